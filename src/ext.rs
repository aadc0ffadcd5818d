use serde::{Serialize, de::DeserializeOwned};
use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

/// Forward-compatible framing: RON ignores unknown fields on deserialize by
/// default, so entries written by newer versions can still be read (and
/// pruned) by older ones (§9 Serialization).
pub trait SerializeExt {
    fn to_bytes(&self) -> Result<Vec<u8>, ron::Error>;
}

impl<T: Serialize> SerializeExt for T {
    fn to_bytes(&self) -> Result<Vec<u8>, ron::Error> {
        ron::to_string(self).map(String::into_bytes)
    }
}

pub trait DeserializeExt: Sized {
    fn from_bytes(bytes: &[u8]) -> Result<Self, ron::de::SpannedError>;
}

impl<T: DeserializeOwned> DeserializeExt for T {
    fn from_bytes(bytes: &[u8]) -> Result<Self, ron::de::SpannedError> {
        ron::de::from_bytes(bytes)
    }
}

pub trait PathExt {
    fn ext(&self) -> Option<&str>;
    fn append_ext(&self, ext: &str) -> PathBuf;
    fn with_prefix(&'_ self, prefix: impl AsRef<Path>) -> Cow<'_, Path>;
}

impl<T: AsRef<Path>> PathExt for T {
    fn ext(&self) -> Option<&str> {
        self.as_ref().extension().and_then(|ext| ext.to_str())
    }
    fn append_ext(&self, ext: &str) -> PathBuf {
        let path = self.as_ref().to_path_buf();
        format!("{}.{}", path.display(), ext).into()
    }

    fn with_prefix(&'_ self, prefix: impl AsRef<Path>) -> Cow<'_, Path> {
        match self.as_ref().starts_with(prefix.as_ref()) {
            false => Cow::Owned(prefix.as_ref().join(self)),
            true => Cow::Borrowed(self.as_ref()),
        }
    }
}
