use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable address of one asset version: `(org, project, asset, version)`.
///
/// Identifiers are value types and are immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetIdentifier {
    pub org_id: String,
    pub project_id: String,
    pub asset_id: String,
    pub version: String,
}

impl AssetIdentifier {
    pub fn new(
        org_id: impl Into<String>,
        project_id: impl Into<String>,
        asset_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            project_id: project_id.into(),
            asset_id: asset_id.into(),
            version: version.into(),
        }
    }

    /// True when the asset has no remote organization, i.e. it is local-only.
    pub fn is_local(&self) -> bool {
        self.org_id.is_empty()
    }

    /// Tracked identity: version elided. At most one version of a given
    /// `(org, project, asset)` may be materialized locally at a time.
    pub fn tracked(&self) -> TrackedId {
        TrackedId {
            org_id: self.org_id.clone(),
            project_id: self.project_id.clone(),
            asset_id: self.asset_id.clone(),
        }
    }

    /// Key used by the resolver's shared traversal table: `{projectId}/{assetId}`.
    /// Deliberately excludes `org_id` and `version` — dependencies are resolved
    /// per asset, not per version.
    pub fn resolver_key(&self) -> String {
        format!("{}/{}", self.project_id, self.asset_id)
    }
}

impl fmt::Display for AssetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.org_id, self.project_id, self.asset_id, self.version
        )
    }
}

/// `AssetIdentifier` with `version` elided. The primary key of the
/// imported-asset index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedId {
    pub org_id: String,
    pub project_id: String,
    pub asset_id: String,
}

impl TrackedId {
    pub fn resolver_key(&self) -> String {
        format!("{}/{}", self.project_id, self.asset_id)
    }
}

impl fmt::Display for TrackedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.org_id, self.project_id, self.asset_id)
    }
}

impl From<&AssetIdentifier> for TrackedId {
    fn from(id: &AssetIdentifier) -> Self {
        id.tracked()
    }
}

/// Workspace-local stable identifier for a file, assigned by the asset
/// database. Opaque to the engine beyond equality and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileGuid(pub String);

impl fmt::Display for FileGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FileGuid {
    /// First two hex characters, used as the persistence sub-folder (§6).
    pub fn shard(&self) -> &str {
        let len = self.0.len().min(2);
        &self.0[..len]
    }
}
