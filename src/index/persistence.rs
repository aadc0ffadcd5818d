//! Load/save the imported-asset index to disk, one file per entry (§6
//! Persistence layout, component B).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PersistenceError;
use crate::ext::{DeserializeExt, PathExt, SerializeExt};
use crate::model::ImportedAssetInfo;
use crate::ports::IoPort;

/// `<projectSettings>/Packages/<packageName>/ImportedAssetInfo/`. Each entry
/// is a file named by `assetId`, stored under a two-character hex
/// sub-folder taken from the first two characters of the tracked id's guid.
pub struct IndexPersistence {
    root: PathBuf,
    io: Arc<dyn IoPort>,
}

impl IndexPersistence {
    pub fn new(root: impl Into<PathBuf>, io: Arc<dyn IoPort>) -> Self {
        Self {
            root: root.into(),
            io,
        }
    }

    fn entry_path(&self, shard: &str, asset_id: &str) -> PathBuf {
        self.root.join(shard).join(asset_id).append_ext("ron")
    }

    pub async fn save_entry(
        &self,
        shard: &str,
        asset_id: &str,
        entry: &ImportedAssetInfo,
    ) -> Result<(), PersistenceError> {
        let path = self.entry_path(shard, asset_id);
        if let Some(parent) = path.parent() {
            self.io.create_directory(parent).await?;
        }
        let bytes = entry
            .to_bytes()
            .map_err(|e| PersistenceError::Malformed {
                path: path.clone(),
                message: e.to_string(),
            })?;
        self.io.file_write_all_bytes(&path, &bytes).await?;
        Ok(())
    }

    pub async fn remove_entry(&self, shard: &str, asset_id: &str) -> Result<(), PersistenceError> {
        let path = self.entry_path(shard, asset_id);
        if self.io.file_exists(&path).await {
            self.io.delete_file(&path, true).await?;
        }
        Ok(())
    }

    /// Loads every entry found under the root. Malformed entries are
    /// skipped with a warning; loading errors do not abort the scan.
    pub async fn load_all(&self) -> Vec<ImportedAssetInfo> {
        let mut out = Vec::new();
        if !self.io.directory_exists(&self.root).await {
            return out;
        }

        for shard_dir in self.list_shard_dirs().await {
            for file in self.list_entry_files(&shard_dir).await {
                match self.io.file_read_all_bytes(&file).await {
                    Ok(bytes) => match ImportedAssetInfo::from_bytes(&bytes) {
                        Ok(entry) => out.push(entry),
                        Err(error) => {
                            log::warn!("skipping malformed index entry {}: {}", file.display(), error);
                        }
                    },
                    Err(error) => {
                        log::warn!("failed to read index entry {}: {}", file.display(), error);
                    }
                }
            }
        }

        out
    }

    async fn list_shard_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for entry in self.io.read_dir(&self.root).await {
            if self.io.directory_exists(&entry).await {
                dirs.push(entry);
            }
        }
        dirs
    }

    async fn list_entry_files(&self, shard_dir: &Path) -> Vec<PathBuf> {
        self.io
            .read_dir(shard_dir)
            .await
            .into_iter()
            .filter(|p| p.ext() == Some("ron"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{AssetIdentifier, FileGuid};
    use crate::model::{AssetData, AssetStatus};
    use crate::testing::InMemoryIo;

    fn sample_entry(asset_id: &str) -> ImportedAssetInfo {
        ImportedAssetInfo {
            asset_data: AssetData {
                identifier: AssetIdentifier::new("org", "proj", asset_id, "1"),
                sequence_number: 1,
                updated: 0,
                name: asset_id.into(),
                asset_type: "mesh".into(),
                status: AssetStatus::Published,
                change_log: String::new(),
                authoring_info: String::new(),
                preview_file: None,
                frozen: true,
                tags: vec![],
                labels: vec![],
                linked_projects: vec![],
                metadata: None,
                datasets: vec![],
                dependencies: vec![],
            },
            files: vec![crate::model::ImportedFileInfo {
                dataset_id: "Source".into(),
                file_guid: FileGuid("abcd".into()),
                original_path: "a.bin".into(),
                checksum: "deadbeef".into(),
                modified: 0,
                meta_checksum: None,
                meta_modified: None,
            }],
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        smol::block_on(async {
            let io: Arc<dyn IoPort> = Arc::new(InMemoryIo::default());
            let persistence = IndexPersistence::new("/index", io);

            let entry = sample_entry("A");
            persistence.save_entry("ab", "A", &entry).await.unwrap();

            let loaded = persistence.load_all().await;
            assert_eq!(loaded.len(), 1);
            assert_eq!(loaded[0], entry);
        });
    }
}
