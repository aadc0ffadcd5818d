//! Path and modification conflict detection once the closure is known
//! (§4.E Conflict detection).

use std::sync::Arc;

use crate::ext::PathExt;
use crate::index::ImportedAssetIndex;
use crate::model::AssetData;
use crate::ports::{CancelToken, IoPort, WorkspacePort};
use crate::settings::EffectiveSettings;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetConflicts {
    /// Original catalog paths whose expected target already exists in the
    /// workspace.
    pub existing_files: Vec<String>,
    /// Original catalog paths whose existing local copy is considered
    /// modified (fail-safe: unknown checksum counts as modified).
    pub modified_files: Vec<String>,
}

impl AssetConflicts {
    pub fn is_empty(&self) -> bool {
        self.existing_files.is_empty() && self.modified_files.is_empty()
    }
}

/// Replaces characters that are unsafe in a file name with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Expected workspace-relative target directory for an asset, honoring the
/// sub-folder-creation setting.
pub fn target_dir(asset: &AssetData, settings: &EffectiveSettings) -> String {
    if settings.is_subfolder_creation_enabled {
        format!(
            "{}/{}",
            settings.import_location.trim_end_matches('/'),
            sanitize_name(&asset.name)
        )
    } else {
        settings.import_location.clone()
    }
}

pub async fn detect_conflicts(
    asset: &AssetData,
    settings: &EffectiveSettings,
    index: &ImportedAssetIndex,
    io: &Arc<dyn IoPort>,
    _workspace: &Arc<dyn WorkspacePort>,
    cancel: &CancelToken,
) -> AssetConflicts {
    let mut conflicts = AssetConflicts::default();
    if cancel.is_cancelled() {
        return conflicts;
    }

    let tracked = asset.identifier.tracked();
    let previous = index.get_by_tracked(&tracked);
    let dir = target_dir(asset, settings);

    for file in asset.files() {
        let target_path = file.path.with_prefix(&dir).into_owned();

        if io.file_exists(&target_path).await {
            conflicts.existing_files.push(file.path.clone());
        }

        let Some(ref previous) = previous else {
            continue;
        };
        let Some(prior_file) = previous
            .files
            .iter()
            .find(|f| f.original_path == file.path)
        else {
            continue;
        };

        if !io.file_exists(&target_path).await {
            continue;
        }

        let modified = match io.get_file_last_write_time_utc(&target_path).await {
            Some(modified) => modified,
            None => {
                conflicts.modified_files.push(file.path.clone());
                continue;
            }
        };

        if modified == prior_file.modified {
            continue;
        }

        match io.file_read_all_bytes(&target_path).await {
            Ok(bytes) => {
                let checksum = format!("{:x}", md5::compute(&bytes));
                if checksum != prior_file.checksum {
                    conflicts.modified_files.push(file.path.clone());
                }
            }
            // unknown checksum is treated as modified, fail-safe
            Err(_) => conflicts.modified_files.push(file.path.clone()),
        }
    }

    // _workspace is reserved for dirty-editor-state queries a full adapter would add.
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::AssetIdentifier;

    #[test]
    fn sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_name("a/b:c"), "a_b_c");
    }

    #[test]
    fn target_dir_appends_subfolder_when_enabled() {
        let asset = AssetData {
            identifier: AssetIdentifier::new("org", "proj", "asset", "1"),
            sequence_number: 1,
            updated: 0,
            name: "My Asset".into(),
            asset_type: "mesh".into(),
            status: crate::model::AssetStatus::Published,
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
        };
        let settings = EffectiveSettings {
            import_location: "Assets/Imported".into(),
            is_subfolder_creation_enabled: true,
            is_reimport_modal_disabled: false,
            avoid_rolling_back_asset_version: false,
        };
        assert_eq!(target_dir(&asset, &settings), "Assets/Imported/My_Asset");
    }
}
