use serde::{Deserialize, Serialize};

/// Recognized settings keys (§6 Settings options).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Workspace-relative root under which assets are imported.
    pub default_import_location: String,
    /// When true, each asset is placed under a sub-folder named from a
    /// sanitized asset name.
    pub is_subfolder_creation_enabled: bool,
    /// When true, re-importing an older version is prevented without user
    /// confirmation.
    pub is_keep_higher_version_enabled: bool,
    /// When true, silently replace on conflict.
    pub is_reimport_modal_disabled: bool,
    pub base_cache_location: String,
    pub thumbnails_cache_location: String,
    /// Eviction ceiling, in megabytes.
    pub max_cache_size_mb: u64,
    /// Resolver chunking size for catalog search.
    pub default_search_page_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_import_location: String::new(),
            is_subfolder_creation_enabled: false,
            is_keep_higher_version_enabled: false,
            is_reimport_modal_disabled: false,
            base_cache_location: "Cache".into(),
            thumbnails_cache_location: "Cache/Thumbnails".into(),
            max_cache_size_mb: 512,
            default_search_page_size: 50,
        }
    }
}

/// Per-call overrides for a single `startImport` (§4.G step 2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportOverrides {
    pub disable_reimport_modal: Option<bool>,
    pub avoid_rolling_back_asset_version: Option<bool>,
    pub import_path: Option<String>,
}

/// Effective settings snapshot: user defaults combined with per-call
/// overrides, override wins if present.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub import_location: String,
    pub is_subfolder_creation_enabled: bool,
    pub is_reimport_modal_disabled: bool,
    pub avoid_rolling_back_asset_version: bool,
}

impl EngineSettings {
    pub fn effective(&self, overrides: &ImportOverrides) -> EffectiveSettings {
        EffectiveSettings {
            import_location: overrides
                .import_path
                .clone()
                .unwrap_or_else(|| self.default_import_location.clone()),
            is_subfolder_creation_enabled: self.is_subfolder_creation_enabled,
            is_reimport_modal_disabled: overrides
                .disable_reimport_modal
                .unwrap_or(self.is_reimport_modal_disabled),
            avoid_rolling_back_asset_version: overrides
                .avoid_rolling_back_asset_version
                .unwrap_or(self.is_keep_higher_version_enabled),
        }
    }
}
