use serde::{Deserialize, Serialize};

use crate::id::{AssetIdentifier, FileGuid};

/// Named group of files within one asset version (e.g. *Source*, *Preview*).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub files: Vec<AssetDataFile>,
}

/// Per-file metadata within a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDataFile {
    pub path: String,
    pub extension: String,
    pub size: u64,
    pub available: bool,
    pub tags: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetStatus {
    Draft,
    Published,
    Archived,
}

/// Catalog view of one asset version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetData {
    pub identifier: AssetIdentifier,
    pub sequence_number: u64,
    pub updated: u64,
    pub name: String,
    pub asset_type: String,
    pub status: AssetStatus,
    pub change_log: String,
    pub authoring_info: String,
    pub preview_file: Option<String>,
    pub frozen: bool,
    pub tags: Vec<String>,
    pub labels: Vec<String>,
    pub linked_projects: Vec<String>,
    pub metadata: Option<String>,
    pub datasets: Vec<Dataset>,
    /// Direct dependency identifiers only; transitive closure is the
    /// resolver's job (§4.E).
    pub dependencies: Vec<AssetIdentifier>,
}

impl AssetData {
    pub fn files(&self) -> impl Iterator<Item = &AssetDataFile> {
        self.datasets.iter().flat_map(|d| d.files.iter())
    }
}

/// One locally materialized file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedFileInfo {
    pub dataset_id: String,
    pub file_guid: FileGuid,
    pub original_path: String,
    /// Content checksum (MD5), hex-encoded.
    pub checksum: String,
    pub modified: u64,
    pub meta_checksum: Option<String>,
    pub meta_modified: Option<u64>,
}

/// One locally materialized asset: an `AssetData` snapshot plus its files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedAssetInfo {
    pub asset_data: AssetData,
    pub files: Vec<ImportedFileInfo>,
}

/// `Import` resolves exact versions as given; `UpdateToLatest` picks the
/// latest version of each requested asset (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportType {
    Import,
    UpdateToLatest,
}

/// Result of `gatherImportStatuses` (§6 Catalog port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportStatus {
    UpToDate,
    OutOfDate,
    ErrorSync,
    NoImport,
}

/// Per-asset outcome of the decision port (§4.E Decision step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Replace,
    Ignore,
}

/// Lifecycle state of one `ImportOperation` (§4.G States).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    NotStarted,
    InProgress,
    Success,
    Error,
    Cancelled,
}
