//! External interfaces the engine core depends on (§6). Each port is an
//! abstract, object-safe trait in the same shape as the teacher crate's
//! `ErasedFileSystem`: methods return a boxed future so the trait stays
//! dyn-compatible and callers can hold `Arc<dyn CatalogPort>` etc.

use std::path::{Path, PathBuf};
use std::pin::Pin;

use futures::Stream;

use crate::error::{CatalogError, IoError};
use crate::id::{AssetIdentifier, FileGuid};
use crate::model::{AssetData, AssetDataFile, ImportStatus};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// A cooperative cancellation signal, shared by clones. Mirrors §5's "single
/// ambient cancellation token attached to every long-running call path".
#[derive(Clone, Default)]
pub struct CancelToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Remote read operations the resolver depends on (§6 Catalog port).
pub trait CatalogPort: Send + Sync {
    fn get_asset<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<AssetData, CatalogError>>;

    fn get_latest_asset_version<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<AssetData, CatalogError>>;

    fn get_latest_asset_version_string<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<String, CatalogError>>;

    fn list_versions_descending<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        cancel: &'a CancelToken,
    ) -> BoxStream<'a, AssetData>;

    fn search<'a>(
        &'a self,
        org: &'a str,
        projects: &'a [String],
        filter: &'a str,
        sort: &'a str,
        order: SortOrder,
        offset: usize,
        page_size: usize,
        cancel: &'a CancelToken,
    ) -> BoxStream<'a, AssetData>;

    fn resolve_datasets<'a>(
        &'a self,
        asset: &'a mut AssetData,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<(), CatalogError>>;

    fn refresh_dependencies<'a>(
        &'a self,
        asset: &'a mut AssetData,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<(), CatalogError>>;

    fn gather_import_statuses<'a>(
        &'a self,
        assets: &'a [AssetIdentifier],
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<std::collections::HashMap<AssetIdentifier, ImportStatus>, CatalogError>>;

    fn list_files<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        dataset: &'a str,
        offset: usize,
        count: usize,
        cancel: &'a CancelToken,
    ) -> BoxStream<'a, AssetDataFile>;

    fn get_dataset_download_urls<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        dataset: &'a str,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<std::collections::HashMap<String, String>, CatalogError>>;

    fn get_preview_url<'a>(
        &'a self,
        asset: &'a AssetIdentifier,
        max_dim: u32,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<Option<String>, CatalogError>>;
}

/// Notification payload for `postprocessAllAssets` (§6 Workspace port).
#[derive(Debug, Clone, Default)]
pub struct PostprocessEvent {
    pub imported: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub moved: Vec<PathBuf>,
    pub moved_from: Vec<PathBuf>,
}

/// The local workspace's asset database (§6 Workspace asset-database port).
pub trait WorkspacePort: Send + Sync {
    fn path_to_id<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Option<FileGuid>>;
    fn id_to_path<'a>(&'a self, guid: &'a FileGuid) -> BoxFuture<'a, Option<PathBuf>>;
    fn get_dependencies<'a>(
        &'a self,
        path: &'a Path,
        recursive: bool,
    ) -> BoxFuture<'a, Vec<PathBuf>>;
    fn delete_assets<'a>(&'a self, paths: &'a [PathBuf]) -> BoxFuture<'a, (bool, Vec<PathBuf>)>;
    fn import_asset<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), IoError>>;
    fn start_asset_editing(&self);
    fn stop_asset_editing(&self);
    fn refresh(&self);
}

/// OS-level file I/O (§6 I/O port). `read_dir` is not part of the source's
/// literal port surface but is required to enumerate persistence shards and
/// cache contents; grounded on the teacher crate's `FileSystem::read_dir`.
pub trait IoPort: Send + Sync {
    fn file_exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool>;
    fn directory_exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool>;
    fn read_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Vec<PathBuf>>;
    fn create_directory<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), IoError>>;
    fn directory_delete<'a>(
        &'a self,
        path: &'a Path,
        recursive: bool,
    ) -> BoxFuture<'a, Result<(), IoError>>;
    fn file_move<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, Result<(), IoError>>;
    fn delete_file<'a>(
        &'a self,
        path: &'a Path,
        remove_empty_parents: bool,
    ) -> BoxFuture<'a, Result<(), IoError>>;
    fn file_read_all_bytes<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<u8>, IoError>>;
    fn file_write_all_bytes<'a>(
        &'a self,
        path: &'a Path,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<(), IoError>>;
    fn get_file_last_write_time_utc<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Option<u64>>;
    fn get_file_length<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Option<u64>>;
    /// Most-recent-first ordering, filtered by access-time <= now+1min.
    fn get_oldest_files<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Vec<(PathBuf, u64, u64)>>;
    fn get_unique_temp_path_in_project<'a>(&'a self) -> BoxFuture<'a, PathBuf>;
}

/// `resolveConflicts(report, settings) -> stream<{asset, Replace|Ignore}>`
/// (§6 Decision port). The core is oblivious to how a human answers.
pub trait DecisionPort: Send + Sync {
    fn resolve_conflicts<'a>(
        &'a self,
        report: &'a crate::resolver::ResolutionReport,
    ) -> BoxStream<'a, (AssetIdentifier, crate::model::Decision)>;
}

/// Outcome of one completed transfer (§4.H). Not part of the source's
/// literal port list, but required for the download manager to have
/// anything to drive — grounded on the same "request's `result`" the
/// manager inspects each tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Success,
    ConnectionError(String),
    ProtocolError(String),
    DataProcessingError(String),
}

/// Streams bytes from a URL to a destination path, reporting progress via
/// callback (§4.H Download Manager's underlying transport).
pub trait DownloadPort: Send + Sync {
    fn download<'a>(
        &'a self,
        url: &'a str,
        destination: &'a Path,
        on_progress: &'a (dyn Fn(u64, Option<u64>) + Send + Sync),
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, DownloadOutcome>;
}
