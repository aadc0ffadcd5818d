//! Synchronizes a remote asset catalog with a local workspace: resolves
//! dependency closures, surfaces conflicts for a decision, downloads and
//! relocates files, and keeps a persistent index of what's been imported.

pub mod cache;
pub mod error;
pub mod ext;
pub mod id;
pub mod index;
pub mod model;
pub mod pipeline;
pub mod ports;
pub mod resolver;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{
    CacheError, CatalogError, EngineError, ImportError, IoError, PersistenceError, ResolveError,
};
pub use id::{AssetIdentifier, FileGuid, TrackedId};
pub use model::{
    AssetData, AssetDataFile, AssetStatus, Dataset, Decision, ImportStatus, ImportType,
    ImportedAssetInfo, ImportedFileInfo, OperationState,
};
pub use pipeline::{BulkImportOperation, ImportEngine, ImportOperation};
pub use ports::{
    BoxFuture, BoxStream, CancelToken, CatalogPort, DecisionPort, DownloadOutcome, DownloadPort,
    IoPort, PostprocessEvent, SortOrder, WorkspacePort,
};
pub use resolver::{DependencyResolver, ResolutionReport, ResolvedClosure};
pub use settings::{EffectiveSettings, EngineSettings, ImportOverrides};
