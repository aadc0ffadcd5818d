use std::path::PathBuf;
use std::sync::Arc;

use crate::id::AssetIdentifier;

/// Failure reading or writing through the I/O port (§6 I/O port).
#[derive(Debug, Clone, thiserror::Error)]
pub enum IoError {
    #[error("not found: {0}")]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
    #[error("{0}")]
    Unknown(String),
}

impl From<std::io::Error> for IoError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(PathBuf::new()),
            _ => IoError::Io(Arc::new(error)),
        }
    }
}

/// Failure reaching the remote catalog (§6 Catalog port, §7 taxonomy).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("asset not found: {0}")]
    NotFound(AssetIdentifier),
    #[error("forbidden: {0}")]
    Forbidden(AssetIdentifier),
    #[error("service error: {0}")]
    Service(String),
    #[error("cancelled")]
    Cancelled,
}

/// Failure during dependency resolution (§4.E).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Failure during the import pipeline (§4.G, §7 propagation policy).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImportError {
    #[error("an import is already in progress")]
    AlreadyInProgress,
    #[error("destination path is outside the workspace root: {0}")]
    DestinationOutsideWorkspace(PathBuf),
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("failed to import asset {id}: {source}")]
    Asset {
        id: AssetIdentifier,
        #[source]
        source: Box<ImportError>,
    },
}

/// Failure loading or saving the imported-asset index (§6 Persistence layout).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("failed to deserialize entry at {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// Failure in the content-addressed cache (§4.I).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] IoError),
}

/// Crate-wide error, composing every subsystem's error type via `#[from]` so
/// a host embedding the engine can match on one type if it doesn't care
/// which component failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_from_not_found_kind() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(IoError::from(err), IoError::NotFound(_)));
    }

    #[test]
    fn import_error_wraps_resolve_error() {
        let err: ImportError = ResolveError::Cancelled.into();
        assert!(matches!(err, ImportError::Resolve(ResolveError::Cancelled)));
    }

    #[test]
    fn engine_error_composes_every_subsystem() {
        let err: EngineError = ImportError::AlreadyInProgress.into();
        assert!(matches!(err, EngineError::Import(ImportError::AlreadyInProgress)));

        let err: EngineError = PersistenceError::Malformed { path: PathBuf::new(), message: "x".into() }.into();
        assert!(matches!(err, EngineError::Persistence(_)));

        let err: EngineError = CacheError::Io(IoError::NotFound(PathBuf::new())).into();
        assert!(matches!(err, EngineError::Cache(_)));
    }
}
