//! In-memory port implementations used across unit tests, in the same
//! spirit as the teacher crate's `VirtualFs` for its `FileSystem` trait:
//! every subsystem can be exercised without real network or disk access.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use futures::stream;

use crate::error::{CatalogError, IoError};
use crate::id::{AssetIdentifier, FileGuid};
use crate::model::{AssetData, AssetDataFile, Decision, ImportStatus};
use crate::ports::{BoxFuture, BoxStream, CancelToken, CatalogPort, DecisionPort, IoPort, SortOrder, WorkspacePort};
use crate::resolver::ResolutionReport;

#[derive(Default)]
struct IoState {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: std::collections::HashSet<PathBuf>,
    access_times: HashMap<PathBuf, u64>,
}

/// Backed entirely by in-process maps; every write is immediately visible
/// and there is no real atomicity below the engine's own temp-then-rename
/// logic, which is exactly what these tests exercise.
#[derive(Default)]
pub struct InMemoryIo {
    state: Mutex<IoState>,
    clock: std::sync::atomic::AtomicU64,
}

impl InMemoryIo {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    fn ensure_parents(state: &mut IoState, path: &Path) {
        let mut cur = PathBuf::new();
        for component in path.parent().into_iter().flat_map(|p| p.components()) {
            cur.push(component);
            state.dirs.insert(cur.clone());
        }
    }
}

impl IoPort for InMemoryIo {
    fn file_exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.state.lock().unwrap().files.contains_key(path) })
    }

    fn directory_exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.state.lock().unwrap().dirs.contains(path) })
    }

    fn read_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Vec<PathBuf>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            let mut out: Vec<PathBuf> = state
                .files
                .keys()
                .chain(state.dirs.iter())
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect();
            out.sort();
            out.dedup();
            out
        })
    }

    fn create_directory<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), IoError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            Self::ensure_parents(&mut state, &path.join("_"));
            state.dirs.insert(path.to_path_buf());
            Ok(())
        })
    }

    fn directory_delete<'a>(
        &'a self,
        path: &'a Path,
        recursive: bool,
    ) -> BoxFuture<'a, Result<(), IoError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if recursive {
                state.files.retain(|p, _| !p.starts_with(path));
                state.dirs.retain(|p| !p.starts_with(path));
            } else {
                state.dirs.remove(path);
            }
            Ok(())
        })
    }

    fn file_move<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, Result<(), IoError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let bytes = state
                .files
                .remove(from)
                .ok_or_else(|| IoError::NotFound(from.to_path_buf()))?;
            Self::ensure_parents(&mut state, to);
            state.files.insert(to.to_path_buf(), bytes);
            let now = self.tick();
            state.access_times.insert(to.to_path_buf(), now);
            Ok(())
        })
    }

    fn delete_file<'a>(
        &'a self,
        path: &'a Path,
        _remove_empty_parents: bool,
    ) -> BoxFuture<'a, Result<(), IoError>> {
        Box::pin(async move {
            self.state.lock().unwrap().files.remove(path);
            Ok(())
        })
    }

    fn file_read_all_bytes<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<u8>, IoError>> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .files
                .get(path)
                .cloned()
                .ok_or_else(|| IoError::NotFound(path.to_path_buf()))
        })
    }

    fn file_write_all_bytes<'a>(
        &'a self,
        path: &'a Path,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<(), IoError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            Self::ensure_parents(&mut state, path);
            state.files.insert(path.to_path_buf(), bytes.to_vec());
            let now = self.tick();
            state.access_times.insert(path.to_path_buf(), now);
            Ok(())
        })
    }

    fn get_file_last_write_time_utc<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Option<u64>> {
        Box::pin(async move { self.state.lock().unwrap().access_times.get(path).copied() })
    }

    fn get_file_length<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Option<u64>> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .files
                .get(path)
                .map(|b| b.len() as u64)
        })
    }

    fn get_oldest_files<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Vec<(PathBuf, u64, u64)>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            let mut out: Vec<(PathBuf, u64, u64)> = state
                .files
                .iter()
                .filter(|(p, _)| p.parent() == Some(dir))
                .map(|(p, bytes)| {
                    let accessed = state.access_times.get(p).copied().unwrap_or(0);
                    (p.clone(), accessed, bytes.len() as u64)
                })
                .collect();
            out.sort_by(|a, b| b.1.cmp(&a.1));
            out
        })
    }

    fn get_unique_temp_path_in_project<'a>(&'a self) -> BoxFuture<'a, PathBuf> {
        Box::pin(async move {
            let _ = self.tick();
            PathBuf::from(format!("/tmp/staging-{}", uuid::Uuid::new_v4()))
        })
    }
}

/// A catalog backed by a fixed, in-process asset table. Tests seed it and
/// exercise the resolver/pipeline against it without a network.
#[derive(Default)]
pub struct InMemoryCatalog {
    assets: Mutex<HashMap<AssetIdentifier, AssetData>>,
}

impl InMemoryCatalog {
    pub fn insert(&self, asset: AssetData) {
        self.assets.lock().unwrap().insert(asset.identifier.clone(), asset);
    }

    fn latest_version(&self, id: &AssetIdentifier) -> Option<AssetData> {
        let assets = self.assets.lock().unwrap();
        assets
            .values()
            .filter(|a| a.identifier.org_id == id.org_id
                && a.identifier.project_id == id.project_id
                && a.identifier.asset_id == id.asset_id)
            .max_by_key(|a| a.sequence_number)
            .cloned()
    }
}

impl CatalogPort for InMemoryCatalog {
    fn get_asset<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        _cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<AssetData, CatalogError>> {
        Box::pin(async move {
            self.assets
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| CatalogError::NotFound(id.clone()))
        })
    }

    fn get_latest_asset_version<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        _cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<AssetData, CatalogError>> {
        Box::pin(async move {
            self.latest_version(id)
                .ok_or_else(|| CatalogError::NotFound(id.clone()))
        })
    }

    fn get_latest_asset_version_string<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        _cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<String, CatalogError>> {
        Box::pin(async move {
            self.latest_version(id)
                .map(|a| a.identifier.version)
                .ok_or_else(|| CatalogError::NotFound(id.clone()))
        })
    }

    fn list_versions_descending<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        _cancel: &'a CancelToken,
    ) -> BoxStream<'a, AssetData> {
        let mut versions: Vec<AssetData> = self
            .assets
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.identifier.tracked() == id.tracked())
            .cloned()
            .collect();
        versions.sort_by_key(|a| std::cmp::Reverse(a.sequence_number));
        Box::pin(stream::iter(versions))
    }

    fn search<'a>(
        &'a self,
        org: &'a str,
        _projects: &'a [String],
        _filter: &'a str,
        _sort: &'a str,
        _order: SortOrder,
        _offset: usize,
        _page_size: usize,
        _cancel: &'a CancelToken,
    ) -> BoxStream<'a, AssetData> {
        let assets: Vec<AssetData> = self
            .assets
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.identifier.org_id == org)
            .cloned()
            .collect();
        Box::pin(stream::iter(assets))
    }

    fn resolve_datasets<'a>(
        &'a self,
        _asset: &'a mut AssetData,
        _cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<(), CatalogError>> {
        Box::pin(async move { Ok(()) })
    }

    fn refresh_dependencies<'a>(
        &'a self,
        asset: &'a mut AssetData,
        _cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<(), CatalogError>> {
        Box::pin(async move {
            if let Some(latest) = self.assets.lock().unwrap().get(&asset.identifier) {
                asset.dependencies = latest.dependencies.clone();
            }
            Ok(())
        })
    }

    fn gather_import_statuses<'a>(
        &'a self,
        assets: &'a [AssetIdentifier],
        _cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<HashMap<AssetIdentifier, ImportStatus>, CatalogError>> {
        Box::pin(async move {
            let mut out = HashMap::new();
            for id in assets {
                let status = match self.latest_version(id) {
                    Some(latest) if latest.identifier.version == id.version => ImportStatus::UpToDate,
                    Some(_) => ImportStatus::OutOfDate,
                    None => ImportStatus::ErrorSync,
                };
                out.insert(id.clone(), status);
            }
            Ok(out)
        })
    }

    fn list_files<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        dataset: &'a str,
        _offset: usize,
        _count: usize,
        _cancel: &'a CancelToken,
    ) -> BoxStream<'a, AssetDataFile> {
        let files: Vec<AssetDataFile> = self
            .assets
            .lock()
            .unwrap()
            .get(id)
            .into_iter()
            .flat_map(|a| a.datasets.iter().find(|d| d.id == dataset).cloned())
            .flat_map(|d| d.files)
            .collect();
        Box::pin(stream::iter(files))
    }

    fn get_dataset_download_urls<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        dataset: &'a str,
        _cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<HashMap<String, String>, CatalogError>> {
        Box::pin(async move {
            let assets = self.assets.lock().unwrap();
            let asset = assets.get(id).ok_or_else(|| CatalogError::NotFound(id.clone()))?;
            let files = asset
                .datasets
                .iter()
                .find(|d| d.id == dataset)
                .map(|d| d.files.clone())
                .unwrap_or_default();
            Ok(files
                .into_iter()
                .map(|f| {
                    let url = format!("mem://{}/{}", id, f.path);
                    (f.path, url)
                })
                .collect())
        })
    }

    fn get_preview_url<'a>(
        &'a self,
        _asset: &'a AssetIdentifier,
        _max_dim: u32,
        _cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<Option<String>, CatalogError>> {
        Box::pin(async move { Ok(None) })
    }
}

/// Workspace port mock: assigns a new guid to every imported path, no
/// recursive dependency tracking.
#[derive(Default)]
pub struct InMemoryWorkspace {
    guids: Mutex<HashMap<PathBuf, FileGuid>>,
}

impl WorkspacePort for InMemoryWorkspace {
    fn path_to_id<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Option<FileGuid>> {
        Box::pin(async move { self.guids.lock().unwrap().get(path).cloned() })
    }

    fn id_to_path<'a>(&'a self, guid: &'a FileGuid) -> BoxFuture<'a, Option<PathBuf>> {
        Box::pin(async move {
            self.guids
                .lock()
                .unwrap()
                .iter()
                .find(|(_, g)| *g == guid)
                .map(|(p, _)| p.clone())
        })
    }

    fn get_dependencies<'a>(&'a self, _path: &'a Path, _recursive: bool) -> BoxFuture<'a, Vec<PathBuf>> {
        Box::pin(async move { Vec::new() })
    }

    fn delete_assets<'a>(&'a self, paths: &'a [PathBuf]) -> BoxFuture<'a, (bool, Vec<PathBuf>)> {
        Box::pin(async move {
            let mut guids = self.guids.lock().unwrap();
            for path in paths {
                guids.remove(path);
            }
            (true, Vec::new())
        })
    }

    fn import_asset<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), IoError>> {
        Box::pin(async move {
            let mut guids = self.guids.lock().unwrap();
            if !guids.contains_key(path) {
                guids.insert(path.to_path_buf(), FileGuid(uuid::Uuid::new_v4().simple().to_string()));
            }
            Ok(())
        })
    }

    fn start_asset_editing(&self) {}
    fn stop_asset_editing(&self) {}
    fn refresh(&self) {}
}

/// Always replaces. Matches the source's "absence of a decision maker
/// defaults to Replace-all" debug/batch mode (§4.E Decision step).
pub struct ReplaceAllDecisions;

impl DecisionPort for ReplaceAllDecisions {
    fn resolve_conflicts<'a>(
        &'a self,
        report: &'a ResolutionReport,
    ) -> BoxStream<'a, (AssetIdentifier, Decision)> {
        let decisions: Vec<_> = report
            .all_assets()
            .map(|a| (a.identifier.clone(), Decision::Replace))
            .collect();
        Box::pin(stream::iter(decisions))
    }
}
