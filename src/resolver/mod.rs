//! Dependency resolver (component E, §4.E): given a requested set of asset
//! identifiers, fetches the latest or exact versions, walks their declared
//! dependency graph, merges duplicate fetches, and reports path/modification
//! conflicts ahead of the decision step.

pub mod conflict;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;

use crate::error::{CatalogError, ResolveError};
use crate::id::AssetIdentifier;
use crate::index::ImportedAssetIndex;
use crate::model::{AssetData, ImportType};
use crate::ports::{CancelToken, CatalogPort, IoPort, SortOrder, WorkspacePort};
use crate::settings::EffectiveSettings;

pub use conflict::AssetConflicts;

/// State of one node in the shared traversal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraversalState {
    NotStarted,
    InProgress,
    Completed,
}

struct TableEntry {
    state: TraversalState,
    data: Option<AssetData>,
}

type Table = smol::lock::Mutex<HashMap<String, TableEntry>>;

struct Shared {
    table: Table,
    direct_keys: smol::lock::Mutex<HashSet<String>>,
    catalog: Arc<dyn CatalogPort>,
    import_type: ImportType,
    page_size: usize,
    cancel: CancelToken,
}

/// Picks the more authoritative of two samples of the same asset.
/// Total order: higher `sequence_number` wins; ties break on `updated`; a
/// full tie returns `a`. Absent sides lose to present ones.
pub fn choose_latest<'a>(a: &'a AssetData, b: &'a AssetData) -> &'a AssetData {
    if b.sequence_number != a.sequence_number {
        if b.sequence_number > a.sequence_number { b } else { a }
    } else if b.updated > a.updated {
        b
    } else {
        a
    }
}

fn choose_latest_opt<'a>(a: Option<&'a AssetData>, b: Option<&'a AssetData>) -> Option<&'a AssetData> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (Some(x), Some(y)) => Some(choose_latest(x, y)),
    }
}

/// Fetches the requested identifiers from the catalog, grouped by
/// organization and chunked by `page_size`. Single-asset groups use a
/// direct lookup; larger groups page through `search` and filter by the
/// wanted asset ids, since the port has no batch-get. `NotFound` and
/// `Forbidden` degrade the asset out of the result rather than aborting.
async fn fetch_updated(
    catalog: &dyn CatalogPort,
    ids: &[AssetIdentifier],
    import_type: ImportType,
    page_size: usize,
    cancel: &CancelToken,
) -> Result<Vec<AssetData>, ResolveError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_org: HashMap<String, Vec<AssetIdentifier>> = HashMap::new();
    for id in ids {
        by_org.entry(id.org_id.clone()).or_default().push(id.clone());
    }

    let mut out = Vec::new();
    for (org, group) in by_org {
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        if group.len() == 1 {
            let id = &group[0];
            let fetched = match import_type {
                ImportType::Import => catalog.get_asset(id, cancel).await,
                ImportType::UpdateToLatest => catalog.get_latest_asset_version(id, cancel).await,
            };
            match fetched {
                Ok(mut asset) => {
                    let _ = catalog.resolve_datasets(&mut asset, cancel).await;
                    let _ = catalog.refresh_dependencies(&mut asset, cancel).await;
                    out.push(asset);
                }
                Err(CatalogError::NotFound(_)) | Err(CatalogError::Forbidden(_)) => {}
                Err(error) => return Err(error.into()),
            }
            continue;
        }

        for chunk in group.chunks(page_size.max(1)) {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            let filter = search_filter(import_type, chunk);
            let mut stream = catalog.search(&org, &[], &filter, "", SortOrder::Descending, 0, page_size, cancel);

            match import_type {
                // Exact versions requested: keep only assets matching one of
                // the requested (asset id, version) pairs.
                ImportType::Import => {
                    let wanted: HashSet<(&str, &str)> = chunk
                        .iter()
                        .map(|id| (id.asset_id.as_str(), id.version.as_str()))
                        .collect();
                    while let Some(mut asset) = stream.next().await {
                        if !wanted.contains(&(asset.identifier.asset_id.as_str(), asset.identifier.version.as_str())) {
                            continue;
                        }
                        let _ = catalog.resolve_datasets(&mut asset, cancel).await;
                        let _ = catalog.refresh_dependencies(&mut asset, cancel).await;
                        out.push(asset);
                    }
                }
                // Latest version per requested asset id, independent of
                // whatever order the catalog happens to return them in.
                ImportType::UpdateToLatest => {
                    let wanted: HashSet<&str> = chunk.iter().map(|id| id.asset_id.as_str()).collect();
                    let mut best: HashMap<String, AssetData> = HashMap::new();
                    while let Some(mut asset) = stream.next().await {
                        if !wanted.contains(asset.identifier.asset_id.as_str()) {
                            continue;
                        }
                        let _ = catalog.resolve_datasets(&mut asset, cancel).await;
                        let _ = catalog.refresh_dependencies(&mut asset, cancel).await;
                        let keep = match best.get(&asset.identifier.asset_id) {
                            Some(existing) => std::ptr::eq(choose_latest(existing, &asset), &asset),
                            None => true,
                        };
                        if keep {
                            best.insert(asset.identifier.asset_id.clone(), asset);
                        }
                    }
                    out.extend(best.into_values());
                }
            }
        }
    }

    Ok(out)
}

/// §4.E: `Import` filters by `assetVersions ∈ versions`; `UpdateToLatest`
/// filters by `assetIds ∈ ids`.
fn search_filter(import_type: ImportType, chunk: &[AssetIdentifier]) -> String {
    match import_type {
        ImportType::Import => {
            let versions: Vec<&str> = chunk.iter().map(|id| id.version.as_str()).collect();
            format!("assetVersions in [{}]", versions.join(","))
        }
        ImportType::UpdateToLatest => {
            let ids: Vec<&str> = chunk.iter().map(|id| id.asset_id.as_str()).collect();
            format!("assetIds in [{}]", ids.join(","))
        }
    }
}

fn traverse(shared: Arc<Shared>, key: String, local: AssetData, direct: bool) -> crate::ports::BoxFuture<'static, ()> {
    Box::pin(async move {
        if shared.cancel.is_cancelled() {
            return;
        }

        let merged = {
            let mut table = shared.table.lock().await;
            let entry = table.entry(key.clone()).or_insert_with(|| TableEntry {
                state: TraversalState::NotStarted,
                data: None,
            });
            if matches!(entry.state, TraversalState::InProgress | TraversalState::Completed) {
                return;
            }
            let merged = choose_latest_opt(entry.data.as_ref(), Some(&local)).cloned().unwrap_or(local);
            entry.data = Some(merged.clone());
            entry.state = TraversalState::InProgress;
            merged
        };

        if direct {
            shared.direct_keys.lock().await.insert(key.clone());
        }

        let mut unseen: Vec<AssetIdentifier> = Vec::new();
        {
            let mut table = shared.table.lock().await;
            for dep in &merged.dependencies {
                let dep_key = dep.resolver_key();
                if !table.contains_key(&dep_key) {
                    table.insert(dep_key, TableEntry { state: TraversalState::NotStarted, data: None });
                    unseen.push(dep.clone());
                }
            }
        }

        if !unseen.is_empty() && !shared.cancel.is_cancelled() {
            if let Ok(fetched) = fetch_updated(&*shared.catalog, &unseen, shared.import_type, shared.page_size, &shared.cancel).await {
                let mut to_spawn = Vec::new();
                {
                    let mut table = shared.table.lock().await;
                    for asset in fetched {
                        let dep_key = asset.identifier.resolver_key();
                        if let Some(entry) = table.get_mut(&dep_key) {
                            if matches!(entry.state, TraversalState::InProgress | TraversalState::Completed) {
                                continue;
                            }
                            entry.data = Some(asset.clone());
                            to_spawn.push((dep_key, asset));
                        }
                    }
                }

                let mut handles = Vec::with_capacity(to_spawn.len());
                for (dep_key, asset) in to_spawn {
                    let shared = shared.clone();
                    handles.push(smol::spawn(traverse(shared, dep_key, asset, false)));
                }
                for handle in handles {
                    handle.await;
                }
            }
        }

        let mut table = shared.table.lock().await;
        if let Some(entry) = table.get_mut(&key) {
            entry.state = TraversalState::Completed;
        }
    })
}

#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    pub direct_assets: Vec<(AssetData, AssetConflicts)>,
    pub dependants: Vec<(AssetData, AssetConflicts)>,
}

impl ResolutionReport {
    pub fn all_assets(&self) -> impl Iterator<Item = &AssetData> {
        self.direct_assets
            .iter()
            .map(|(asset, _)| asset)
            .chain(self.dependants.iter().map(|(asset, _)| asset))
    }

    pub fn has_conflicts(&self) -> bool {
        self.all_assets_with_conflicts().next().is_some()
    }

    fn all_assets_with_conflicts(&self) -> impl Iterator<Item = &AssetConflicts> {
        self.direct_assets
            .iter()
            .map(|(_, c)| c)
            .chain(self.dependants.iter().map(|(_, c)| c))
            .filter(|c| !c.is_empty())
    }
}

pub struct ResolvedClosure {
    pub assets: Vec<AssetData>,
    pub report: ResolutionReport,
}

pub struct DependencyResolver {
    catalog: Arc<dyn CatalogPort>,
    io: Arc<dyn IoPort>,
    workspace: Arc<dyn WorkspacePort>,
    page_size: usize,
}

impl DependencyResolver {
    pub fn new(
        catalog: Arc<dyn CatalogPort>,
        io: Arc<dyn IoPort>,
        workspace: Arc<dyn WorkspacePort>,
        page_size: usize,
    ) -> Self {
        Self { catalog, io, workspace, page_size }
    }

    /// Resolves the full dependency closure of `requested`, with a fresh
    /// traversal table per call (§4.E: empty input short-circuits without
    /// touching the catalog).
    pub async fn resolve(
        &self,
        requested: &[AssetIdentifier],
        import_type: ImportType,
        index: &ImportedAssetIndex,
        settings: &EffectiveSettings,
        cancel: &CancelToken,
    ) -> Result<ResolvedClosure, ResolveError> {
        if requested.is_empty() {
            return Ok(ResolvedClosure { assets: Vec::new(), report: ResolutionReport::default() });
        }

        let seeds = fetch_updated(&*self.catalog, requested, import_type, self.page_size, cancel).await?;

        let shared = Arc::new(Shared {
            table: smol::lock::Mutex::new(HashMap::new()),
            direct_keys: smol::lock::Mutex::new(HashSet::new()),
            catalog: self.catalog.clone(),
            import_type,
            page_size: self.page_size,
            cancel: cancel.clone(),
        });

        {
            let mut table = shared.table.lock().await;
            for asset in &seeds {
                table.insert(
                    asset.identifier.resolver_key(),
                    TableEntry { state: TraversalState::NotStarted, data: Some(asset.clone()) },
                );
            }
        }

        let mut handles = Vec::with_capacity(seeds.len());
        for asset in seeds {
            let key = asset.identifier.resolver_key();
            handles.push(smol::spawn(traverse(shared.clone(), key, asset, true)));
        }
        for handle in handles {
            handle.await;
        }

        if cancel.is_cancelled() {
            return Ok(ResolvedClosure { assets: Vec::new(), report: ResolutionReport::default() });
        }

        let (assets, direct_keys) = {
            let table = shared.table.lock().await;
            let direct_keys = shared.direct_keys.lock().await;
            let assets: Vec<AssetData> = table.values().filter_map(|e| e.data.clone()).collect();
            (assets, direct_keys.clone())
        };

        let mut report = ResolutionReport::default();
        for asset in &assets {
            let conflicts = conflict::detect_conflicts(asset, settings, index, &self.io, &self.workspace, cancel).await;
            if direct_keys.contains(&asset.identifier.resolver_key()) {
                report.direct_assets.push((asset.clone(), conflicts));
            } else {
                report.dependants.push((asset.clone(), conflicts));
            }
        }

        Ok(ResolvedClosure { assets, report })
    }
}
