//! Import pipeline (component G, §4.G): download, stage, relocate, track.
//! `ImportEngine` is the crate's facade — the single object a host embeds.

pub mod download;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;

use crate::error::ImportError;
use crate::ext::PathExt;
use crate::id::{FileGuid, TrackedId};
use crate::index::ImportedAssetIndex;
use crate::model::{
    AssetData, Decision, ImportStatus, ImportType, ImportedAssetInfo, ImportedFileInfo,
    OperationState,
};
use crate::ports::{
    CancelToken, CatalogPort, DecisionPort, DownloadOutcome, DownloadPort, IoPort, PostprocessEvent,
    WorkspacePort,
};
use crate::resolver::{conflict, DependencyResolver};
use crate::settings::{EffectiveSettings, EngineSettings, ImportOverrides};

use download::{DownloadManager, DownloadRequest, DownloadUpdate};

#[derive(Debug, Clone)]
struct DownloadRequestRecord {
    url: String,
    original_path: String,
    download_path: PathBuf,
    download_id: Option<download::DownloadId>,
    bytes_downloaded: u64,
    total_bytes: Option<u64>,
    finished: bool,
    outcome: Option<DownloadOutcome>,
}

/// One asset's worth of the import (§4.G Per-asset import operation).
#[derive(Debug, Clone)]
pub struct ImportOperation {
    pub asset: AssetData,
    pub state: OperationState,
    pub error: Option<String>,
    requests: Vec<DownloadRequestRecord>,
}

impl ImportOperation {
    /// Progress across requests, equally weighted (§4.G).
    pub fn progress(&self) -> f64 {
        if self.requests.is_empty() {
            return 1.0;
        }
        let total: f64 = self
            .requests
            .iter()
            .map(|r| match (r.total_bytes, r.finished) {
                (_, true) => 1.0,
                (Some(total), false) if total > 0 => (r.bytes_downloaded as f64 / total as f64).min(1.0),
                _ => 0.0,
            })
            .sum();
        total / self.requests.len() as f64
    }
}

/// One `startImport` call's worth of work (§4.G States).
#[derive(Debug, Clone)]
pub struct BulkImportOperation {
    pub operations: Vec<ImportOperation>,
    pub status: OperationState,
}

fn aggregate_status(operations: &[ImportOperation]) -> OperationState {
    if operations.iter().all(|op| op.state == OperationState::Success) {
        OperationState::Success
    } else if operations.iter().any(|op| op.state == OperationState::Cancelled) {
        OperationState::Cancelled
    } else {
        OperationState::Error
    }
}

pub struct ImportEngine {
    catalog: Arc<dyn CatalogPort>,
    workspace: Arc<dyn WorkspacePort>,
    io: Arc<dyn IoPort>,
    decision: Arc<dyn DecisionPort>,
    resolver: DependencyResolver,
    download_manager: DownloadManager,
    index: ImportedAssetIndex,
    settings: Mutex<EngineSettings>,
    is_importing: AtomicBool,
}

impl ImportEngine {
    pub fn new(
        catalog: Arc<dyn CatalogPort>,
        workspace: Arc<dyn WorkspacePort>,
        io: Arc<dyn IoPort>,
        decision: Arc<dyn DecisionPort>,
        download_port: Arc<dyn DownloadPort>,
        settings: EngineSettings,
        index_root: impl Into<PathBuf>,
    ) -> Self {
        let resolver = DependencyResolver::new(
            catalog.clone(),
            io.clone(),
            workspace.clone(),
            settings.default_search_page_size,
        );
        let index = ImportedAssetIndex::new(index_root, io.clone());
        let download_manager = DownloadManager::new(download_port);
        Self {
            catalog,
            workspace,
            io,
            decision,
            resolver,
            download_manager,
            index,
            settings: Mutex::new(settings),
            is_importing: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> &ImportedAssetIndex {
        &self.index
    }

    pub async fn load_index(&self) {
        self.index.load().await;
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings.lock().unwrap().clone()
    }

    pub fn set_settings(&self, settings: EngineSettings) {
        *self.settings.lock().unwrap() = settings;
    }

    /// §5 Import exclusivity: a process-wide flag rejects re-entrant calls
    /// rather than queuing them; the caller is expected to wait and retry.
    pub async fn start_import(
        &self,
        requested: &[crate::id::AssetIdentifier],
        import_type: ImportType,
        overrides: ImportOverrides,
        cancel: &CancelToken,
    ) -> Result<BulkImportOperation, ImportError> {
        if self.is_importing.swap(true, Ordering::SeqCst) {
            return Err(ImportError::AlreadyInProgress);
        }
        let result = self.run_import(requested, import_type, overrides, cancel).await;
        self.is_importing.store(false, Ordering::SeqCst);
        result
    }

    async fn run_import(
        &self,
        requested: &[crate::id::AssetIdentifier],
        import_type: ImportType,
        overrides: ImportOverrides,
        cancel: &CancelToken,
    ) -> Result<BulkImportOperation, ImportError> {
        let engine_settings = self.settings.lock().unwrap().clone();
        let effective = engine_settings.effective(&overrides);

        let closure = self
            .resolver
            .resolve(requested, import_type, &self.index, &effective, cancel)
            .await?;

        if cancel.is_cancelled() {
            return Ok(BulkImportOperation { operations: Vec::new(), status: OperationState::Cancelled });
        }

        let mut decisions: HashMap<crate::id::AssetIdentifier, Decision> = HashMap::new();
        if closure.report.has_conflicts() {
            let mut stream = self.decision.resolve_conflicts(&closure.report);
            while let Some((id, decision)) = stream.next().await {
                decisions.insert(id, decision);
            }
        }

        let mut operations = Vec::new();
        for asset in &closure.assets {
            let decision = decisions.get(&asset.identifier).copied().unwrap_or(Decision::Replace);
            if decision == Decision::Ignore {
                continue;
            }
            if self.is_rollback(asset, &effective) {
                continue;
            }
            operations.push(self.import_one(asset, &effective, cancel).await);
        }

        let status = aggregate_status(&operations);
        Ok(BulkImportOperation { operations, status })
    }

    /// §6 `isKeepHigherVersionEnabled` / §4.G `avoidRollingBackAssetVersion`:
    /// when set, an asset already tracked at a higher sequence number is not
    /// silently replaced by an older one.
    fn is_rollback(&self, asset: &AssetData, settings: &EffectiveSettings) -> bool {
        if !settings.avoid_rolling_back_asset_version {
            return false;
        }
        self.index
            .get_by_tracked(&asset.identifier.tracked())
            .is_some_and(|previous| asset.sequence_number < previous.asset_data.sequence_number)
    }

    async fn import_one(
        &self,
        asset: &AssetData,
        settings: &EffectiveSettings,
        cancel: &CancelToken,
    ) -> ImportOperation {
        let mut operation = ImportOperation {
            asset: asset.clone(),
            state: OperationState::InProgress,
            error: None,
            requests: Vec::new(),
        };

        if cancel.is_cancelled() {
            operation.state = OperationState::Cancelled;
            return operation;
        }

        let staging = self.io.get_unique_temp_path_in_project().await;
        for file in asset.files() {
            operation.requests.push(DownloadRequestRecord {
                url: String::new(),
                original_path: file.path.clone(),
                download_path: staging.join(&file.path),
                download_id: None,
                bytes_downloaded: 0,
                total_bytes: Some(file.size),
                finished: false,
                outcome: None,
            });
        }

        let mut urls_by_dataset: HashMap<String, HashMap<String, String>> = HashMap::new();
        for dataset in &asset.datasets {
            if let Ok(urls) = self
                .catalog
                .get_dataset_download_urls(&asset.identifier, &dataset.id, cancel)
                .await
            {
                urls_by_dataset.insert(dataset.id.clone(), urls);
            }
        }

        for request in &mut operation.requests {
            let dataset_id = asset
                .datasets
                .iter()
                .find(|d| d.files.iter().any(|f| f.path == request.original_path))
                .map(|d| d.id.clone());
            if let Some(dataset_id) = dataset_id {
                if let Some(url) = urls_by_dataset.get(&dataset_id).and_then(|m| m.get(&request.original_path)) {
                    request.url = url.clone();
                }
            }
            let id = self.download_manager.enqueue(DownloadRequest {
                url: request.url.clone(),
                destination: request.download_path.clone(),
            });
            request.download_id = Some(id);
        }

        while operation.requests.iter().any(|r| !r.finished) && !cancel.is_cancelled() {
            let updates = self.download_manager.tick(cancel).await;
            for update in updates {
                match update {
                    DownloadUpdate::Progress { id, bytes_downloaded, total_bytes } => {
                        if let Some(r) = operation.requests.iter_mut().find(|r| r.download_id == Some(id)) {
                            r.bytes_downloaded = bytes_downloaded;
                            if total_bytes.is_some() {
                                r.total_bytes = total_bytes;
                            }
                        }
                    }
                    DownloadUpdate::Finished { id, outcome } => {
                        if let Some(r) = operation.requests.iter_mut().find(|r| r.download_id == Some(id)) {
                            r.finished = true;
                            r.outcome = Some(outcome);
                        }
                    }
                }
            }
            if operation.requests.iter().any(|r| !r.finished) {
                smol::future::yield_now().await;
            }
        }

        if cancel.is_cancelled() {
            operation.state = OperationState::Cancelled;
            return operation;
        }

        if operation.requests.iter().any(|r| !matches!(r.outcome, Some(DownloadOutcome::Success))) {
            operation.state = OperationState::Error;
            operation.error = Some("one or more files failed to download".into());
            return operation;
        }

        match self.finalize(asset, settings, &operation.requests).await {
            Ok(()) => operation.state = OperationState::Success,
            Err(error) => {
                operation.state = OperationState::Error;
                operation.error = Some(error.to_string());
            }
        }

        operation
    }

    /// §4.G Post-processing steps 1-6.
    async fn finalize(
        &self,
        asset: &AssetData,
        settings: &EffectiveSettings,
        requests: &[DownloadRequestRecord],
    ) -> Result<(), ImportError> {
        let mut checksums = HashMap::new();
        for request in requests {
            if let Ok(bytes) = self.io.file_read_all_bytes(&request.download_path).await {
                checksums.insert(request.original_path.clone(), format!("{:x}", md5::compute(&bytes)));
            }
        }

        self.workspace.start_asset_editing();

        let tracked = asset.identifier.tracked();
        if let Some(previous) = self.index.get_by_tracked(&tracked) {
            let mut stale_paths = Vec::new();
            for file in &previous.files {
                if let Some(path) = self.workspace.id_to_path(&file.file_guid).await {
                    stale_paths.push(path);
                }
            }
            if !stale_paths.is_empty() {
                self.workspace.delete_assets(&stale_paths).await;
            }
        }

        let dir = conflict::target_dir(asset, settings);
        let mut file_infos = Vec::new();
        for request in requests {
            let final_path = request.original_path.with_prefix(&dir).into_owned();
            if self.io.file_exists(&final_path).await {
                self.io.delete_file(&final_path, true).await?;
            }
            self.io.file_move(&request.download_path, &final_path).await?;

            let is_meta = final_path.ext() == Some("meta");
            if !is_meta {
                self.workspace.import_asset(&final_path).await?;
            }

            if let Some(guid) = self.workspace.path_to_id(&final_path).await {
                let dataset_id = asset
                    .datasets
                    .iter()
                    .find(|d| d.files.iter().any(|f| f.path == request.original_path))
                    .map(|d| d.id.clone())
                    .unwrap_or_default();
                file_infos.push(ImportedFileInfo {
                    dataset_id,
                    file_guid: guid,
                    original_path: request.original_path.clone(),
                    checksum: checksums.get(&request.original_path).cloned().unwrap_or_default(),
                    modified: self.io.get_file_last_write_time_utc(&final_path).await.unwrap_or(0),
                    meta_checksum: None,
                    meta_modified: None,
                });
            }
        }

        self.workspace.stop_asset_editing();
        self.workspace.refresh();

        if let Some(parent) = requests.first().and_then(|r| r.download_path.parent()) {
            let _ = self.io.directory_delete(parent, true).await;
        }

        self.index
            .upsert(ImportedAssetInfo { asset_data: asset.clone(), files: file_infos })
            .await?;

        Ok(())
    }

    /// §4.G Removal flow: `removeImports(ids)`.
    pub async fn remove_imports(&self, ids: &[TrackedId]) -> Result<Vec<PathBuf>, ImportError> {
        let exclusive: Vec<TrackedId> = self.index.find_exclusive_dependencies(ids).into_iter().collect();
        let exclusive_set: HashSet<TrackedId> = exclusive.iter().cloned().collect();

        let mut paths_to_delete = Vec::new();
        for id in &exclusive {
            let Some(entry) = self.index.get_by_tracked(id) else { continue };
            for file in &entry.files {
                if self.guid_owned_by_surviving_asset(&file.file_guid, &exclusive_set) {
                    continue;
                }
                if let Some(path) = self.workspace.id_to_path(&file.file_guid).await {
                    paths_to_delete.push(path);
                }
            }
        }

        self.index.remove(&exclusive).await?;
        let (_all_ok, failed) = self.workspace.delete_assets(&paths_to_delete).await;
        Ok(failed)
    }

    fn guid_owned_by_surviving_asset(&self, guid: &FileGuid, being_removed: &HashSet<TrackedId>) -> bool {
        self.index
            .file_guid_owners(guid)
            .iter()
            .any(|owner| !being_removed.contains(owner))
    }

    /// Reacts to the workspace's `postprocessAllAssets` notification (§3
    /// Lifecycle: entries are also destroyed by postprocess notification of
    /// a deleted workspace path). A path the workspace no longer recognizes
    /// carries no resolvable guid and is skipped.
    pub async fn handle_postprocess(&self, event: &PostprocessEvent) -> Result<Vec<TrackedId>, ImportError> {
        let mut guids = Vec::new();
        for path in &event.deleted {
            if let Some(guid) = self.workspace.path_to_id(path).await {
                guids.push(guid);
            }
        }
        if guids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.index.remove_files_by_guid(&guids).await?)
    }

    /// §4.G Update-to-latest.
    pub async fn update_to_latest(
        &self,
        candidates: &[crate::id::AssetIdentifier],
        overrides: ImportOverrides,
        cancel: &CancelToken,
    ) -> Result<BulkImportOperation, ImportError> {
        let statuses = self
            .catalog
            .gather_import_statuses(candidates, cancel)
            .await
            .map_err(crate::error::ResolveError::Catalog)?;

        let outdated: Vec<crate::id::AssetIdentifier> = candidates
            .iter()
            .filter(|id| matches!(statuses.get(*id), Some(ImportStatus::OutOfDate)))
            .cloned()
            .collect();

        self.start_import(&outdated, ImportType::UpdateToLatest, overrides, cancel).await
    }
}
