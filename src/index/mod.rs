//! The imported-asset index (component C): the source of truth for what is
//! currently materialized in the workspace, kept consistent with disk via
//! [`persistence`] and exposing [`graph`]'s exclusive-dependency query.

pub mod graph;
pub mod persistence;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use graph::DependencyGraph;
use persistence::IndexPersistence;

use crate::error::PersistenceError;
use crate::id::{AssetIdentifier, FileGuid, TrackedId};
use crate::model::ImportedAssetInfo;
use crate::ports::IoPort;

/// `imported-changed(added, updated, removed)` (§4.C).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDiff {
    pub added: Vec<TrackedId>,
    pub updated: Vec<TrackedId>,
    pub removed: Vec<TrackedId>,
}

impl IndexDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

struct State {
    entries: HashMap<TrackedId, ImportedAssetInfo>,
    /// A file guid can be claimed by more than one entry (§3: "the same
    /// file can be referenced by multiple imported assets").
    by_file_guid: HashMap<FileGuid, HashSet<TrackedId>>,
}

impl State {
    fn add_owner(&mut self, guid: &FileGuid, tracked: &TrackedId) {
        self.by_file_guid.entry(guid.clone()).or_default().insert(tracked.clone());
    }

    fn remove_owner(&mut self, guid: &FileGuid, tracked: &TrackedId) {
        if let Some(owners) = self.by_file_guid.get_mut(guid) {
            owners.remove(tracked);
            if owners.is_empty() {
                self.by_file_guid.remove(guid);
            }
        }
    }

    /// Mutates `entries`/`by_file_guid` for an upsert. Returns the tracked
    /// id and whether this was a new entry.
    fn apply_upsert(&mut self, entry: ImportedAssetInfo) -> (TrackedId, bool) {
        let tracked = entry.asset_data.identifier.tracked();
        if let Some(previous) = self.entries.get(&tracked) {
            let guids: Vec<_> = previous.files.iter().map(|file| file.file_guid.clone()).collect();
            for guid in guids {
                self.remove_owner(&guid, &tracked);
            }
        }
        for file in &entry.files {
            self.add_owner(&file.file_guid, &tracked);
        }
        let existed = self.entries.insert(tracked.clone(), entry).is_some();
        (tracked, !existed)
    }

    fn apply_remove(&mut self, tracked: &TrackedId) -> bool {
        match self.entries.remove(tracked) {
            Some(entry) => {
                for file in &entry.files {
                    self.remove_owner(&file.file_guid, tracked);
                }
                true
            }
            None => false,
        }
    }
}

/// Sharding for the persistence layer: the first two hex characters of the
/// tracked id's digest, since tracked ids (unlike files) carry no guid of
/// their own.
fn shard_for(tracked: &TrackedId) -> String {
    let digest = format!("{:x}", md5::compute(tracked.asset_id.as_bytes()));
    digest[..2].to_string()
}

pub struct ImportedAssetIndex {
    state: RwLock<State>,
    persistence: IndexPersistence,
    subscribers: Mutex<Vec<smol::channel::Sender<IndexDiff>>>,
}

impl ImportedAssetIndex {
    pub fn new(root: impl Into<PathBuf>, io: Arc<dyn IoPort>) -> Self {
        Self {
            state: RwLock::new(State {
                entries: HashMap::new(),
                by_file_guid: HashMap::new(),
            }),
            persistence: IndexPersistence::new(root, io),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a listener for `imported-changed` events (§4.C, §5: emitted
    /// after all mutations of the triggering call are complete). Dropping
    /// the receiver unsubscribes; closed senders are pruned lazily on the
    /// next notification.
    pub fn subscribe(&self) -> smol::channel::Receiver<IndexDiff> {
        let (tx, rx) = smol::channel::unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn notify(&self, diff: IndexDiff) {
        if diff.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.try_send(diff.clone()).is_ok());
    }

    /// Loads every entry from disk, replacing the in-memory state.
    pub async fn load(&self) {
        let entries = self.persistence.load_all().await;
        self.set_all(entries);
    }

    /// Replaces the in-memory state wholesale (e.g. on initial load), diffed
    /// against whatever was there before rather than blindly clearing it, so
    /// a subscriber still sees one accurate `imported-changed` event.
    pub fn set_all(&self, entries: Vec<ImportedAssetInfo>) {
        let diff = {
            let mut state = self.state.write().unwrap();
            let previous = std::mem::take(&mut state.entries);
            state.by_file_guid.clear();

            let mut diff = IndexDiff::default();
            for entry in entries {
                let tracked = entry.asset_data.identifier.tracked();
                for file in &entry.files {
                    state.add_owner(&file.file_guid, &tracked);
                }
                match previous.get(&tracked) {
                    Some(old) if *old == entry => {}
                    Some(_) => diff.updated.push(tracked.clone()),
                    None => diff.added.push(tracked.clone()),
                }
                state.entries.insert(tracked, entry);
            }
            for tracked in previous.keys() {
                if !state.entries.contains_key(tracked) {
                    diff.removed.push(tracked.clone());
                }
            }
            diff
        };
        self.notify(diff);
    }

    /// Inserts or replaces an entry. Returns `true` if this was a new
    /// tracked id (an "added" event), `false` if it replaced an existing
    /// one (an "updated" event).
    pub async fn upsert(&self, entry: ImportedAssetInfo) -> Result<bool, PersistenceError> {
        let tracked = entry.asset_data.identifier.tracked();
        let shard = shard_for(&tracked);
        self.persistence
            .save_entry(&shard, &tracked.asset_id, &entry)
            .await?;

        let (tracked, added) = {
            let mut state = self.state.write().unwrap();
            state.apply_upsert(entry)
        };

        self.notify(if added {
            IndexDiff { added: vec![tracked], ..Default::default() }
        } else {
            IndexDiff { updated: vec![tracked], ..Default::default() }
        });
        Ok(added)
    }

    pub async fn remove(&self, tracked: &[TrackedId]) -> Result<Vec<TrackedId>, PersistenceError> {
        let mut removed = Vec::new();
        for id in tracked {
            let shard = shard_for(id);
            self.persistence.remove_entry(&shard, &id.asset_id).await?;

            let did_remove = {
                let mut state = self.state.write().unwrap();
                state.apply_remove(id)
            };
            if did_remove {
                removed.push(id.clone());
            }
        }
        if !removed.is_empty() {
            self.notify(IndexDiff { removed: removed.clone(), ..Default::default() });
        }
        Ok(removed)
    }

    /// §4.C / §3 Lifecycle: drops each guid from every entry that
    /// references it; an entry left with no files is removed outright, one
    /// with files remaining is re-persisted. Returns the tracked ids that
    /// were fully removed.
    pub async fn remove_files_by_guid(
        &self,
        guids: &[FileGuid],
    ) -> Result<Vec<TrackedId>, PersistenceError> {
        let guid_set: HashSet<FileGuid> = guids.iter().cloned().collect();
        let owners: HashSet<TrackedId> = {
            let state = self.state.read().unwrap();
            guid_set
                .iter()
                .filter_map(|guid| state.by_file_guid.get(guid).cloned())
                .flatten()
                .collect()
        };

        let mut fully_removed = Vec::new();
        let mut updated = Vec::new();
        for tracked in owners {
            let Some(mut entry) = self.get_by_tracked(&tracked) else { continue };
            entry.files.retain(|f| !guid_set.contains(&f.file_guid));

            let shard = shard_for(&tracked);
            if entry.files.is_empty() {
                self.persistence.remove_entry(&shard, &tracked.asset_id).await?;
                let did_remove = {
                    let mut state = self.state.write().unwrap();
                    state.apply_remove(&tracked)
                };
                if did_remove {
                    fully_removed.push(tracked);
                }
            } else {
                self.persistence.save_entry(&shard, &tracked.asset_id, &entry).await?;
                {
                    let mut state = self.state.write().unwrap();
                    state.apply_upsert(entry);
                }
                updated.push(tracked);
            }
        }

        self.notify(IndexDiff {
            removed: fully_removed.clone(),
            updated,
            ..Default::default()
        });
        Ok(fully_removed)
    }

    pub fn get_by_tracked(&self, tracked: &TrackedId) -> Option<ImportedAssetInfo> {
        self.state.read().unwrap().entries.get(tracked).cloned()
    }

    pub fn get_by_asset_id(&self, id: &AssetIdentifier) -> Option<ImportedAssetInfo> {
        self.get_by_tracked(&id.tracked())
    }

    /// Every entry that currently references `guid`, since more than one
    /// can (§3).
    pub fn get_by_file_guid(&self, guid: &FileGuid) -> Vec<ImportedAssetInfo> {
        let owners = self.state.read().unwrap().by_file_guid.get(guid).cloned().unwrap_or_default();
        owners.iter().filter_map(|tracked| self.get_by_tracked(tracked)).collect()
    }

    /// Every tracked id currently claiming `guid` in the reverse map.
    pub fn file_guid_owners(&self, guid: &FileGuid) -> HashSet<TrackedId> {
        self.state.read().unwrap().by_file_guid.get(guid).cloned().unwrap_or_default()
    }

    pub fn is_imported(&self, tracked: &TrackedId) -> bool {
        self.state.read().unwrap().entries.contains_key(tracked)
    }

    pub fn all_tracked(&self) -> Vec<TrackedId> {
        self.state.read().unwrap().entries.keys().cloned().collect()
    }

    /// The requested set, plus any transitive dependency that removing it
    /// would orphan (§4.C). The graph is rebuilt from the current state on
    /// every call, since `find_exclusive_dependencies` mutates it.
    pub fn find_exclusive_dependencies(&self, requested: &[TrackedId]) -> HashSet<TrackedId> {
        let state = self.state.read().unwrap();
        let graph = DependencyGraph::build(state.entries.keys().cloned(), |id| {
            state
                .entries
                .get(id)
                .map(|entry| {
                    entry
                        .asset_data
                        .dependencies
                        .iter()
                        .map(|dep| dep.tracked())
                        .collect()
                })
                .unwrap_or_default()
        });
        graph.find_exclusive_dependencies(requested)
    }
}
