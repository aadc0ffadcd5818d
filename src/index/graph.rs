//! Transient dependency graph used by `findExclusiveDependencies` (§4.C).
//!
//! The source models nodes with intrusive set back-links; per §9's design
//! note, this port instead uses arena-allocated nodes indexed by a dense
//! integer key (an `IndexMap` position) to avoid per-node heap allocation
//! during removal. The graph is built fresh from the index on every call
//! (§9 open question: `findExclusiveDependencies` mutates nodes before
//! returning, so it must be rebuilt rather than cached).

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;

use crate::id::TrackedId;

struct Node {
    dependencies: HashSet<usize>,
    dependent_by: HashSet<usize>,
    is_root: bool,
}

/// Arena of nodes keyed by tracked identity, indexed densely.
pub struct DependencyGraph {
    ids: IndexMap<TrackedId, Node>,
}

impl DependencyGraph {
    /// Build from the index's current dependency map and its transpose.
    pub fn build(
        primary_keys: impl Iterator<Item = TrackedId>,
        dependencies_of: impl Fn(&TrackedId) -> Vec<TrackedId>,
    ) -> Self {
        let mut ids: IndexMap<TrackedId, Node> = IndexMap::new();
        for id in primary_keys {
            ids.entry(id).or_insert_with(|| Node {
                dependencies: HashSet::new(),
                dependent_by: HashSet::new(),
                is_root: true,
            });
        }

        let keys: Vec<TrackedId> = ids.keys().cloned().collect();
        for id in &keys {
            let deps = dependencies_of(id);
            let from = ids.get_index_of(id).unwrap();
            for dep in deps {
                if let Some(to) = ids.get_index_of(&dep) {
                    ids[from].dependencies.insert(to);
                }
            }
        }

        // dependent_by is the transpose of dependencies; a node is root iff
        // nothing depends on it.
        let edges: Vec<(usize, usize)> = ids
            .values()
            .enumerate()
            .flat_map(|(from, node)| node.dependencies.iter().map(move |&to| (from, to)))
            .collect();
        for (from, to) in edges {
            ids[to].dependent_by.insert(from);
            ids[from].is_root = false;
        }
        for node in ids.values_mut() {
            node.is_root = node.dependent_by.is_empty();
        }

        Self { ids }
    }

    fn index_of(&self, id: &TrackedId) -> Option<usize> {
        self.ids.get_index_of(id)
    }

    fn id_at(&self, idx: usize) -> &TrackedId {
        self.ids.get_index(idx).unwrap().0
    }

    /// Nodes in `requested`, plus any transitive dependency that, once the
    /// requested set is removed, has no remaining root-reachable dependent.
    pub fn find_exclusive_dependencies(&self, requested: &[TrackedId]) -> HashSet<TrackedId> {
        let mut to_delete: HashSet<usize> = HashSet::new();
        let mut frontier: VecDeque<usize> = VecDeque::new();
        let mut pending_cycle_check: HashSet<usize> = HashSet::new();
        let mut live_dependent_by: Vec<HashSet<usize>> =
            self.ids.values().map(|n| n.dependent_by.clone()).collect();

        for id in requested {
            if let Some(idx) = self.index_of(id) {
                if to_delete.insert(idx) {
                    frontier.push_back(idx);
                }
            }
        }

        let cut_and_propagate = |idx: usize,
                                  to_delete: &mut HashSet<usize>,
                                  frontier: &mut VecDeque<usize>,
                                  pending_cycle_check: &mut HashSet<usize>,
                                  live_dependent_by: &mut [HashSet<usize>]| {
            let node = &self.ids[idx];
            for &dep_idx in &node.dependencies {
                if to_delete.contains(&dep_idx) {
                    continue;
                }
                live_dependent_by[dep_idx].remove(&idx);
                if live_dependent_by[dep_idx].is_empty() {
                    if !self.ids[dep_idx].is_root {
                        to_delete.insert(dep_idx);
                        pending_cycle_check.remove(&dep_idx);
                        frontier.push_back(dep_idx);
                    }
                } else {
                    pending_cycle_check.insert(dep_idx);
                }
            }
        };

        while let Some(idx) = frontier.pop_front() {
            cut_and_propagate(
                idx,
                &mut to_delete,
                &mut frontier,
                &mut pending_cycle_check,
                &mut live_dependent_by,
            );
        }

        loop {
            let candidates: Vec<usize> = pending_cycle_check.iter().copied().collect();
            let mut changed = false;
            for idx in candidates {
                if to_delete.contains(&idx) {
                    pending_cycle_check.remove(&idx);
                    continue;
                }
                if !self.reaches_live_root(idx, &live_dependent_by, &to_delete) {
                    to_delete.insert(idx);
                    pending_cycle_check.remove(&idx);
                    frontier.push_back(idx);
                    changed = true;
                }
            }

            while let Some(idx) = frontier.pop_front() {
                cut_and_propagate(
                    idx,
                    &mut to_delete,
                    &mut frontier,
                    &mut pending_cycle_check,
                    &mut live_dependent_by,
                );
                changed = true;
            }

            if !changed {
                break;
            }
        }

        to_delete.into_iter().map(|idx| self.id_at(idx).clone()).collect()
    }

    /// BFS upward along `dependent_by`; true if a live (not-to-be-deleted)
    /// root is reachable from `idx`.
    fn reaches_live_root(
        &self,
        idx: usize,
        live_dependent_by: &[HashSet<usize>],
        to_delete: &HashSet<usize>,
    ) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(idx);
        visited.insert(idx);

        while let Some(current) = queue.pop_front() {
            if self.ids[current].is_root && !to_delete.contains(&current) {
                return true;
            }
            for &next in &live_dependent_by[current] {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        false
    }
}
