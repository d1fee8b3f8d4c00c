//! Per-session node cache
//!
//! The cache shadows mapper-backed storage for one session: fetched nodes
//! are kept clean, mutated nodes are kept dirty together with the stamp
//! they were read at (the stamp is what the optimistic conflict check
//! compares at commit). Clean entries are evicted least-recently-used past
//! the configured capacity; dirty entries are pinned until the pending set
//! is flushed or discarded.
//!
//! The cache is owned by exactly one session and is not shared across
//! threads.

mod pending;

pub use pending::PendingChangeSet;

use std::collections::HashMap;

use crate::mapper::ChangeKind;
use crate::node::{NodeId, NodeState};

#[derive(Debug)]
struct CacheEntry {
    state: NodeState,
    dirty: bool,
    last_access: u64,
}

/// Session-scoped write-ahead cache of node state
#[derive(Debug)]
pub struct NodeCache {
    entries: HashMap<NodeId, CacheEntry>,
    capacity: usize,
    tick: u64,
    pending: PendingChangeSet,
}

impl NodeCache {
    /// Cache bounded to `capacity` clean entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            tick: 0,
            pending: PendingChangeSet::new(),
        }
    }

    fn touch(&mut self, id: NodeId) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.last_access = tick;
        }
    }

    /// Cached state for a node, refreshing its recency
    pub fn get(&mut self, id: NodeId) -> Option<NodeState> {
        self.touch(id);
        self.entries.get(&id).map(|e| e.state.clone())
    }

    /// Whether the cached entry for `id` is dirty
    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.entries.get(&id).map(|e| e.dirty).unwrap_or(false)
    }

    /// Insert freshly fetched, committed state
    pub fn put_clean(&mut self, state: NodeState) {
        self.tick += 1;
        let id = state.id();
        self.entries.insert(
            id,
            CacheEntry {
                state,
                dirty: false,
                last_access: self.tick,
            },
        );
        self.evict_excess();
    }

    /// Insert mutated state and record the change kind. The entry is
    /// pinned until the pending set is cleared.
    pub fn put_dirty(&mut self, state: NodeState, kind: ChangeKind) {
        self.tick += 1;
        let id = state.id();
        self.entries.insert(
            id,
            CacheEntry {
                state,
                dirty: true,
                last_access: self.tick,
            },
        );
        self.pending.record(id, kind);
    }

    /// Drop one entry
    pub fn evict(&mut self, id: NodeId) {
        self.entries.remove(&id);
    }

    /// Drop everything, clean and dirty alike. Pending changes survive so
    /// a mid-transaction full flush does not lose writes, but their
    /// cached states do not; callers only use this on freshly-opened or
    /// just-saved sessions (reconnect fallback, model generation change).
    pub fn flush_all(&mut self) {
        self.entries.clear();
    }

    /// Drop every clean entry, keeping dirty entries and the pending set.
    /// Used when the whole cache is suspect mid-transaction (model
    /// generation change, flush demand while changes are pending).
    pub fn evict_clean(&mut self) {
        self.entries.retain(|_, entry| entry.dirty);
    }

    /// A remote modification: the committed state we hold is stale. Dirty
    /// entries stay (the commit will surface the conflict); clean entries
    /// are evicted.
    pub fn apply_modified(&mut self, id: NodeId) {
        if !self.is_dirty(id) {
            self.entries.remove(&id);
        }
    }

    /// A remote removal or security change at `id`: evict it and every
    /// clean entry that cannot be proven to live outside the affected
    /// subtree. The proof walks cached parents up to the root; entries
    /// whose chain is broken (a parent was evicted) are treated as inside.
    pub fn apply_subtree_stale(&mut self, id: NodeId) {
        let victims: Vec<NodeId> = self
            .entries
            .iter()
            .filter(|(entry_id, entry)| {
                !entry.dirty && (**entry_id == id || !self.provably_outside(**entry_id, id))
            })
            .map(|(entry_id, _)| *entry_id)
            .collect();
        for victim in victims {
            self.entries.remove(&victim);
        }
    }

    /// Walk cached parents from `start` to the root; true only when the
    /// walk completes without passing through `subtree_root`.
    fn provably_outside(&self, start: NodeId, subtree_root: NodeId) -> bool {
        let mut current = start;
        let mut hops = 0usize;
        loop {
            if current == subtree_root {
                return false;
            }
            let Some(entry) = self.entries.get(&current) else {
                // Chain broken; cannot prove anything
                return false;
            };
            match entry.state.parent_id() {
                None => return true, // reached the root
                Some(parent) => current = parent,
            }
            hops += 1;
            if hops > self.entries.len() {
                // Cycle through stale parent data; be conservative
                return false;
            }
        }
    }

    /// The pending change set
    pub fn pending(&self) -> &PendingChangeSet {
        &self.pending
    }

    /// Record a change without replacing state (used when only the change
    /// bookkeeping must be adjusted)
    pub fn record_pending(&mut self, id: NodeId, kind: ChangeKind) {
        self.pending.record(id, kind);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.dirty = true;
        }
    }

    /// Forget a node entirely: entry and pending record (created-then-
    /// removed within one transaction)
    pub fn forget(&mut self, id: NodeId) {
        self.entries.remove(&id);
        self.pending.forget(id);
    }

    /// After a successful flush: apply backend-assigned stamps, mark
    /// everything clean, clear the pending set. Removed nodes are evicted.
    pub fn commit_pending(&mut self, new_stamps: &HashMap<NodeId, u64>) {
        let pending_ids: Vec<NodeId> = self.pending.iter().map(|(id, _)| id).collect();
        for id in pending_ids {
            let removed = self.pending.has(id, ChangeKind::Removed);
            if removed {
                self.entries.remove(&id);
                continue;
            }
            if let Some(entry) = self.entries.get_mut(&id) {
                if let Some(stamp) = new_stamps.get(&id) {
                    entry.state.set_stamp(*stamp);
                }
                entry.dirty = false;
            }
        }
        self.pending.clear();
        self.evict_excess();
    }

    /// After an aborted flush: drop every dirty entry and the pending set,
    /// so nothing half-applied can be observed
    pub fn abort_pending(&mut self) {
        let dirty_ids: Vec<NodeId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(id, _)| *id)
            .collect();
        for id in dirty_ids {
            self.entries.remove(&id);
        }
        self.pending.clear();
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_excess(&mut self) {
        let clean_count = self.entries.values().filter(|e| !e.dirty).count();
        if clean_count <= self.capacity {
            return;
        }
        let mut clean: Vec<(NodeId, u64)> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.dirty)
            .map(|(id, e)| (*id, e.last_access))
            .collect();
        clean.sort_by_key(|(_, access)| *access);
        let excess = clean_count - self.capacity;
        for (id, _) in clean.into_iter().take(excess) {
            self.entries.remove(&id);
        }
    }
}
