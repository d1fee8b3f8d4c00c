//! Pending change set
//!
//! Per session, the ordered record of what changed since the last save.
//! Insertion order is preserved; because a parent must exist before a
//! child can be created under it, and removals are expanded
//! child-before-parent by the session, replaying the set in insertion
//! order is already dependency-safe.

use std::collections::{BTreeSet, HashMap};

use crate::mapper::ChangeKind;
use crate::node::NodeId;

/// Ordered mapping from node id to the kinds of change it accumulated
#[derive(Debug, Clone, Default)]
pub struct PendingChangeSet {
    order: Vec<NodeId>,
    changes: HashMap<NodeId, BTreeSet<ChangeKind>>,
}

impl PendingChangeSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change against a node. The node keeps its position from
    /// its first recorded change.
    pub fn record(&mut self, id: NodeId, kind: ChangeKind) {
        let entry = self.changes.entry(id).or_insert_with(|| {
            self.order.push(id);
            BTreeSet::new()
        });
        entry.insert(kind);
    }

    /// Change kinds recorded for a node
    pub fn kinds(&self, id: NodeId) -> Option<&BTreeSet<ChangeKind>> {
        self.changes.get(&id)
    }

    /// Whether a specific kind is recorded for a node
    pub fn has(&self, id: NodeId, kind: ChangeKind) -> bool {
        self.changes
            .get(&id)
            .map(|kinds| kinds.contains(&kind))
            .unwrap_or(false)
    }

    /// Whether any change is recorded for a node
    pub fn contains(&self, id: NodeId) -> bool {
        self.changes.contains_key(&id)
    }

    /// Drop a node's record entirely (a node created and removed within
    /// the same transaction leaves no trace)
    pub fn forget(&mut self, id: NodeId) {
        if self.changes.remove(&id).is_some() {
            self.order.retain(|o| *o != id);
        }
    }

    /// Iterate (id, kinds) in first-touch order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &BTreeSet<ChangeKind>)> {
        self.order
            .iter()
            .filter_map(|id| self.changes.get(id).map(|kinds| (*id, kinds)))
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of touched nodes
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.order.clear();
        self.changes.clear();
    }
}
