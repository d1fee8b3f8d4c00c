//! Write batches
//!
//! A session's pending changes are flushed as one `WriteBatch`, applied by
//! the mapper atomically: either every operation commits or none does.
//! Each operation on an existing node carries the stamp the session read,
//! so the backend can reject the whole batch when any touched node moved.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::node::{NodeId, NodeState};
use crate::versioning::VersionSnapshot;

/// What changed about a node, at the granularity listeners and
/// invalidations care about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Node was created
    Created,
    /// Property content changed
    Updated,
    /// Node was removed
    Removed,
    /// ACL changed
    SecurityChanged,
    /// Lock or check-in/check-out state changed
    StateChanged,
    /// Lifecycle state changed
    LifecycleChanged,
}

impl ChangeKind {
    /// Stable name for logs and event records
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Removed => "removed",
            ChangeKind::SecurityChanged => "security-changed",
            ChangeKind::StateChanged => "state-changed",
            ChangeKind::LifecycleChanged => "lifecycle-changed",
        }
    }
}

/// One operation in a write batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert a new node; fails the batch if the id already exists
    Create { state: NodeState },
    /// Replace a node's state; `expected_stamp` is the stamp the session
    /// read, `kinds` records what changed for invalidation/event purposes
    Update {
        expected_stamp: u64,
        state: NodeState,
        kinds: BTreeSet<ChangeKind>,
    },
    /// Remove a node
    Remove { id: NodeId, expected_stamp: u64 },
    /// Persist an immutable version snapshot (created by check-in)
    CreateVersion { snapshot: VersionSnapshot },
}

impl WriteOp {
    /// Node id this operation touches, None for version snapshots
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            WriteOp::Create { state } => Some(state.id()),
            WriteOp::Update { state, .. } => Some(state.id()),
            WriteOp::Remove { id, .. } => Some(*id),
            WriteOp::CreateVersion { .. } => None,
        }
    }
}

/// An ordered, atomic batch of write operations
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation; order is preserved and must already be
    /// dependency-safe (parents created before children, children removed
    /// before parents)
    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    /// Operations in application order
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// True when there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Result of a successful write: the stamps the backend assigned
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    /// New stamp per surviving touched node (removed nodes excluded)
    pub new_stamps: std::collections::HashMap<NodeId, u64>,
}
