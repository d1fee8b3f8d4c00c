//! Invalidation messages
//!
//! One message per changed node id, broadcast after a successful commit.
//! Messages are transient: delivered once to each live subscriber, never
//! persisted. The origin process id lets a subscriber drop its own
//! publications.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::NodeId;

/// Identity of one engine process on the cluster channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(Uuid);

impl ProcessId {
    /// Generate a fresh process identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of change the message reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationKind {
    /// Content changed; evict the single entry
    Modified,
    /// Node removed; the whole subtree below it is suspect
    Deleted,
    /// ACL changed; permission results for the subtree are suspect
    Security,
}

/// One cache invalidation, as carried on the cluster channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    /// Repository the change belongs to
    pub repository: String,
    /// The changed node
    pub id: NodeId,
    /// Change category
    pub kind: InvalidationKind,
    /// Publishing process, so subscribers can skip their own messages
    pub origin: ProcessId,
}

impl InvalidationMessage {
    /// Build a message
    pub fn new(
        repository: impl Into<String>,
        id: NodeId,
        kind: InvalidationKind,
        origin: ProcessId,
    ) -> Self {
        Self {
            repository: repository.into(),
            id,
            kind,
            origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_round_trips() {
        let message = InvalidationMessage::new(
            "docs",
            NodeId::new(),
            InvalidationKind::Deleted,
            ProcessId::new(),
        );
        let json = serde_json::to_string(&message).unwrap();
        let back: InvalidationMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_wire_format_carries_required_fields() {
        let message = InvalidationMessage::new(
            "docs",
            NodeId::new(),
            InvalidationKind::Modified,
            ProcessId::new(),
        );
        let json: serde_json::Value =
            serde_json::to_value(&message).unwrap();
        assert!(json.get("repository").is_some());
        assert!(json.get("id").is_some());
        assert!(json.get("kind").is_some());
        assert!(json.get("origin").is_some());
    }
}
