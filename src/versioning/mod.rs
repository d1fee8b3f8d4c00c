//! Versioning types
//!
//! A check-in freezes the live node's properties into a `VersionSnapshot`,
//! addressable by its own `VersionId` independently of the live node.
//! Snapshots are immutable once created and outlive the node they were
//! taken from: removing a document removes its head but leaves its version
//! history readable for audit (garbage collection of orphaned chains is a
//! separate concern, not handled here).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::{NodeId, PropertyValue};

/// Identifier of one version snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId(Uuid);

impl VersionId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable point-in-time snapshot of a node's property state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    id: VersionId,
    /// The live node this snapshot was taken from
    node_id: NodeId,
    type_name: String,
    /// Optional caller-assigned label ("1.0", "approved", ...)
    label: Option<String>,
    description: Option<String>,
    /// Version this one superseded, None for the first check-in
    predecessor: Option<VersionId>,
    created: DateTime<Utc>,
    properties: HashMap<String, PropertyValue>,
}

impl VersionSnapshot {
    /// Freeze the given properties into a new snapshot
    pub fn new(
        node_id: NodeId,
        type_name: impl Into<String>,
        label: Option<String>,
        description: Option<String>,
        predecessor: Option<VersionId>,
        properties: HashMap<String, PropertyValue>,
    ) -> Self {
        Self {
            id: VersionId::new(),
            node_id,
            type_name: type_name.into(),
            label,
            description,
            predecessor,
            created: Utc::now(),
            properties,
        }
    }

    pub fn id(&self) -> VersionId {
        self.id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn predecessor(&self) -> Option<VersionId> {
        self.predecessor
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn properties(&self) -> &HashMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, path: &str) -> Option<&PropertyValue> {
        self.properties.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_title(title: &str) -> VersionSnapshot {
        let mut props = HashMap::new();
        props.insert("dc:title".to_string(), PropertyValue::from(title));
        VersionSnapshot::new(NodeId::new(), "File", None, None, None, props)
    }

    #[test]
    fn test_snapshot_captures_properties() {
        let snapshot = snapshot_with_title("v1");
        assert_eq!(
            snapshot.property("dc:title").and_then(|v| v.as_str()),
            Some("v1")
        );
    }

    #[test]
    fn test_snapshot_ids_are_distinct_from_each_other() {
        let a = snapshot_with_title("x");
        let b = snapshot_with_title("x");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_predecessor_links_form_a_chain() {
        let first = snapshot_with_title("v1");
        let second = VersionSnapshot::new(
            first.node_id(),
            "File",
            Some("2.0".into()),
            None,
            Some(first.id()),
            HashMap::new(),
        );
        assert_eq!(second.predecessor(), Some(first.id()));
        assert_eq!(second.label(), Some("2.0"));
    }
}
