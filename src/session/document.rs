//! Read-only document view
//!
//! What the session hands back from reads: a snapshot of one node's
//! state at the time of the call. Mutations go through session
//! operations, never through this view.

use std::collections::HashMap;

use crate::node::{Acl, LockInfo, NodeId, NodeState, PropertyValue};
use crate::versioning::VersionId;

/// Snapshot view of one document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    state: NodeState,
}

impl Document {
    pub(crate) fn from_state(state: NodeState) -> Self {
        Self { state }
    }

    pub fn id(&self) -> NodeId {
        self.state.id()
    }

    /// None only for the repository root
    pub fn parent_id(&self) -> Option<NodeId> {
        self.state.parent_id()
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn type_name(&self) -> &str {
        self.state.type_name()
    }

    pub fn property(&self, path: &str) -> Option<&PropertyValue> {
        self.state.property(path)
    }

    pub fn properties(&self) -> &HashMap<String, PropertyValue> {
        self.state.properties()
    }

    pub fn acl(&self) -> Option<&Acl> {
        self.state.acl()
    }

    pub fn lock(&self) -> Option<&LockInfo> {
        self.state.lock()
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().is_some()
    }

    pub fn lifecycle_state(&self) -> &str {
        self.state.lifecycle_state()
    }

    pub fn is_checked_out(&self) -> bool {
        self.state.is_checked_out()
    }

    /// Version created by the most recent check-in, if any
    pub fn base_version(&self) -> Option<VersionId> {
        self.state.base_version()
    }

    /// Child ids in advisory order
    pub fn children(&self) -> &[NodeId] {
        self.state.children()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_reflects_state() {
        let mut state = NodeState::new(NodeId::new(), None, "doc", "File", "project");
        state.set_property("dc:title", PropertyValue::from("hello"));

        let doc = Document::from_state(state.clone());
        assert_eq!(doc.id(), state.id());
        assert_eq!(doc.name(), "doc");
        assert_eq!(doc.property("dc:title").and_then(|v| v.as_str()), Some("hello"));
        assert!(doc.is_checked_out());
        assert!(!doc.is_locked());
    }
}
