//! Node state
//!
//! `NodeState` is the unit the mapper fetches and the cache stores: one
//! document node with its tree position, typed properties, ACL, lock,
//! lifecycle state and versioning flags. The `stamp` is the optimistic
//! concurrency token: the backend bumps it on every committed write to the
//! node, and a commit fails when a touched node's stamp moved since it was
//! read.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Acl, LockInfo, NodeId, PropertyValue};
use crate::versioning::VersionId;

/// In-memory state of one document node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    id: NodeId,
    /// None only for the repository root
    parent_id: Option<NodeId>,
    /// Name under the parent; path segments are built from these
    name: String,
    type_name: String,
    properties: HashMap<String, PropertyValue>,
    /// Local ACL; None means fully inherited from ancestors
    acl: Option<Acl>,
    lock: Option<LockInfo>,
    lifecycle_state: String,
    /// True while the live node's properties are mutable
    checked_out: bool,
    /// Version created by the most recent check-in, if any
    base_version: Option<VersionId>,
    /// Advisory child ordering for tree traversal
    children: Vec<NodeId>,
    /// Optimistic concurrency stamp, owned by the backend
    stamp: u64,
}

impl NodeState {
    /// Create a fresh, checked-out node under the given parent
    pub fn new(
        id: NodeId,
        parent_id: Option<NodeId>,
        name: impl Into<String>,
        type_name: impl Into<String>,
        lifecycle_state: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
            type_name: type_name.into(),
            properties: HashMap::new(),
            acl: None,
            lock: None,
            lifecycle_state: lifecycle_state.into(),
            checked_out: true,
            base_version: None,
            children: Vec::new(),
            stamp: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn properties(&self) -> &HashMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, path: &str) -> Option<&PropertyValue> {
        self.properties.get(path)
    }

    pub fn acl(&self) -> Option<&Acl> {
        self.acl.as_ref()
    }

    pub fn lock(&self) -> Option<&LockInfo> {
        self.lock.as_ref()
    }

    pub fn lifecycle_state(&self) -> &str {
        &self.lifecycle_state
    }

    pub fn is_checked_out(&self) -> bool {
        self.checked_out
    }

    pub fn base_version(&self) -> Option<VersionId> {
        self.base_version
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    // --- mutators, used by the session (on cached copies) and the backend ---

    pub fn set_parent(&mut self, parent_id: Option<NodeId>) {
        self.parent_id = parent_id;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_property(&mut self, path: impl Into<String>, value: PropertyValue) {
        self.properties.insert(path.into(), value);
    }

    pub fn remove_property(&mut self, path: &str) -> Option<PropertyValue> {
        self.properties.remove(path)
    }

    pub fn replace_properties(&mut self, properties: HashMap<String, PropertyValue>) {
        self.properties = properties;
    }

    pub fn set_acl(&mut self, acl: Option<Acl>) {
        self.acl = acl;
    }

    pub fn set_lock(&mut self, lock: Option<LockInfo>) {
        self.lock = lock;
    }

    pub fn set_lifecycle_state(&mut self, state: impl Into<String>) {
        self.lifecycle_state = state.into();
    }

    pub fn set_checked_out(&mut self, checked_out: bool) {
        self.checked_out = checked_out;
    }

    pub fn set_base_version(&mut self, version: Option<VersionId>) {
        self.base_version = version;
    }

    /// Append a child at the end of the advisory order
    pub fn add_child(&mut self, child: NodeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Drop a child from the advisory order
    pub fn remove_child(&mut self, child: NodeId) {
        self.children.retain(|c| *c != child);
    }

    /// Move `child` so it sits just before `before`; append when `before`
    /// is None or absent
    pub fn order_child_before(&mut self, child: NodeId, before: Option<NodeId>) {
        self.children.retain(|c| *c != child);
        match before.and_then(|b| self.children.iter().position(|c| *c == b)) {
            Some(pos) => self.children.insert(pos, child),
            None => self.children.push(child),
        }
    }

    /// Backend-only: assign the committed stamp
    pub fn set_stamp(&mut self, stamp: u64) {
        self.stamp = stamp;
    }
}
