//! Event bundles
//!
//! One bundle per committed transaction: an immutable, ordered record of
//! everything the transaction changed, plus who committed it, when, and
//! against which repository. Bundles are frozen at commit time and shared
//! by reference with every listener; a listener can never mutate one.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mapper::ChangeKind;
use crate::node::NodeId;

/// Identifier of one event bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(Uuid);

impl BundleId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One changed node inside a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// The changed node
    pub id: NodeId,
    /// Node type at change time
    pub type_name: String,
    /// What happened to it
    pub kinds: BTreeSet<ChangeKind>,
}

/// Immutable record of a committed transaction's changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBundle {
    id: BundleId,
    repository: String,
    /// Principal that committed the transaction
    principal: String,
    /// Commit time
    timestamp: DateTime<Utc>,
    /// Changes in the order the transaction first touched each node
    records: Vec<ChangeRecord>,
}

impl EventBundle {
    /// Freeze a transaction's changes into a bundle
    pub fn new(
        repository: impl Into<String>,
        principal: impl Into<String>,
        records: Vec<ChangeRecord>,
    ) -> Self {
        Self {
            id: BundleId::new(),
            repository: repository.into(),
            principal: principal.into(),
            timestamp: Utc::now(),
            records,
        }
    }

    pub fn id(&self) -> BundleId {
        self.id
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Whether the bundle records no changes
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
