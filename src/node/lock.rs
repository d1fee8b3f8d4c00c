//! Lock descriptor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lock held on a document node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Principal owning the lock
    pub owner: String,
    /// When the lock was taken
    pub created: DateTime<Utc>,
}

impl LockInfo {
    /// Take a lock for the given owner, timestamped now
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            created: Utc::now(),
        }
    }

    /// Whether the given principal owns this lock
    pub fn owned_by(&self, principal: &str) -> bool {
        self.owner == principal
    }
}
