//! Access control entries
//!
//! An ACL is an ordered list of entries. Resolution walks from the node
//! toward the root; within a single ACL the first entry matching the
//! principal and permission decides, and the first decision found on the
//! walk wins ("closest ACL wins"). The walk itself lives in
//! `session::permissions`.

use serde::{Deserialize, Serialize};

/// Pseudo-principal matching every authenticated principal
pub const EVERYONE: &str = "Everyone";

/// Permissions a principal can hold on a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// Read document content and properties
    Read,
    /// Modify content, move, remove, lock
    Write,
    /// All permissions, including security changes
    Everything,
}

impl Permission {
    /// Whether holding `self` satisfies a check for `requested`
    pub fn implies(&self, requested: Permission) -> bool {
        match self {
            Permission::Everything => true,
            Permission::Write => matches!(requested, Permission::Read | Permission::Write),
            Permission::Read => matches!(requested, Permission::Read),
        }
    }
}

/// One ACL entry: principal, permission, grant or deny
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ace {
    /// Principal name, or `EVERYONE`
    pub principal: String,
    /// Permission this entry speaks about
    pub permission: Permission,
    /// Grant when true, deny when false
    pub granted: bool,
}

impl Ace {
    /// A grant entry
    pub fn grant(principal: impl Into<String>, permission: Permission) -> Self {
        Self {
            principal: principal.into(),
            permission,
            granted: true,
        }
    }

    /// A deny entry
    pub fn deny(principal: impl Into<String>, permission: Permission) -> Self {
        Self {
            principal: principal.into(),
            permission,
            granted: false,
        }
    }

    /// Whether this entry applies to the given principal and permission
    pub fn matches(&self, principal: &str, requested: Permission) -> bool {
        if self.principal != principal && self.principal != EVERYONE {
            return false;
        }
        if self.granted {
            // A grant applies when the granted permission covers the request
            self.permission.implies(requested)
        } else {
            // A deny applies when the request needs the denied permission
            requested.implies(self.permission) || self.permission == Permission::Everything
        }
    }
}

/// Ordered access control list attached to one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    entries: Vec<Ace>,
}

impl Acl {
    /// Empty ACL
    pub fn new() -> Self {
        Self::default()
    }

    /// ACL from entries, kept in the given order
    pub fn from_entries(entries: Vec<Ace>) -> Self {
        Self { entries }
    }

    /// Append an entry at the end (lowest precedence within this ACL)
    pub fn add(&mut self, ace: Ace) {
        self.entries.push(ace);
    }

    /// Entries in precedence order
    pub fn entries(&self) -> &[Ace] {
        &self.entries
    }

    /// True when no entries are present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First matching decision for (principal, permission), if any
    pub fn decide(&self, principal: &str, requested: Permission) -> Option<bool> {
        self.entries
            .iter()
            .find(|ace| ace.matches(principal, requested))
            .map(|ace| ace.granted)
    }
}
