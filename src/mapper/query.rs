//! Structural queries
//!
//! A `QueryExpr` is a structural predicate over committed node state: type
//! equality, property equality, parent, lifecycle state, and conjunction.
//! Full query-language parsing is deliberately absent; callers build the
//! expression tree directly.
//!
//! Results stream lazily: the cursor holds the candidate set captured when
//! the query was issued and fetches one node per step. Re-issuing the
//! query is the only way to restart it.

use crate::node::{NodeId, NodeState, PropertyValue};

use super::errors::MapperResult;

/// A structural query predicate
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// Node type equals
    TypeIs(String),
    /// Property at path equals value
    PropEq(String, PropertyValue),
    /// Direct parent equals
    ParentIs(NodeId),
    /// Lifecycle state equals
    LifecycleIs(String),
    /// Every sub-expression matches
    And(Vec<QueryExpr>),
}

impl QueryExpr {
    /// Convenience: type equality
    pub fn type_is(name: impl Into<String>) -> Self {
        QueryExpr::TypeIs(name.into())
    }

    /// Convenience: property equality
    pub fn prop_eq(path: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        QueryExpr::PropEq(path.into(), value.into())
    }

    /// Whether the given node satisfies this predicate
    pub fn matches(&self, node: &NodeState) -> bool {
        match self {
            QueryExpr::TypeIs(name) => node.type_name() == name,
            QueryExpr::PropEq(path, value) => node.property(path) == Some(value),
            QueryExpr::ParentIs(parent) => node.parent_id() == Some(*parent),
            QueryExpr::LifecycleIs(state) => node.lifecycle_state() == state,
            QueryExpr::And(exprs) => exprs.iter().all(|e| e.matches(node)),
        }
    }
}

/// Lazy stream of matching nodes
pub struct QueryCursor {
    inner: Box<dyn Iterator<Item = MapperResult<NodeState>> + Send>,
}

impl QueryCursor {
    /// Wrap a backend-specific match stream
    pub fn new(inner: Box<dyn Iterator<Item = MapperResult<NodeState>> + Send>) -> Self {
        Self { inner }
    }
}

impl Iterator for QueryCursor {
    type Item = MapperResult<NodeState>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
