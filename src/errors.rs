//! Repository error taxonomy
//!
//! Callers must be able to branch on the error kind for retry logic:
//! - `NotFound` covers both a missing id and a permission-shadowed id,
//!   which are indistinguishable by design
//! - `Validation` and `Permission` are raised synchronously from the
//!   mutating call, before anything reaches the mapper
//! - `ConcurrentUpdate` and `BackendUnavailable` are raised only from
//!   `save()`
//! - `ConcurrentUpdate` is recoverable by re-read-and-retry of the whole
//!   logical operation

use thiserror::Error;

use crate::node::NodeId;
use crate::versioning::VersionId;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Typed errors surfaced by the session API
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Document does not exist, or the principal may not know it exists
    #[error("document not found: {0}")]
    NotFound(NodeId),

    /// Document path does not resolve
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// Version snapshot does not exist
    #[error("version not found: {0}")]
    VersionNotFound(VersionId),

    /// Schema or type violation, caught before touching the mapper
    #[error("validation failed: {0}")]
    Validation(String),

    /// Document is locked by a different owner
    #[error("document {id} is locked by {owner}")]
    LockConflict { id: NodeId, owner: String },

    /// Principal lacks the permission required by the operation
    #[error("permission denied: {0}")]
    Permission(String),

    /// Optimistic conflict detected at commit; re-read and retry
    #[error("concurrent update detected: {0}")]
    ConcurrentUpdate(String),

    /// Operation not legal in the document's current state
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Storage backend unreachable; fatal for the current session
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A synchronous listener vetoed the commit
    #[error("commit vetoed by listener '{listener}': {reason}")]
    Vetoed { listener: String, reason: String },

    /// Invariant violation inside the engine
    #[error("internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a permission error
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    /// Create an illegal-state error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable error code for logs and monitoring
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::PathNotFound(_) | Self::VersionNotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::LockConflict { .. } => "LOCK_CONFLICT",
            Self::Permission(_) => "PERMISSION_DENIED",
            Self::ConcurrentUpdate(_) => "CONCURRENT_UPDATE",
            Self::IllegalState(_) => "ILLEGAL_STATE",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::Vetoed { .. } => "COMMIT_VETOED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// True when the caller can recover by re-reading and retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentUpdate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(RepositoryError::validation("x").code(), "VALIDATION_FAILED");
        assert_eq!(
            RepositoryError::ConcurrentUpdate("stamp mismatch".into()).code(),
            "CONCURRENT_UPDATE"
        );
        assert_eq!(
            RepositoryError::BackendUnavailable("offline".into()).code(),
            "BACKEND_UNAVAILABLE"
        );
    }

    #[test]
    fn test_only_concurrent_update_is_retryable() {
        assert!(RepositoryError::ConcurrentUpdate("c".into()).is_retryable());
        assert!(!RepositoryError::validation("v").is_retryable());
        assert!(!RepositoryError::BackendUnavailable("b".into()).is_retryable());
    }

    #[test]
    fn test_lock_conflict_display_names_owner() {
        let id = NodeId::new();
        let err = RepositoryError::LockConflict {
            id,
            owner: "alice".into(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("alice"));
    }
}
