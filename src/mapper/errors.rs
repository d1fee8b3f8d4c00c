//! Mapper error types

use thiserror::Error;

use crate::node::NodeId;

/// Result type for mapper operations
pub type MapperResult<T> = Result<T, MapperError>;

/// Errors raised by a storage mapper
#[derive(Debug, Error)]
pub enum MapperError {
    /// Optimistic stamp check failed for a node in the batch; nothing from
    /// the batch was applied
    #[error("write conflict on node {id}: expected stamp {expected}, found {actual}")]
    Conflict {
        id: NodeId,
        expected: u64,
        actual: u64,
    },

    /// Node disappeared between read and write (concurrent removal)
    #[error("node {0} no longer exists")]
    Gone(NodeId),

    /// Backend cannot be reached
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// Connection already closed
    #[error("mapper connection is closed")]
    ConnectionClosed,

    /// Invariant violation inside the mapper
    #[error("mapper internal error: {0}")]
    Internal(String),
}

impl From<MapperError> for crate::errors::RepositoryError {
    fn from(err: MapperError) -> Self {
        use crate::errors::RepositoryError;
        match err {
            MapperError::Conflict { .. } | MapperError::Gone(_) => {
                RepositoryError::ConcurrentUpdate(err.to_string())
            }
            MapperError::Unavailable(msg) => RepositoryError::BackendUnavailable(msg),
            MapperError::ConnectionClosed => {
                RepositoryError::IllegalState("mapper connection is closed".into())
            }
            MapperError::Internal(msg) => RepositoryError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_concurrent_update() {
        let err: crate::errors::RepositoryError = MapperError::Conflict {
            id: NodeId::new(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert_eq!(err.code(), "CONCURRENT_UPDATE");
    }

    #[test]
    fn test_unavailable_maps_to_backend_unavailable() {
        let err: crate::errors::RepositoryError =
            MapperError::Unavailable("offline".into()).into();
        assert_eq!(err.code(), "BACKEND_UNAVAILABLE");
    }
}
