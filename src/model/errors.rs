//! Model error types

use thiserror::Error;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while loading or consulting the model
#[derive(Debug, Error)]
pub enum ModelError {
    /// Document type is not registered
    #[error("unknown document type '{0}'")]
    UnknownType(String),

    /// Schema is not registered
    #[error("unknown schema '{0}'")]
    UnknownSchema(String),

    /// Property path has no slot for this type
    #[error("type '{type_name}' has no property '{path}'")]
    UnknownProperty { type_name: String, path: String },

    /// Property path is not schema-qualified
    #[error("malformed property path '{0}', expected 'schema:field'")]
    MalformedPath(String),

    /// Lifecycle is not registered
    #[error("unknown lifecycle '{0}'")]
    UnknownLifecycle(String),

    /// Declarative definition did not parse or is inconsistent
    #[error("invalid model definition: {0}")]
    InvalidDefinition(String),
}

impl From<ModelError> for crate::errors::RepositoryError {
    fn from(err: ModelError) -> Self {
        crate::errors::RepositoryError::Validation(err.to_string())
    }
}
