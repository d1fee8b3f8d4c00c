//! Event listeners
//!
//! Synchronous listeners run inline during `save()` before anything
//! reaches the mapper; an error from one vetoes the commit. Asynchronous
//! listeners are grouped by named queue and receive bundles after the
//! commit, at least once each; they must be idempotent.

use std::fmt;
use std::sync::Arc;

use super::bundle::EventBundle;

/// Error returned by a listener. For synchronous listeners this vetoes
/// the commit; for asynchronous ones it triggers a retry.
#[derive(Debug, Clone)]
pub struct ListenerError(pub String);

impl ListenerError {
    /// Build from any message
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ListenerError {}

/// A post-commit (or pre-commit, when synchronous) event handler
pub trait EventListener: Send + Sync {
    /// Handle one bundle. Must be idempotent when registered
    /// asynchronously.
    fn handle(&self, bundle: &EventBundle) -> Result<(), ListenerError>;
}

/// Blanket impl so plain closures can be registered in tests and simple
/// embedders
impl<F> EventListener for F
where
    F: Fn(&EventBundle) -> Result<(), ListenerError> + Send + Sync,
{
    fn handle(&self, bundle: &EventBundle) -> Result<(), ListenerError> {
        self(bundle)
    }
}

/// How a listener is invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerMode {
    /// Inline during `save()`, may veto the commit
    Synchronous,
    /// After commit, on the named work queue, at-least-once
    Asynchronous {
        /// Queue the listener's deliveries are processed on
        queue: String,
    },
}

/// A registered listener
#[derive(Clone)]
pub struct RegisteredListener {
    /// Registration name, used in veto errors and dead-letter records
    pub name: String,
    /// The handler itself
    pub listener: Arc<dyn EventListener>,
    /// Invocation mode
    pub mode: ListenerMode,
}

impl fmt::Debug for RegisteredListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredListener")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish()
    }
}
