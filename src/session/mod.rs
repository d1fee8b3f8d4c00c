//! Sessions
//!
//! The unit-of-work layer: each session wraps one mapper connection and
//! one node cache, accumulates writes as pending changes, and commits
//! them atomically through `save`. Permission checks, locking, version
//! state and lifecycle transitions are all enforced here, before
//! anything reaches the mapper.

mod document;
mod permissions;
mod session;

pub use document::Document;
pub use session::Session;
