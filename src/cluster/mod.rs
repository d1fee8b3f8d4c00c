//! Cluster cache coherency
//!
//! After a commit, the session publishes one invalidation message per
//! changed id. Other processes' sessions evict the named entries from
//! their caches (conservatively, whole subtrees for removals and security
//! changes) so no session observes stale state once a message has been
//! delivered. Delivery is best-effort; a reconnecting subscriber flushes
//! its entire cache as the safety fallback.

mod bus;
mod message;
mod sink;

pub use bus::{ClusterBus, Subscription};
pub use message::{InvalidationKind, InvalidationMessage, ProcessId};
pub use sink::InvalidationSink;
