//! Post-commit event pipeline
//!
//! Every successful `save()` freezes the transaction's changes into an
//! [`EventBundle`]. Synchronous listeners see the bundle before the
//! commit reaches the mapper and may veto it; asynchronous listeners
//! receive it afterwards on named work queues with at-least-once
//! delivery, retry with backoff, and dead-lettering.

mod bundle;
mod listener;
mod pipeline;
mod queue;

pub use bundle::{BundleId, ChangeRecord, EventBundle};
pub use listener::{EventListener, ListenerError, ListenerMode, RegisteredListener};
pub use pipeline::WorkPipeline;
pub use queue::{DeadLetter, WorkQueue};
