//! Per-session invalidation mailbox
//!
//! The repository fans incoming invalidations (remote, via the bus, and
//! local, from sibling sessions in the same process) out to one sink per
//! live session. The owning session drains its sink at operation
//! boundaries and applies the evictions to its node cache.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::message::InvalidationMessage;

/// Mailbox of invalidations addressed to one session
#[derive(Debug, Default)]
pub struct InvalidationSink {
    queue: Mutex<VecDeque<InvalidationMessage>>,
    /// Set when the session must flush its whole cache instead
    flush_all: AtomicBool,
}

impl InvalidationSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch, preserving order
    pub fn offer(&self, messages: &[InvalidationMessage]) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(messages.iter().cloned());
        }
    }

    /// Demand a full cache flush (reconnect fallback, model change)
    pub fn demand_flush(&self) {
        self.flush_all.store(true, Ordering::Release);
    }

    /// Take the flush demand, resetting it
    pub fn take_flush_demand(&self) -> bool {
        self.flush_all.swap(false, Ordering::AcqRel)
    }

    /// Take all queued messages in order
    pub fn drain(&self) -> Vec<InvalidationMessage> {
        self.queue
            .lock()
            .map(|mut queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Queued message count
    pub fn len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
