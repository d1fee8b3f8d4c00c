//! Cluster invalidation bus
//!
//! In-process stand-in for the cluster's pub/sub topic: every engine
//! process sharing a repository subscribes once; `publish` delivers each
//! batch to every other live subscriber, preserving the batch's internal
//! order per subscriber. Delivery is best-effort: a disconnected
//! subscriber misses messages, and on reconnect its handle reports that a
//! full cache flush is required.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::message::{InvalidationMessage, ProcessId};
use crate::observability::Logger;

#[derive(Debug, Default)]
struct Mailbox {
    queue: Mutex<VecDeque<InvalidationMessage>>,
    /// Set when messages may have been missed (reconnect)
    needs_flush: AtomicBool,
}

#[derive(Debug)]
struct Registration {
    process: ProcessId,
    mailbox: Arc<Mailbox>,
}

/// Process-wide pub/sub channel for invalidation messages
#[derive(Debug, Clone, Default)]
pub struct ClusterBus {
    subscribers: Arc<RwLock<Vec<Registration>>>,
}

impl ClusterBus {
    /// A bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the bus as `process`. Each process subscribes once.
    pub fn subscribe(&self, process: ProcessId) -> Subscription {
        let mailbox = Arc::new(Mailbox::default());
        if let Ok(mut subs) = self.subscribers.write() {
            subs.push(Registration {
                process,
                mailbox: mailbox.clone(),
            });
        }
        Subscription {
            bus: self.clone(),
            process,
            mailbox,
            connected: true,
        }
    }

    /// Deliver a batch to every other currently-subscribed process. The
    /// batch's order is preserved per subscriber; ordering across
    /// publishers is unspecified.
    pub fn publish(&self, messages: &[InvalidationMessage]) {
        if messages.is_empty() {
            return;
        }
        let Ok(subs) = self.subscribers.read() else {
            return;
        };
        for sub in subs.iter() {
            // One lock per subscriber keeps the batch contiguous
            if let Ok(mut queue) = sub.mailbox.queue.lock() {
                for message in messages {
                    if message.origin == sub.process {
                        continue;
                    }
                    queue.push_back(message.clone());
                }
            }
        }
    }

    fn remove(&self, process: ProcessId, mailbox: &Arc<Mailbox>) {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.retain(|s| !(s.process == process && Arc::ptr_eq(&s.mailbox, mailbox)));
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }
}

/// One process's subscription to the bus
#[derive(Debug)]
pub struct Subscription {
    bus: ClusterBus,
    process: ProcessId,
    mailbox: Arc<Mailbox>,
    connected: bool,
}

impl Subscription {
    /// The subscribing process
    pub fn process(&self) -> ProcessId {
        self.process
    }

    /// A publishing handle on the underlying bus
    pub fn bus_handle(&self) -> ClusterBus {
        self.bus.clone()
    }

    /// Take all queued messages, in delivery order
    pub fn drain(&self) -> Vec<InvalidationMessage> {
        self.mailbox
            .queue
            .lock()
            .map(|mut queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// True once after a reconnect: the subscriber may have missed
    /// messages and must flush its caches entirely
    pub fn take_needs_flush(&self) -> bool {
        self.mailbox.needs_flush.swap(false, Ordering::AcqRel)
    }

    /// Leave the bus; messages published while disconnected are missed
    pub fn disconnect(&mut self) {
        if self.connected {
            self.bus.remove(self.process, &self.mailbox);
            self.connected = false;
        }
    }

    /// Rejoin after a disconnect. Anything published in between was
    /// missed, so the safety fallback is flagged.
    pub fn reconnect(&mut self) {
        if self.connected {
            return;
        }
        if let Ok(mut queue) = self.mailbox.queue.lock() {
            queue.clear();
        }
        self.mailbox.needs_flush.store(true, Ordering::Release);
        if let Ok(mut subs) = self.bus.subscribers.write() {
            subs.push(Registration {
                process: self.process,
                mailbox: self.mailbox.clone(),
            });
        }
        self.connected = true;
        Logger::info(
            "cluster.reconnect",
            &[("process", &self.process.to_string())],
        );
    }

    /// Whether this subscription is currently attached to the bus
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::message::InvalidationKind;
    use crate::node::NodeId;

    fn message(origin: ProcessId) -> InvalidationMessage {
        InvalidationMessage::new("docs", NodeId::new(), InvalidationKind::Modified, origin)
    }

    #[test]
    fn test_delivery_skips_origin() {
        let bus = ClusterBus::new();
        let a = bus.subscribe(ProcessId::new());
        let b = bus.subscribe(ProcessId::new());

        bus.publish(&[message(a.process())]);

        assert!(a.drain().is_empty());
        assert_eq!(b.drain().len(), 1);
    }

    #[test]
    fn test_batch_order_preserved_per_subscriber() {
        let bus = ClusterBus::new();
        let publisher = ProcessId::new();
        let sub = bus.subscribe(ProcessId::new());

        let batch: Vec<_> = (0..5).map(|_| message(publisher)).collect();
        bus.publish(&batch);

        let received = sub.drain();
        let sent_ids: Vec<_> = batch.iter().map(|m| m.id).collect();
        let got_ids: Vec<_> = received.iter().map(|m| m.id).collect();
        assert_eq!(got_ids, sent_ids);
    }

    #[test]
    fn test_disconnected_subscriber_misses_messages() {
        let bus = ClusterBus::new();
        let mut sub = bus.subscribe(ProcessId::new());
        sub.disconnect();

        bus.publish(&[message(ProcessId::new())]);
        assert!(sub.drain().is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_reconnect_flags_full_flush() {
        let bus = ClusterBus::new();
        let mut sub = bus.subscribe(ProcessId::new());
        assert!(!sub.take_needs_flush());

        sub.disconnect();
        bus.publish(&[message(ProcessId::new())]);
        sub.reconnect();

        assert!(sub.take_needs_flush());
        // Flag is one-shot
        assert!(!sub.take_needs_flush());
        // Messages published while away stay missed
        assert!(sub.drain().is_empty());

        // Messages after the reconnect flow again
        bus.publish(&[message(ProcessId::new())]);
        assert_eq!(sub.drain().len(), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = ClusterBus::new();
        {
            let _sub = bus.subscribe(ProcessId::new());
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
