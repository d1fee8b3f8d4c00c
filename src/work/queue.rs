//! Work queues
//!
//! One queue per registered queue name, each with its own fixed pool of
//! worker tasks. Delivery is at-least-once: a failing listener is retried
//! with doubling backoff plus jitter, then the bundle is recorded as a
//! dead letter for that listener and processing moves on.
//!
//! Depth counts queued plus in-flight bundles. `submit` applies
//! backpressure against the configured capacity: it blocks the committing
//! session up to the configured timeout, then accepts the bundle anyway
//! with a warning — a saturated queue never loses a committed
//! transaction's events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};

use super::bundle::EventBundle;
use super::listener::RegisteredListener;
use crate::config::WorkConfig;
use crate::observability::{Logger, Metrics};

/// A bundle that exhausted its retries for one listener
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Queue the delivery ran on
    pub queue: String,
    /// Listener that kept failing
    pub listener: String,
    /// The undeliverable bundle
    pub bundle: Arc<EventBundle>,
    /// Attempts made
    pub attempts: u32,
    /// Last error message
    pub error: String,
    /// When the bundle was given up on
    pub recorded: DateTime<Utc>,
}

struct Job {
    bundle: Arc<EventBundle>,
    listeners: Vec<RegisteredListener>,
}

/// One named work queue with its worker pool
pub struct WorkQueue {
    name: String,
    tx: mpsc::UnboundedSender<Job>,
    /// Queued + in-flight bundles
    depth: Arc<AtomicUsize>,
    capacity: usize,
    /// Signaled when depth decreases
    space: Arc<Notify>,
    /// Signaled when depth reaches zero
    idle: Arc<Notify>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    runtime: Handle,
    config: WorkConfig,
}

impl WorkQueue {
    /// Create the queue and spawn its workers on the given runtime
    pub fn new(
        name: impl Into<String>,
        config: WorkConfig,
        runtime: Handle,
        metrics: Arc<Metrics>,
    ) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let depth = Arc::new(AtomicUsize::new(0));
        let space = Arc::new(Notify::new());
        let idle = Arc::new(Notify::new());
        let dead_letters = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..config.workers_per_queue.max(1) {
            let rx = rx.clone();
            let depth = depth.clone();
            let space = space.clone();
            let idle = idle.clone();
            let dead_letters = dead_letters.clone();
            let metrics = metrics.clone();
            let config = config.clone();
            let queue_name = name.clone();
            runtime.spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else {
                        break; // queue dropped, drain done
                    };
                    process_job(&queue_name, job, &config, &dead_letters, &metrics).await;
                    let remaining = depth.fetch_sub(1, Ordering::AcqRel) - 1;
                    space.notify_waiters();
                    if remaining == 0 {
                        idle.notify_waiters();
                    }
                }
            });
        }

        Self {
            name,
            tx,
            depth,
            capacity: config.queue_capacity.max(1),
            space,
            idle,
            dead_letters,
            runtime,
            config,
        }
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit one bundle for the given listeners. Blocks while the queue
    /// is at capacity, up to the configured timeout; past the timeout the
    /// bundle is accepted anyway and a warning is logged.
    pub fn submit(&self, bundle: Arc<EventBundle>, listeners: Vec<RegisteredListener>) {
        let timeout = Duration::from_millis(self.config.submit_timeout_ms);
        let deadline = std::time::Instant::now() + timeout;

        while self.depth.load(Ordering::Acquire) >= self.capacity {
            let now = std::time::Instant::now();
            if now >= deadline {
                Logger::warn(
                    "work.backpressure_timeout",
                    &[
                        ("queue", &self.name),
                        ("depth", &self.depth.load(Ordering::Acquire).to_string()),
                    ],
                );
                break;
            }
            let space = self.space.clone();
            let remaining = deadline - now;
            self.runtime.block_on(async move {
                let _ = tokio::time::timeout(remaining, space.notified()).await;
            });
        }

        self.depth.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(Job { bundle, listeners }).is_err() {
            // Workers are gone (shutdown); nothing is in flight
            self.depth.fetch_sub(1, Ordering::AcqRel);
            Logger::error("work.queue_closed", &[("queue", &self.name)]);
        }
    }

    /// Queued plus in-flight bundles
    pub fn in_flight(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Block until every submitted bundle has been processed or dead-
    /// lettered, or the timeout elapses. Returns true on quiescence.
    pub fn wait_for_quiescence(&self, timeout: Duration) -> bool {
        let depth = self.depth.clone();
        let idle = self.idle.clone();
        self.runtime.block_on(async move {
            tokio::time::timeout(timeout, async {
                loop {
                    let notified = idle.notified();
                    if depth.load(Ordering::Acquire) == 0 {
                        return;
                    }
                    notified.await;
                }
            })
            .await
            .is_ok()
        })
    }

    /// Dead letters recorded so far
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("depth", &self.in_flight())
            .field("capacity", &self.capacity)
            .finish()
    }
}

async fn process_job(
    queue: &str,
    job: Job,
    config: &WorkConfig,
    dead_letters: &Mutex<Vec<DeadLetter>>,
    metrics: &Metrics,
) {
    for registered in &job.listeners {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match registered.listener.handle(&job.bundle) {
                Ok(()) => break,
                Err(err) => {
                    if attempt >= config.max_attempts.max(1) {
                        Logger::error(
                            "work.dead_letter",
                            &[
                                ("queue", queue),
                                ("listener", &registered.name),
                                ("bundle", &job.bundle.id().to_string()),
                                ("attempts", &attempt.to_string()),
                                ("error", &err.to_string()),
                            ],
                        );
                        metrics.record_dead_letter();
                        if let Ok(mut dead) = dead_letters.lock() {
                            dead.push(DeadLetter {
                                queue: queue.to_string(),
                                listener: registered.name.clone(),
                                bundle: job.bundle.clone(),
                                attempts: attempt,
                                error: err.to_string(),
                                recorded: Utc::now(),
                            });
                        }
                        break;
                    }
                    let backoff = config.retry_backoff_ms.max(1) << (attempt - 1);
                    let jitter = rand::thread_rng().gen_range(0..=backoff / 2 + 1);
                    Logger::warn(
                        "work.retry",
                        &[
                            ("queue", queue),
                            ("listener", &registered.name),
                            ("attempt", &attempt.to_string()),
                            ("backoff_ms", &backoff.to_string()),
                        ],
                    );
                    tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                }
            }
        }
    }
    metrics.record_bundle_processed();
}
