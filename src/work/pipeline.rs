//! Work pipeline
//!
//! Owns the async runtime, the listener registry and the named work
//! queues. Sessions call `run_synchronous` during `save()` (a listener
//! error there vetoes the commit) and `submit` after a successful commit
//! to fan the bundle out to every asynchronous listener's queue.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::runtime::Runtime;

use super::bundle::EventBundle;
use super::listener::{EventListener, ListenerMode, RegisteredListener};
use super::queue::{DeadLetter, WorkQueue};
use crate::config::WorkConfig;
use crate::errors::{RepositoryError, RepositoryResult};
use crate::observability::{Logger, Metrics};

/// Listener registry plus the worker pools behind it
pub struct WorkPipeline {
    runtime: Runtime,
    listeners: RwLock<Vec<RegisteredListener>>,
    queues: RwLock<HashMap<String, Arc<WorkQueue>>>,
    config: WorkConfig,
    metrics: Arc<Metrics>,
}

impl WorkPipeline {
    /// Build the pipeline with its own runtime
    pub fn new(config: WorkConfig, metrics: Arc<Metrics>) -> RepositoryResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.workers_per_queue.max(2))
            .enable_time()
            .thread_name("docstore-work")
            .build()
            .map_err(|e| RepositoryError::internal(format!("work runtime: {e}")))?;
        Ok(Self {
            runtime,
            listeners: RwLock::new(Vec::new()),
            queues: RwLock::new(HashMap::new()),
            config,
            metrics,
        })
    }

    /// Register a listener. Asynchronous listeners get their queue's
    /// worker pool created on first registration.
    pub fn register_listener(
        &self,
        name: impl Into<String>,
        listener: Arc<dyn EventListener>,
        mode: ListenerMode,
    ) -> RepositoryResult<()> {
        let name = name.into();
        if let ListenerMode::Asynchronous { queue } = &mode {
            self.ensure_queue(queue)?;
        }
        let mut listeners = self
            .listeners
            .write()
            .map_err(|_| RepositoryError::internal("listener registry lock poisoned"))?;
        listeners.push(RegisteredListener {
            name: name.clone(),
            listener,
            mode,
        });
        Logger::info("work.listener_registered", &[("listener", &name)]);
        Ok(())
    }

    /// Run every synchronous listener inline. The first error vetoes.
    pub fn run_synchronous(&self, bundle: &EventBundle) -> RepositoryResult<()> {
        let listeners = self
            .listeners
            .read()
            .map_err(|_| RepositoryError::internal("listener registry lock poisoned"))?;
        for registered in listeners.iter() {
            if registered.mode != ListenerMode::Synchronous {
                continue;
            }
            if let Err(err) = registered.listener.handle(bundle) {
                return Err(RepositoryError::Vetoed {
                    listener: registered.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Fan a committed bundle out to every asynchronous listener's queue.
    /// Each queue gets one job carrying all of its listeners, so a
    /// bundle is processed once per queue.
    pub fn submit(&self, bundle: EventBundle) -> RepositoryResult<()> {
        if bundle.is_empty() {
            return Ok(());
        }
        let listeners = self
            .listeners
            .read()
            .map_err(|_| RepositoryError::internal("listener registry lock poisoned"))?;
        let mut per_queue: HashMap<String, Vec<RegisteredListener>> = HashMap::new();
        for registered in listeners.iter() {
            if let ListenerMode::Asynchronous { queue } = &registered.mode {
                per_queue
                    .entry(queue.clone())
                    .or_default()
                    .push(registered.clone());
            }
        }
        drop(listeners);
        if per_queue.is_empty() {
            return Ok(());
        }

        let bundle = Arc::new(bundle);
        let queues = self
            .queues
            .read()
            .map_err(|_| RepositoryError::internal("work queue registry lock poisoned"))?;
        for (queue_name, queue_listeners) in per_queue {
            if let Some(queue) = queues.get(&queue_name) {
                queue.submit(bundle.clone(), queue_listeners);
            }
        }
        Ok(())
    }

    /// Block until every queue is empty with nothing in flight, or the
    /// timeout elapses. Returns true on full quiescence.
    pub fn wait_for_quiescence(&self, timeout: Duration) -> bool {
        let queues: Vec<Arc<WorkQueue>> = match self.queues.read() {
            Ok(queues) => queues.values().cloned().collect(),
            Err(_) => return false,
        };
        let deadline = std::time::Instant::now() + timeout;
        for queue in queues {
            let now = std::time::Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            if !queue.wait_for_quiescence(remaining) {
                return false;
            }
        }
        true
    }

    /// Queued plus in-flight bundles across all queues
    pub fn in_flight(&self) -> usize {
        self.queues
            .read()
            .map(|queues| queues.values().map(|q| q.in_flight()).sum())
            .unwrap_or(0)
    }

    /// Dead letters across all queues
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.queues
            .read()
            .map(|queues| {
                queues
                    .values()
                    .flat_map(|q| q.dead_letters())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn ensure_queue(&self, name: &str) -> RepositoryResult<()> {
        let mut queues = self
            .queues
            .write()
            .map_err(|_| RepositoryError::internal("work queue registry lock poisoned"))?;
        if !queues.contains_key(name) {
            let queue = WorkQueue::new(
                name,
                self.config.clone(),
                self.runtime.handle().clone(),
                self.metrics.clone(),
            );
            queues.insert(name.to_string(), Arc::new(queue));
            Logger::info("work.queue_created", &[("queue", name)]);
        }
        Ok(())
    }
}

impl std::fmt::Debug for WorkPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkPipeline")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
