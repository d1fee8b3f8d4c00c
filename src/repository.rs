//! The repository façade
//!
//! One `Repository` per process per logical repository, built once from
//! explicit parts: the model, the storage backend, the cluster bus and
//! the work pipeline. No global registry; everything a session needs is
//! injected here and handed down.
//!
//! The repository also owns invalidation fan-out: after a commit it
//! delivers the messages to every sibling session's sink and publishes
//! them on the cluster bus; `process_remote_invalidations` pumps the
//! other direction, from the bus into the local sinks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::cluster::{ClusterBus, InvalidationMessage, InvalidationSink, ProcessId, Subscription};
use crate::config::RepositoryConfig;
use crate::errors::{RepositoryError, RepositoryResult};
use crate::mapper::MemoryBackend;
use crate::model::Model;
use crate::node::NodeId;
use crate::observability::{Logger, Metrics};
use crate::session::Session;
use crate::work::{EventBundle, WorkPipeline};

/// Who a session acts as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    name: String,
    is_admin: bool,
}

impl Principal {
    /// A regular principal, subject to ACL checks
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_admin: false,
        }
    }

    /// An administrator; bypasses ACL checks entirely
    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_admin: true,
        }
    }

    /// The internal system principal
    pub fn system() -> Self {
        Self::admin("system")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }
}

/// Process-wide handle on one repository
pub struct Repository {
    config: RepositoryConfig,
    model: Arc<Model>,
    backend: MemoryBackend,
    process: ProcessId,
    subscription: Mutex<Subscription>,
    pipeline: Arc<WorkPipeline>,
    metrics: Arc<Metrics>,
    /// Per-session invalidation mailboxes, keyed by session serial
    sinks: Mutex<HashMap<u64, Weak<InvalidationSink>>>,
    next_serial: AtomicU64,
    root_id: NodeId,
}

impl Repository {
    /// Wire a repository from its parts. The root node is created if the
    /// backend does not have one yet.
    pub fn open(
        config: RepositoryConfig,
        model: Arc<Model>,
        backend: MemoryBackend,
        bus: &ClusterBus,
    ) -> RepositoryResult<Arc<Self>> {
        let initial_state = model
            .lifecycle_for_type(crate::model::ROOT_TYPE)
            .map(|l| l.initial_state)
            .unwrap_or_else(|_| "project".to_string());
        let root_id = backend
            .ensure_root(&initial_state)
            .map_err(RepositoryError::from)?;

        let metrics = Arc::new(Metrics::new());
        let pipeline = Arc::new(WorkPipeline::new(config.work.clone(), metrics.clone())?);
        let process = ProcessId::new();
        let subscription = bus.subscribe(process);

        Logger::info(
            "repository.open",
            &[
                ("repository", config.name.as_str()),
                ("process", process.to_string().as_str()),
            ],
        );
        Ok(Arc::new(Self {
            config,
            model,
            backend,
            process,
            subscription: Mutex::new(subscription),
            pipeline,
            metrics,
            sinks: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
            root_id,
        }))
    }

    /// Logical repository name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The shared model
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// This process's identity on the cluster bus
    pub fn process(&self) -> ProcessId {
        self.process
    }

    /// Engine counters
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The work pipeline, for listener registration and quiescence
    pub fn pipeline(&self) -> &WorkPipeline {
        &self.pipeline
    }

    /// Id of the repository root
    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    /// Open a session as the given principal
    pub fn open_session(self: &Arc<Self>, principal: Principal) -> RepositoryResult<Session> {
        self.process_remote_invalidations();
        let serial = self.next_serial.fetch_add(1, Ordering::AcqRel);
        let sink = Arc::new(InvalidationSink::new());
        {
            let mut sinks = self
                .sinks
                .lock()
                .map_err(|_| RepositoryError::internal("sink registry lock poisoned"))?;
            sinks.insert(serial, Arc::downgrade(&sink));
        }
        let mapper = Box::new(self.backend.connect());
        Ok(Session::new(
            self.clone(),
            serial,
            principal,
            mapper,
            sink,
            self.root_id,
            self.config.cache_capacity,
        ))
    }

    /// Pump invalidations from the cluster bus into the local sessions'
    /// sinks. A reconnect since the last pump demands a full cache flush
    /// from every session.
    pub fn process_remote_invalidations(&self) {
        let (needs_flush, messages) = {
            let Ok(subscription) = self.subscription.lock() else {
                return;
            };
            (subscription.take_needs_flush(), subscription.drain())
        };
        let Ok(sinks) = self.sinks.lock() else {
            return;
        };
        for sink in sinks.values().filter_map(Weak::upgrade) {
            if needs_flush {
                sink.demand_flush();
            }
            if !messages.is_empty() {
                sink.offer(&messages);
            }
        }
    }

    /// Simulate losing and regaining the cluster connection
    pub fn drop_cluster_connection(&self) {
        if let Ok(mut subscription) = self.subscription.lock() {
            subscription.disconnect();
        }
    }

    /// Rejoin the cluster bus after a drop; sessions flush on next use
    pub fn reconnect_cluster(&self) {
        if let Ok(mut subscription) = self.subscription.lock() {
            subscription.reconnect();
        }
        self.process_remote_invalidations();
    }

    /// Post-commit fan-out: local sinks, the cluster bus, metrics, and
    /// the asynchronous pipeline
    pub(crate) fn after_commit(
        &self,
        origin_serial: u64,
        messages: &[InvalidationMessage],
        bundle: EventBundle,
    ) -> RepositoryResult<()> {
        self.metrics.record_commit();
        self.metrics.record_invalidations_sent(messages.len() as u64);

        if !messages.is_empty() {
            if let Ok(sinks) = self.sinks.lock() {
                for (serial, sink) in sinks.iter() {
                    if *serial == origin_serial {
                        continue;
                    }
                    if let Some(sink) = sink.upgrade() {
                        sink.offer(messages);
                    }
                }
            }
            self.bus().publish(messages);
        }

        self.pipeline.submit(bundle)
    }

    fn bus(&self) -> ClusterBus {
        // The subscription holds the bus; publishing does not need the
        // subscription lock beyond cloning the handle
        self.subscription
            .lock()
            .map(|s| s.bus_handle())
            .unwrap_or_default()
    }

    /// Forget a closed session's sink
    pub(crate) fn release_session(&self, serial: u64) {
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.remove(&serial);
        }
    }

    /// The backing store, for tests that simulate outages
    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.config.name)
            .field("process", &self.process)
            .finish()
    }
}
