//! In-memory backend
//!
//! `MemoryBackend` plays the role of the database server: one shared store
//! that many mapper connections (possibly owned by different simulated
//! processes) read and write. `MemoryMapper` is one connection, owned by
//! exactly one session.
//!
//! `write` is the single synchronization point: it takes the store's write
//! lock, validates every stamp in the batch, and only then applies — so a
//! batch is all-or-nothing even under concurrent committers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::batch::{WriteBatch, WriteOp, WriteOutcome};
use super::errors::{MapperError, MapperResult};
use super::query::{QueryCursor, QueryExpr};
use super::Mapper;
use crate::model::ROOT_TYPE;
use crate::node::{NodeId, NodeState};
use crate::versioning::{VersionId, VersionSnapshot};

#[derive(Debug, Default)]
struct StoreInner {
    nodes: HashMap<NodeId, NodeState>,
    versions: HashMap<VersionId, VersionSnapshot>,
    /// Version ids per source node, in check-in order
    chains: HashMap<NodeId, Vec<VersionId>>,
    root_id: Option<NodeId>,
    /// Monotonic stamp source; every batch gets the next value
    stamp_counter: u64,
    /// Simulated outage, for tests and failure handling paths
    offline: bool,
}

/// Shared in-memory store standing in for the physical database
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryBackend {
    /// Fresh, empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection against this store
    pub fn connect(&self) -> MemoryMapper {
        MemoryMapper {
            store: self.inner.clone(),
            live: true,
        }
    }

    /// Simulate the backend going down or coming back
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut inner) = self.inner.write() {
            inner.offline = offline;
        }
    }

    /// Create the root node if the store does not have one yet.
    /// Idempotent; returns the root id either way.
    pub fn ensure_root(&self, lifecycle_state: &str) -> MapperResult<NodeId> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| MapperError::Internal("store lock poisoned".into()))?;
        if let Some(root_id) = inner.root_id {
            return Ok(root_id);
        }
        let root_id = NodeId::new();
        let mut root = NodeState::new(root_id, None, "", ROOT_TYPE, lifecycle_state);
        inner.stamp_counter += 1;
        root.set_stamp(inner.stamp_counter);
        inner.nodes.insert(root_id, root);
        inner.root_id = Some(root_id);
        Ok(root_id)
    }
}

/// One connection to a `MemoryBackend`
#[derive(Debug)]
pub struct MemoryMapper {
    store: Arc<RwLock<StoreInner>>,
    live: bool,
}

impl MemoryMapper {
    fn read_store(&self) -> MapperResult<std::sync::RwLockReadGuard<'_, StoreInner>> {
        if !self.live {
            return Err(MapperError::ConnectionClosed);
        }
        let inner = self
            .store
            .read()
            .map_err(|_| MapperError::Internal("store lock poisoned".into()))?;
        if inner.offline {
            return Err(MapperError::Unavailable("store is offline".into()));
        }
        Ok(inner)
    }

    fn validate(inner: &StoreInner, batch: &WriteBatch) -> MapperResult<()> {
        for op in batch.ops() {
            match op {
                WriteOp::Create { state } => {
                    if let Some(existing) = inner.nodes.get(&state.id()) {
                        return Err(MapperError::Conflict {
                            id: state.id(),
                            expected: 0,
                            actual: existing.stamp(),
                        });
                    }
                }
                WriteOp::Update {
                    expected_stamp,
                    state,
                    ..
                } => match inner.nodes.get(&state.id()) {
                    None => return Err(MapperError::Gone(state.id())),
                    Some(current) if current.stamp() != *expected_stamp => {
                        return Err(MapperError::Conflict {
                            id: state.id(),
                            expected: *expected_stamp,
                            actual: current.stamp(),
                        });
                    }
                    Some(_) => {}
                },
                WriteOp::Remove { id, expected_stamp } => match inner.nodes.get(id) {
                    None => return Err(MapperError::Gone(*id)),
                    Some(current) if current.stamp() != *expected_stamp => {
                        return Err(MapperError::Conflict {
                            id: *id,
                            expected: *expected_stamp,
                            actual: current.stamp(),
                        });
                    }
                    Some(_) => {}
                },
                WriteOp::CreateVersion { .. } => {}
            }
        }
        Ok(())
    }
}

impl Mapper for MemoryMapper {
    fn fetch(&self, id: NodeId) -> MapperResult<Option<NodeState>> {
        Ok(self.read_store()?.nodes.get(&id).cloned())
    }

    fn fetch_children(&self, parent: NodeId) -> MapperResult<Vec<NodeState>> {
        let inner = self.read_store()?;
        let Some(parent_state) = inner.nodes.get(&parent) else {
            return Ok(Vec::new());
        };
        Ok(parent_state
            .children()
            .iter()
            .filter_map(|child| inner.nodes.get(child).cloned())
            .collect())
    }

    fn fetch_version(&self, version: VersionId) -> MapperResult<Option<VersionSnapshot>> {
        Ok(self.read_store()?.versions.get(&version).cloned())
    }

    fn versions_of(&self, node: NodeId) -> MapperResult<Vec<VersionSnapshot>> {
        let inner = self.read_store()?;
        Ok(inner
            .chains
            .get(&node)
            .map(|chain| {
                chain
                    .iter()
                    .filter_map(|v| inner.versions.get(v).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn query(&self, expr: &QueryExpr) -> MapperResult<QueryCursor> {
        // Capture the candidate set now; each step fetches fresh state so
        // the stream stays lazy and cheap to abandon
        let candidates: Vec<NodeId> = {
            let inner = self.read_store()?;
            inner.nodes.keys().copied().collect()
        };
        let store = self.store.clone();
        let expr = expr.clone();
        let iter = candidates.into_iter().filter_map(move |id| {
            let inner = match store.read() {
                Ok(inner) => inner,
                Err(_) => {
                    return Some(Err(MapperError::Internal("store lock poisoned".into())))
                }
            };
            if inner.offline {
                return Some(Err(MapperError::Unavailable("store is offline".into())));
            }
            match inner.nodes.get(&id) {
                Some(node) if expr.matches(node) => Some(Ok(node.clone())),
                _ => None,
            }
        });
        Ok(QueryCursor::new(Box::new(iter)))
    }

    fn write(&mut self, batch: WriteBatch) -> MapperResult<WriteOutcome> {
        if !self.live {
            return Err(MapperError::ConnectionClosed);
        }
        let mut inner = self
            .store
            .write()
            .map_err(|_| MapperError::Internal("store lock poisoned".into()))?;
        if inner.offline {
            return Err(MapperError::Unavailable("store is offline".into()));
        }

        // Validate everything before touching anything
        Self::validate(&inner, &batch)?;

        inner.stamp_counter += 1;
        let stamp = inner.stamp_counter;
        let mut outcome = WriteOutcome::default();

        for op in batch.ops() {
            match op {
                WriteOp::Create { state } => {
                    let mut state = state.clone();
                    state.set_stamp(stamp);
                    outcome.new_stamps.insert(state.id(), stamp);
                    inner.nodes.insert(state.id(), state);
                }
                WriteOp::Update { state, .. } => {
                    let mut state = state.clone();
                    state.set_stamp(stamp);
                    outcome.new_stamps.insert(state.id(), stamp);
                    inner.nodes.insert(state.id(), state);
                }
                WriteOp::Remove { id, .. } => {
                    inner.nodes.remove(id);
                }
                WriteOp::CreateVersion { snapshot } => {
                    inner
                        .chains
                        .entry(snapshot.node_id())
                        .or_default()
                        .push(snapshot.id());
                    inner.versions.insert(snapshot.id(), snapshot.clone());
                }
            }
        }

        Ok(outcome)
    }

    fn root_id(&self) -> MapperResult<Option<NodeId>> {
        Ok(self.read_store()?.root_id)
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn close(&mut self) {
        self.live = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::batch::ChangeKind;
    use std::collections::BTreeSet;

    fn create_op(parent: Option<NodeId>, name: &str) -> (NodeId, WriteOp) {
        let state = NodeState::new(NodeId::new(), parent, name, "File", "project");
        (state.id(), WriteOp::Create { state })
    }

    #[test]
    fn test_ensure_root_is_idempotent() {
        let backend = MemoryBackend::new();
        let a = backend.ensure_root("project").unwrap();
        let b = backend.ensure_root("project").unwrap();
        assert_eq!(a, b);

        let mapper = backend.connect();
        assert_eq!(mapper.root_id().unwrap(), Some(a));
    }

    #[test]
    fn test_write_then_fetch() {
        let backend = MemoryBackend::new();
        let mut mapper = backend.connect();

        let (id, op) = create_op(None, "a");
        let mut batch = WriteBatch::new();
        batch.push(op);
        let outcome = mapper.write(batch).unwrap();
        assert!(outcome.new_stamps[&id] > 0);

        let fetched = mapper.fetch(id).unwrap().unwrap();
        assert_eq!(fetched.name(), "a");
        assert_eq!(fetched.stamp(), outcome.new_stamps[&id]);
    }

    #[test]
    fn test_stale_stamp_rejects_whole_batch() {
        let backend = MemoryBackend::new();
        let mut mapper = backend.connect();

        let (id, op) = create_op(None, "a");
        let mut batch = WriteBatch::new();
        batch.push(op);
        mapper.write(batch).unwrap();
        let read = mapper.fetch(id).unwrap().unwrap();

        // A second connection commits first
        let mut other = backend.connect();
        let mut their_state = read.clone();
        their_state.set_property("dc:title", "theirs".into());
        let mut their_batch = WriteBatch::new();
        their_batch.push(WriteOp::Update {
            expected_stamp: read.stamp(),
            state: their_state,
            kinds: BTreeSet::from([ChangeKind::Updated]),
        });
        other.write(their_batch).unwrap();

        // Our write against the old stamp must fail, and a fresh unrelated
        // create in the same batch must not be applied either
        let (orphan_id, orphan_op) = create_op(None, "orphan");
        let mut our_state = read.clone();
        our_state.set_property("dc:title", "ours".into());
        let mut our_batch = WriteBatch::new();
        our_batch.push(orphan_op);
        our_batch.push(WriteOp::Update {
            expected_stamp: read.stamp(),
            state: our_state,
            kinds: BTreeSet::from([ChangeKind::Updated]),
        });

        let err = mapper.write(our_batch).unwrap_err();
        assert!(matches!(err, MapperError::Conflict { .. }));
        assert!(mapper.fetch(orphan_id).unwrap().is_none());
    }

    #[test]
    fn test_remove_of_missing_node_is_gone() {
        let backend = MemoryBackend::new();
        let mut mapper = backend.connect();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::Remove {
            id: NodeId::new(),
            expected_stamp: 1,
        });
        assert!(matches!(
            mapper.write(batch).unwrap_err(),
            MapperError::Gone(_)
        ));
    }

    #[test]
    fn test_offline_store_reports_unavailable() {
        let backend = MemoryBackend::new();
        let mut mapper = backend.connect();
        backend.set_offline(true);

        assert!(matches!(
            mapper.fetch(NodeId::new()).unwrap_err(),
            MapperError::Unavailable(_)
        ));
        assert!(matches!(
            mapper.write(WriteBatch::new()).unwrap_err(),
            MapperError::Unavailable(_)
        ));

        backend.set_offline(false);
        assert!(mapper.fetch(NodeId::new()).unwrap().is_none());
    }

    #[test]
    fn test_closed_connection_rejects_calls() {
        let backend = MemoryBackend::new();
        let mut mapper = backend.connect();
        mapper.close();
        assert!(!mapper.is_live());
        assert!(matches!(
            mapper.fetch(NodeId::new()).unwrap_err(),
            MapperError::ConnectionClosed
        ));
    }

    #[test]
    fn test_query_streams_matches() {
        let backend = MemoryBackend::new();
        let mut mapper = backend.connect();

        let mut batch = WriteBatch::new();
        for name in ["a", "b"] {
            let (_, op) = create_op(None, name);
            batch.push(op);
        }
        let mut folder = NodeState::new(NodeId::new(), None, "f", "Folder", "project");
        folder.set_property("dc:title", "keep".into());
        batch.push(WriteOp::Create { state: folder });
        mapper.write(batch).unwrap();

        let cursor = mapper.query(&QueryExpr::type_is("Folder")).unwrap();
        let results: Vec<_> = cursor.collect::<MapperResult<Vec<_>>>().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name(), "f");
    }

    #[test]
    fn test_versions_survive_node_removal() {
        let backend = MemoryBackend::new();
        let mut mapper = backend.connect();

        let (id, op) = create_op(None, "doc");
        let mut batch = WriteBatch::new();
        batch.push(op);
        let outcome = mapper.write(batch).unwrap();

        let snapshot = VersionSnapshot::new(id, "File", None, None, None, Default::default());
        let version_id = snapshot.id();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::CreateVersion { snapshot });
        batch.push(WriteOp::Remove {
            id,
            expected_stamp: outcome.new_stamps[&id],
        });
        mapper.write(batch).unwrap();

        assert!(mapper.fetch(id).unwrap().is_none());
        assert!(mapper.fetch_version(version_id).unwrap().is_some());
        assert_eq!(mapper.versions_of(id).unwrap().len(), 1);
    }
}
