//! The session
//!
//! One session = one unit of work on one thread: one mapper connection,
//! one node cache, one pending change set. Reads go through the cache
//! with mapper fallback; writes mutate cached copies and accumulate in
//! the pending set; `save` flushes everything as one atomic batch.
//!
//! Invalidations addressed to this session are applied at the start of
//! every public operation, so a session never reads state that a
//! delivered invalidation already declared stale.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::cluster::{InvalidationKind, InvalidationMessage, InvalidationSink};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::mapper::{ChangeKind, Mapper, MapperError, QueryExpr, WriteBatch, WriteOp};
use crate::model::Validator;
use crate::node::{Acl, LockInfo, NodeId, NodeState, Permission, PropertyValue};
use crate::observability::Logger;
use crate::repository::{Principal, Repository};
use crate::versioning::{VersionId, VersionSnapshot};
use crate::work::{ChangeRecord, EventBundle};
use crate::cache::NodeCache;

use super::document::Document;
use super::permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Open,
    Saving,
    Closed,
}

/// Unit-of-work handle on one repository
pub struct Session {
    repo: Arc<Repository>,
    serial: u64,
    principal: Principal,
    mapper: Box<dyn Mapper>,
    cache: NodeCache,
    sink: Arc<InvalidationSink>,
    /// Snapshots taken by check-in, persisted at the next save
    pending_versions: Vec<VersionSnapshot>,
    /// Model generation the cache contents were read under
    model_generation: u64,
    status: SessionStatus,
    root_id: NodeId,
}

impl Session {
    pub(crate) fn new(
        repo: Arc<Repository>,
        serial: u64,
        principal: Principal,
        mapper: Box<dyn Mapper>,
        sink: Arc<InvalidationSink>,
        root_id: NodeId,
        cache_capacity: usize,
    ) -> Self {
        let model_generation = repo.model().generation();
        Self {
            repo,
            serial,
            principal,
            mapper,
            cache: NodeCache::new(cache_capacity),
            sink,
            pending_versions: Vec::new(),
            model_generation,
            status: SessionStatus::Open,
            root_id,
        }
    }

    /// The principal this session acts as
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Id of the repository root
    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    /// Whether the session can still be used
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    /// Whether unsaved changes exist
    pub fn has_pending_changes(&self) -> bool {
        !self.cache.pending().is_empty() || !self.pending_versions.is_empty()
    }

    // ------------------------------------------------------------------
    // reads
    // ------------------------------------------------------------------

    /// Fetch one document. Fails with `NotFound` when the id is absent or
    /// the principal may not read it; the two are indistinguishable.
    pub fn get_document(&mut self, id: NodeId) -> RepositoryResult<Document> {
        self.begin_op()?;
        let state = self.load_state(id)?;
        self.check_read(&state)?;
        Ok(Document::from_state(state))
    }

    /// The repository root
    pub fn get_root(&mut self) -> RepositoryResult<Document> {
        self.get_document(self.root_id)
    }

    /// Parent document, None for the root
    pub fn get_parent(&mut self, id: NodeId) -> RepositoryResult<Option<Document>> {
        self.begin_op()?;
        let state = self.load_state(id)?;
        self.check_read(&state)?;
        match state.parent_id() {
            None => Ok(None),
            Some(parent) => self.get_document(parent).map(Some),
        }
    }

    /// Readable children in advisory order. Children the principal may
    /// not read are silently omitted.
    pub fn get_children(&mut self, parent: NodeId) -> RepositoryResult<Vec<Document>> {
        self.begin_op()?;
        let parent_state = self.load_state(parent)?;
        self.check_read(&parent_state)?;
        let mut children = Vec::new();
        for child_id in parent_state.children().to_vec() {
            let child = match self.load_state(child_id) {
                Ok(child) => child,
                Err(RepositoryError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            if self.is_granted(&child, Permission::Read)? {
                children.push(Document::from_state(child));
            }
        }
        Ok(children)
    }

    /// Child by name. Absence and unreadability both surface as
    /// `PathNotFound`.
    pub fn get_child(&mut self, parent: NodeId, name: &str) -> RepositoryResult<Document> {
        self.begin_op()?;
        let parent_state = self.load_state(parent)?;
        self.check_read(&parent_state)?;
        match self.child_by_name(&parent_state, name)? {
            Some(child) if self.is_granted(&child, Permission::Read)? => {
                Ok(Document::from_state(child))
            }
            _ => Err(RepositoryError::PathNotFound(name.to_string())),
        }
    }

    /// Resolve an absolute path ("/", "/a/b/c") to a document
    pub fn get_document_by_path(&mut self, path: &str) -> RepositoryResult<Document> {
        self.begin_op()?;
        if !path.starts_with('/') {
            return Err(RepositoryError::validation(format!(
                "path must be absolute: '{}'",
                path
            )));
        }
        let mut current = self.load_state(self.root_id)?;
        if !self.is_granted(&current, Permission::Read)? {
            return Err(RepositoryError::PathNotFound(path.to_string()));
        }
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let next = self.child_by_name(&current, segment)?;
            match next {
                Some(child) if self.is_granted(&child, Permission::Read)? => current = child,
                _ => return Err(RepositoryError::PathNotFound(path.to_string())),
            }
        }
        Ok(Document::from_state(current))
    }

    /// Absolute path of a document, "/" for the root
    pub fn get_path(&mut self, id: NodeId) -> RepositoryResult<String> {
        self.begin_op()?;
        let state = self.load_state(id)?;
        self.check_read(&state)?;
        let mut segments = Vec::new();
        let mut current = state;
        let mut hops = 0usize;
        while let Some(parent) = current.parent_id() {
            segments.push(current.name().to_string());
            current = self.ancestor_state(parent)?;
            hops += 1;
            if hops > MAX_DEPTH {
                return Err(RepositoryError::internal("ancestor chain does not terminate"));
            }
        }
        if segments.is_empty() {
            return Ok("/".to_string());
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    /// Run a structural query against committed state. Results are
    /// filtered by read permission; the session's own unsaved changes are
    /// not visible.
    pub fn query(&mut self, expr: &QueryExpr) -> RepositoryResult<Vec<Document>> {
        self.begin_op()?;
        let cursor = self.mapper.query(expr).map_err(|e| self.backend_err(e))?;
        let states = cursor
            .collect::<Result<Vec<_>, MapperError>>()
            .map_err(|e| self.backend_err(e))?;
        let mut documents = Vec::new();
        for state in states {
            if self.is_granted(&state, Permission::Read)? {
                documents.push(Document::from_state(state));
            }
        }
        Ok(documents)
    }

    // ------------------------------------------------------------------
    // writes
    // ------------------------------------------------------------------

    /// Create a document under a folderish parent. Properties are
    /// validated against the model before anything is recorded.
    pub fn create_document(
        &mut self,
        parent_id: NodeId,
        name: &str,
        type_name: &str,
        properties: HashMap<String, PropertyValue>,
    ) -> RepositoryResult<Document> {
        self.begin_op()?;
        validate_name(name)?;
        let mut parent = self.load_state(parent_id)?;
        self.check_read(&parent)?;
        self.check_write(&parent)?;
        self.require_folderish(&parent)?;
        if self.child_by_name(&parent, name)?.is_some() {
            return Err(RepositoryError::validation(format!(
                "a child named '{}' already exists",
                name
            )));
        }
        Validator::validate_create(self.repo.model(), type_name, &properties)?;
        let lifecycle = self.repo.model().lifecycle_for_type(type_name)?;

        let id = NodeId::new();
        let mut state = NodeState::new(id, Some(parent_id), name, type_name, lifecycle.initial_state);
        state.replace_properties(properties);
        self.cache.put_dirty(state.clone(), ChangeKind::Created);

        parent.add_child(id);
        self.cache.put_dirty(parent, ChangeKind::Updated);

        Ok(Document::from_state(state))
    }

    /// Set one property on a checked-out document
    pub fn set_property(
        &mut self,
        id: NodeId,
        path: &str,
        value: PropertyValue,
    ) -> RepositoryResult<()> {
        self.set_properties(id, HashMap::from([(path.to_string(), value)]))
    }

    /// Set several properties in one step; all are validated before any
    /// is applied
    pub fn set_properties(
        &mut self,
        id: NodeId,
        properties: HashMap<String, PropertyValue>,
    ) -> RepositoryResult<()> {
        self.begin_op()?;
        let mut state = self.writable_state(id)?;
        if !state.is_checked_out() {
            return Err(RepositoryError::illegal_state(
                "document is checked in; check out before modifying",
            ));
        }
        for (path, value) in &properties {
            Validator::validate_set(self.repo.model(), state.type_name(), path, value)?;
        }
        for (path, value) in properties {
            state.set_property(path, value);
        }
        self.cache.put_dirty(state, ChangeKind::Updated);
        Ok(())
    }

    /// Move a document under a different folderish parent
    pub fn move_document(&mut self, id: NodeId, new_parent_id: NodeId) -> RepositoryResult<()> {
        self.begin_op()?;
        let mut state = self.writable_state(id)?;
        let Some(old_parent_id) = state.parent_id() else {
            return Err(RepositoryError::illegal_state("the root cannot be moved"));
        };
        if old_parent_id == new_parent_id {
            return Ok(());
        }

        let mut new_parent = self.load_state(new_parent_id)?;
        self.check_read(&new_parent)?;
        self.check_write(&new_parent)?;
        self.require_folderish(&new_parent)?;
        self.ensure_not_descendant(new_parent_id, id)?;
        if self.child_by_name(&new_parent, state.name())?.is_some() {
            return Err(RepositoryError::validation(format!(
                "a child named '{}' already exists at the destination",
                state.name()
            )));
        }

        let mut old_parent = self.load_state(old_parent_id)?;
        self.check_write(&old_parent)?;

        old_parent.remove_child(id);
        self.cache.put_dirty(old_parent, ChangeKind::Updated);
        new_parent.add_child(id);
        self.cache.put_dirty(new_parent, ChangeKind::Updated);
        state.set_parent(Some(new_parent_id));
        self.cache.put_dirty(state, ChangeKind::Updated);
        Ok(())
    }

    /// Reorder a child in its parent's advisory order; `before` of None
    /// moves it last
    pub fn order_before(
        &mut self,
        parent_id: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    ) -> RepositoryResult<()> {
        self.begin_op()?;
        let mut parent = self.load_state(parent_id)?;
        self.check_read(&parent)?;
        self.check_write(&parent)?;
        if !parent.children().contains(&child) {
            return Err(RepositoryError::validation(
                "node is not a child of the given parent",
            ));
        }
        if let Some(before) = before {
            if !parent.children().contains(&before) {
                return Err(RepositoryError::validation(
                    "reference node is not a child of the given parent",
                ));
            }
        }
        parent.order_child_before(child, before);
        self.cache.put_dirty(parent, ChangeKind::Updated);
        Ok(())
    }

    /// Deep-copy a subtree under a new parent. Copies get fresh ids and
    /// no version history; children the principal may not read are
    /// omitted from the copy.
    pub fn copy_document(
        &mut self,
        id: NodeId,
        new_parent_id: NodeId,
        name: Option<&str>,
    ) -> RepositoryResult<Document> {
        self.begin_op()?;
        let source = self.load_state(id)?;
        self.check_read(&source)?;
        let mut parent = self.load_state(new_parent_id)?;
        self.check_read(&parent)?;
        self.check_write(&parent)?;
        self.require_folderish(&parent)?;

        let copy_name = name.unwrap_or_else(|| source.name()).to_string();
        validate_name(&copy_name)?;
        if self.child_by_name(&parent, &copy_name)?.is_some() {
            return Err(RepositoryError::validation(format!(
                "a child named '{}' already exists at the destination",
                copy_name
            )));
        }

        let copy_id = self.copy_subtree(&source, new_parent_id, &copy_name)?;
        parent.add_child(copy_id);
        self.cache.put_dirty(parent, ChangeKind::Updated);

        let copy = self
            .cache
            .get(copy_id)
            .ok_or_else(|| RepositoryError::internal("copied node missing from cache"))?;
        Ok(Document::from_state(copy))
    }

    /// Remove a document and its whole subtree
    pub fn remove_document(&mut self, id: NodeId) -> RepositoryResult<()> {
        self.begin_op()?;
        let state = self.load_state(id)?;
        self.check_read(&state)?;
        self.check_write(&state)?;
        let Some(parent_id) = state.parent_id() else {
            return Err(RepositoryError::illegal_state("the root cannot be removed"));
        };

        // Deepest-first, so removals replay child-before-parent
        let mut subtree = Vec::new();
        self.collect_subtree(id, 0, &mut subtree)?;

        let mut parent = self.load_state(parent_id)?;
        self.check_write(&parent)?;
        parent.remove_child(id);
        self.cache.put_dirty(parent, ChangeKind::Updated);

        for node in subtree {
            let node_id = node.id();
            if self.cache.pending().has(node_id, ChangeKind::Created) {
                // Created and removed in the same transaction: no trace
                self.cache.forget(node_id);
            } else {
                self.cache.put_dirty(node, ChangeKind::Removed);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // security
    // ------------------------------------------------------------------

    /// Replace a document's local ACL. Requires the Everything permission.
    pub fn set_acl(&mut self, id: NodeId, acl: Option<Acl>) -> RepositoryResult<()> {
        self.begin_op()?;
        let mut state = self.load_state(id)?;
        self.check_read(&state)?;
        if !self.is_granted(&state, Permission::Everything)? {
            return Err(RepositoryError::permission(format!(
                "changing security on {} requires the Everything permission",
                id
            )));
        }
        state.set_acl(acl);
        self.cache.put_dirty(state, ChangeKind::SecurityChanged);
        Ok(())
    }

    /// The document's local ACL, if any
    pub fn get_acl(&mut self, id: NodeId) -> RepositoryResult<Option<Acl>> {
        self.begin_op()?;
        let state = self.load_state(id)?;
        self.check_read(&state)?;
        Ok(state.acl().cloned())
    }

    // ------------------------------------------------------------------
    // locking
    // ------------------------------------------------------------------

    /// Take a lock as the session's principal. Re-locking an own lock is
    /// a no-op; a foreign lock fails with `LockConflict`.
    pub fn lock(&mut self, id: NodeId) -> RepositoryResult<()> {
        self.begin_op()?;
        let mut state = self.load_state(id)?;
        self.check_read(&state)?;
        self.check_write(&state)?;
        if let Some(existing) = state.lock() {
            if existing.owned_by(self.principal.name()) {
                return Ok(());
            }
            return Err(RepositoryError::LockConflict {
                id,
                owner: existing.owner.clone(),
            });
        }
        state.set_lock(Some(LockInfo::new(self.principal.name())));
        self.cache.put_dirty(state, ChangeKind::StateChanged);
        Ok(())
    }

    /// Release a lock. Only the owner or an administrator may unlock;
    /// unlocking an unlocked document is a no-op.
    pub fn unlock(&mut self, id: NodeId) -> RepositoryResult<()> {
        self.begin_op()?;
        let mut state = self.load_state(id)?;
        self.check_read(&state)?;
        let Some(lock) = state.lock().cloned() else {
            return Ok(());
        };
        if lock.owned_by(self.principal.name()) || self.principal.is_admin() {
            state.set_lock(None);
            self.cache.put_dirty(state, ChangeKind::StateChanged);
            Ok(())
        } else {
            Err(RepositoryError::permission(format!(
                "only the lock owner '{}' or an administrator may unlock",
                lock.owner
            )))
        }
    }

    /// Current lock descriptor, if any
    pub fn get_lock(&mut self, id: NodeId) -> RepositoryResult<Option<LockInfo>> {
        self.begin_op()?;
        let state = self.load_state(id)?;
        self.check_read(&state)?;
        Ok(state.lock().cloned())
    }

    // ------------------------------------------------------------------
    // versioning
    // ------------------------------------------------------------------

    /// Freeze the document's properties into a new immutable version.
    /// Fails with `IllegalState` when the document is already checked in.
    pub fn check_in(
        &mut self,
        id: NodeId,
        label: Option<String>,
        description: Option<String>,
    ) -> RepositoryResult<VersionId> {
        self.begin_op()?;
        let mut state = self.writable_state(id)?;
        if !state.is_checked_out() {
            return Err(RepositoryError::illegal_state(
                "document is already checked in",
            ));
        }
        let snapshot = VersionSnapshot::new(
            id,
            state.type_name(),
            label,
            description,
            state.base_version(),
            state.properties().clone(),
        );
        let version_id = snapshot.id();
        self.pending_versions.push(snapshot);

        state.set_checked_out(false);
        state.set_base_version(Some(version_id));
        self.cache.put_dirty(state, ChangeKind::StateChanged);
        Ok(version_id)
    }

    /// Make a checked-in document mutable again. Fails with
    /// `IllegalState` when it is already checked out.
    pub fn check_out(&mut self, id: NodeId) -> RepositoryResult<()> {
        self.begin_op()?;
        let mut state = self.writable_state(id)?;
        if state.is_checked_out() {
            return Err(RepositoryError::illegal_state(
                "document is already checked out",
            ));
        }
        state.set_checked_out(true);
        self.cache.put_dirty(state, ChangeKind::StateChanged);
        Ok(())
    }

    /// All committed versions of a document, in check-in order. Works
    /// after the live document has been removed (audit access).
    pub fn get_versions(&mut self, id: NodeId) -> RepositoryResult<Vec<VersionSnapshot>> {
        self.begin_op()?;
        match self.load_state(id) {
            Ok(state) => self.check_read(&state)?,
            // The live node is gone; history stays readable for audit
            Err(RepositoryError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        self.mapper.versions_of(id).map_err(|e| self.backend_err(e))
    }

    /// Most recent committed version, if any
    pub fn get_last_version(&mut self, id: NodeId) -> RepositoryResult<Option<VersionSnapshot>> {
        Ok(self.get_versions(id)?.pop())
    }

    /// One version snapshot by id
    pub fn get_version(&mut self, version: VersionId) -> RepositoryResult<VersionSnapshot> {
        self.begin_op()?;
        self.mapper
            .fetch_version(version)
            .map_err(|e| self.backend_err(e))?
            .ok_or(RepositoryError::VersionNotFound(version))
    }

    /// Overwrite the checked-out document's properties from a version
    pub fn restore_version(&mut self, id: NodeId, version: VersionId) -> RepositoryResult<()> {
        self.begin_op()?;
        let mut state = self.writable_state(id)?;
        if !state.is_checked_out() {
            return Err(RepositoryError::illegal_state(
                "check out the document before restoring a version",
            ));
        }
        let snapshot = self
            .mapper
            .fetch_version(version)
            .map_err(|e| self.backend_err(e))?
            .ok_or(RepositoryError::VersionNotFound(version))?;
        if snapshot.node_id() != id {
            return Err(RepositoryError::validation(
                "version belongs to a different document",
            ));
        }
        state.replace_properties(snapshot.properties().clone());
        state.set_base_version(Some(version));
        self.cache.put_dirty(state, ChangeKind::Updated);
        Ok(())
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// Follow a named lifecycle transition from the current state
    pub fn follow_transition(&mut self, id: NodeId, transition: &str) -> RepositoryResult<()> {
        self.begin_op()?;
        let mut state = self.writable_state(id)?;
        let lifecycle = self.repo.model().lifecycle_for_type(state.type_name())?;
        let target = lifecycle
            .target(state.lifecycle_state(), transition)
            .ok_or_else(|| {
                RepositoryError::illegal_state(format!(
                    "no transition '{}' from lifecycle state '{}'",
                    transition,
                    state.lifecycle_state()
                ))
            })?
            .to_string();
        state.set_lifecycle_state(target);
        self.cache.put_dirty(state, ChangeKind::LifecycleChanged);
        Ok(())
    }

    /// Current lifecycle state
    pub fn lifecycle_state(&mut self, id: NodeId) -> RepositoryResult<String> {
        self.begin_op()?;
        let state = self.load_state(id)?;
        self.check_read(&state)?;
        Ok(state.lifecycle_state().to_string())
    }

    // ------------------------------------------------------------------
    // transaction boundary
    // ------------------------------------------------------------------

    /// Flush the pending change set as one atomic batch.
    ///
    /// A synchronous listener error vetoes before anything reaches the
    /// mapper and the pending set is retained. An optimistic conflict
    /// aborts the whole pending set and surfaces `ConcurrentUpdate`; the
    /// caller retries the logical operation from a fresh read. On success
    /// invalidations are published and the event bundle is handed to the
    /// asynchronous pipeline.
    pub fn save(&mut self) -> RepositoryResult<()> {
        self.ensure_open()?;
        self.status = SessionStatus::Saving;
        self.apply_invalidations();

        if !self.has_pending_changes() {
            self.status = SessionStatus::Open;
            return Ok(());
        }

        let pending: Vec<(NodeId, BTreeSet<ChangeKind>)> = self
            .cache
            .pending()
            .iter()
            .map(|(id, kinds)| (id, kinds.clone()))
            .collect();

        let bundle = self.build_bundle(&pending);
        if let Err(err) = self.repo.pipeline().run_synchronous(&bundle) {
            // Vetoed before the mapper; pending changes stay for a retry
            self.status = SessionStatus::Open;
            return Err(err);
        }

        let batch = match self.build_batch(&pending) {
            Ok(batch) => batch,
            Err(err) => {
                self.status = SessionStatus::Open;
                return Err(err);
            }
        };
        let messages = self.build_invalidations(&pending);

        let outcome = match self.mapper.write(batch) {
            Ok(outcome) => outcome,
            Err(MapperError::Conflict { id, .. }) => {
                self.cache.abort_pending();
                self.pending_versions.clear();
                self.status = SessionStatus::Open;
                self.repo.metrics().record_conflict();
                Logger::warn(
                    "session.conflict",
                    &[
                        ("node", &id.to_string()),
                        ("repository", &self.repo.name().to_string()),
                    ],
                );
                return Err(RepositoryError::ConcurrentUpdate(format!(
                    "node {} changed since it was read",
                    id
                )));
            }
            Err(MapperError::Gone(id)) => {
                self.cache.abort_pending();
                self.pending_versions.clear();
                self.status = SessionStatus::Open;
                self.repo.metrics().record_conflict();
                return Err(RepositoryError::ConcurrentUpdate(format!(
                    "node {} was removed since it was read",
                    id
                )));
            }
            Err(err) => {
                self.cache.abort_pending();
                self.pending_versions.clear();
                self.status = SessionStatus::Open;
                return Err(self.backend_err(err));
            }
        };

        self.cache.commit_pending(&outcome.new_stamps);
        self.pending_versions.clear();
        self.status = SessionStatus::Open;

        let node_count = pending.len().to_string();
        Logger::info(
            "session.commit",
            &[
                ("nodes", node_count.as_str()),
                ("repository", self.repo.name()),
            ],
        );
        if let Err(err) = self.repo.after_commit(self.serial, &messages, bundle) {
            // The commit is durable; post-commit plumbing failures are
            // operational, never surfaced to the committer
            Logger::error(
                "session.post_commit",
                &[("error", err.to_string().as_str())],
            );
        }
        Ok(())
    }

    /// Release the mapper connection. Unsaved pending changes are
    /// discarded; the session is unusable afterwards.
    pub fn close(&mut self) {
        if self.status == SessionStatus::Closed {
            return;
        }
        self.cache.abort_pending();
        self.pending_versions.clear();
        self.mapper.close();
        self.status = SessionStatus::Closed;
        self.repo.release_session(self.serial);
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> RepositoryResult<()> {
        match self.status {
            SessionStatus::Open => Ok(()),
            SessionStatus::Saving => Err(RepositoryError::illegal_state("save in progress")),
            SessionStatus::Closed => Err(RepositoryError::illegal_state("session is closed")),
        }
    }

    fn begin_op(&mut self) -> RepositoryResult<()> {
        self.ensure_open()?;
        self.apply_invalidations();
        Ok(())
    }

    fn apply_invalidations(&mut self) {
        let generation = self.repo.model().generation();
        if generation != self.model_generation {
            // Cached data predates a model change
            self.cache.evict_clean();
            self.model_generation = generation;
        }
        if self.sink.take_flush_demand() {
            if self.cache.pending().is_empty() {
                self.cache.flush_all();
            } else {
                self.cache.evict_clean();
            }
        }
        for message in self.sink.drain() {
            if message.repository != self.repo.name() {
                continue;
            }
            match message.kind {
                InvalidationKind::Modified => self.cache.apply_modified(message.id),
                InvalidationKind::Deleted | InvalidationKind::Security => {
                    self.cache.apply_subtree_stale(message.id)
                }
            }
            self.repo.metrics().record_invalidation_applied();
        }
    }

    fn backend_err(&mut self, err: MapperError) -> RepositoryError {
        let err: RepositoryError = err.into();
        if matches!(err, RepositoryError::BackendUnavailable(_)) {
            // Fatal for this session; the caller opens a new one
            self.mapper.close();
            self.status = SessionStatus::Closed;
            self.repo.release_session(self.serial);
            Logger::error(
                "session.backend_lost",
                &[("repository", self.repo.name())],
            );
        }
        err
    }

    fn load_state(&mut self, id: NodeId) -> RepositoryResult<NodeState> {
        if let Some(state) = self.cache.get(id) {
            return Ok(state);
        }
        let fetched = self.mapper.fetch(id).map_err(|e| self.backend_err(e))?;
        match fetched {
            Some(state) => {
                self.cache.put_clean(state.clone());
                Ok(state)
            }
            None => Err(RepositoryError::NotFound(id)),
        }
    }

    /// Load an ancestor during a walk; a dangling parent is a broken tree
    fn ancestor_state(&mut self, id: NodeId) -> RepositoryResult<NodeState> {
        match self.load_state(id) {
            Ok(state) => Ok(state),
            Err(RepositoryError::NotFound(_)) => Err(RepositoryError::internal(format!(
                "dangling parent reference: {}",
                id
            ))),
            Err(err) => Err(err),
        }
    }

    fn is_granted(&mut self, state: &NodeState, requested: Permission) -> RepositoryResult<bool> {
        if self.principal.is_admin() {
            return Ok(true);
        }
        let mut chain = vec![state.clone()];
        let mut parent = state.parent_id();
        let mut hops = 0usize;
        while let Some(id) = parent {
            let ancestor = self.ancestor_state(id)?;
            parent = ancestor.parent_id();
            chain.push(ancestor);
            hops += 1;
            if hops > MAX_DEPTH {
                return Err(RepositoryError::internal("ancestor chain does not terminate"));
            }
        }
        Ok(permissions::granted_along_chain(
            self.principal.name(),
            requested,
            chain.iter(),
        ))
    }

    fn check_read(&mut self, state: &NodeState) -> RepositoryResult<()> {
        if self.is_granted(state, Permission::Read)? {
            Ok(())
        } else {
            // Concealed: indistinguishable from absence
            Err(RepositoryError::NotFound(state.id()))
        }
    }

    fn check_write(&mut self, state: &NodeState) -> RepositoryResult<()> {
        if !self.is_granted(state, Permission::Write)? {
            return Err(RepositoryError::permission(format!(
                "write denied on {}",
                state.id()
            )));
        }
        if let Some(lock) = state.lock() {
            if !lock.owned_by(self.principal.name()) && !self.principal.is_admin() {
                return Err(RepositoryError::LockConflict {
                    id: state.id(),
                    owner: lock.owner.clone(),
                });
            }
        }
        Ok(())
    }

    /// Load, conceal-check and write-check in one step
    fn writable_state(&mut self, id: NodeId) -> RepositoryResult<NodeState> {
        let state = self.load_state(id)?;
        self.check_read(&state)?;
        self.check_write(&state)?;
        Ok(state)
    }

    fn require_folderish(&self, state: &NodeState) -> RepositoryResult<()> {
        let doc_type = self
            .repo
            .model()
            .doc_type(state.type_name())
            .ok_or_else(|| {
                RepositoryError::internal(format!("node type '{}' not in model", state.type_name()))
            })?;
        if doc_type.folderish {
            Ok(())
        } else {
            Err(RepositoryError::validation(format!(
                "type '{}' cannot have children",
                state.type_name()
            )))
        }
    }

    fn child_by_name(
        &mut self,
        parent: &NodeState,
        name: &str,
    ) -> RepositoryResult<Option<NodeState>> {
        for child_id in parent.children().to_vec() {
            let child = match self.load_state(child_id) {
                Ok(child) => child,
                Err(RepositoryError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            if child.name() == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Reject a move that would place a node under its own subtree
    fn ensure_not_descendant(&mut self, candidate: NodeId, of: NodeId) -> RepositoryResult<()> {
        let mut current = Some(candidate);
        let mut hops = 0usize;
        while let Some(id) = current {
            if id == of {
                return Err(RepositoryError::validation(
                    "move would create a cycle in the tree",
                ));
            }
            current = self.ancestor_state(id)?.parent_id();
            hops += 1;
            if hops > MAX_DEPTH {
                return Err(RepositoryError::internal("ancestor chain does not terminate"));
            }
        }
        Ok(())
    }

    fn collect_subtree(
        &mut self,
        id: NodeId,
        depth: usize,
        out: &mut Vec<NodeState>,
    ) -> RepositoryResult<()> {
        if depth > MAX_DEPTH {
            return Err(RepositoryError::internal("subtree deeper than supported"));
        }
        let state = self.load_state(id)?;
        if let Some(lock) = state.lock() {
            if !lock.owned_by(self.principal.name()) && !self.principal.is_admin() {
                return Err(RepositoryError::LockConflict {
                    id,
                    owner: lock.owner.clone(),
                });
            }
        }
        for child in state.children().to_vec() {
            match self.collect_subtree(child, depth + 1, out) {
                Ok(()) => {}
                Err(RepositoryError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        out.push(state);
        Ok(())
    }

    fn copy_subtree(
        &mut self,
        source: &NodeState,
        new_parent: NodeId,
        name: &str,
    ) -> RepositoryResult<NodeId> {
        let id = NodeId::new();
        let mut state = NodeState::new(
            id,
            Some(new_parent),
            name,
            source.type_name(),
            source.lifecycle_state(),
        );
        state.replace_properties(source.properties().clone());
        state.set_acl(source.acl().cloned());
        // Record the parent before its children so creates replay
        // parent-first
        self.cache.put_dirty(state.clone(), ChangeKind::Created);

        for child_id in source.children().to_vec() {
            let child = match self.load_state(child_id) {
                Ok(child) => child,
                Err(RepositoryError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            if !self.is_granted(&child, Permission::Read)? {
                continue;
            }
            let child_name = child.name().to_string();
            let copy_id = self.copy_subtree(&child, id, &child_name)?;
            state.add_child(copy_id);
        }
        self.cache.put_dirty(state, ChangeKind::Created);
        Ok(id)
    }

    fn build_bundle(&mut self, pending: &[(NodeId, BTreeSet<ChangeKind>)]) -> EventBundle {
        let records = pending
            .iter()
            .map(|(id, kinds)| ChangeRecord {
                id: *id,
                type_name: self
                    .cache
                    .get(*id)
                    .map(|s| s.type_name().to_string())
                    .unwrap_or_default(),
                kinds: kinds.clone(),
            })
            .collect();
        EventBundle::new(self.repo.name(), self.principal.name(), records)
    }

    fn build_batch(
        &mut self,
        pending: &[(NodeId, BTreeSet<ChangeKind>)],
    ) -> RepositoryResult<WriteBatch> {
        let mut batch = WriteBatch::new();
        for snapshot in &self.pending_versions {
            batch.push(WriteOp::CreateVersion {
                snapshot: snapshot.clone(),
            });
        }

        let mut creates = Vec::new();
        let mut updates = Vec::new();
        let mut removes: Vec<(usize, WriteOp)> = Vec::new();
        for (id, kinds) in pending {
            let state = self.cache.get(*id).ok_or_else(|| {
                RepositoryError::internal(format!("pending node {} missing from cache", id))
            })?;
            if kinds.contains(&ChangeKind::Removed) {
                let depth = self.cached_depth(*id);
                removes.push((
                    depth,
                    WriteOp::Remove {
                        id: *id,
                        expected_stamp: state.stamp(),
                    },
                ));
            } else if kinds.contains(&ChangeKind::Created) {
                creates.push(WriteOp::Create { state });
            } else {
                updates.push(WriteOp::Update {
                    expected_stamp: state.stamp(),
                    state,
                    kinds: kinds.clone(),
                });
            }
        }
        // Deepest removals first, so children go before their parents
        removes.sort_by(|(a, _), (b, _)| b.cmp(a));

        for op in creates {
            batch.push(op);
        }
        for op in updates {
            batch.push(op);
        }
        for (_, op) in removes {
            batch.push(op);
        }
        Ok(batch)
    }

    fn build_invalidations(
        &self,
        pending: &[(NodeId, BTreeSet<ChangeKind>)],
    ) -> Vec<InvalidationMessage> {
        pending
            .iter()
            .map(|(id, kinds)| {
                let kind = if kinds.contains(&ChangeKind::Removed) {
                    InvalidationKind::Deleted
                } else if kinds.contains(&ChangeKind::SecurityChanged) {
                    InvalidationKind::Security
                } else {
                    InvalidationKind::Modified
                };
                InvalidationMessage::new(self.repo.name(), *id, kind, self.repo.process())
            })
            .collect()
    }

    /// Depth of a node as far as cached parents reach; only the relative
    /// order among nodes of one removed subtree matters
    fn cached_depth(&mut self, id: NodeId) -> usize {
        let mut depth = 0usize;
        let mut current = id;
        while let Some(state) = self.cache.get(current) {
            match state.parent_id() {
                Some(parent) => {
                    depth += 1;
                    current = parent;
                }
                None => break,
            }
            if depth > MAX_DEPTH {
                break;
            }
        }
        depth
    }
}

const MAX_DEPTH: usize = 4096;

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("principal", &self.principal)
            .field("status", &self.status)
            .field("pending", &self.cache.pending().len())
            .finish()
    }
}

fn validate_name(name: &str) -> RepositoryResult<()> {
    if name.is_empty() {
        return Err(RepositoryError::validation("document name must not be empty"));
    }
    if name.contains('/') {
        return Err(RepositoryError::validation(
            "document name must not contain '/'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation() {
        assert!(validate_name("report").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
