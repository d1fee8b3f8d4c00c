//! Storage mappers
//!
//! The mapper is the only component that touches physical storage. One
//! implementation exists per backend; sessions hold one connection each.
//! Reads are side-effect free; `write` applies a whole batch atomically
//! and detects optimistic conflicts via per-node stamps.

mod batch;
mod errors;
mod memory;
mod query;

pub use batch::{ChangeKind, WriteBatch, WriteOp, WriteOutcome};
pub use errors::{MapperError, MapperResult};
pub use memory::{MemoryBackend, MemoryMapper};
pub use query::{QueryCursor, QueryExpr};

use crate::node::{NodeId, NodeState};
use crate::versioning::{VersionId, VersionSnapshot};

/// Backend adapter translating node-level operations into the underlying
/// persistence protocol
pub trait Mapper: Send {
    /// Fetch one node's committed state
    fn fetch(&self, id: NodeId) -> MapperResult<Option<NodeState>>;

    /// Fetch a node's children in advisory order. Unknown parents yield an
    /// empty list.
    fn fetch_children(&self, parent: NodeId) -> MapperResult<Vec<NodeState>>;

    /// Fetch one immutable version snapshot
    fn fetch_version(&self, version: VersionId) -> MapperResult<Option<VersionSnapshot>>;

    /// All version snapshots of a node, in check-in order. Works after the
    /// live node has been removed.
    fn versions_of(&self, node: NodeId) -> MapperResult<Vec<VersionSnapshot>>;

    /// Issue a query; results stream lazily and restart only by re-issuing
    fn query(&self, expr: &QueryExpr) -> MapperResult<QueryCursor>;

    /// Apply a batch atomically. Fails with `Conflict`/`Gone` when any
    /// touched node's stamp moved since it was read; nothing is applied in
    /// that case.
    fn write(&mut self, batch: WriteBatch) -> MapperResult<WriteOutcome>;

    /// Id of the repository root, if initialized
    fn root_id(&self) -> MapperResult<Option<NodeId>>;

    /// Whether this connection is still usable
    fn is_live(&self) -> bool;

    /// Release the connection; subsequent calls fail
    fn close(&mut self);
}
