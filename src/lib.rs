//! docstore — a transactional, versioned, hierarchical document store
//! engine.
//!
//! Documents are typed tree nodes with schema-validated properties,
//! ACLs, locks, lifecycle states and immutable version history. Each
//! [`Session`](session::Session) is one unit of work: reads go through a
//! per-session cache backed by a pluggable storage
//! [`Mapper`](mapper::Mapper), writes accumulate as pending changes, and
//! [`save`](session::Session::save) commits them as one atomic batch
//! with optimistic conflict detection. After a commit, invalidation
//! messages keep the caches of other sessions and processes coherent,
//! and an immutable event bundle is delivered to registered listeners —
//! synchronous ones inline (they may veto), asynchronous ones through a
//! retrying worker pool.
//!
//! ```no_run
//! use std::sync::Arc;
//! use docstore::{
//!     ClusterBus, MemoryBackend, ModelLoader, Principal, Repository,
//!     RepositoryConfig,
//! };
//!
//! # fn main() -> docstore::RepositoryResult<()> {
//! let model = Arc::new(ModelLoader::base()?);
//! let bus = ClusterBus::new();
//! let repo = Repository::open(
//!     RepositoryConfig::default(),
//!     model,
//!     MemoryBackend::new(),
//!     &bus,
//! )?;
//!
//! let mut session = repo.open_session(Principal::system())?;
//! let root = session.get_root()?;
//! let folder = session.create_document(
//!     root.id(),
//!     "reports",
//!     "Folder",
//!     Default::default(),
//! )?;
//! session.save()?;
//! # let _ = folder;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cluster;
pub mod config;
pub mod errors;
pub mod mapper;
pub mod model;
pub mod node;
pub mod observability;
pub mod repository;
pub mod session;
pub mod versioning;
pub mod work;

pub use cluster::{ClusterBus, InvalidationKind, InvalidationMessage, ProcessId};
pub use config::{RepositoryConfig, WorkConfig};
pub use errors::{RepositoryError, RepositoryResult};
pub use mapper::{Mapper, MemoryBackend, QueryExpr};
pub use model::{Model, ModelDefinition, ModelLoader};
pub use node::{Ace, Acl, NodeId, Permission, PropertyValue, EVERYONE};
pub use repository::{Principal, Repository};
pub use session::{Document, Session};
pub use versioning::{VersionId, VersionSnapshot};
pub use work::{EventBundle, EventListener, ListenerError, ListenerMode};
