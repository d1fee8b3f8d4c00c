//! Document node data model
//!
//! - `NodeId`: opaque node identity
//! - `PropertyValue`: typed property values
//! - `Acl`/`Ace`/`Permission`: ordered access control entries
//! - `LockInfo`: lock descriptor
//! - `NodeState`: one node's full state, as fetched and cached

mod acl;
mod id;
mod lock;
mod state;
mod value;

pub use acl::{Ace, Acl, Permission, EVERYONE};
pub use id::NodeId;
pub use lock::LockInfo;
pub use state::NodeState;
pub use value::PropertyValue;
