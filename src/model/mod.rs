//! Schema/type metadata
//!
//! The model maps logical document types and schema-qualified property
//! paths to physical storage slots. It is loaded once at process start
//! from declarative definitions and shared read-only by every session;
//! late registrations are serialized and tracked by a generation counter.

mod errors;
mod loader;
mod registry;
mod types;
mod validator;

pub use errors::{ModelError, ModelResult};
pub use loader::{ModelDefinition, ModelLoader, ROOT_TYPE};
pub use registry::{Model, DEFAULT_LIFECYCLE};
pub use types::{
    DocTypeDef, LifecycleDef, PhysicalSlot, PropertyDef, PropertyKind, SchemaDef, TransitionDef,
};
pub use validator::Validator;
