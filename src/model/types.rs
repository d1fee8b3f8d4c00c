//! Declarative model definitions
//!
//! Schemas declare named, typed property fields; document types compose
//! schemas and pick a lifecycle; lifecycles declare states and named
//! transitions. Property paths are schema-qualified: `"dc:title"` is field
//! `title` of schema `dc`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Kind of a property field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PropertyKind {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Int,
    /// Boolean
    Bool,
    /// 64-bit floating point
    Float,
    /// Timestamp with timezone
    DateTime,
    /// Homogeneous list
    List {
        /// Element kind (boxed to allow nesting)
        element: Box<PropertyKind>,
    },
    /// Nested map with a fixed field layout
    Map {
        /// Nested field definitions
        fields: HashMap<String, PropertyDef>,
    },
}

impl PropertyKind {
    /// Name used in validation messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyKind::String => "string",
            PropertyKind::Int => "int",
            PropertyKind::Bool => "bool",
            PropertyKind::Float => "float",
            PropertyKind::DateTime => "datetime",
            PropertyKind::List { .. } => "list",
            PropertyKind::Map { .. } => "map",
        }
    }
}

/// One field of a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Field kind
    #[serde(flatten)]
    pub kind: PropertyKind,
    /// Whether the field must be present at document creation
    #[serde(default)]
    pub required: bool,
}

impl PropertyDef {
    /// An optional field of the given kind
    pub fn optional(kind: PropertyKind) -> Self {
        Self {
            kind,
            required: false,
        }
    }

    /// A required field of the given kind
    pub fn required(kind: PropertyKind) -> Self {
        Self {
            kind,
            required: true,
        }
    }
}

/// A named schema: a prefix plus its field layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDef {
    /// Schema name, also the path prefix ("dc" for "dc:title")
    pub name: String,
    /// Field definitions by field name
    pub fields: HashMap<String, PropertyDef>,
}

impl SchemaDef {
    /// Create a schema from its fields
    pub fn new(name: impl Into<String>, fields: HashMap<String, PropertyDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// A document type: composition of schemas plus tree/lifecycle behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocTypeDef {
    /// Type name ("Folder", "File", ...)
    pub name: String,
    /// Schemas whose fields this type carries
    pub schemas: Vec<String>,
    /// Whether nodes of this type may have children
    #[serde(default)]
    pub folderish: bool,
    /// Lifecycle governing nodes of this type; None uses the default
    #[serde(default)]
    pub lifecycle: Option<String>,
}

/// One lifecycle transition edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDef {
    /// Transition name, as passed to `follow_transition`
    pub name: String,
    /// State the node must currently be in
    pub from: String,
    /// State the node moves to
    pub to: String,
}

/// A named lifecycle: states plus transition edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleDef {
    /// Lifecycle name
    pub name: String,
    /// State assigned at document creation
    pub initial_state: String,
    /// All legal states
    pub states: Vec<String>,
    /// Legal transitions between states
    pub transitions: Vec<TransitionDef>,
}

impl LifecycleDef {
    /// Target state for following `transition` from `from`, if legal
    pub fn target(&self, from: &str, transition: &str) -> Option<&str> {
        self.transitions
            .iter()
            .find(|t| t.name == transition && t.from == from)
            .map(|t| t.to.as_str())
    }
}

/// Physical storage slot a property path resolves to.
///
/// A SQL mapper stores each schema in its own table, one column per field.
/// The in-memory backend does not split by table but still resolves slots
/// so validation and any future SQL mapper share one code path.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSlot {
    /// Table (one per schema)
    pub table: String,
    /// Column (one per field)
    pub column: String,
    /// Declared kind of the stored value
    pub kind: PropertyKind,
    /// Whether the field is required at creation
    pub required: bool,
}
