//! Model loading from declarative definitions
//!
//! Definitions are JSON documents listing schemas, lifecycles and document
//! types. The loader assembles them into a `Model`, with the slot table
//! resolved ahead of time. A built-in base model provides the root type,
//! the standard `dc` schema and the default lifecycle; loaded definitions
//! extend it.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::errors::{ModelError, ModelResult};
use super::registry::{Model, DEFAULT_LIFECYCLE};
use super::types::{DocTypeDef, LifecycleDef, PropertyDef, PropertyKind, SchemaDef, TransitionDef};

/// Type name of the repository root node
pub const ROOT_TYPE: &str = "Root";

/// Top-level shape of a declarative model definition file
#[derive(Debug, Default, Deserialize)]
pub struct ModelDefinition {
    /// Schemas to register, in order
    #[serde(default)]
    pub schemas: Vec<SchemaDef>,
    /// Lifecycles to register, in order
    #[serde(default)]
    pub lifecycles: Vec<LifecycleDef>,
    /// Document types to register, in order (after schemas and lifecycles)
    #[serde(default)]
    pub doc_types: Vec<DocTypeDef>,
}

/// Loads models from declarative definitions
pub struct ModelLoader;

impl ModelLoader {
    /// The base model every repository starts from: root type, `dc`
    /// schema, `Folder`/`File` types and the default lifecycle.
    pub fn base() -> ModelResult<Model> {
        let model = Model::new();

        let mut dc = HashMap::new();
        dc.insert("title".into(), PropertyDef::optional(PropertyKind::String));
        dc.insert(
            "description".into(),
            PropertyDef::optional(PropertyKind::String),
        );
        dc.insert("creator".into(), PropertyDef::optional(PropertyKind::String));
        dc.insert(
            "created".into(),
            PropertyDef::optional(PropertyKind::DateTime),
        );
        dc.insert(
            "contributors".into(),
            PropertyDef::optional(PropertyKind::List {
                element: Box::new(PropertyKind::String),
            }),
        );
        model.register_schema(SchemaDef::new("dc", dc))?;

        model.register_lifecycle(default_lifecycle())?;

        model.register_type(DocTypeDef {
            name: ROOT_TYPE.into(),
            schemas: vec![],
            folderish: true,
            lifecycle: None,
        })?;
        model.register_type(DocTypeDef {
            name: "Folder".into(),
            schemas: vec!["dc".into()],
            folderish: true,
            lifecycle: None,
        })?;
        model.register_type(DocTypeDef {
            name: "File".into(),
            schemas: vec!["dc".into()],
            folderish: false,
            lifecycle: None,
        })?;

        Ok(model)
    }

    /// Base model extended with a parsed definition
    pub fn from_definition(definition: ModelDefinition) -> ModelResult<Model> {
        let model = Self::base()?;
        Self::apply(&model, definition)?;
        Ok(model)
    }

    /// Base model extended with a JSON definition document
    pub fn from_json(json: &str) -> ModelResult<Model> {
        let definition: ModelDefinition = serde_json::from_str(json)
            .map_err(|e| ModelError::InvalidDefinition(e.to_string()))?;
        Self::from_definition(definition)
    }

    /// Base model extended with a JSON definition file
    pub fn from_path(path: &Path) -> ModelResult<Model> {
        let json = fs::read_to_string(path)
            .map_err(|e| ModelError::InvalidDefinition(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Register a definition's contents on an existing model
    pub fn apply(model: &Model, definition: ModelDefinition) -> ModelResult<()> {
        for schema in definition.schemas {
            model.register_schema(schema)?;
        }
        for lifecycle in definition.lifecycles {
            model.register_lifecycle(lifecycle)?;
        }
        for doc_type in definition.doc_types {
            model.register_type(doc_type)?;
        }
        Ok(())
    }
}

fn default_lifecycle() -> LifecycleDef {
    let states = ["project", "approved", "obsolete", "deleted"];
    let mut transitions = vec![
        TransitionDef {
            name: "approve".into(),
            from: "project".into(),
            to: "approved".into(),
        },
        TransitionDef {
            name: "obsolete".into(),
            from: "project".into(),
            to: "obsolete".into(),
        },
        TransitionDef {
            name: "obsolete".into(),
            from: "approved".into(),
            to: "obsolete".into(),
        },
        TransitionDef {
            name: "undelete".into(),
            from: "deleted".into(),
            to: "project".into(),
        },
    ];
    for from in ["project", "approved", "obsolete"] {
        transitions.push(TransitionDef {
            name: "delete".into(),
            from: from.into(),
            to: "deleted".into(),
        });
    }
    LifecycleDef {
        name: DEFAULT_LIFECYCLE.into(),
        initial_state: "project".into(),
        states: states.iter().map(|s| s.to_string()).collect(),
        transitions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_model_has_standard_types() {
        let model = ModelLoader::base().unwrap();
        assert!(model.doc_type(ROOT_TYPE).unwrap().folderish);
        assert!(model.doc_type("Folder").unwrap().folderish);
        assert!(!model.doc_type("File").unwrap().folderish);
        assert!(model.resolve("File", "dc:title").is_ok());
    }

    #[test]
    fn test_default_lifecycle_shape() {
        let model = ModelLoader::base().unwrap();
        let lifecycle = model.lifecycle_for_type("File").unwrap();
        assert_eq!(lifecycle.initial_state, "project");
        assert_eq!(lifecycle.target("project", "approve"), Some("approved"));
        assert_eq!(lifecycle.target("approved", "delete"), Some("deleted"));
        assert_eq!(lifecycle.target("deleted", "undelete"), Some("project"));
        assert_eq!(lifecycle.target("deleted", "approve"), None);
    }

    #[test]
    fn test_from_json_extends_base() {
        let model = ModelLoader::from_json(
            r#"{
                "schemas": [
                    {"name": "note", "fields": {"content": {"type": "string", "required": true}}}
                ],
                "doc_types": [
                    {"name": "Note", "schemas": ["dc", "note"], "folderish": false}
                ]
            }"#,
        )
        .unwrap();
        let slot = model.resolve("Note", "note:content").unwrap();
        assert!(slot.required);
        // Composed schemas both resolve
        assert!(model.resolve("Note", "dc:title").is_ok());
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(matches!(
            ModelLoader::from_json("{not json"),
            Err(ModelError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_from_path_reads_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"doc_types": [{{"name": "Workspace", "schemas": ["dc"], "folderish": true}}]}}"#
        )
        .unwrap();
        let model = ModelLoader::from_path(file.path()).unwrap();
        assert!(model.doc_type("Workspace").unwrap().folderish);
    }
}
