//! The model registry
//!
//! One `Model` instance is built at process start and shared by every
//! session. Reads take a shared lock and are uncontended in steady state;
//! late registration takes the write lock and bumps the generation counter,
//! which sessions compare to detect that their cached data predates the
//! model change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::errors::{ModelError, ModelResult};
use super::types::{DocTypeDef, LifecycleDef, PhysicalSlot, SchemaDef};

/// Name of the lifecycle used by types that do not declare one
pub const DEFAULT_LIFECYCLE: &str = "default";

#[derive(Debug, Default)]
struct ModelInner {
    schemas: HashMap<String, SchemaDef>,
    types: HashMap<String, DocTypeDef>,
    lifecycles: HashMap<String, LifecycleDef>,
    /// (type name, property path) -> physical slot, precomputed at
    /// registration so reads never walk schema definitions
    slots: HashMap<(String, String), PhysicalSlot>,
}

/// Immutable-after-startup schema/type metadata shared by all sessions
#[derive(Debug, Default)]
pub struct Model {
    inner: RwLock<ModelInner>,
    generation: AtomicU64,
}

impl Model {
    /// Empty model; callers register schemas, lifecycles and types
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation; bumped by every late registration
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Register a schema. Replaces any schema of the same name.
    pub fn register_schema(&self, schema: SchemaDef) -> ModelResult<()> {
        let mut inner = self.write_inner()?;
        inner.schemas.insert(schema.name.clone(), schema);
        // Slots of already-registered types may now resolve differently
        Self::rebuild_slots(&mut inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Register a lifecycle. Replaces any lifecycle of the same name.
    pub fn register_lifecycle(&self, lifecycle: LifecycleDef) -> ModelResult<()> {
        let mut inner = self.write_inner()?;
        inner.lifecycles.insert(lifecycle.name.clone(), lifecycle);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Register a document type. All referenced schemas must already be
    /// registered so the slot table can be precomputed.
    pub fn register_type(&self, doc_type: DocTypeDef) -> ModelResult<()> {
        let mut inner = self.write_inner()?;
        for schema_name in &doc_type.schemas {
            if !inner.schemas.contains_key(schema_name) {
                return Err(ModelError::UnknownSchema(schema_name.clone()));
            }
        }
        if let Some(lifecycle) = &doc_type.lifecycle {
            if !inner.lifecycles.contains_key(lifecycle) {
                return Err(ModelError::UnknownLifecycle(lifecycle.clone()));
            }
        }
        inner.types.insert(doc_type.name.clone(), doc_type);
        Self::rebuild_slots(&mut inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn rebuild_slots(inner: &mut ModelInner) {
        inner.slots.clear();
        for doc_type in inner.types.values() {
            for schema_name in &doc_type.schemas {
                let Some(schema) = inner.schemas.get(schema_name) else {
                    continue;
                };
                for (field, def) in &schema.fields {
                    let path = format!("{}:{}", schema.name, field);
                    inner.slots.insert(
                        (doc_type.name.clone(), path),
                        PhysicalSlot {
                            table: schema.name.clone(),
                            column: field.clone(),
                            kind: def.kind.clone(),
                            required: def.required,
                        },
                    );
                }
            }
        }
    }

    fn read_inner(&self) -> ModelResult<std::sync::RwLockReadGuard<'_, ModelInner>> {
        self.inner
            .read()
            .map_err(|_| ModelError::InvalidDefinition("model lock poisoned".into()))
    }

    fn write_inner(&self) -> ModelResult<std::sync::RwLockWriteGuard<'_, ModelInner>> {
        self.inner
            .write()
            .map_err(|_| ModelError::InvalidDefinition("model lock poisoned".into()))
    }

    /// Look up a schema by name
    pub fn schema(&self, name: &str) -> Option<SchemaDef> {
        self.read_inner().ok()?.schemas.get(name).cloned()
    }

    /// Look up a document type by name
    pub fn doc_type(&self, name: &str) -> Option<DocTypeDef> {
        self.read_inner().ok()?.types.get(name).cloned()
    }

    /// Look up a lifecycle by name
    pub fn lifecycle(&self, name: &str) -> Option<LifecycleDef> {
        self.read_inner().ok()?.lifecycles.get(name).cloned()
    }

    /// Lifecycle governing the given type (its own or the default)
    pub fn lifecycle_for_type(&self, type_name: &str) -> ModelResult<LifecycleDef> {
        let inner = self.read_inner()?;
        let doc_type = inner
            .types
            .get(type_name)
            .ok_or_else(|| ModelError::UnknownType(type_name.to_string()))?;
        let lifecycle_name = doc_type.lifecycle.as_deref().unwrap_or(DEFAULT_LIFECYCLE);
        inner
            .lifecycles
            .get(lifecycle_name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownLifecycle(lifecycle_name.to_string()))
    }

    /// Resolve a schema-qualified property path to its physical slot
    pub fn resolve(&self, type_name: &str, path: &str) -> ModelResult<PhysicalSlot> {
        if !path.contains(':') {
            return Err(ModelError::MalformedPath(path.to_string()));
        }
        let inner = self.read_inner()?;
        if !inner.types.contains_key(type_name) {
            return Err(ModelError::UnknownType(type_name.to_string()));
        }
        inner
            .slots
            .get(&(type_name.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| ModelError::UnknownProperty {
                type_name: type_name.to_string(),
                path: path.to_string(),
            })
    }

    /// All slots of a type, keyed by property path
    pub fn slots_for_type(&self, type_name: &str) -> ModelResult<HashMap<String, PhysicalSlot>> {
        let inner = self.read_inner()?;
        if !inner.types.contains_key(type_name) {
            return Err(ModelError::UnknownType(type_name.to_string()));
        }
        Ok(inner
            .slots
            .iter()
            .filter(|((t, _), _)| t == type_name)
            .map(|((_, path), slot)| (path.clone(), slot.clone()))
            .collect())
    }
}
