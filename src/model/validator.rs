//! Property validation against the model
//!
//! Validation runs before anything reaches the mapper: unknown types,
//! unresolvable paths, kind mismatches and missing required fields are all
//! rejected synchronously from the mutating call.

use std::collections::HashMap;

use super::registry::Model;
use super::types::{PropertyDef, PropertyKind};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::node::PropertyValue;

/// Validates property values against declared kinds
pub struct Validator;

impl Validator {
    /// Validate the full property set of a new document: every path must
    /// resolve, every value must match its declared kind, and every
    /// required field must be present.
    pub fn validate_create(
        model: &Model,
        type_name: &str,
        properties: &HashMap<String, PropertyValue>,
    ) -> RepositoryResult<()> {
        let slots = model.slots_for_type(type_name)?;

        for (path, value) in properties {
            let slot = slots.get(path).ok_or_else(|| {
                RepositoryError::validation(format!(
                    "type '{}' has no property '{}'",
                    type_name, path
                ))
            })?;
            Self::check_kind(path, &slot.kind, value)?;
        }

        for (path, slot) in &slots {
            if slot.required && !properties.contains_key(path) {
                return Err(RepositoryError::validation(format!(
                    "required property '{}' missing for type '{}'",
                    path, type_name
                )));
            }
        }

        Ok(())
    }

    /// Validate one property update
    pub fn validate_set(
        model: &Model,
        type_name: &str,
        path: &str,
        value: &PropertyValue,
    ) -> RepositoryResult<()> {
        let slot = model.resolve(type_name, path)?;
        Self::check_kind(path, &slot.kind, value)
    }

    fn check_kind(path: &str, kind: &PropertyKind, value: &PropertyValue) -> RepositoryResult<()> {
        let ok = match (kind, value) {
            (PropertyKind::String, PropertyValue::String(_)) => true,
            (PropertyKind::Int, PropertyValue::Int(_)) => true,
            (PropertyKind::Bool, PropertyValue::Bool(_)) => true,
            (PropertyKind::Float, PropertyValue::Float(_)) => true,
            (PropertyKind::DateTime, PropertyValue::DateTime(_)) => true,
            (PropertyKind::List { element }, PropertyValue::List(items)) => {
                for item in items {
                    Self::check_kind(path, element, item)?;
                }
                true
            }
            (PropertyKind::Map { fields }, PropertyValue::Map(entries)) => {
                Self::check_map(path, fields, entries)?;
                true
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(RepositoryError::validation(format!(
                "property '{}' expects {}, got {}",
                path,
                kind.kind_name(),
                value.kind_name()
            )))
        }
    }

    fn check_map(
        path: &str,
        fields: &HashMap<String, PropertyDef>,
        entries: &HashMap<String, PropertyValue>,
    ) -> RepositoryResult<()> {
        for (name, value) in entries {
            let def = fields.get(name).ok_or_else(|| {
                RepositoryError::validation(format!(
                    "property '{}' has no nested field '{}'",
                    path, name
                ))
            })?;
            Self::check_kind(path, &def.kind, value)?;
        }
        for (name, def) in fields {
            if def.required && !entries.contains_key(name) {
                return Err(RepositoryError::validation(format!(
                    "property '{}' is missing required nested field '{}'",
                    path, name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::loader::ModelLoader;
    use crate::model::types::{DocTypeDef, SchemaDef};

    fn model() -> Model {
        let model = ModelLoader::base().unwrap();
        let mut fields = HashMap::new();
        fields.insert(
            "content".into(),
            PropertyDef::required(PropertyKind::String),
        );
        fields.insert(
            "tags".into(),
            PropertyDef::optional(PropertyKind::List {
                element: Box::new(PropertyKind::String),
            }),
        );
        model.register_schema(SchemaDef::new("note", fields)).unwrap();
        model
            .register_type(DocTypeDef {
                name: "Note".into(),
                schemas: vec!["dc".into(), "note".into()],
                folderish: false,
                lifecycle: None,
            })
            .unwrap();
        model
    }

    fn props(pairs: &[(&str, PropertyValue)]) -> HashMap<String, PropertyValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_create_with_required_field_passes() {
        let model = model();
        let properties = props(&[
            ("note:content", PropertyValue::from("body")),
            ("dc:title", PropertyValue::from("t")),
        ]);
        assert!(Validator::validate_create(&model, "Note", &properties).is_ok());
    }

    #[test]
    fn test_create_missing_required_field_fails() {
        let model = model();
        let properties = props(&[("dc:title", PropertyValue::from("t"))]);
        let err = Validator::validate_create(&model, "Note", &properties).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_create_unknown_type_fails() {
        let model = model();
        let err = Validator::validate_create(&model, "Ghost", &HashMap::new()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_set_kind_mismatch_fails() {
        let model = model();
        let err =
            Validator::validate_set(&model, "Note", "note:content", &PropertyValue::from(3i64))
                .unwrap_err();
        assert!(format!("{}", err).contains("expects string"));
    }

    #[test]
    fn test_list_elements_validated() {
        let model = model();
        let good = PropertyValue::List(vec![PropertyValue::from("a")]);
        assert!(Validator::validate_set(&model, "Note", "note:tags", &good).is_ok());

        let bad = PropertyValue::List(vec![PropertyValue::from(1i64)]);
        assert!(Validator::validate_set(&model, "Note", "note:tags", &bad).is_err());
    }

    #[test]
    fn test_unknown_path_fails() {
        let model = model();
        let err = Validator::validate_set(&model, "Note", "note:nope", &PropertyValue::from("x"))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }
}
