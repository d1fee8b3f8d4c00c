//! Typed property values
//!
//! A document's properties map schema-qualified paths ("dc:title") to
//! these values. The value shapes mirror the property kinds the model
//! declares: scalars, homogeneous lists, and nested maps.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A property value stored on a document node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    /// UTF-8 string
    String(String),
    /// 64-bit signed integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// 64-bit float
    Float(f64),
    /// Timestamp with timezone
    DateTime(DateTime<Utc>),
    /// Homogeneous list
    List(Vec<PropertyValue>),
    /// Nested map (complex property)
    Map(HashMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Name of this value's kind, for validation messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::Int(_) => "int",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Float(_) => "float",
            PropertyValue::DateTime(_) => "datetime",
            PropertyValue::List(_) => "list",
            PropertyValue::Map(_) => "map",
        }
    }

    /// String content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Boolean content, if this is a bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(PropertyValue::from("x").kind_name(), "string");
        assert_eq!(PropertyValue::from(1i64).kind_name(), "int");
        assert_eq!(PropertyValue::List(vec![]).kind_name(), "list");
    }

    #[test]
    fn test_accessors() {
        assert_eq!(PropertyValue::from("hello").as_str(), Some("hello"));
        assert_eq!(PropertyValue::from(42i64).as_int(), Some(42));
        assert_eq!(PropertyValue::from(true).as_bool(), Some(true));
        assert_eq!(PropertyValue::from(42i64).as_str(), None);
    }

    #[test]
    fn test_serde_round_trip() {
        let value = PropertyValue::List(vec![
            PropertyValue::from("a"),
            PropertyValue::from(1i64),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        let back: PropertyValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
