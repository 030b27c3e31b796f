//! Attribute codec.
//!
//! Two output forms for an ordered attribute set:
//!
//! - [`flatten`] yields `(key, string)` pairs for the `metric_attributes`
//!   table. Every value is rendered to its string form, which loses the type.
//! - [`structure`] yields [`AttributeNode`]s that keep the type tag and the
//!   native value, used by span snapshots.
//!
//! Neither form drops or deduplicates attributes; order follows the input.

use crate::models::{KeyValue, Value, ValueType};
use serde::Serialize;

/// A flattened attribute ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatAttribute<'a> {
    /// Attribute key, borrowed from the source set.
    pub key: &'a str,
    /// Rendered value.
    pub value: String,
}

/// Flattens attributes into key/string-value pairs.
pub fn flatten<'a, I>(attributes: I) -> impl Iterator<Item = FlatAttribute<'a>>
where
    I: IntoIterator<Item = &'a KeyValue>,
{
    attributes.into_iter().map(|kv| FlatAttribute {
        key: kv.key.as_str(),
        value: kv.value.render(),
    })
}

/// A value together with its type tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedValue {
    /// The type tag, e.g. `INT64`.
    #[serde(rename = "Type")]
    pub value_type: ValueType,
    /// The native value.
    #[serde(rename = "Value")]
    pub value: Value,
}

/// A structured attribute node: `{"Key": .., "Value": {"Type": .., "Value": ..}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeNode {
    /// Attribute key.
    pub key: String,
    /// Typed value.
    pub value: TypedValue,
}

impl From<&KeyValue> for AttributeNode {
    fn from(kv: &KeyValue) -> Self {
        Self {
            key: kv.key.clone(),
            value: TypedValue {
                value_type: kv.value.value_type(),
                value: kv.value.clone(),
            },
        }
    }
}

/// Maps attributes into structured nodes.
pub fn structure<'a, I>(attributes: I) -> Vec<AttributeNode>
where
    I: IntoIterator<Item = &'a KeyValue>,
{
    attributes.into_iter().map(AttributeNode::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeSet;
    use serde_json::json;

    fn sample() -> AttributeSet {
        AttributeSet::new()
            .with("service", "checkout")
            .with("retries", 3_i64)
            .with("ratio", 0.25)
            .with("cached", true)
            .with("ports", vec![80_i64, 443])
    }

    #[test]
    fn test_flatten_renders_strings_in_order() {
        let attrs = sample();
        let flat: Vec<(&str, String)> = flatten(&attrs).map(|a| (a.key, a.value)).collect();

        assert_eq!(
            flat,
            vec![
                ("service", "checkout".to_string()),
                ("retries", "3".to_string()),
                ("ratio", "0.25".to_string()),
                ("cached", "true".to_string()),
                ("ports", "[80,443]".to_string()),
            ]
        );
    }

    #[test]
    fn test_structure_keeps_type_and_native_value() {
        let attrs = AttributeSet::new().with("retries", 3_i64);
        let nodes = structure(&attrs);

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].value.value_type, ValueType::Int64);
        assert_eq!(nodes[0].value.value, Value::I64(3));

        let json = serde_json::to_value(&nodes).unwrap();
        assert_eq!(
            json,
            json!([{"Key": "retries", "Value": {"Type": "INT64", "Value": 3}}])
        );
    }

    #[test]
    fn test_structure_preserves_every_attribute() {
        let attrs = sample();
        let nodes = structure(&attrs);
        let keys: Vec<&str> = nodes.iter().map(|n| n.key.as_str()).collect();

        assert_eq!(keys, ["service", "retries", "ratio", "cached", "ports"]);
        assert_eq!(nodes[4].value.value_type, ValueType::Int64Slice);
    }

    #[test]
    fn test_empty_set() {
        let attrs = AttributeSet::new();
        assert_eq!(flatten(&attrs).count(), 0);
        assert!(structure(&attrs).is_empty());
    }
}
