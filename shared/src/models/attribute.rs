//! Attribute data model.
//!
//! Attributes are ordered key/value tags attached to data points, spans,
//! events, links, resources and instrumentation scopes. Iteration order is
//! insertion order; keys are expected to be unique within a set.

use serde::{Serialize, Serializer};
use std::fmt;

/// The type tag of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// A boolean.
    Bool,
    /// A 64-bit signed integer.
    Int64,
    /// A 64-bit float.
    Float64,
    /// A UTF-8 string.
    String,
    /// An array of booleans.
    BoolSlice,
    /// An array of 64-bit signed integers.
    Int64Slice,
    /// An array of 64-bit floats.
    Float64Slice,
    /// An array of strings.
    StringSlice,
}

impl ValueType {
    /// Returns the canonical upper-case tag name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Int64 => "INT64",
            Self::Float64 => "FLOAT64",
            Self::String => "STRING",
            Self::BoolSlice => "BOOLSLICE",
            Self::Int64Slice => "INT64SLICE",
            Self::Float64Slice => "FLOAT64SLICE",
            Self::StringSlice => "STRINGSLICE",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// An attribute value in its native type.
///
/// Serializes untagged, so `Value::I64(3)` becomes the JSON number `3`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer value.
    I64(i64),
    /// A 64-bit float value.
    F64(f64),
    /// A string value.
    String(String),
    /// An array of booleans.
    BoolArray(Vec<bool>),
    /// An array of integers.
    I64Array(Vec<i64>),
    /// An array of floats.
    F64Array(Vec<f64>),
    /// An array of strings.
    StringArray(Vec<String>),
}

impl Value {
    /// Returns the type tag for this value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::I64(_) => ValueType::Int64,
            Self::F64(_) => ValueType::Float64,
            Self::String(_) => ValueType::String,
            Self::BoolArray(_) => ValueType::BoolSlice,
            Self::I64Array(_) => ValueType::Int64Slice,
            Self::F64Array(_) => ValueType::Float64Slice,
            Self::StringArray(_) => ValueType::StringSlice,
        }
    }

    /// Renders the value as a string.
    ///
    /// Scalars use their plain textual form (floats in shortest round-trip
    /// form); arrays are rendered as a JSON array.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::I64(i) => i.to_string(),
            Self::F64(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::BoolArray(_) | Self::I64Array(_) | Self::F64Array(_) | Self::StringArray(_) => {
                // Non-finite floats inside an array render as null.
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I64(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Self::BoolArray(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Self::I64Array(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::F64Array(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::StringArray(v)
    }
}

/// A single key/value attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    /// The attribute key.
    pub key: String,
    /// The attribute value.
    pub value: Value,
}

impl KeyValue {
    /// Creates a new attribute.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An ordered set of attributes.
///
/// # Example
///
/// ```
/// use shared::models::AttributeSet;
///
/// let attrs = AttributeSet::new()
///     .with("http.method", "GET")
///     .with("retries", 3_i64);
///
/// let keys: Vec<&str> = attrs.iter().map(|kv| kv.key.as_str()).collect();
/// assert_eq!(keys, ["http.method", "retries"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet(Vec<KeyValue>);

impl AttributeSet {
    /// Creates an empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute, keeping insertion order.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push(KeyValue::new(key, value));
        self
    }

    /// Iterates the attributes in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, KeyValue> {
        self.0.iter()
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the set holds no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up an attribute value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|kv| kv.key == key).map(|kv| &kv.value)
    }
}

impl FromIterator<KeyValue> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<KeyValue>> for AttributeSet {
    fn from(values: Vec<KeyValue>) -> Self {
        Self(values)
    }
}

impl<'a> IntoIterator for &'a AttributeSet {
    type Item = &'a KeyValue;
    type IntoIter = std::slice::Iter<'a, KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
