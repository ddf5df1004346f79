//! Render-time values
//!
//! Templates are rendered against a [`Record`] of caller data. Values flow
//! through expressions, print directives and calls as [`Value`]s; output that
//! is already known to be safe for some context travels as
//! [`SanitizedContent`] tagged with its [`ContentKind`].

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// What a piece of rendered output is safe to be used as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Html,
    Attributes,
    Js,
    Css,
    Uri,
    Text,
}

impl ContentKind {
    /// All kinds, in declaration order
    pub const ALL: [ContentKind; 6] = [
        ContentKind::Html,
        ContentKind::Attributes,
        ContentKind::Js,
        ContentKind::Css,
        ContentKind::Uri,
        ContentKind::Text,
    ];

    /// The value used for this kind in a `kind="..."` attribute
    pub fn attribute_value(self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Attributes => "attributes",
            ContentKind::Js => "js",
            ContentKind::Css => "css",
            ContentKind::Uri => "uri",
            ContentKind::Text => "text",
        }
    }

    /// Parse a `kind="..."` attribute value
    pub fn from_attribute_value(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.attribute_value() == value)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute_value())
    }
}

/// Rendered text tagged with the context it is safe in
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedContent {
    content: String,
    kind: ContentKind,
}

impl SanitizedContent {
    /// Tag `content` as safe for `kind`; callers vouch for the claim
    pub fn ordain(content: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            content: content.into(),
            kind,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

impl fmt::Display for SanitizedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// A value visible to template expressions
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Record(Record),
    Sanitized(SanitizedContent),
}

impl Value {
    /// Null, false, zero and the empty string are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Sanitized(s) => !s.content().is_empty(),
            Value::List(_) | Value::Record(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Sanitized(_) => "sanitized content",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String form used when a value is printed or concatenated
    pub fn coerce_to_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::Sanitized(s) => f.write_str(s.content()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Record(record) => {
                f.write_str("{")?;
                for (i, (key, value)) in record.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<SanitizedContent> for Value {
    fn from(content: SanitizedContent) -> Self {
        Value::Sanitized(content)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Record(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

/// Errors raised when caller data cannot be used as a record
#[derive(Debug, Error)]
pub enum DataError {
    #[error("template data must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("invalid JSON data: {0}")]
    Json(#[from] serde_json::Error),
}

/// A string-keyed map of values; the shape of template data
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Convert a JSON document into a record; the top level must be an object
    pub fn from_json(json: serde_json::Value) -> Result<Self, DataError> {
        match Value::from(json) {
            Value::Record(record) => Ok(record),
            other => Err(DataError::NotAnObject {
                found: other.type_name(),
            }),
        }
    }

    /// Parse JSON text into a record
    pub fn from_json_str(text: &str) -> Result<Self, DataError> {
        Self::from_json(serde_json::from_str(text)?)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Record(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Record(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }

    #[test]
    fn test_record_from_json() {
        let record = Record::from_json_str(r#"{"name": "Ed", "tags": ["a", 2]}"#).unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("Ed")));
        assert_eq!(
            record.get("tags"),
            Some(&Value::List(vec![Value::from("a"), Value::Int(2)]))
        );
    }

    #[test]
    fn test_record_from_json_rejects_non_object() {
        let err = Record::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, DataError::NotAnObject { found: "list" }));
    }

    #[test]
    fn test_display_list() {
        let value = Value::List(vec![Value::Int(1), Value::from("b"), Value::Null]);
        assert_eq!(value.to_string(), "[1, b, null]");
    }

    #[test]
    fn test_content_kind_attribute_round_trip() {
        for kind in ContentKind::ALL {
            assert_eq!(ContentKind::from_attribute_value(kind.attribute_value()), Some(kind));
        }
        assert_eq!(ContentKind::from_attribute_value("xml"), None);
    }
}
