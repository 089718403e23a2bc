//! Value model: literals supplied by callers and the slots containers hold

use crate::ids::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A scalar JSON-like value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Primitive {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Primitive::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Equality that treats a NaN number as equal to itself
    pub fn same_as(&self, other: &Primitive) -> bool {
        match (self, other) {
            (Primitive::Number(a), Primitive::Number(b)) => a == b || a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    /// True for a string holding exactly one character (a text element)
    pub fn is_char(&self) -> bool {
        match self {
            Primitive::String(s) => s.chars().count() == 1,
            _ => false,
        }
    }
}

impl From<bool> for Primitive {
    fn from(v: bool) -> Self {
        Primitive::Bool(v)
    }
}

impl From<f64> for Primitive {
    fn from(v: f64) -> Self {
        Primitive::Number(v)
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Primitive::String(v.to_string())
    }
}

impl From<String> for Primitive {
    fn from(v: String) -> Self {
        Primitive::String(v)
    }
}

/// Interpretation tag attached to a numeric op or patch value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Counter,
    Timestamp,
}

/// Kind of a container object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Map,
    List,
    Text,
    Table,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Map => write!(f, "map"),
            ObjectType::List => write!(f, "list"),
            ObjectType::Text => write!(f, "text"),
            ObjectType::Table => write!(f, "table"),
        }
    }
}

/// A value tree supplied by a caller for assignment or insertion
///
/// Composite variants carry their contents only; object ids are allocated
/// when the value is written into the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Primitive(Primitive),
    Date(SystemTime),
    Counter(i64),
    Map(BTreeMap<String, Value>),
    List(Vec<Value>),
    Text(String),
    /// Table literal; each row is expected to be a `Value::Map`
    Table(Vec<Value>),
}

impl Value {
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn empty_table() -> Self {
        Value::Table(Vec::new())
    }

    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Value::Map(_) | Value::List(_) | Value::Text(_) | Value::Table(_)
        )
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Value::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// Structural equality used for no-op detection; NaN numbers compare equal
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Primitive(a), Value::Primitive(b)) => a.same_as(b),
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((ka, va), (kb, vb))| ka == kb && va.same_as(vb))
            }
            (Value::List(a), Value::List(b)) | (Value::Table(a), Value::Table(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            _ => self == other,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Primitive(Primitive::Null) => "null",
            Value::Primitive(Primitive::Bool(_)) => "bool",
            Value::Primitive(Primitive::Number(_)) => "number",
            Value::Primitive(Primitive::String(_)) => "string",
            Value::Date(_) => "date",
            Value::Counter(_) => "counter",
            Value::Map(_) => "map",
            Value::List(_) => "list",
            Value::Text(_) => "text",
            Value::Table(_) => "table",
        }
    }
}

impl From<Primitive> for Value {
    fn from(v: Primitive) -> Self {
        Value::Primitive(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Primitive(Primitive::Bool(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Primitive(Primitive::Number(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Primitive(Primitive::String(v.to_string()))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Primitive(Primitive::String(v))
    }
}

impl From<SystemTime> for Value {
    fn from(v: SystemTime) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// What a container slot (or one conflict entry of it) holds
///
/// Nested containers are stored by reference; the referenced object lives
/// in the cache under its own id.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Primitive(Primitive),
    Date(SystemTime),
    Counter(i64),
    Object(ObjectId),
}

impl Cell {
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Cell::Object(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_counter(&self) -> Option<i64> {
        match self {
            Cell::Counter(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Primitive(_) => "primitive",
            Cell::Date(_) => "date",
            Cell::Counter(_) => "counter",
            Cell::Object(_) => "object",
        }
    }
}

impl From<Primitive> for Cell {
    fn from(v: Primitive) -> Self {
        Cell::Primitive(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Primitive(Primitive::Number(v))
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Primitive(Primitive::String(v.to_string()))
    }
}

impl From<&ObjectId> for Cell {
    fn from(v: &ObjectId) -> Self {
        Cell::Object(v.clone())
    }
}

/// Seconds since the Unix epoch, negative before it
pub fn timestamp_seconds(t: SystemTime) -> f64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Inverse of [`timestamp_seconds`]; `None` for non-finite or unrepresentable input
pub fn from_timestamp_seconds(secs: f64) -> Option<SystemTime> {
    let magnitude = Duration::try_from_secs_f64(secs.abs()).ok()?;
    if secs >= 0.0 {
        UNIX_EPOCH.checked_add(magnitude)
    } else {
        UNIX_EPOCH.checked_sub(magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_roundtrip() {
        let t = UNIX_EPOCH + Duration::from_secs(1_587_000_000);
        assert_eq!(timestamp_seconds(t), 1_587_000_000.0);
        assert_eq!(from_timestamp_seconds(1_587_000_000.0), Some(t));
    }

    #[test]
    fn test_timestamp_before_epoch() {
        let t = UNIX_EPOCH - Duration::from_secs(60);
        assert_eq!(timestamp_seconds(t), -60.0);
        assert_eq!(from_timestamp_seconds(-60.0), Some(t));
        assert_eq!(from_timestamp_seconds(f64::NAN), None);
    }

    #[test]
    fn test_is_char() {
        assert!(Primitive::from("h").is_char());
        assert!(Primitive::from("é").is_char());
        assert!(!Primitive::from("hi").is_char());
        assert!(!Primitive::Number(1.0).is_char());
    }

    #[test]
    fn test_value_from_vec() {
        let v: Value = vec!["sparrow", "goldfinch"].into();
        assert_eq!(
            v,
            Value::List(vec![Value::from("sparrow"), Value::from("goldfinch")])
        );
        assert!(v.is_composite());
    }

    #[test]
    fn test_primitive_json_shape() {
        assert_eq!(serde_json::to_string(&Primitive::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Primitive::from(5.0)).unwrap(), "5.0");
        assert_eq!(serde_json::to_string(&ObjectType::Table).unwrap(), "\"table\"");
    }

    #[test]
    fn test_same_as_treats_nan_as_equal() {
        assert!(Value::from(f64::NAN).same_as(&Value::from(f64::NAN)));
        assert!(Value::from(0.0).same_as(&Value::from(-0.0)));
        assert!(!Value::from(f64::NAN).same_as(&Value::from(1.0)));
        let nested = Value::map([("wingspan", Value::List(vec![Value::from(f64::NAN)]))]);
        assert!(nested.same_as(&nested.clone()));
        assert!(!nested.same_as(&Value::map([("wingspan", Value::List(Vec::new()))])));
        assert!(Value::text("hi").same_as(&Value::text("hi")));
    }
}
