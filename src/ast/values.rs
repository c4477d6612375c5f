use crate::ast::TypeRef;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// A value bound into the parameter map of a compiled statement.
///
/// Values are structural: equality is used by the token writer to decide
/// whether a `(name, value)` pair can reuse an already-declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// The SQL `NULL`.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float(f64),
    /// An exact numeric value.
    Numeric(BigDecimal),
    /// String value.
    Text(String),
    /// Bytes value.
    Bytes(Vec<u8>),
    /// A datetime value in UTC.
    DateTime(DateTime<Utc>),
    /// An UUID value.
    Uuid(Uuid),
    /// A JSON value.
    Json(serde_json::Value),
    /// An in-memory collection, e.g. the right-hand side of a `Contains`
    /// membership test.
    Array(Vec<Value>),
    /// A captured host object. Member accesses whose chain bottoms out in a
    /// record constant resolve through its fields and bind the reached value
    /// as a parameter.
    Record(Vec<(String, Value)>),
}

impl Value {
    /// `true` if the value is the SQL `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The static type tag a constant of this value carries.
    pub fn type_ref(&self) -> TypeRef {
        match self {
            Value::Null => TypeRef::Unit,
            Value::Boolean(_) => TypeRef::Bool,
            Value::Int32(_) => TypeRef::Int32,
            Value::Int64(_) => TypeRef::Int64,
            Value::Float(_) => TypeRef::Float,
            Value::Numeric(_) => TypeRef::Decimal,
            Value::Text(_) => TypeRef::Text,
            Value::Bytes(_) => TypeRef::Bytes,
            Value::DateTime(_) => TypeRef::DateTime,
            Value::Uuid(_) => TypeRef::Uuid,
            Value::Json(_) => TypeRef::Json,
            Value::Array(items) => {
                let elem = items.first().map(Value::type_ref).unwrap_or(TypeRef::Unit);
                TypeRef::Sequence(Box::new(elem))
            }
            Value::Record(_) => TypeRef::Row,
        }
    }

    /// Field lookup on a record value.
    pub fn record_field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// The value as an integer, if it holds one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Int32(i) => Some(i64::from(*i)),
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as a string slice, if it holds text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Numeric(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "\"{s}\""),
            Value::Bytes(b) => write!(f, "<{} bytes blob>", b.len()),
            Value::DateTime(dt) => write!(f, "{dt}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Json(j) => write!(f, "{j}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<BigDecimal> for Value {
    fn from(d: BigDecimal) -> Self {
        Value::Numeric(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::Json(j)
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_field_lookup() {
        let record = Value::Record(vec![
            ("Status".to_string(), Value::Int32(1)),
            ("Name".to_string(), Value::from("musti")),
        ]);

        assert_eq!(Some(&Value::Int32(1)), record.record_field("Status"));
        assert_eq!(None, record.record_field("Missing"));
    }

    #[test]
    fn array_type_ref_uses_first_element() {
        let value = Value::from(vec![1, 2, 3]);
        assert_eq!(TypeRef::Sequence(Box::new(TypeRef::Int32)), value.type_ref());
    }
}
