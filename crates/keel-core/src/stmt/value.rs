use super::{Entity, Record};
use crate::Result;

use std::fmt::Write;

/// A dynamically typed value flowing into or out of the database.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum Value {
    /// Boolean value
    Bool(bool),

    /// Signed 64-bit integer
    I64(i64),

    /// Double precision float
    F64(f64),

    /// String value
    String(String),

    /// Binary value
    Bytes(Vec<u8>),

    /// UUID value
    Uuid(uuid::Uuid),

    /// Structured JSON value. Spatial values are carried as GeoJSON or WKT
    /// depending on the dialect.
    Json(serde_json::Value),

    /// Null value
    #[default]
    Null,

    /// Property map, typically an entity-shaped object or an id map.
    Record(Record),

    /// A list of values
    List(Vec<Value>),

    /// A hydrated entity
    Entity(Box<Entity>),
}

impl Value {
    pub const fn null() -> Self {
        Self::Null
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// True for values shaped like an object: records and entities.
    pub const fn is_object(&self) -> bool {
        matches!(self, Self::Record(_) | Self::Entity(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            Self::String(v) => v.parse().ok(),
            Self::F64(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            Self::Entity(entity) => Some(&entity.record),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_record(self) -> Result<Record> {
        match self {
            Self::Record(record) => Ok(record),
            Self::Entity(entity) => Ok(entity.record),
            _ => crate::bail!("cannot convert value to record; value={self:?}"),
        }
    }

    /// Looks up a property on an object-shaped value.
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.as_record()?.get(property)
    }

    /// Normalized textual form used to compare values across rows.
    ///
    /// Returns `None` for null. Binary values become lowercase hex, structured
    /// values become canonical JSON text with sorted keys, everything else its
    /// plain textual rendering. Integers and their string forms compare equal.
    pub fn to_key_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(v) => Some(v.to_string()),
            Value::I64(v) => Some(v.to_string()),
            Value::F64(v) => Some(v.to_string()),
            Value::String(v) => Some(v.clone()),
            Value::Uuid(v) => Some(v.hyphenated().to_string()),
            Value::Bytes(bytes) => {
                let mut hex = String::with_capacity(bytes.len() * 2);
                for byte in bytes {
                    let _ = write!(hex, "{byte:02x}");
                }
                Some(hex)
            }
            value => Some(canonical_json(&value.to_json())),
        }
    }

    /// Converts to a JSON value. Bytes are rendered as lowercase hex.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Bool(v) => Json::Bool(*v),
            Value::I64(v) => Json::from(*v),
            Value::F64(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(v) => Json::String(v.clone()),
            Value::Uuid(v) => Json::String(v.hyphenated().to_string()),
            Value::Bytes(_) => Json::String(self.to_key_text().unwrap_or_default()),
            Value::Json(v) => v.clone(),
            Value::Record(record) => record.to_json(),
            Value::Entity(entity) => entity.record.to_json(),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

/// Renders JSON with object keys sorted, independent of map ordering.
fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(src: bool) -> Self {
        Self::Bool(src)
    }
}

impl From<i32> for Value {
    fn from(src: i32) -> Self {
        Self::I64(src.into())
    }
}

impl From<i64> for Value {
    fn from(src: i64) -> Self {
        Self::I64(src)
    }
}

impl From<u32> for Value {
    fn from(src: u32) -> Self {
        Self::I64(src.into())
    }
}

impl From<f64> for Value {
    fn from(src: f64) -> Self {
        Self::F64(src)
    }
}

impl From<&str> for Value {
    fn from(src: &str) -> Self {
        Self::String(src.to_string())
    }
}

impl From<String> for Value {
    fn from(src: String) -> Self {
        Self::String(src)
    }
}

impl From<&[u8]> for Value {
    fn from(src: &[u8]) -> Self {
        Self::Bytes(src.to_vec())
    }
}

impl From<uuid::Uuid> for Value {
    fn from(src: uuid::Uuid) -> Self {
        Self::Uuid(src)
    }
}

impl From<serde_json::Value> for Value {
    fn from(src: serde_json::Value) -> Self {
        Self::Json(src)
    }
}

impl From<Record> for Value {
    fn from(src: Record) -> Self {
        Self::Record(src)
    }
}

impl From<Entity> for Value {
    fn from(src: Entity) -> Self {
        Self::Entity(Box::new(src))
    }
}

impl From<Vec<Value>> for Value {
    fn from(src: Vec<Value>) -> Self {
        Self::List(src)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(src: Option<T>) -> Self {
        match src {
            Some(value) => value.into(),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_text_normalizes_binary_to_hex() {
        let value = Value::Bytes(vec![0x00, 0xab, 0x10]);
        assert_eq!(value.to_key_text().as_deref(), Some("00ab10"));
    }

    #[test]
    fn key_text_is_canonical_for_structured_values() {
        let a = Value::Json(serde_json::json!({ "b": 1, "a": [true, null] }));
        let b = Value::Json(serde_json::json!({ "a": [true, null], "b": 1 }));
        assert_eq!(a.to_key_text(), b.to_key_text());
        assert_eq!(a.to_key_text().as_deref(), Some(r#"{"a":[true,null],"b":1}"#));
    }

    #[test]
    fn key_text_treats_integer_and_numeric_string_alike() {
        assert_eq!(Value::I64(7).to_key_text(), Value::from("7").to_key_text());
        assert_eq!(Value::Null.to_key_text(), None);
    }
}
