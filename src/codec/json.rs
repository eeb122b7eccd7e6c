//! JSON Conversion
//!
//! A container marshals to a JSON object whose field names are the `Display`
//! form of its keys, in insertion order. Nested containers become nested
//! objects, sequences become arrays, and scalars map onto JSON scalars.
//! Complex numbers, non-finite floats and opaque values have no JSON form and
//! make marshalling fail.
//!
//! Unmarshalling accepts only a top-level object. Nested objects become new
//! containers sharing the receiver's configuration, arrays become sequences.
//! Integral JSON numbers are read as [`Value::Int`] (or [`Value::UInt`] above
//! `i64::MAX`), all others as [`Value::Float`].
//!
//! Because both directions preserve key order, marshalling a container,
//! unmarshalling the bytes and marshalling again yields identical bytes.

use crate::codec::Ancestry;
use crate::error::{Error, Result};
use crate::storage::Container;
use crate::value::Value;
use bytes::Bytes;
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

impl Container {
    /// Marshals the container into JSON bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::Unencodable`] if a value has no JSON representation
    /// - [`Error::Cycle`] if the container is reachable from itself
    pub fn marshal_json(&self) -> Result<Bytes> {
        let tree = self.to_json()?;
        Ok(Bytes::from(serde_json::to_vec(&tree)?))
    }

    /// Converts the container into a `serde_json` object tree.
    pub fn to_json(&self) -> Result<JsonValue> {
        self.object_to_json(&mut Ancestry::default())
    }

    fn object_to_json(&self, path: &mut Ancestry) -> Result<JsonValue> {
        path.enter(self)?;

        let entries = self.entries();
        let mut object = Map::with_capacity(entries.len());
        for (key, value) in &entries {
            object.insert(key.to_string(), value_to_json(value, path)?);
        }

        path.leave();
        Ok(JsonValue::Object(object))
    }

    /// Unmarshals a JSON object into the container via [`Container::set`].
    ///
    /// Existing keys not mentioned in the input are kept.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the input is not valid JSON
    /// - [`Error::NotAnObject`] if the top-level value is not an object
    pub fn unmarshal_json(&self, data: &[u8]) -> Result<()> {
        let parsed: JsonValue = serde_json::from_slice(data)?;
        match parsed {
            JsonValue::Object(object) => {
                self.load_json_object(object);
                Ok(())
            }
            other => Err(Error::NotAnObject {
                found: json_kind(&other),
            }),
        }
    }

    /// Creates a container from JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Container> {
        let container = Container::new();
        container.unmarshal_json(data)?;
        Ok(container)
    }

    fn load_json_object(&self, object: Map<String, JsonValue>) {
        for (key, value) in object {
            let value = self.json_to_value(value);
            self.set(key, value);
        }
    }

    fn json_to_value(&self, value: JsonValue) -> Value {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => number_to_value(&n),
            JsonValue::String(s) => Value::Str(s),
            JsonValue::Array(items) => {
                Value::Seq(items.into_iter().map(|v| self.json_to_value(v)).collect())
            }
            JsonValue::Object(object) => {
                let child = self.child();
                child.load_json_object(object);
                Value::Map(child)
            }
        }
    }
}

fn number_to_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else if let Some(u) = n.as_u64() {
        Value::UInt(u)
    } else {
        Value::Float(n.as_f64().unwrap_or_default())
    }
}

fn value_to_json(value: &Value, path: &mut Ancestry) -> Result<JsonValue> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(n) => JsonValue::from(*n),
        Value::UInt(n) => JsonValue::from(*n),
        Value::Float(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or_else(|| Error::Unencodable {
                kind: format!("non-finite float ({})", f),
            })?,
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::Seq(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| value_to_json(item, path))
                .collect::<Result<_>>()?,
        ),
        Value::Map(child) => child.object_to_json(path)?,
        Value::Complex(_) => {
            return Err(Error::Unencodable {
                kind: "complex".to_string(),
            })
        }
        Value::Opaque(o) => {
            return Err(Error::Unencodable {
                kind: o.type_name().to_string(),
            })
        }
    })
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Renders the container as JSON, or `{}` when it is empty or cannot be
/// marshalled.
impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        match self.marshal_json() {
            Ok(bytes) => f.write_str(&String::from_utf8_lossy(&bytes)),
            Err(_) => f.write_str("{}"),
        }
    }
}

impl FromStr for Container {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Container::from_json(s.as_bytes())
    }
}

impl Serialize for Container {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        value_to_json(self, &mut Ancestry::default())
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Container {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match JsonValue::deserialize(deserializer)? {
            JsonValue::Object(object) => {
                let container = Container::new();
                container.load_json_object(object);
                Ok(container)
            }
            other => Err(D::Error::custom(Error::NotAnObject {
                found: json_kind(&other),
            })),
        }
    }
}
