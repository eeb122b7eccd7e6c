//! Untyped Bridge Representation
//!
//! [`Dynamic`] is the generic nested keyed container that containers are
//! mirrored into and read back from. Unlike [`Value`] it keeps every numeric
//! width apart, so a host can hand over data without normalizing it first;
//! [`Dynamic::normalize`] collapses the closed set of numeric kinds into the
//! common representation a container stores.

use crate::value::types::{Complex, Key, Opaque, Value};
use std::collections::HashMap;

/// A generic, untyped nested value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Dynamic {
    #[default]
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Complex64(f32, f32),
    Complex128(Complex),
    Str(String),
    List(Vec<Dynamic>),
    Map(HashMap<Key, Dynamic>),
    Opaque(OpaqueDyn),
}

/// Opaque payload inside a [`Dynamic`], compared by identity.
#[derive(Debug, Clone)]
pub struct OpaqueDyn(pub Opaque);

impl PartialEq for OpaqueDyn {
    fn eq(&self, other: &Self) -> bool {
        Opaque::ptr_eq(&self.0, &other.0)
    }
}

impl Dynamic {
    /// Creates an empty keyed container, the only valid `write_to` target.
    pub fn map() -> Self {
        Dynamic::Map(HashMap::new())
    }

    /// A short name for the variant, used in type mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Dynamic::Null => "null",
            Dynamic::Bool(_) => "bool",
            Dynamic::I8(_) => "i8",
            Dynamic::I16(_) => "i16",
            Dynamic::I32(_) => "i32",
            Dynamic::I64(_) => "i64",
            Dynamic::U8(_) => "u8",
            Dynamic::U16(_) => "u16",
            Dynamic::U32(_) => "u32",
            Dynamic::U64(_) => "u64",
            Dynamic::F32(_) => "f32",
            Dynamic::F64(_) => "f64",
            Dynamic::Complex64(..) => "complex64",
            Dynamic::Complex128(_) => "complex128",
            Dynamic::Str(_) => "string",
            Dynamic::List(_) => "list",
            Dynamic::Map(_) => "map",
            Dynamic::Opaque(_) => "opaque",
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<Key, Dynamic>> {
        match self {
            Dynamic::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up a key when this is a map.
    pub fn get(&self, key: impl Into<Key>) -> Option<&Dynamic> {
        self.as_map().and_then(|m| m.get(&key.into()))
    }

    /// Normalizes a scalar into the common numeric representation.
    ///
    /// Signed widths become [`Value::Int`], unsigned widths [`Value::UInt`],
    /// floats [`Value::Float`] and both complex widths [`Value::Complex`].
    /// Lists and maps are not scalars; callers that need them mirrored
    /// recursively go through [`Container::read_from`](crate::Container::read_from),
    /// and this returns [`Value::Null`] for them.
    pub fn normalize(&self) -> Value {
        match self {
            Dynamic::Null => Value::Null,
            Dynamic::Bool(b) => Value::Bool(*b),
            Dynamic::I8(n) => Value::Int(*n as i64),
            Dynamic::I16(n) => Value::Int(*n as i64),
            Dynamic::I32(n) => Value::Int(*n as i64),
            Dynamic::I64(n) => Value::Int(*n),
            Dynamic::U8(n) => Value::UInt(*n as u64),
            Dynamic::U16(n) => Value::UInt(*n as u64),
            Dynamic::U32(n) => Value::UInt(*n as u64),
            Dynamic::U64(n) => Value::UInt(*n),
            Dynamic::F32(f) => Value::Float(*f as f64),
            Dynamic::F64(f) => Value::Float(*f),
            Dynamic::Complex64(re, im) => Value::Complex(Complex::new(*re as f64, *im as f64)),
            Dynamic::Complex128(c) => Value::Complex(*c),
            Dynamic::Str(s) => Value::Str(s.clone()),
            Dynamic::Opaque(o) => Value::Opaque(o.0.clone()),
            Dynamic::List(_) | Dynamic::Map(_) => Value::Null,
        }
    }
}

impl From<&str> for Dynamic {
    fn from(s: &str) -> Self {
        Dynamic::Str(s.to_string())
    }
}

impl From<String> for Dynamic {
    fn from(s: String) -> Self {
        Dynamic::Str(s)
    }
}

impl From<Opaque> for Dynamic {
    fn from(o: Opaque) -> Self {
        Dynamic::Opaque(OpaqueDyn(o))
    }
}

impl From<Vec<Dynamic>> for Dynamic {
    fn from(items: Vec<Dynamic>) -> Self {
        Dynamic::List(items)
    }
}

impl From<HashMap<Key, Dynamic>> for Dynamic {
    fn from(m: HashMap<Key, Dynamic>) -> Self {
        Dynamic::Map(m)
    }
}

macro_rules! dynamic_from {
    ($($t:ty => $variant:ident),*) => {
        $(impl From<$t> for Dynamic {
            fn from(n: $t) -> Self {
                Dynamic::$variant(n)
            }
        })*
    };
}

dynamic_from!(
    bool => Bool,
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64,
    Complex => Complex128
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_signed_widths() {
        assert_eq!(Dynamic::I8(-8).normalize(), Value::Int(-8));
        assert_eq!(Dynamic::I16(-16).normalize(), Value::Int(-16));
        assert_eq!(Dynamic::I32(-32).normalize(), Value::Int(-32));
        assert_eq!(Dynamic::I64(i64::MIN).normalize(), Value::Int(i64::MIN));
    }

    #[test]
    fn test_normalize_unsigned_widths() {
        assert_eq!(Dynamic::U8(8).normalize(), Value::UInt(8));
        assert_eq!(Dynamic::U32(32).normalize(), Value::UInt(32));
        assert_eq!(Dynamic::U64(u64::MAX).normalize(), Value::UInt(u64::MAX));
    }

    #[test]
    fn test_normalize_float_and_complex() {
        assert_eq!(Dynamic::F32(0.5).normalize(), Value::Float(0.5));
        assert_eq!(
            Dynamic::Complex64(1.0, -2.0).normalize(),
            Value::Complex(Complex::new(1.0, -2.0))
        );
        assert_eq!(Dynamic::Bool(true).normalize(), Value::Bool(true));
    }

    #[test]
    fn test_map_lookup() {
        let mut m = HashMap::new();
        m.insert(Key::from("a"), Dynamic::from(1i32));
        let d = Dynamic::from(m);

        assert_eq!(d.get("a"), Some(&Dynamic::I32(1)));
        assert_eq!(d.get("b"), None);
        assert_eq!(Dynamic::from("x").get("a"), None);
        assert_eq!(Dynamic::List(vec![]).kind_name(), "list");
    }
}
