//! Dynamic Bridge
//!
//! Mirrors a container into a [`Dynamic`] map and back. Outbound, nested
//! containers become nested maps and sequences become lists, element by
//! element. Inbound, maps become containers and every scalar is normalized
//! through [`Dynamic::normalize`].

use crate::codec::Ancestry;
use crate::error::{Error, Result};
use crate::storage::Container;
use crate::value::dynamic::OpaqueDyn;
use crate::value::{Dynamic, Key, Value};
use std::collections::HashMap;

impl Container {
    /// Writes every entry into `target`, which must be a [`Dynamic::Map`].
    ///
    /// Existing entries of `target` with other keys are kept.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if `target` is not a map
    /// - [`Error::Cycle`] if the container is reachable from itself; `target`
    ///   may then hold a partial copy
    pub fn write_to(&self, target: &mut Dynamic) -> Result<()> {
        match target {
            Dynamic::Map(map) => self.write_entries(map, &mut Ancestry::default()),
            other => Err(Error::TypeMismatch {
                expected: "map",
                found: other.kind_name(),
            }),
        }
    }

    /// Mirrors the container into a new [`Dynamic::Map`].
    pub fn to_dynamic(&self) -> Result<Dynamic> {
        let mut target = Dynamic::map();
        self.write_to(&mut target)?;
        Ok(target)
    }

    fn write_entries(&self, map: &mut HashMap<Key, Dynamic>, path: &mut Ancestry) -> Result<()> {
        path.enter(self)?;
        for (key, value) in self.entries() {
            map.insert(key, value_to_dynamic(&value, path)?);
        }
        path.leave();
        Ok(())
    }

    /// Reads every entry of `source`, which must be a [`Dynamic::Map`], into
    /// the container via [`Container::set`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `source` is not a map.
    pub fn read_from(&self, source: &Dynamic) -> Result<()> {
        match source {
            Dynamic::Map(map) => {
                self.read_entries(map);
                Ok(())
            }
            other => Err(Error::TypeMismatch {
                expected: "map",
                found: other.kind_name(),
            }),
        }
    }

    fn read_entries(&self, map: &HashMap<Key, Dynamic>) {
        for (key, value) in map {
            self.set(key, self.dynamic_to_value(value));
        }
    }

    fn dynamic_to_value(&self, value: &Dynamic) -> Value {
        match value {
            Dynamic::Map(map) => {
                let child = self.child();
                child.read_entries(map);
                Value::Map(child)
            }
            Dynamic::List(items) => {
                Value::Seq(items.iter().map(|v| self.dynamic_to_value(v)).collect())
            }
            scalar => scalar.normalize(),
        }
    }
}

fn value_to_dynamic(value: &Value, path: &mut Ancestry) -> Result<Dynamic> {
    Ok(match value {
        Value::Null => Dynamic::Null,
        Value::Bool(b) => Dynamic::Bool(*b),
        Value::Int(n) => Dynamic::I64(*n),
        Value::UInt(n) => Dynamic::U64(*n),
        Value::Float(f) => Dynamic::F64(*f),
        Value::Complex(c) => Dynamic::Complex128(*c),
        Value::Str(s) => Dynamic::Str(s.clone()),
        Value::Seq(items) => Dynamic::List(
            items
                .iter()
                .map(|item| value_to_dynamic(item, path))
                .collect::<Result<_>>()?,
        ),
        Value::Map(child) => {
            let mut map = HashMap::with_capacity(child.len());
            child.write_entries(&mut map, path)?;
            Dynamic::Map(map)
        }
        Value::Opaque(o) => Dynamic::Opaque(OpaqueDyn(o.clone())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Complex, Opaque};

    fn sample() -> Container {
        let a2 = Container::new();
        a2.set("a3", "A3");
        a2.set("a3-1", Value::Null);
        a2.new_map("a3-2");

        let a1 = Container::new();
        a1.set("a2", &a2);

        let m = Container::new();
        m.set("a1", &a1);
        m.set("a3", vec![a1.clone(), a2.clone()]);
        m.set("n", -4);
        m
    }

    #[test]
    fn test_write_to_mirrors_structure() -> anyhow::Result<()> {
        let mut target = Dynamic::map();
        sample().write_to(&mut target)?;

        let a3 = target.get("a1").and_then(|d| d.get("a2")).and_then(|d| d.get("a3"));
        assert_eq!(a3, Some(&Dynamic::from("A3")));
        assert_eq!(target.get("n"), Some(&Dynamic::I64(-4)));

        match target.get("a3") {
            Some(Dynamic::List(items)) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0], Dynamic::Map(_)));
                assert_eq!(items[1].get("a3"), Some(&Dynamic::from("A3")));
            }
            other => panic!("expected list, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_write_to_rejects_non_map() {
        let mut target = Dynamic::List(vec![]);
        let err = sample().write_to(&mut target).unwrap_err();

        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: "map",
                found: "list"
            }
        ));
    }

    #[test]
    fn test_read_from_rejects_non_map() {
        let m = Container::new();
        assert!(matches!(
            m.read_from(&Dynamic::from("nope")),
            Err(Error::TypeMismatch { found: "string", .. })
        ));
        assert!(m.is_empty());
    }

    #[test]
    fn test_write_then_read_back() -> anyhow::Result<()> {
        let original = sample();
        let bridged = original.to_dynamic()?;

        original.reset();
        original.read_from(&bridged)?;

        assert_eq!(original.index(["a1", "a2", "a3"]), Some(Value::from("A3")));
        assert_eq!(original.index(["a1", "a2", "a3-1"]), Some(Value::Null));
        assert_eq!(original.get("n"), Some(Value::Int(-4)));

        let seq = original.get("a3").unwrap();
        let seq = seq.as_seq().unwrap();
        assert_eq!(
            seq[1].as_container().unwrap().get("a3"),
            Some(Value::from("A3"))
        );
        Ok(())
    }

    #[test]
    fn test_read_from_normalizes_numbers() -> anyhow::Result<()> {
        let mut inner = HashMap::new();
        inner.insert(Key::from("u16"), Dynamic::U16(16));
        inner.insert(Key::from("f32"), Dynamic::F32(0.25));

        let mut source = HashMap::new();
        source.insert(Key::from("i8"), Dynamic::I8(-8));
        source.insert(Key::from("c64"), Dynamic::Complex64(1.0, 1.0));
        source.insert(Key::from(7u32), Dynamic::Bool(true));
        source.insert(
            Key::from("list"),
            Dynamic::List(vec![Dynamic::I32(1), Dynamic::List(vec![Dynamic::U8(2)])]),
        );
        source.insert(Key::from("inner"), Dynamic::from(inner));

        let m = Container::new();
        m.read_from(&Dynamic::from(source))?;

        assert_eq!(m.get("i8"), Some(Value::Int(-8)));
        assert_eq!(m.get("c64"), Some(Value::Complex(Complex::new(1.0, 1.0))));
        assert_eq!(m.get(7u32), Some(Value::Bool(true)));
        assert_eq!(
            m.get("list"),
            Some(Value::Seq(vec![Value::Int(1), Value::Seq(vec![Value::UInt(2)])]))
        );
        assert_eq!(m.index(["inner", "u16"]), Some(Value::UInt(16)));
        assert_eq!(m.index(["inner", "f32"]), Some(Value::Float(0.25)));
        Ok(())
    }

    #[test]
    fn test_opaque_passes_through_by_reference() -> anyhow::Result<()> {
        let handle = Opaque::new(String::from("payload"));
        let m = Container::new();
        m.set("o", handle.clone());

        let restored = Container::new();
        restored.read_from(&m.to_dynamic()?)?;

        let value = restored.get("o").unwrap();
        assert!(Opaque::ptr_eq(value.as_opaque().unwrap(), &handle));
        Ok(())
    }

    #[test]
    fn test_write_to_detects_cycles() {
        let m = Container::new();
        m.new_map("child").set("loop", &m);

        assert!(matches!(m.to_dynamic(), Err(Error::Cycle)));
        m.del("child");
    }
}
