//! Nested Containers
//!
//! Path-based lookup and get-or-create across chains of containers stored as
//! values, plus deep merging of one container into another.
//!
//! Each step of a traversal locks only the container it is visiting, so a
//! multi-level lookup is not atomic across levels.

use crate::storage::engine::Container;
use crate::value::{Key, Value};
use tracing::warn;

impl Container {
    /// Stores a fresh empty container at `key`, replacing any previous value,
    /// and returns it.
    ///
    /// Use [`Container::get_new_map`] to keep an existing child.
    pub fn new_map(&self, key: impl Into<Key>) -> Container {
        let child = self.child();
        self.set(key, child.clone());
        child
    }

    /// Returns the container stored at `key`, creating it if the key is absent
    /// or holds something other than a container.
    pub fn get_new_map(&self, key: impl Into<Key>) -> Container {
        self.upsert(key.into(), |current| match current {
            Some(Value::Map(existing)) => (None, existing.clone()),
            _ => {
                let child = self.child();
                (Some(Value::Map(child.clone())), child)
            }
        })
    }

    /// Chained [`Container::get_new_map`]: each key is resolved inside the
    /// container returned for the previous one.
    ///
    /// An empty key list returns this container.
    ///
    /// ```
    /// use flashmap::{Container, Value};
    ///
    /// let m = Container::new();
    /// m.get_new_maps(["a", "b", "c"]).set("d", 1);
    ///
    /// assert_eq!(m.index(["a", "b", "c", "d"]), Some(Value::Int(1)));
    /// ```
    pub fn get_new_maps<I>(&self, keys: I) -> Container
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        keys.into_iter()
            .fold(self.clone(), |current, key| current.get_new_map(key))
    }

    /// Looks up a value through nested containers, discarding presence.
    pub fn index<I>(&self, keys: I) -> Option<Value>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let (value, found) = self.index_has(keys);
        found.then_some(value)
    }

    /// Looks up a value through nested containers.
    ///
    /// Every key but the last must resolve to a container. Returns
    /// `(Value::Null, false)` for an empty key list, a missing key at any
    /// level, or a non-container intermediate value.
    pub fn index_has<I>(&self, keys: I) -> (Value, bool)
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let mut keys = keys.into_iter().peekable();
        let mut current = self.clone();

        while let Some(key) = keys.next() {
            let Some(value) = current.get(key) else {
                break;
            };
            if keys.peek().is_none() {
                return (value, true);
            }
            match value {
                Value::Map(next) => current = next,
                _ => break,
            }
        }

        (Value::Null, false)
    }

    /// Deep-merges `source` into this container.
    ///
    /// Child containers are merged recursively into the matching child here,
    /// which is created when missing. With `overwrite`, scalars replace
    /// existing values and a non-container value in the way of a child
    /// container is replaced; without it, existing values are left untouched
    /// and only absent keys are added. The same flag applies at every depth.
    ///
    /// Sequences are copied as values; containers inside them stay shared.
    pub fn copy_from(&self, source: &Container, overwrite: bool) {
        let mut path = vec![source.id()];
        self.merge(source, overwrite, &mut path);
    }

    fn merge(&self, source: &Container, overwrite: bool, path: &mut Vec<usize>) {
        for (key, value) in source.entries() {
            match value {
                Value::Map(child) => {
                    if path.contains(&child.id()) {
                        warn!(key = %key, "Skipping cyclic container during copy");
                        continue;
                    }

                    let target = self.upsert(key, |current| match current {
                        Some(Value::Map(existing)) => (None, Some(existing.clone())),
                        Some(_) if !overwrite => (None, None),
                        _ => {
                            let fresh = self.child();
                            (Some(Value::Map(fresh.clone())), Some(fresh))
                        }
                    });

                    if let Some(target) = target {
                        path.push(child.id());
                        target.merge(&child, overwrite, path);
                        path.pop();
                    }
                }
                scalar if overwrite => {
                    self.set(key, scalar);
                }
                scalar => {
                    self.upsert(key, |current| (current.is_none().then_some(scalar), ()));
                }
            }
        }
    }
}
