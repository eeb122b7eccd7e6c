//! Serialization Bridge
//!
//! Converts containers (and any containers or sequences nested in them) to and
//! from external representations:
//!
//! - [`json`]: JSON text, plus `serde` integration
//! - [`bridge`]: the untyped [`Dynamic`](crate::Dynamic) tree
//!
//! Both directions walk the same [`Value`](crate::Value) kinds with an explicit
//! `match`. Outbound walks track the chain of enclosing containers so that a
//! container reachable from itself fails with [`Error::Cycle`] instead of
//! recursing forever.

pub mod bridge;
pub mod json;

use crate::error::{Error, Result};
use crate::storage::Container;

/// The containers enclosing the one currently being walked.
#[derive(Debug, Default)]
pub(crate) struct Ancestry(Vec<usize>);

impl Ancestry {
    pub(crate) fn enter(&mut self, container: &Container) -> Result<()> {
        let id = container.id();
        if self.0.contains(&id) {
            return Err(Error::Cycle);
        }
        self.0.push(id);
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.0.pop();
    }
}
