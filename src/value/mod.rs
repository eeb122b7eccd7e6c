//! Value Model
//!
//! Everything a [`Container`](crate::Container) stores is expressed with the
//! types in this module:
//!
//! - [`Key`]: the closed set of comparable key types
//! - [`Value`]: a tagged variant covering scalars, sequences, nested
//!   containers and opaque host values
//! - [`Dynamic`]: the untyped bridge representation used by
//!   [`Container::write_to`](crate::Container::write_to) and
//!   [`Container::read_from`](crate::Container::read_from)
//!
//! Kind inspection at the serialization boundaries is an exhaustive `match`
//! over these enums, never an open-ended downcast.

pub mod dynamic;
pub mod types;

pub use dynamic::Dynamic;
pub use types::{Complex, Key, Kind, Opaque, Value};
