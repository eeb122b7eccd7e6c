//! # FlashMap - A Concurrent, Nestable Map with Per-Key TTL
//!
//! FlashMap is an in-memory associative container written in Rust. It keeps
//! keys in insertion order, lets values be further containers (a "map of
//! maps"), expires individual keys after a time-to-live, and converts to and
//! from JSON and an untyped nested representation.
//!
//! ## Features
//!
//! - **Thread-Safe**: Sharded storage with RwLock for concurrent access
//! - **TTL Support**: Keys can expire, with an optional callback receiving the evicted value
//! - **Nested Containers**: Path-based lookup and get-or-create across levels
//! - **JSON**: Order-preserving marshalling and `serde` integration
//! - **Bridge Format**: Mirror into and out of an untyped [`Dynamic`] tree
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashMap                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   codec     │───>│  Container  │<───│   nested    │                  │
//! │  │ JSON/bridge │    │  (storage)  │    │ index/copy  │                  │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘                  │
//! │                            │                                            │
//! │                            ▼                                            │
//! │     ┌──────────────────────────────────────────────┐                    │
//! │     │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │                    │
//! │     │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │                    │
//! │     │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │                    │
//! │     │  └────────┘ └────────┘ └────────┘ └────────┘ │                    │
//! │     └──────────────────────────────────────────────┘                    │
//! │                            ▲                                            │
//! │                            │                                            │
//! │     ┌──────────────────────┴──────────────────────┐                     │
//! │     │        Expiry timers (Tokio tasks)          │                     │
//! │     └─────────────────────────────────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use flashmap::{Container, Value};
//! use std::time::Duration;
//!
//! let m = Container::new();
//! m.set("x", 1);
//! m.set("y", "s");
//! assert_eq!(m.to_string(), r#"{"x":1,"y":"s"}"#);
//!
//! let copy = Container::from_json(&m.marshal_json().unwrap()).unwrap();
//! assert_eq!(copy.get("y"), Some(Value::from("s")));
//!
//! m.set_expired_call("x", Duration::from_secs(30), |evicted| {
//!     println!("x expired with {:?}", evicted);
//! })
//! .unwrap();
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: The container, its expiry timers and nested navigation
//! - [`value`]: Keys, values and the untyped bridge representation
//! - [`codec`]: JSON and bridge conversions
//!
//! ## Design Highlights
//!
//! ### Thread Safety
//!
//! Values are spread over independent shards. The insertion-order list and the
//! timer table share one mutex that is only taken when keys are added or
//! removed. Nested containers have their own locks.
//!
//! ### Timer-Driven Expiry
//!
//! Each key with a TTL owns one Tokio task. When it fires it deletes the key
//! through the same path as an explicit delete, so eviction callbacks run
//! exactly once however the key went away. Outside of a Tokio runtime a small
//! shared background runtime is started on demand.
//!
//! ### Cycles
//!
//! Containers may reference each other freely. Marshalling rejects a container
//! reachable from itself with [`Error::Cycle`].

pub mod codec;
pub mod error;
pub mod storage;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use storage::{Container, ContainerConfig, EvictionCallback, ExpiryConfig};
pub use value::{Complex, Dynamic, Key, Kind, Opaque, Value};

/// Version of FlashMap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
