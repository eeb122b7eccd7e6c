//! Container Storage Module
//!
//! This module provides the core of FlashMap: a thread-safe, sharded,
//! insertion-ordered container with per-key expiry timers and nested
//! container navigation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Container                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...N     │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! │        order list + timer table (Mutex)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ del(key)
//!              ┌─────────────┴─────────────┐
//!              │     TimerHandle (1/key)   │
//!              │      (Tokio task)         │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Sharded Storage**: independent shards reduce lock contention
//! - **Insertion Order**: keys are tracked in the order they were added
//! - **Per-Key TTL**: each key may own one timer that deletes it on expiry
//! - **Eviction Callbacks**: run in the background with the evicted value
//! - **Nesting**: containers stored as values can be traversed by key paths
//!
//! ## Example
//!
//! ```
//! use flashmap::{Container, Value};
//! use std::time::Duration;
//!
//! let m = Container::new();
//!
//! // Basic operations
//! m.set("name", "Ariz");
//! assert_eq!(m.get("name"), Some(Value::from("Ariz")));
//!
//! // Nested containers
//! m.get_new_maps(["session", "user"]).set("id", 42);
//! assert_eq!(m.index(["session", "user", "id"]), Some(Value::Int(42)));
//!
//! // Expire the whole session after an hour
//! m.set_expired("session", Duration::from_secs(3600)).unwrap();
//! ```

pub mod engine;
pub mod expiry;
pub mod nested;

// Re-export commonly used types
pub use engine::{Container, ContainerConfig, DEFAULT_SHARDS};
pub use expiry::{EvictionCallback, ExpiryConfig};
