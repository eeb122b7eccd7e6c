//! Error Types
//!
//! Every fallible operation returns [`Error`]. Nothing is retried internally
//! and nothing panics; failures surface to the immediate caller.

use thiserror::Error;

/// Errors that can occur while converting or arming a container.
#[derive(Debug, Error)]
pub enum Error {
    /// A bridge argument was not a keyed container
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The input was not valid JSON
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The input was valid JSON but not an object at the top level
    #[error("malformed JSON: expected an object, found {found}")]
    NotAnObject { found: &'static str },

    /// A value has no JSON representation
    #[error("cannot encode {kind} value as JSON")]
    Unencodable { kind: String },

    /// A container is reachable from itself
    #[error("container references itself")]
    Cycle,

    /// No runtime was available to drive expiry timers
    #[error("timer runtime unavailable: {0}")]
    Runtime(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
