//! Error types for Weft Core
//!
//! Every variant is a precondition violation: the caller issued an edit
//! against a path, index or row it has not observed. A transaction that
//! returns one of these has emitted nothing.

use crate::ids::ObjectId;
use thiserror::Error;

/// Core error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Broken path at step {step}: {reason}")]
    BrokenPath { step: usize, reason: String },

    #[error("Type mismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Table row not found: {0}")]
    RowNotFound(ObjectId),

    #[error("Counter overflow: {current} + {delta} exceeds the i64 range")]
    CounterOverflow { current: i64, delta: i64 },

    #[error("Object not found in cache: {0}")]
    UnknownObject(ObjectId),
}

impl Error {
    pub(crate) fn broken_path(step: usize, reason: impl Into<String>) -> Self {
        Error::BrokenPath {
            step,
            reason: reason.into(),
        }
    }

    pub(crate) fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Result type alias for Weft Core operations
pub type Result<T> = std::result::Result<T, Error>;
