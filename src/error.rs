//! Error types for dictionary construction and persistence.

use thiserror::Error;

/// Errors raised by mutating and persistence operations.
///
/// Lookups never fail; they report absence through `Option`/`bool`.
#[derive(Debug, Error)]
pub enum Error {
    /// A unit index or arena offset no longer fits the 32-bit index type.
    #[error("capacity exceeded: {what} would need index {requested}")]
    CapacityExceeded { what: &'static str, requested: u64 },

    /// The key contains the reserved terminator byte.
    #[error("key contains the reserved byte 0x00 at position {position}")]
    ReservedByte { position: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
