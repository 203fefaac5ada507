//! Pool-specific error types.
//!
//! Public operations on [`crate::BlockPool`] signal ordinary failure via
//! return values (`bool`, `Option`, `0`), never via panics. `PoolError` is
//! used on internal seams where `?` propagation keeps the code honest,
//! most notably backing-buffer allocation.

use std::error::Error;
use std::fmt;

/// Errors that can occur inside pool operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// The underlying aligned allocation failed.
    AllocationFailed {
        /// Number of bytes requested.
        bytes: usize,
        /// Alignment requested.
        align: usize,
    },
    /// An operation requiring an initialized pool ran before `initialize()`.
    NotInitialized,
    /// A size/alignment pair that `std::alloc::Layout` rejects.
    InvalidLayout {
        /// Number of bytes requested.
        bytes: usize,
        /// Alignment requested.
        align: usize,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed { bytes, align } => {
                write!(
                    f,
                    "backing buffer allocation failed: {bytes} bytes at {align}-byte alignment"
                )
            }
            Self::NotInitialized => write!(f, "pool is not initialized"),
            Self::InvalidLayout { bytes, align } => {
                write!(f, "invalid buffer layout: {bytes} bytes at {align}-byte alignment")
            }
        }
    }
}

impl Error for PoolError {}
