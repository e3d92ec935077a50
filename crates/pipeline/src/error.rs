//! Pipeline Error Types
//!
//! Errors in this module are fatal to a whole batch: they are raised before
//! any item is staged and the batch reports all-zero counters. Failures of a
//! single item are not errors of the batch; see [`item`](crate::item).

use derive_more::{Display, Error};

/// A batch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for batch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The source tree does not resolve to a readable directory.
    #[display("source is not a readable directory")]
    InvalidSource,
    /// The destination tree does not resolve to a readable directory.
    #[display("destination is not a readable directory")]
    InvalidDestination,
    /// Scratch space could not be set up.
    #[display("could not create scratch space")]
    Scratch,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Scratch)
    }
}
