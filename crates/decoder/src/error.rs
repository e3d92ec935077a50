//! Decoder Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Only constructing a decoder can
//! fail; a decode invocation itself reports nothing but a status code.

use derive_more::{Display, Error};

/// A decoder error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for decoder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// None of the requested programs could be found or executed.
    #[display("decoder program not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// An argument template failed to compile or render.
    #[display("invalid decoder argument template")]
    Template,
    /// No argument template references the staged input file.
    #[display("decoder arguments never reference {{{{ input }}}}")]
    MissingInput,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
