//! Command-line Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A command-line error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for command-line operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    /// Neither given on the command line nor remembered from a previous run.
    #[display("no {_0} directory given and none remembered")]
    MissingDirectory(#[error(not(source))] &'static str),
    #[display("not a usable directory: {}", _0.display())]
    InvalidDirectory(#[error(not(source))] PathBuf),
    #[display("could not set up the decoder")]
    Decoder,
    #[display("batch failed")]
    Batch,
    #[display("conversion worker stopped unexpectedly")]
    Worker,
}
