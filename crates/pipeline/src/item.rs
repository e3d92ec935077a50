//! Per-item failure reasons and outcomes.
//!
//! An item failure is isolated: it is counted, logged with the phase that
//! failed, and the batch moves on to the next item.

use derive_more::{Display, Error};

/// An item error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for single-item operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why an item failed to convert.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source could not be copied into a non-empty scratch file.
    #[display("staging failed")]
    Staging,
    /// The decoder reported a non-zero status.
    #[display("decoder exited with status {_0}")]
    Decode(#[error(not(source))] i32),
    /// No usable artifact was found in scratch after a successful decode.
    #[display("decoded artifact not found")]
    ArtifactNotFound,
    /// The artifact could not be written into the destination.
    #[display("commit to destination failed")]
    Commit,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Staging | Self::Commit)
    }

    /// The step that was running when the item failed.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Staging => Phase::Stage,
            Self::Decode(_) => Phase::Decode,
            Self::ArtifactNotFound => Phase::Locate,
            Self::Commit => Phase::Commit,
        }
    }
}

/// The steps an item passes through, in order. Cleanup always runs last,
/// whichever step the item stopped at.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[display("stage")]
    Stage,
    #[display("decode")]
    Decode,
    #[display("locate")]
    Locate,
    #[display("commit")]
    Commit,
    #[display("cleanup")]
    Cleanup,
}

/// Terminal state of one source item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Written into the destination under `name`.
    Committed { name: String },
    Failed(ErrorKind),
    /// Already present in the destination; never staged.
    Skipped,
}
impl Outcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
