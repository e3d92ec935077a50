//! The decant batch pipeline.
//!
//! Converts encrypted media containers found in a source tree into plain
//! media files in a destination tree:
//!
//! 1. [`scan()`] lists the containers in the source tree.
//! 2. [`plan`](plan::plan) skips every item whose basename already exists in
//!    the destination.
//! 3. For each remaining item, [`BatchRunner`] stages a local copy, hands it
//!    to the [`Decoder`](decant_decoder::Decoder), locates the artifact the
//!    decoder wrote, commits it into the destination, and cleans up scratch
//!    space whatever happened.
//!
//! Progress is reported through a [`ProgressSink`]; the final
//! [`BatchReport`] is returned as well as emitted.

mod batch;
pub mod commit;
pub mod error;
pub mod item;
pub mod locate;
pub mod name;
pub mod plan;
mod progress;
mod report;
pub mod scan;
pub mod stage;

pub use crate::batch::{BatchRunner, DEFAULT_EXTENSION};
pub use crate::plan::Plan;
pub use crate::progress::{BatchEvent, Progress, ProgressSink};
pub use crate::report::{BatchReport, Summary};
pub use crate::scan::{SourceItem, scan};
pub use crate::stage::Scratch;
