//! Decoder adapter.
//!
//! The decoder is an opaque, blocking transform: given a staged container
//! file and an output directory it (hopefully) writes one plain media file
//! into that directory and reports a bare status code, `0` meaning success.
//! Nothing else crosses the boundary.
//!
//! ```
//! use decant_decoder::Decoder;
//! use std::path::Path;
//!
//! // Closures are decoders too, which keeps tests free of real programs.
//! let always_fails = |_input: &Path, _output_dir: &Path| 1;
//! assert_eq!(always_fails.decode(Path::new("a.ncm"), Path::new(".")), 1);
//! ```

mod args;
mod command;
pub mod error;

pub use crate::args::ArgsTemplate;
pub use crate::command::CommandDecoder;
use std::path::Path;

/// The external transform contract: `decode(input, output_dir) -> status`.
///
/// Implementations block; callers run them off the async runtime.
pub trait Decoder: Send + Sync {
    fn decode(&self, input: &Path, output_dir: &Path) -> i32;
}

impl<F> Decoder for F
where
    F: Fn(&Path, &Path) -> i32 + Send + Sync,
{
    fn decode(&self, input: &Path, output_dir: &Path) -> i32 {
        self(input, output_dir)
    }
}
