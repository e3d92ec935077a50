use crate::error::{ErrorKind, Result};
use crate::{ArgsTemplate, Decoder};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Status reported when the decoder could not be run to completion at all.
const NOT_RUN: i32 = -1;

/// Runs an external decoder program once per item.
///
/// The program's exit code is the decode status. A program killed by a
/// signal, or one that cannot be spawned, reports `-1`. Standard streams are
/// discarded; the adapter never inspects decoder output.
#[derive(Debug)]
pub struct CommandDecoder {
    program: PathBuf,
    args: ArgsTemplate,
}
impl CommandDecoder {
    /// Use `program` exactly as given, without checking that it exists.
    pub fn new(program: impl Into<PathBuf>, args: ArgsTemplate) -> Self {
        Self { program: program.into(), args }
    }

    /// Resolve `program` (a name searched on `PATH`, or a path to an
    /// executable) before use.
    pub fn locate(program: impl AsRef<Path>, args: ArgsTemplate) -> Result<Self> {
        let program = program.as_ref();
        match which::which(program) {
            Ok(path) => Ok(Self::new(path, args)),
            Err(err) => {
                tracing::debug!(program = %program.display(), error = %err, "Decoder program not executable");
                exn::bail!(ErrorKind::NotFound(program.display().to_string()))
            },
        }
    }

    /// Search `PATH` for the first of `candidates` that exists.
    pub fn discover(candidates: impl IntoIterator<Item = impl AsRef<str>>, args: ArgsTemplate) -> Result<Self> {
        let mut searched = Vec::new();
        for candidate in candidates {
            let candidate = candidate.as_ref();
            if let Ok(path) = which::which(candidate) {
                tracing::debug!(program = %path.display(), "Discovered decoder program");
                return Ok(Self::new(path, args));
            }
            searched.push(candidate.to_string());
        }
        tracing::info!(candidates = ?searched, "No decoder program found in PATH");
        exn::bail!(ErrorKind::NotFound(searched.join(", ")))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Decoder for CommandDecoder {
    fn decode(&self, input: &Path, output_dir: &Path) -> i32 {
        let args = match self.args.render(input, output_dir) {
            Ok(args) => args,
            Err(err) => {
                tracing::error!(input = %input.display(), error = ?err, "Could not render decoder arguments");
                return NOT_RUN;
            },
        };
        tracing::debug!(program = %self.program.display(), ?args, "Invoking decoder");
        let status = Command::new(&self.program)
            .args(&args)
            .current_dir(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) => match status.code() {
                Some(code) => code,
                None => {
                    tracing::warn!(program = %self.program.display(), %status, "Decoder terminated by signal");
                    NOT_RUN
                },
            },
            Err(err) => {
                tracing::error!(program = %self.program.display(), error = %err, "Could not spawn decoder");
                NOT_RUN
            },
        }
    }
}
