//! Remembered source and destination directories.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LAST_USED_FILE: &str = "last-used.json";

/// The directories chosen on the previous run.
///
/// Stored as JSON in the user's data directory. Entries are re-validated on
/// [`load()`](Self::load): a directory that no longer exists (or is no
/// longer a directory) is forgotten rather than offered back.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastUsed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination: Option<PathBuf>,
}
impl LastUsed {
    /// `<data_dir>/last-used.json` for the current user.
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::project_dirs()?.data_dir().join(LAST_USED_FILE))
    }

    /// Read the store at `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err).or_raise(|| ErrorKind::Io),
        };
        let mut stored: Self = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Parse)?;
        stored.source = revalidate("source", stored.source);
        stored.destination = revalidate("destination", stored.destination);
        Ok(stored)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Io)?;
        }
        let json = serde_json::to_vec_pretty(self).or_raise(|| ErrorKind::Parse)?;
        std::fs::write(path, json).or_raise(|| ErrorKind::Io)?;
        tracing::debug!(path = %path.display(), "Saved last used directories");
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn remember(&mut self, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) {
        self.source = Some(source.into());
        self.destination = Some(destination.into());
    }
}

fn revalidate(role: &str, dir: Option<PathBuf>) -> Option<PathBuf> {
    let dir = dir?;
    match dir.is_dir() {
        true => Some(dir),
        false => {
            tracing::warn!(role, path = %dir.display(), "Forgetting last used directory that is no longer available");
            None
        },
    }
}
