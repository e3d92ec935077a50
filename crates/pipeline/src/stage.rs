//! Scratch space and staging.
//!
//! The decoder only understands local files, so each source item is copied
//! into scratch space before it is decoded. Scratch is touched by a single
//! worker only; nothing in it outlives the item that created it.

use crate::error::{ErrorKind as BatchErrorKind, Result as BatchResult};
use crate::item::{ErrorKind, Result};
use crate::scan::SourceItem;
use decant_storage::BackendHandle;
use exn::ResultExt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::instrument;

/// The pipeline's private scratch directory.
///
/// Always a fresh directory owned by the pipeline: staging and cleanup
/// delete files in it by name, so it must never be shared with anything
/// else. It is removed, with anything left in it, on drop.
#[derive(Debug)]
pub struct Scratch {
    dir: PathBuf,
    _temporary: TempDir,
}
impl Scratch {
    /// A private directory created inside `parent`, which is created first
    /// if needed. Nothing already in `parent` is ever touched.
    pub fn at(parent: impl AsRef<Path>) -> BatchResult<Self> {
        let parent = parent.as_ref();
        fs::create_dir_all(parent).or_raise(|| BatchErrorKind::Scratch)?;
        Self::owned(tempfile::Builder::new().prefix("decant-").tempdir_in(parent))
    }

    /// A private directory inside the system temporary directory.
    pub fn temporary() -> BatchResult<Self> {
        Self::owned(tempfile::Builder::new().prefix("decant-").tempdir())
    }

    fn owned(created: io::Result<TempDir>) -> BatchResult<Self> {
        let temporary = created.or_raise(|| BatchErrorKind::Scratch)?;
        tracing::debug!(path = %temporary.path().display(), "Created scratch directory");
        Ok(Self { dir: temporary.path().to_path_buf(), _temporary: temporary })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

/// A local copy of exactly one source item.
///
/// Named `<basename>.<original extension>` inside scratch space.
#[derive(Debug)]
pub struct StagingSlot {
    path: PathBuf,
}
impl StagingSlot {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Copy `item` from the source tree into scratch space.
///
/// A stale file of the same name is replaced. The copy must end up non-empty;
/// on any failure the partial file is removed before returning
/// [`Staging`](ErrorKind::Staging).
#[instrument(skip_all, fields(item = item.name()))]
pub async fn stage(source: &BackendHandle, item: &SourceItem, scratch: &Scratch) -> Result<StagingSlot> {
    let name = match item.extension() {
        Some(ext) => format!("{}.{ext}", item.basename()),
        None => item.basename().to_string(),
    };
    let path = scratch.path().join(name);
    let dir = scratch.path().to_path_buf();
    let reader = source.reader(item.handle()).await.or_raise(|| ErrorKind::Staging)?;

    let target = path.clone();
    let staged = tokio::task::spawn_blocking(move || -> Result<u64> {
        fs::create_dir_all(&dir).or_raise(|| ErrorKind::Staging)?;
        match fs::remove_file(&target) {
            Ok(()) => tracing::debug!(path = %target.display(), "Removed stale staging file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {},
            Err(err) => return Err(err).or_raise(|| ErrorKind::Staging),
        }
        let result = copy_into(reader, &target);
        if result.is_err() {
            discard(&target);
        }
        result
    })
    .await
    .or_raise(|| ErrorKind::Staging)??;

    tracing::debug!(path = %path.display(), bytes = staged, "Staged source item");
    Ok(StagingSlot { path })
}

fn copy_into(mut reader: impl io::Read, target: &Path) -> Result<u64> {
    let mut file = File::create(target).or_raise(|| ErrorKind::Staging)?;
    io::copy(&mut reader, &mut file).or_raise(|| ErrorKind::Staging)?;
    file.flush().or_raise(|| ErrorKind::Staging)?;
    drop(file);
    // Check what actually landed on disk, not what the copy claims.
    let size = fs::metadata(target).or_raise(|| ErrorKind::Staging)?.len();
    if size == 0 {
        tracing::warn!(path = %target.display(), "Staged file is empty");
        exn::bail!(ErrorKind::Staging);
    }
    Ok(size)
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {},
        Err(err) if err.kind() == io::ErrorKind::NotFound => {},
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "Could not remove partial staging file"),
    }
}
