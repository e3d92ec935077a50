use crate::item::{ErrorKind, Result};
use crate::locate::Artifact;
use decant_storage::{BackendHandle, Entry};
use exn::ResultExt;
use std::fs::File;
use std::io::{self, Write};
use tracing::instrument;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for a file extension, compared case-insensitively.
pub fn content_type(extension: Option<&str>) -> &'static str {
    let Some(extension) = extension else {
        return FALLBACK_CONTENT_TYPE;
    };
    match extension.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "m4a" | "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "wma" => "audio/x-ms-wma",
        "ape" => "audio/ape",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => FALLBACK_CONTENT_TYPE,
    }
}

/// Write `artifact` into the destination as `<basename>.<artifact extension>`.
///
/// An existing child with that exact name is deleted first; if deleting it
/// fails the commit carries on and leaves the outcome to the backend's own
/// create semantics. When copying fails after the child was created, an
/// empty child is removed again before [`Commit`](ErrorKind::Commit) is
/// returned.
#[instrument(skip_all, fields(destination = destination.name(), basename = basename))]
pub async fn commit(destination: &BackendHandle, artifact: &Artifact, basename: &str) -> Result<Entry> {
    let name = artifact.final_name(basename);
    if let Some(existing) = destination.find(&name).await.or_raise(|| ErrorKind::Commit)? {
        match destination.delete(&existing.path).await {
            Ok(()) => tracing::debug!(name = %name, "Replaced existing destination file"),
            Err(err) => tracing::warn!(name = %name, error = ?err, "Could not delete existing destination file; continuing"),
        }
    }

    let created = destination.create(&name, content_type(artifact.extension())).await.or_raise(|| ErrorKind::Commit)?;
    match copy(destination, artifact, &created).await {
        Ok(bytes) => {
            tracing::debug!(name = %name, bytes, "Committed artifact");
            Ok(created)
        },
        Err(err) => {
            remove_if_empty(destination, &created).await;
            Err(err)
        },
    }
}

async fn copy(destination: &BackendHandle, artifact: &Artifact, created: &Entry) -> Result<u64> {
    let mut writer = destination.writer(&created.path).await.or_raise(|| ErrorKind::Commit)?;
    let source = artifact.path().to_path_buf();
    tokio::task::spawn_blocking(move || -> io::Result<u64> {
        let mut reader = File::open(&source)?;
        let bytes = io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        Ok(bytes)
    })
    .await
    .or_raise(|| ErrorKind::Commit)?
    .or_raise(|| ErrorKind::Commit)
}

async fn remove_if_empty(destination: &BackendHandle, created: &Entry) {
    match destination.stat(&created.path).await {
        Ok(entry) if entry.size == 0 => match destination.delete(&created.path).await {
            Ok(()) => tracing::debug!(name = %created.name, "Removed empty destination file after failed commit"),
            Err(err) => tracing::warn!(name = %created.name, error = ?err, "Could not remove empty destination file"),
        },
        Ok(entry) => {
            tracing::warn!(name = %created.name, bytes = entry.size, "Leaving partially written destination file")
        },
        Err(err) if err.is_not_found() => {},
        Err(err) => tracing::warn!(name = %created.name, error = ?err, "Could not inspect destination file"),
    }
}
