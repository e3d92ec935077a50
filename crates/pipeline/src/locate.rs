//! Finding what the decoder produced.
//!
//! The decoder never says which file it wrote, so the artifact is inferred
//! from scratch space: a file sharing the staged input's basename whose
//! extension is not the container extension. The first such file with an
//! extension wins immediately; a file without any extension is only used
//! when nothing better turns up. If the decoder leaves several candidates
//! behind, which one is picked depends on directory enumeration order.

use crate::item::{ErrorKind, Result};
use crate::name::{self, BaseName};
use exn::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};

/// A file the decoder produced in scratch space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    extension: Option<String>,
}
impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-empty extension of the artifact, as written by the decoder.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Name to commit under: the source basename plus this artifact's
    /// extension, or just the basename if the artifact has none.
    pub fn final_name(&self, basename: &str) -> String {
        match &self.extension {
            Some(ext) => format!("{basename}.{ext}"),
            None => basename.to_string(),
        }
    }
}

/// Search `dir` for the artifact belonging to `basename`. Blocking.
///
/// Files with the `excluded` extension (the container extension) are never
/// candidates. A zero-length match counts as not found.
pub fn locate(dir: &Path, basename: &str, excluded: &str) -> Result<Artifact> {
    let identity = BaseName::new(basename);
    let mut fallback = None;
    for entry in fs::read_dir(dir).or_raise(|| ErrorKind::ArtifactNotFound)? {
        let entry = entry.or_raise(|| ErrorKind::ArtifactNotFound)?;
        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !identity.matches(file_name) || name::has_extension(file_name, excluded) {
            continue;
        }
        match name::extension(file_name).filter(|ext| !ext.is_empty()) {
            Some(ext) => {
                return accept(Artifact { path: entry.path(), extension: Some(ext.to_string()) });
            },
            None if fallback.is_none() => {
                fallback = Some(Artifact { path: entry.path(), extension: None });
            },
            None => {},
        }
    }
    match fallback {
        Some(artifact) => accept(artifact),
        None => exn::bail!(ErrorKind::ArtifactNotFound),
    }
}

fn accept(artifact: Artifact) -> Result<Artifact> {
    let size = fs::metadata(&artifact.path).or_raise(|| ErrorKind::ArtifactNotFound)?.len();
    if size == 0 {
        tracing::warn!(path = %artifact.path.display(), "Decoder produced an empty artifact");
        exn::bail!(ErrorKind::ArtifactNotFound);
    }
    tracing::debug!(path = %artifact.path.display(), bytes = size, "Located artifact");
    Ok(artifact)
}
