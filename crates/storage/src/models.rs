//! Storage models.
//!
//! An [`Entry`] is both the handle used to address a child of a storage tree
//! and the metadata reported for it while listing.

use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// What kind of child an [`Entry`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// A child of a storage tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Opaque handle, relative to the storage root.
    pub path: PathBuf,
    /// Authoritative display name. Backends may report a name that differs
    /// from the last component of `path`; identity decisions must use this.
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes (zero for directories)
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl Entry {
    pub fn file(path: impl Into<PathBuf>, name: impl Into<String>, size: u64, modified: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            kind: EntryKind::File,
            size,
            modified,
        }
    }

    pub fn directory(path: impl Into<PathBuf>, name: impl Into<String>, modified: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
            modified,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
