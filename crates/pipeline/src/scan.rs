use crate::error::{ErrorKind, Result};
use crate::name::{self, BaseName};
use decant_storage::{BackendHandle, Entry};
use exn::ResultExt;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// One encrypted container found in the source tree.
///
/// Lives only as long as its batch: created by [`scan()`], consumed when its
/// item finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    handle: PathBuf,
    name: String,
    size: u64,
}
impl SourceItem {
    /// Opaque handle into the source tree.
    pub fn handle(&self) -> &Path {
        &self.handle
    }

    /// Authoritative display name. Basenames are derived from this, never
    /// from the handle.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn basename(&self) -> &str {
        name::basename(&self.name)
    }

    pub fn identity(&self) -> BaseName {
        BaseName::of(&self.name)
    }

    /// Extension as it appears in the display name (original case).
    pub fn extension(&self) -> Option<&str> {
        name::extension(&self.name)
    }
}
impl From<Entry> for SourceItem {
    fn from(entry: Entry) -> Self {
        Self { handle: entry.path, name: entry.name, size: entry.size }
    }
}

/// List the files directly under the source root whose extension is
/// `extension` (case-insensitively), in enumeration order.
///
/// # Errors
/// [`InvalidSource`](ErrorKind::InvalidSource) if the root does not resolve
/// to a readable directory, or listing it fails part way through.
#[instrument(skip_all, fields(source = source.name(), extension = extension))]
pub async fn scan(source: &BackendHandle, extension: &str) -> Result<Vec<SourceItem>> {
    source.check().await.or_raise(|| ErrorKind::InvalidSource)?;
    let items: Vec<SourceItem> = source
        .list_stream()
        .try_filter(|entry| futures::future::ready(entry.is_file() && name::has_extension(&entry.name, extension)))
        .map_ok(SourceItem::from)
        .try_collect()
        .await
        .or_raise(|| ErrorKind::InvalidSource)?;
    tracing::debug!(found = items.len(), "Scanned source tree");
    Ok(items)
}
