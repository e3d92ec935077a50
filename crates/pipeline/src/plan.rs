//! Deduplication planning.
//!
//! A source item is already converted when any file in the destination has
//! the same basename, whatever its extension. Nothing is read or decoded to
//! decide this.

use crate::error::{ErrorKind, Result};
use crate::name::BaseName;
use crate::scan::{SourceItem, scan};
use decant_storage::BackendHandle;
use exn::ResultExt;
use futures::TryStreamExt;
use std::collections::HashSet;
use tracing::instrument;

/// Which source items need converting and which are already done.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Plan {
    pub to_convert: Vec<SourceItem>,
    pub skipped: Vec<SourceItem>,
}
impl Plan {
    /// Split `items` against the identities already present in the
    /// destination, preserving order.
    pub fn classify(items: impl IntoIterator<Item = SourceItem>, existing: &HashSet<BaseName>) -> Self {
        let (skipped, to_convert) = items.into_iter().partition(|item| existing.contains(&item.identity()));
        Self { to_convert, skipped }
    }

    pub fn found(&self) -> usize {
        self.to_convert.len() + self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_convert.is_empty()
    }
}

/// Basenames of every file directly under the destination root.
///
/// # Errors
/// [`InvalidDestination`](ErrorKind::InvalidDestination) if the root does not
/// resolve to a readable directory.
#[instrument(skip_all, fields(destination = destination.name()))]
pub async fn existing(destination: &BackendHandle) -> Result<HashSet<BaseName>> {
    destination.check().await.or_raise(|| ErrorKind::InvalidDestination)?;
    destination
        .list_stream()
        .try_filter(|entry| futures::future::ready(entry.is_file()))
        .map_ok(|entry| BaseName::of(&entry.name))
        .try_collect()
        .await
        .or_raise(|| ErrorKind::InvalidDestination)
}

/// Scan the source and classify every item against the destination.
pub async fn plan(source: &BackendHandle, destination: &BackendHandle, extension: &str) -> Result<Plan> {
    let items = scan(source, extension).await?;
    let existing = existing(destination).await?;
    let plan = Plan::classify(items, &existing);
    tracing::info!(
        found = plan.found(),
        to_convert = plan.to_convert.len(),
        skipped = plan.skipped.len(),
        "Planned conversion"
    );
    Ok(plan)
}
