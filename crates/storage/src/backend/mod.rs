//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, the capability both the
//! source tree and the destination tree present to the pipeline. A tree is
//! flat from the pipeline's point of view: only the direct children of the
//! root are listed, and children are created by name directly under it.

mod local;
#[cfg(feature = "mock")]
mod mock;
mod ro;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
pub use self::ro::ReadOnlyBackend;
use crate::error::Result;
use crate::models::Entry;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::io::{Read, Write};
use std::path::Path;
use std::pin::Pin;

pub type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<Entry>> + Send + 'a>>;
pub type BoxSyncRead = Box<dyn Read + Send + 'static>;
pub type BoxSyncWrite = Box<dyn Write + Send + 'static>;

/// Unified interface for storage trees.
///
/// All operations are asynchronous; the streaming methods hand back `'static`
/// boxed [`Read`]/[`Write`] implementations so the byte copying itself can be
/// moved onto a blocking thread.
///
/// # Handles
/// Entries are addressed by [`Entry::path`], relative to the storage root.
/// Implementations validate every path with
/// [`validate_path`](crate::validate_path) and every child name with
/// [`validate_name`](crate::validate_name).
///
/// # Examples
///
/// ```
/// use decant_storage::{StorageBackend, error::Result};
///
/// async fn total_size(backend: &dyn StorageBackend) -> Result<u64> {
///     backend.check().await?;
///     let entries = backend.list().await?;
///     Ok(entries.iter().filter(|e| e.is_file()).map(|e| e.size).sum())
/// }
/// ```
///
/// # Streaming
/// Copy one child into a brand new child without buffering the whole file:
///
/// ```
/// use decant_storage::{Entry, StorageBackend, error::{ErrorKind, Result}};
/// use exn::ResultExt;
///
/// async fn duplicate(backend: &dyn StorageBackend, entry: &Entry, name: &str) -> Result<u64> {
///     let mut reader = backend.reader(&entry.path).await?;
///     let created = backend.create(name, "application/octet-stream").await?;
///     let mut writer = backend.writer(&created.path).await?;
///     let copied = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
///         let copied = std::io::copy(&mut reader, &mut writer)?;
///         std::io::Write::flush(&mut writer)?;
///         Ok(copied)
///     })
///     .await
///     .or_raise(|| ErrorKind::BackendError("copy task panicked".into()))?
///     .or_raise(|| ErrorKind::BackendError("copy failed".into()))?;
///     Ok(copied)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Verify that the tree root resolves to a readable directory.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound),
    /// [`NotADirectory`](crate::error::ErrorKind::NotADirectory) or
    /// [`PermissionDenied`](crate::error::ErrorKind::PermissionDenied)
    /// otherwise.
    async fn check(&self) -> Result<()>;

    /// List the direct children of the root.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// into a [`Vec`].
    async fn list(&self) -> Result<Vec<Entry>> {
        self.list_stream().try_collect().await
    }

    /// Stream the direct children of the root, files and directories alike,
    /// in enumeration order. Ordering is backend-defined and not guaranteed
    /// to be stable between calls.
    fn list_stream(&self) -> EntryStream<'_>;

    /// Look up a child by its exact display name.
    ///
    /// Returns `Ok(None)` when no such child exists.
    async fn find(&self, name: &str) -> Result<Option<Entry>>;

    /// Get entry metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the entry
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<Entry>;

    /// Check if an entry exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read an entire file into memory.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open a file for streaming reads.
    ///
    /// Returns a `'static` boxed [`Read`] suitable for use inside
    /// [`spawn_blocking`](tokio::task::spawn_blocking). The async setup
    /// (opening the file) happens before returning.
    async fn reader(&self, path: &Path) -> Result<BoxSyncRead>;

    /// Create (or truncate) a child named `name` directly under the root.
    ///
    /// The `content_type` is a hint for backends that store one; if a child
    /// with the same name already exists, what happens is up to the backend.
    async fn create(&self, name: &str, content_type: &str) -> Result<Entry>;

    /// Open an existing file for streaming writes, truncating it.
    ///
    /// Callers should call `flush()` before dropping to ensure data is
    /// written and errors are propagated.
    async fn writer(&self, path: &Path) -> Result<BoxSyncWrite>;

    /// Write a whole file in one go, creating it if needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;
}
