//! Read-only storage backend.
//!
//! Wraps another backend and refuses every mutating operation with
//! [`ReadOnly`](crate::error::ErrorKind::ReadOnly). The source tree of a batch
//! is handed to the pipeline through this wrapper so that nothing can ever
//! modify it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::backend::{BoxSyncRead, BoxSyncWrite, EntryStream};
use crate::error::{ErrorKind, Result};
use crate::models::Entry;
use crate::{BackendHandle, StorageBackend};

/// Read-only storage backend.
///
/// Reads are delegated to the wrapped backend; writes, creates and deletes
/// fail, logging a [`warn event`](tracing::Event).
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }

    fn refuse<T>(&self, path: impl Into<PathBuf>, operation: &str) -> Result<T> {
        let path = path.into();
        tracing::warn!(backend = self.inner.name(), path = %path.display(), operation, "Refusing write to read-only tree");
        exn::bail!(ErrorKind::ReadOnly(path))
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn check(&self) -> Result<()> {
        self.inner.check().await
    }

    fn list_stream(&self) -> EntryStream<'_> {
        self.inner.list_stream()
    }

    async fn find(&self, name: &str) -> Result<Option<Entry>> {
        self.inner.find(name).await
    }

    async fn stat(&self, path: &Path) -> Result<Entry> {
        self.inner.stat(path).await
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        self.inner.reader(path).await
    }

    async fn create(&self, name: &str, _content_type: &str) -> Result<Entry> {
        self.refuse(name, "create")
    }

    async fn writer(&self, path: &Path) -> Result<BoxSyncWrite> {
        self.refuse(path, "writer")
    }

    async fn write(&self, path: &Path, _data: &[u8]) -> Result<()> {
        self.refuse(path, "write")
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.refuse(path, "delete")
    }
}
