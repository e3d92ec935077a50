//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for a directory on
//! the local filesystem, accessed via `tokio::fs` for async I/O.

use crate::backend::{BoxSyncRead, BoxSyncWrite, EntryStream};
use crate::error::ErrorKind;
use crate::{Entry, StorageBackend, error::Result, path::validate as validate_path, validate_name};
use async_stream::stream;
use async_trait::async_trait;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs::{self, DirEntry, OpenOptions};

/// Local filesystem storage backend.
///
/// All handles are relative to the configured root directory. Unlike a
/// destination that gets created on demand, the root is never created here:
/// a tree that doesn't exist is reported by [`check()`](StorageBackend::check).
///
/// # Examples
///
/// ```no_run
/// use decant_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("music", "/home/me/Music/encrypted")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory of the tree
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates the path and joins it with the root directory.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn entry(relative: &Path, metadata: &Metadata) -> Result<Entry> {
        let modified = metadata.modified().map(OffsetDateTime::from).map_err(ErrorKind::Io)?;
        let name = relative.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(match metadata.is_dir() {
            true => Entry::directory(relative, name, modified),
            false => Entry::file(relative, name, metadata.len(), modified),
        })
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::NotADirectory => ErrorKind::NotADirectory(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Pulled out of the stream loop, where `?` isn't available.
    async fn process_entry(&self, entry: DirEntry) -> Result<Option<Entry>> {
        let path = entry.path();
        // Follows symlinks, so a link to a file is listed as a file.
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            // Note: silently drop what is most likely a broken symlink.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => exn::bail!(Self::map_io_error(e, &path)),
        };
        if !metadata.is_file() && !metadata.is_dir() {
            return Ok(None);
        }
        let relative = validate_path(Path::new(&entry.file_name()))?;
        Self::entry(&relative, &metadata).map(Some)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| Self::map_io_error(e, &self.root))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::NotADirectory(self.root.clone()));
        }
        // Being a directory isn't enough, it has to be listable too.
        let _entries = fs::read_dir(&self.root).await.map_err(|e| Self::map_io_error(e, &self.root))?;
        Ok(())
    }

    fn list_stream(&self) -> EntryStream<'_> {
        Box::pin(stream! {
            let mut entries = match fs::read_dir(&self.root).await {
                Ok(entries) => entries,
                Err(err) => {
                    yield Err(exn::Exn::from(Self::map_io_error(err, &self.root)));
                    return;
                },
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &self.root))); continue; },
                };
                match self.process_entry(entry).await {
                    Ok(Some(entry)) => yield Ok(entry),
                    Ok(None) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn find(&self, name: &str) -> Result<Option<Entry>> {
        let name = validate_name(name)?;
        match self.stat(Path::new(name)).await {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn stat(&self, path: &Path) -> Result<Entry> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Self::entry(&validate_path(path)?, &metadata)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let abs_path = self.absolute_path(path)?;
        let file = fs::File::open(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Ok(Box::new(file.into_std().await))
    }

    async fn create(&self, name: &str, content_type: &str) -> Result<Entry> {
        let name = validate_name(name)?;
        let abs_path = self.root.join(name);
        tracing::trace!(target_name = %self.name, name, content_type, "Creating file (content type not stored locally)");
        let file = fs::File::create(&abs_path).await.map_err(|e| Self::map_io_error(e, Path::new(name)))?;
        let metadata = file.metadata().await.map_err(ErrorKind::Io)?;
        Self::entry(Path::new(name), &metadata)
    }

    async fn writer(&self, path: &Path) -> Result<BoxSyncWrite> {
        let abs_path = self.absolute_path(path)?;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&abs_path)
            .await
            .map_err(|e| Self::map_io_error(e, path))?;
        Ok(Box::new(file.into_std().await))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryKind;
    use std::io::{Read, Write};

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[test]
    fn test_absolute_path() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("track01.ncm");
        assert_eq!(backend.absolute_path(Path::new("track01.ncm")).unwrap(), expected);
        // Path traversal is prevented
        assert!(backend.absolute_path(Path::new("../etc/passwd")).is_err());
    }

    #[tokio::test]
    async fn test_check() {
        let (temp_dir, backend) = backend();
        backend.check().await.unwrap();

        let missing = LocalBackend::new("missing", temp_dir.path().join("nope")).unwrap();
        let err = missing.check().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));

        backend.write(Path::new("file.ncm"), b"data").await.unwrap();
        let file_root = LocalBackend::new("file", temp_dir.path().join("file.ncm")).unwrap();
        let err = file_root.check().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_list_direct_children_only() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("a.ncm"), b"a").await.unwrap();
        backend.write(Path::new("b.mp3"), b"bb").await.unwrap();
        std::fs::create_dir(temp_dir.path().join("Album")).unwrap();
        std::fs::write(temp_dir.path().join("Album/nested.ncm"), b"nested").unwrap();

        let mut entries = backend.list().await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let names: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            names,
            vec![("Album", EntryKind::Directory), ("a.ncm", EntryKind::File), ("b.mp3", EntryKind::File)]
        );
        assert_eq!(entries[2].size, 2);
    }

    #[tokio::test]
    async fn test_list_missing_root_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("missing", temp_dir.path().join("nope")).unwrap();
        assert!(backend.list().await.is_err());
    }

    #[tokio::test]
    async fn test_find() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("song.mp3"), b"data").await.unwrap();
        let found = backend.find("song.mp3").await.unwrap().unwrap();
        assert_eq!(found.name, "song.mp3");
        assert_eq!(found.size, 4);
        assert!(backend.find("other.mp3").await.unwrap().is_none());
        assert!(backend.find("../song.mp3").await.is_err());
    }

    #[tokio::test]
    async fn test_create_and_stream() {
        let (_temp_dir, backend) = backend();
        let entry = backend.create("song.flac", "audio/flac").await.unwrap();
        assert_eq!(entry.path, PathBuf::from("song.flac"));
        assert_eq!(entry.size, 0);

        let mut writer = backend.writer(&entry.path).await.unwrap();
        writer.write_all(b"fLaC....").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut reader = backend.reader(&entry.path).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"fLaC....");
    }

    #[tokio::test]
    async fn test_create_truncates_existing() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("song.mp3"), b"old contents").await.unwrap();
        let entry = backend.create("song.mp3", "audio/mpeg").await.unwrap();
        assert_eq!(entry.size, 0);
        assert!(backend.read(Path::new("song.mp3")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_writer_requires_existing_file() {
        let (_temp_dir, backend) = backend();
        let err = backend.writer(Path::new("missing.mp3")).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("file.mp3"), b"data").await.unwrap();
        backend.delete(Path::new("file.mp3")).await.unwrap();
        assert!(!backend.exists(Path::new("file.mp3")).await.unwrap());
        let err = backend.delete(Path::new("file.mp3")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("file.ncm"), b"Hello, world!").await.unwrap();
        let entry = backend.stat(Path::new("file.ncm")).await.unwrap();
        assert_eq!(entry.name, "file.ncm");
        assert_eq!(entry.size, 13);
        assert!(entry.is_file());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../etc/passwd"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
        assert!(backend.create("../escape.mp3", "audio/mpeg").await.is_err());
    }
}
