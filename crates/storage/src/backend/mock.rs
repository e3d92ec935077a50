//! In-memory storage backend for testing.

use super::{BoxSyncRead, BoxSyncWrite, EntryStream};
use crate::error::{ErrorKind, Result};
use crate::models::Entry;
use crate::path::validate as validate_path;
use crate::{StorageBackend, validate_name};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use time::OffsetDateTime;

struct MockFile {
    name: String,
    modified: OffsetDateTime,
    data: Vec<u8>,
}

type Files = Arc<RwLock<BTreeMap<PathBuf, MockFile>>>;

#[derive(Default)]
struct Faults {
    unavailable: bool,
    reads: BTreeSet<String>,
    /// Display name -> number of bytes accepted before writes start failing.
    writes: HashMap<String, usize>,
    deletes: BTreeSet<String>,
}

/// In-memory storage backend for testing.
///
/// Files live in a [`BTreeMap`] behind a [`RwLock`], so listing order is
/// deterministic and the synchronous writers handed out by
/// [`writer()`](StorageBackend::writer) can append to the same storage from a
/// blocking thread. Faults can be injected per display name to exercise
/// failure paths.
///
/// # Examples
///
/// ```
/// use decant_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("song.ncm", b"encrypted")]);
/// assert!(backend.exists(Path::new("song.ncm")).await?);
/// assert_eq!(backend.find("song.ncm").await?.unwrap().size, 9);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    files: Files,
    faults: Faults,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files. Display names default
    /// to the last path component.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = BTreeMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            let name = validated.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            map.insert(validated, MockFile { name, modified: now, data: data.into() });
        }
        Self {
            name: "mock".to_string(),
            files: Arc::new(RwLock::new(map)),
            faults: Faults::default(),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Report `name` as the display name of the file stored at `path`,
    /// independent of the path itself.
    ///
    /// ```
    /// use decant_storage::backend::{MockBackend, StorageBackend};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let backend = MockBackend::with_files([("document-4711", b"...")])
    ///     .with_display_name("document-4711", "Song.ncm");
    /// assert_eq!(backend.list().await?[0].name, "Song.ncm");
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_display_name(self, path: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let path = validate_path(path.as_ref()).unwrap_or_else(|_| panic!("invalid path {}", path.as_ref().display()));
        match write_lock(&self.files).get_mut(&path) {
            Some(file) => file.name = name.into(),
            None => panic!("MockBackend::with_display_name: no file at {}", path.display()),
        }
        self
    }

    /// Make [`check()`](StorageBackend::check) and listing fail, as if the
    /// tree root no longer resolved to a directory.
    pub fn unavailable(mut self) -> Self {
        self.faults.unavailable = true;
        self
    }

    /// Opening a reader on the file displayed as `name` fails.
    pub fn failing_reads(mut self, name: impl Into<String>) -> Self {
        self.faults.reads.insert(name.into());
        self
    }

    /// Every write to the file displayed as `name` fails.
    pub fn failing_writes(self, name: impl Into<String>) -> Self {
        self.failing_writes_after(name, 0)
    }

    /// Writes to the file displayed as `name` are accepted for the first
    /// `bytes` bytes, then fail.
    pub fn failing_writes_after(mut self, name: impl Into<String>, bytes: usize) -> Self {
        self.faults.writes.insert(name.into(), bytes);
        self
    }

    /// Deleting the file displayed as `name` fails.
    pub fn failing_deletes(mut self, name: impl Into<String>) -> Self {
        self.faults.deletes.insert(name.into());
        self
    }

    /// Display names of all files in the root, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> =
            read_lock(&self.files).iter().filter(|(p, _)| is_child(p)).map(|(_, f)| f.name.clone()).collect();
        names.sort();
        names
    }

    fn unavailable_error(&self) -> exn::Exn<ErrorKind> {
        exn::Exn::from(ErrorKind::NotFound(PathBuf::from(&self.name)))
    }

    fn entry(path: &Path, file: &MockFile) -> Entry {
        Entry::file(path, file.name.clone(), file.data.len() as u64, file.modified)
    }

    fn get(&self, path: &Path) -> Result<(PathBuf, Entry)> {
        let path = validate_path(path)?;
        let files = read_lock(&self.files);
        let file = files.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        let entry = Self::entry(&path, file);
        Ok((path, entry))
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &[u8]); 0] = [];
        Self::with_files(files)
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn is_child(path: &Path) -> bool {
    path.components().count() == 1
}

struct MockWriter {
    files: Files,
    path: PathBuf,
    written: usize,
    fail_after: Option<usize>,
}
impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let accepted = match self.fail_after {
            Some(limit) if self.written >= limit => return Err(io::Error::other("injected write failure")),
            Some(limit) => buf.len().min(limit - self.written),
            None => buf.len(),
        };
        let mut files = write_lock(&self.files);
        let file = files.get_mut(&self.path).ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        file.data.extend_from_slice(&buf[..accepted]);
        file.modified = OffsetDateTime::now_utc();
        self.written += accepted;
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<()> {
        match self.faults.unavailable {
            true => Err(self.unavailable_error()),
            false => Ok(()),
        }
    }

    fn list_stream(&self) -> EntryStream<'_> {
        Box::pin(stream! {
            if self.faults.unavailable {
                yield Err(self.unavailable_error());
                return;
            }
            // Snapshot under the lock, then drop it before yielding.
            let entries: Vec<Entry> = {
                let files = read_lock(&self.files);
                let mut directories = BTreeSet::new();
                let mut entries = Vec::new();
                for (path, file) in files.iter() {
                    match is_child(path) {
                        true => entries.push(Self::entry(path, file)),
                        false => if let Some(first) = path.components().next() {
                            directories.insert(PathBuf::from(first.as_os_str()));
                        },
                    }
                }
                let now = OffsetDateTime::now_utc();
                entries.extend(directories.into_iter().map(|dir| {
                    let name = dir.to_string_lossy().into_owned();
                    Entry::directory(dir, name, now)
                }));
                entries
            };
            for entry in entries {
                yield Ok(entry);
            }
        })
    }

    async fn find(&self, name: &str) -> Result<Option<Entry>> {
        let name = validate_name(name)?;
        let files = read_lock(&self.files);
        Ok(files.iter().find(|(path, file)| is_child(path) && file.name == name).map(|(p, f)| Self::entry(p, f)))
    }

    async fn stat(&self, path: &Path) -> Result<Entry> {
        self.get(path).map(|(_, entry)| entry)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(read_lock(&self.files).contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let files = read_lock(&self.files);
        let file = files.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(file.data.clone())
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let (path, entry) = self.get(path)?;
        if self.faults.reads.contains(&entry.name) {
            exn::bail!(ErrorKind::PermissionDenied(path));
        }
        let data = self.read(&path).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn create(&self, name: &str, content_type: &str) -> Result<Entry> {
        let name = validate_name(name)?;
        tracing::trace!(name, content_type, "Creating mock file");
        let path = PathBuf::from(name);
        let file = MockFile {
            name: name.to_string(),
            modified: OffsetDateTime::now_utc(),
            data: Vec::new(),
        };
        let entry = Self::entry(&path, &file);
        write_lock(&self.files).insert(path, file);
        Ok(entry)
    }

    async fn writer(&self, path: &Path) -> Result<BoxSyncWrite> {
        let (path, entry) = self.get(path)?;
        if let Some(file) = write_lock(&self.files).get_mut(&path) {
            file.data.clear();
        }
        Ok(Box::new(MockWriter {
            files: Arc::clone(&self.files),
            path,
            written: 0,
            fail_after: self.faults.writes.get(&entry.name).copied(),
        }))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        let mut files = write_lock(&self.files);
        let now = OffsetDateTime::now_utc();
        match files.get_mut(&path) {
            Some(file) => {
                file.data = data.to_vec();
                file.modified = now;
            },
            None => {
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                files.insert(path, MockFile { name, modified: now, data: data.to_vec() });
            },
        }
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let (path, entry) = self.get(path)?;
        if self.faults.deletes.contains(&entry.name) {
            exn::bail!(ErrorKind::PermissionDenied(path));
        }
        write_lock(&self.files).remove(&path);
        Ok(())
    }
}
