//! Path and name validation.
//!
//! Handles are relative to a storage root and must never escape it. Child
//! names handed to [`create`](crate::StorageBackend::create) and
//! [`find`](crate::StorageBackend::find) must be exactly one path component.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path for security and correctness.
/// Ensures that paths don't escape the storage root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use decant_storage::validate_path;
/// assert!(validate_path("Album/track01.ncm").is_ok());
/// assert!(validate_path("a/../track01.ncm").is_ok()); // (never leaves the root)
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("wrong/.././correct//./track.mp3/").unwrap(),
///     Path::new("correct/track.mp3")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if has_null(s) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates a child name: exactly one normal path component.
///
/// ```
/// use decant_storage::validate_name;
/// assert!(validate_name("track01.mp3").is_ok());
/// assert!(validate_name("Album/track01.mp3").is_err());
/// assert!(validate_name("..").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(s)), None) if !has_null(s) && s == OsStr::new(name) => Ok(name),
        _ => exn::bail!(ErrorKind::InvalidPath(PathBuf::from(name))),
    }
}

fn has_null(s: &OsStr) -> bool {
    s.as_encoded_bytes().contains(&0)
}
