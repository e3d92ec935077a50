//! Handle-based storage trees.
//!
//! A storage tree is addressed through opaque [`Entry`] handles rather than
//! raw filesystem paths: callers list children, open streams by handle and
//! create or delete children by name. The pipeline only ever talks to a
//! [`BackendHandle`], so the same code drives a local directory, a
//! read-only view of one, or an in-memory tree in tests.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::{Entry, EntryKind};
pub use crate::path::{validate as validate_path, validate_name};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
