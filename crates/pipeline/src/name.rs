//! Display-name helpers.
//!
//! A basename is a name with its final extension segment removed, and it is
//! the identity key for both deduplication and artifact matching. Every
//! comparison of basenames or extensions is case-insensitive.

use std::fmt;

/// `name` without its final `.extension`; the whole name if it has no dot.
pub fn basename(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(base, _)| base)
}

/// The final extension segment of `name`, if it has a dot.
pub fn extension(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Case-insensitive extension check.
pub fn has_extension(name: &str, wanted: &str) -> bool {
    extension(name).is_some_and(|ext| fold(ext) == fold(wanted))
}

fn fold(s: &str) -> String {
    s.to_lowercase()
}

/// A case-folded basename, usable as a set or map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BaseName(String);
impl BaseName {
    /// Identity of the file displayed as `name`.
    pub fn of(name: &str) -> Self {
        Self::new(basename(name))
    }

    /// Identity of an already-stripped basename.
    pub fn new(basename: &str) -> Self {
        Self(fold(basename))
    }

    /// Does the file displayed as `name` share this identity?
    pub fn matches(&self, name: &str) -> bool {
        fold(basename(name)) == self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for BaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
