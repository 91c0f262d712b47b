//! Name to identifier table for ACLs in one project.
//!
//! Control-plane object names are derived from stable numeric identifiers,
//! never from free text. `IdTable` is the request-scoped snapshot of the
//! database's name→identifier mapping handed to the compiler, reconciler
//! and GC.
//!
//! Like a map that refuses auto-vivification, lookups never create entries:
//! - `get()` returns `Option<i64>`
//! - `require()` returns `Result<i64, IdTableError>`

use std::collections::BTreeMap;
use thiserror::Error;

/// Error type for IdTable lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdTableError {
    #[error("Cannot find security ACL ID for {0:?}")]
    UnknownName(String),
}

/// Request-scoped mapping of ACL names to their identifiers.
///
/// Iteration is ordered by name so that anything derived from the table
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdTable {
    inner: BTreeMap<String, i64>,
}

impl IdTable {
    /// Creates a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Returns the identifier for `name`.
    ///
    /// **This never creates entries.**
    pub fn get(&self, name: &str) -> Option<i64> {
        self.inner.get(name).copied()
    }

    /// Returns the identifier for `name` or an error naming it.
    pub fn require(&self, name: &str) -> Result<i64, IdTableError> {
        self.get(name)
            .ok_or_else(|| IdTableError::UnknownName(name.to_string()))
    }

    /// Returns the name owning `id`, if any.
    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.inner
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.as_str())
    }

    /// Inserts a mapping. Returns the previous identifier if the name existed.
    pub fn insert(&mut self, name: impl Into<String>, id: i64) -> Option<i64> {
        self.inner.insert(name.into(), id)
    }

    pub fn remove(&mut self, name: &str) -> Option<i64> {
        self.inner.remove(name)
    }

    /// Iterates `(name, id)` pairs ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Iterates names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<(S, i64)> for IdTable {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl From<BTreeMap<String, i64>> for IdTable {
    fn from(inner: BTreeMap<String, i64>) -> Self {
        Self { inner }
    }
}
