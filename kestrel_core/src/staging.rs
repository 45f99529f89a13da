//! Staging index: the pending snapshot captured by the next commit.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::store::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

/// One staged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Repository-relative path with `/` separators.
    pub path: String,
    pub hash: Hash,
    pub mode: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Ordered list of staged files.
///
/// Entry order is significant: commits build their tree in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an entry. Re-staging a path replaces it and moves it to the end.
    pub fn add(&mut self, entry: IndexEntry) {
        self.remove(&entry.path);
        self.entries.push(entry);
    }

    /// Unstage a path, returning the removed entry.
    pub fn remove(&mut self, path: &str) -> Option<IndexEntry> {
        let pos = self.entries.iter().position(|e| e.path == path)?;
        Some(self.entries.remove(pos))
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomically write the index as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes, false)
    }

    /// Read an index file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::invalid_repository(path, format!("Invalid index: {}", e)))
    }

    /// Read an index file, treating a missing file as an empty index.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(Error::Io { source }) if source.kind() == IoErrorKind::NotFound => Ok(Self::new()),
            other => other,
        }
    }
}

impl<'a> IntoIterator for &'a Index {
    type Item = &'a IndexEntry;
    type IntoIter = std::slice::Iter<'a, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
