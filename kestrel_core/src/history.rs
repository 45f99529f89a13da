//! Walking the commit chain.

use crate::error::Result;
use crate::hash::Hash;
use crate::object::Commit;
use crate::repository::Repository;
use crate::store::ObjectStore;
use std::collections::BTreeMap;

/// Iterator over commits from a starting point back to the root.
///
/// Each step is one object load; nothing beyond the next hash is kept.
pub struct History<'a> {
    objects: &'a ObjectStore,
    next: Option<Hash>,
}

impl<'a> History<'a> {
    pub fn new(objects: &'a ObjectStore, start: Option<Hash>) -> Self {
        Self {
            objects,
            next: start,
        }
    }
}

impl Iterator for History<'_> {
    type Item = Result<(Hash, Commit)>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        match self.objects.read_commit(&hash) {
            Ok(commit) => {
                self.next = commit.parent();
                Some(Ok((hash, commit)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl Repository {
    /// Commits reachable from HEAD, newest first. Empty before the first commit.
    pub fn history(&self) -> Result<History<'_>> {
        let start = self.refs().resolve_head()?;
        Ok(History::new(self.objects(), start))
    }

    /// Commits reachable from any ref, newest first.
    pub fn history_from(&self, name: &str) -> Result<History<'_>> {
        let start = self.refs().resolve(name)?;
        Ok(History::new(self.objects(), Some(start)))
    }

    /// Path to blob hash for every file in HEAD's tree.
    pub fn head_tree_entries(&self) -> Result<BTreeMap<String, Hash>> {
        let Some(head) = self.refs().resolve_head()? else {
            return Ok(BTreeMap::new());
        };
        let commit = self.read_commit(&head)?;
        let tree = self.read_tree(&commit.tree())?;
        Ok(tree
            .entries()
            .iter()
            .map(|entry| (entry.name.clone(), entry.hash))
            .collect())
    }
}
