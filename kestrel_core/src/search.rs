//! Finding commits by author and message.

use crate::error::{ErrorKind, Result};
use crate::hash::Hash;
use crate::object::Commit;
use crate::repository::Repository;
use tracing::{debug, warn};

/// Substring filters applied to every commit in the object store.
///
/// An unset filter matches everything. Matching is case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitFilter {
    /// Must appear in the message or the author name.
    pub query: Option<String>,
    /// Must appear in the author name.
    pub author: Option<String>,
    /// Must appear in the message.
    pub message: Option<String>,
}

impl CommitFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn matches(&self, commit: &Commit) -> bool {
        let contains = |filter: &Option<String>, text: &str| {
            filter.as_deref().is_none_or(|needle| text.contains(needle))
        };

        contains(&self.author, commit.author())
            && contains(&self.message, commit.message())
            && self.query.as_deref().is_none_or(|needle| {
                commit.message().contains(needle) || commit.author().contains(needle)
            })
    }
}

impl Repository {
    /// Every stored commit matching `filter`, newest first.
    ///
    /// Scans all loose and packed objects, so commits no ref reaches are
    /// found too. Objects that fail to load are skipped with a warning.
    pub fn search_commits(&self, filter: &CommitFilter) -> Result<Vec<(Hash, Commit)>> {
        let mut results = Vec::new();
        let mut scanned = 0usize;

        for hash in self.objects().object_hashes()? {
            scanned += 1;
            let bytes = match self.load(&hash) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::Io => return Err(e),
                Err(e) => {
                    warn!(%hash, error = %e, "skipping unreadable object");
                    continue;
                }
            };
            // Blobs and trees do not decode as commits.
            let Ok(commit) = Commit::decode(&bytes) else {
                continue;
            };
            if filter.matches(&commit) {
                results.push((hash, commit));
            }
        }

        results.sort_by(|(a_hash, a), (b_hash, b)| {
            b.timestamp()
                .cmp(&a.timestamp())
                .then_with(|| a_hash.cmp(b_hash))
        });
        debug!(scanned, found = results.len(), "searched commits");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn commit_file(repo: &Repository, name: &str, content: &str, message: &str) -> Hash {
        fs::write(repo.work_tree().join(name), content).unwrap();
        repo.add_paths(&[name]).unwrap();
        repo.commit(message).unwrap()
    }

    fn set_author(temp_dir: &TempDir, name: &str) -> Repository {
        fs::write(
            temp_dir.path().join(".kestrel").join("config"),
            format!("version=1\nalgo=sha256\nuser.name={}\nuser.email=x@example.com\n", name),
        )
        .unwrap();
        Repository::open(temp_dir.path()).unwrap()
    }

    #[test]
    fn test_filter_matching() {
        let commit = Commit::new(
            Hash::hash_bytes(b"tree"),
            None,
            "Grace",
            "grace@example.com",
            "Refactor: tidy search",
        )
        .unwrap();

        assert!(CommitFilter::new().matches(&commit));
        assert!(CommitFilter::new().author("Gra").matches(&commit));
        assert!(!CommitFilter::new().author("Ada").matches(&commit));
        assert!(CommitFilter::new().message("tidy").matches(&commit));
        assert!(!CommitFilter::new().message("refactor").matches(&commit));
        assert!(CommitFilter::new().query("Grace").matches(&commit));
        assert!(CommitFilter::new().query("search").matches(&commit));
        assert!(!CommitFilter::new().query("grace@").matches(&commit));
        assert!(!CommitFilter::new().author("Grace").message("other").matches(&commit));
    }

    #[test]
    fn test_search_by_message() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        commit_file(&repo, "a.txt", "one", "initial import");
        let refactor = commit_file(&repo, "b.txt", "two", "Refactor: improve search");

        let results = repo
            .search_commits(&CommitFilter::new().message("Refactor"))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, refactor);
        assert!(results[0].1.message().contains("Refactor"));
    }

    #[test]
    fn test_search_by_author() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        commit_file(&repo, "a.txt", "one", "by default user");

        let repo = set_author(&temp_dir, "tester");
        commit_file(&repo, "b.txt", "two", "second");
        commit_file(&repo, "c.txt", "three", "third");

        let results = repo.search_commits(&CommitFilter::new().author("tester")).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, c)| c.author() == "tester"));

        let all = repo.search_commits(&CommitFilter::new()).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].1.timestamp() >= w[1].1.timestamp()));
    }

    #[test]
    fn test_search_no_results() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        commit_file(&repo, "a.txt", "one", "first");

        let results = repo
            .search_commits(&CommitFilter::new().author("nonexistent-author"))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_finds_packed_and_unreferenced_commits() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let first = commit_file(&repo, "a.txt", "one", "packed commit");
        repo.create_branch("side").unwrap();
        repo.gc().unwrap();

        // A commit reachable only from a branch that is then deleted.
        repo.checkout("side").unwrap();
        let orphan = commit_file(&repo, "b.txt", "two", "orphaned work");
        repo.checkout(&first.to_hex()).unwrap();
        fs::remove_file(repo.meta_dir().join("refs").join("heads").join("side")).unwrap();

        let packed = repo.search_commits(&CommitFilter::new().query("packed")).unwrap();
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].0, first);

        let orphaned = repo.search_commits(&CommitFilter::new().query("orphaned")).unwrap();
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].0, orphan);
    }
}
