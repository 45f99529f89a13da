//! Branch creation and listing.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::refs::BranchInfo;
use crate::repository::Repository;
use tracing::info;

impl Repository {
    /// Create a branch at the commit HEAD resolves to.
    pub fn create_branch(&self, name: &str) -> Result<Hash> {
        let _lock = self.lock()?;
        let refs = self.refs();

        if refs.branch(name)?.is_some() {
            return Err(Error::already_exists(format!("branch '{}'", name)));
        }
        let head = refs.resolve("HEAD")?;
        refs.create_branch(name, &head)?;

        info!(branch = name, commit = %head, "created branch");
        Ok(head)
    }

    /// All branches, sorted by name, with the current one flagged.
    pub fn list_branches(&self) -> Result<Vec<BranchInfo>> {
        self.refs().list_branches()
    }

    /// Branch HEAD points at, `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        self.refs().current_branch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn repo_with_commit(temp_dir: &TempDir) -> (Repository, Hash) {
        let repo = Repository::init(temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"a").unwrap();
        repo.add_paths(&["a.txt"]).unwrap();
        let commit = repo.commit("first").unwrap();
        (repo, commit)
    }

    #[test]
    fn test_create_branch_at_head() {
        let temp_dir = TempDir::new().unwrap();
        let (repo, commit) = repo_with_commit(&temp_dir);

        assert_eq!(repo.create_branch("feature").unwrap(), commit);
        assert_eq!(
            fs::read_to_string(repo.meta_dir().join("refs/heads/feature")).unwrap(),
            commit.to_hex()
        );
    }

    #[test]
    fn test_create_existing_branch() {
        let temp_dir = TempDir::new().unwrap();
        let (repo, _) = repo_with_commit(&temp_dir);

        let err = repo.create_branch("main").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_create_branch_without_commits() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let err = repo.create_branch("feature").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_create_branch_invalid_name() {
        let temp_dir = TempDir::new().unwrap();
        let (repo, _) = repo_with_commit(&temp_dir);

        assert!(matches!(
            repo.create_branch("a/b").unwrap_err(),
            Error::InvalidRef { .. }
        ));
    }

    #[test]
    fn test_list_branches() {
        let temp_dir = TempDir::new().unwrap();
        let (repo, commit) = repo_with_commit(&temp_dir);
        repo.create_branch("dev").unwrap();

        let branches = repo.list_branches().unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].name, "dev");
        assert!(!branches[0].current);
        assert_eq!(branches[1].name, "main");
        assert!(branches[1].current);
        assert!(branches.iter().all(|b| b.hash == commit));
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
    }
}
