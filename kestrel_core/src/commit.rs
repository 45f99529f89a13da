//! Recording the staged snapshot as a commit.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::{Commit, Object, Tree, TreeEntry};
use crate::refs::Head;
use crate::repository::Repository;
use tracing::info;

impl Repository {
    /// Commit the staging index on top of HEAD.
    ///
    /// The tree lists index entries in index order. The branch HEAD points at
    /// is advanced to the new commit, whose hash is returned.
    pub fn commit(&self, message: &str) -> Result<Hash> {
        let _lock = self.lock()?;

        let index = self.load_index()?;
        if index.is_empty() {
            return Err(Error::EmptyIndex);
        }

        // Nothing is stored if the commit could not be recorded anyway
        if let Head::Detached(_) = self.refs().head()? {
            return Err(Error::DetachedHead);
        }

        let entries = index
            .iter()
            .map(|entry| TreeEntry::new(entry.mode.clone(), entry.path.clone(), entry.hash))
            .collect::<Result<Vec<_>>>()?;
        let tree = Tree::new(entries)?;
        let tree_hash = self.store(&Object::Tree(tree))?;

        let parent = self.refs().resolve_head()?;
        let user = &self.config().user;
        let commit = Commit::new(tree_hash, parent, &user.name, &user.email, message)?;
        let commit_hash = self.store(&Object::Commit(commit))?;

        self.refs().update_head_target(&commit_hash)?;
        info!(commit = %commit_hash, tree = %tree_hash, "created commit");
        Ok(commit_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::object::file_modes;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_init_add_commit_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("a.txt"), b"hello").unwrap();
        let staged = repo.add_paths(&["a.txt"]).unwrap();
        let blob_hash = staged[0].hash;
        assert_eq!(
            blob_hash.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let commit_hash = repo.commit("first").unwrap();
        let commit = repo.read_commit(&commit_hash).unwrap();
        assert_eq!(commit.parent(), None);
        assert_eq!(commit.message(), "first");
        assert_eq!(commit.author(), "User");

        let tree = repo.read_tree(&commit.tree()).unwrap();
        assert_eq!(tree.entries().len(), 1);
        let entry = &tree.entries()[0];
        assert_eq!(entry.mode, file_modes::REGULAR);
        assert_eq!(entry.name, "a.txt");
        assert_eq!(entry.hash, blob_hash);

        let meta = repo.meta_dir();
        assert_eq!(
            fs::read_to_string(meta.join("HEAD")).unwrap(),
            "ref: refs/heads/main"
        );
        assert_eq!(
            fs::read_to_string(meta.join("refs/heads/main")).unwrap(),
            commit_hash.to_hex()
        );
        assert_eq!(repo.resolve_ref("HEAD").unwrap(), commit_hash);
    }

    #[test]
    fn test_second_commit_links_parent() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("a.txt"), b"one").unwrap();
        repo.add_paths(&["a.txt"]).unwrap();
        let first = repo.commit("first").unwrap();

        fs::write(temp_dir.path().join("a.txt"), b"two").unwrap();
        repo.add_paths(&["a.txt"]).unwrap();
        let second = repo.commit("second").unwrap();

        assert_eq!(repo.read_commit(&second).unwrap().parent(), Some(first));
    }

    #[test]
    fn test_commit_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let err = repo.commit("nothing").unwrap_err();
        assert!(matches!(err, Error::EmptyIndex));
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_commit_detached_head() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("a.txt"), b"one").unwrap();
        repo.add_paths(&["a.txt"]).unwrap();
        let first = repo.commit("first").unwrap();
        repo.refs().set_head_detached(&first).unwrap();

        let loose_before = repo.object_count().unwrap();
        let err = repo.commit("detached").unwrap_err();
        assert!(matches!(err, Error::DetachedHead));
        assert_eq!(repo.object_count().unwrap(), loose_before);
    }

    #[test]
    fn test_commit_uses_configured_identity() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        fs::write(
            repo.meta_dir().join("config"),
            "version=1\nalgo=sha256\nuser.name=Ada\nuser.email=ada@example.com\n",
        )
        .unwrap();
        let repo = Repository::open(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("a.txt"), b"one").unwrap();
        repo.add_paths(&["a.txt"]).unwrap();
        let commit = repo.read_commit(&repo.commit("msg").unwrap()).unwrap();
        assert_eq!(commit.author(), "Ada");
        assert_eq!(commit.email(), "ada@example.com");
    }
}
