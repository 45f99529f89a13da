//! Switching the working tree to another commit.

use crate::error::Result;
use crate::hash::Hash;
use crate::object::file_modes;
use crate::refs::validate_branch_name;
use crate::repository::Repository;
use crate::staging::{Index, IndexEntry};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use tracing::{debug, info};

impl Repository {
    /// Check out a branch name, `HEAD` or a literal commit hash.
    ///
    /// Files tracked by the current index are removed, every file in the
    /// target commit's tree is written out, and the index is rebuilt to match.
    /// HEAD follows a branch when `name` is one, otherwise it is detached.
    pub fn checkout(&self, name: &str) -> Result<Hash> {
        let _lock = self.lock()?;

        let target = self.refs().resolve(name)?;
        let commit = self.read_commit(&target)?;
        let tree = self.read_tree(&commit.tree())?;

        // Load everything up front so a missing blob leaves the tree untouched
        let mut files = Vec::with_capacity(tree.entries().len());
        for entry in tree.entries() {
            files.push((entry, self.load(&entry.hash)?));
        }

        let old_index = self.load_index()?;
        for entry in &old_index {
            let path = self.work_tree().join(&entry.path);
            match fs::remove_file(&path) {
                Ok(()) => prune_empty_dirs(self.work_tree(), &path),
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut index = Index::new();
        for (entry, content) in files {
            let path = self.work_tree().join(&entry.name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &content)?;
            let mode = if entry.mode == file_modes::EXECUTABLE {
                0o755
            } else {
                0o644
            };
            set_file_mode(&path, mode)?;

            let modified = fs::metadata(&path)?
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            index.add(IndexEntry {
                path: entry.name.clone(),
                hash: entry.hash,
                mode: entry.mode.clone(),
                size: content.len() as u64,
                modified,
            });
            debug!(path = %entry.name, hash = %entry.hash, "wrote file");
        }
        self.save_index(&index)?;

        let refs = self.refs();
        if validate_branch_name(name).is_ok() && refs.branch(name)?.is_some() {
            refs.set_head_branch(name)?;
        } else {
            refs.set_head_detached(&target)?;
        }

        info!(target = name, commit = %target, files = index.len(), "checked out");
        Ok(target)
    }
}

/// Remove directories emptied by a file removal, stopping at the work tree.
fn prune_empty_dirs(work_tree: &Path, removed: &Path) {
    let mut dir = removed.parent();
    while let Some(current) = dir {
        if current == work_tree || !current.starts_with(work_tree) {
            break;
        }
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

/// Set file mode (permissions) on a path.
#[cfg(unix)]
fn set_file_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Set file mode (Windows no-op).
#[cfg(not(unix))]
fn set_file_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::refs::Head;
    use tempfile::TempDir;

    fn commit_file(repo: &Repository, name: &str, content: &[u8], message: &str) -> Hash {
        let path = repo.work_tree().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        repo.add_paths(&[name]).unwrap();
        repo.commit(message).unwrap()
    }

    #[test]
    fn test_branch_checkout_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let a = commit_file(&repo, "a.txt", b"hello", "A");
        repo.create_branch("f").unwrap();
        repo.checkout("f").unwrap();
        let b = commit_file(&repo, "dir/b.txt", b"only on f", "B");
        assert_ne!(a, b);
        assert_eq!(repo.refs().branch("f").unwrap(), Some(b));
        assert_eq!(repo.refs().branch("main").unwrap(), Some(a));

        repo.checkout("main").unwrap();

        let work_tree = repo.work_tree();
        assert_eq!(fs::read(work_tree.join("a.txt")).unwrap(), b"hello");
        assert!(!work_tree.join("dir/b.txt").exists());
        assert!(!work_tree.join("dir").exists());

        let index = repo.load_index().unwrap();
        let paths: Vec<&str> = index.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt"]);
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
        assert_eq!(repo.resolve_ref("HEAD").unwrap(), a);
    }

    #[test]
    fn test_checkout_hash_detaches_head() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let first = commit_file(&repo, "a.txt", b"one", "first");
        commit_file(&repo, "a.txt", b"two", "second");

        repo.checkout(&first.to_hex()).unwrap();
        assert_eq!(repo.refs().head().unwrap(), Head::Detached(first));
        assert_eq!(fs::read(repo.work_tree().join("a.txt")).unwrap(), b"one");
        assert_eq!(repo.current_branch().unwrap(), None);
    }

    #[test]
    fn test_checkout_unknown_ref() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        commit_file(&repo, "a.txt", b"one", "first");

        let err = repo.checkout("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(repo.work_tree().join("a.txt").exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_checkout_restores_executable_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let script = repo.work_tree().join("run.sh");
        fs::write(&script, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        repo.add_paths(&["run.sh"]).unwrap();
        let commit = repo.commit("script").unwrap();

        fs::remove_file(&script).unwrap();
        repo.checkout(&commit.to_hex()).unwrap();

        let mode = fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
