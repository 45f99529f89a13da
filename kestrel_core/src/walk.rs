//! Staging files from the working tree.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::{Blob, Object, file_modes};
use crate::repository::{META_DIR, Repository};
use crate::staging::IndexEntry;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// A file recorded in the staging index by [`Repository::add_paths`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: String,
    pub hash: Hash,
}

impl Repository {
    /// Stage files and directories.
    ///
    /// Directories are walked recursively in file-name order, honouring
    /// `.gitignore` and skipping the metadata directory. Each file is stored
    /// as a blob and recorded in the index under its repository-relative path.
    pub fn add_paths<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<StagedFile>> {
        let _lock = self.lock()?;
        let mut index = self.load_index()?;
        let mut staged = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.work_tree().join(path)
            };
            let absolute = fs::canonicalize(&absolute).map_err(|e| Error::Io {
                source: std::io::Error::new(
                    e.kind(),
                    format!("Path does not exist: {}", path.display()),
                ),
            })?;

            if !absolute.starts_with(self.work_tree()) {
                return Err(Error::path_outside_repository(absolute));
            }
            if absolute.starts_with(self.meta_dir()) {
                debug!(path = %absolute.display(), "skipping metadata path");
                continue;
            }

            let walker = ignore::WalkBuilder::new(&absolute)
                .hidden(false) // Include hidden files
                .git_ignore(true) // Respect .gitignore
                .require_git(false)
                .sort_by_file_name(|a, b| a.cmp(b))
                .filter_entry(|entry| entry.file_name() != META_DIR)
                .build();

            for entry in walker {
                let entry = entry?;
                let entry_path = entry.path();
                let Some(file_type) = entry.file_type() else {
                    continue;
                };

                if file_type.is_dir() {
                    continue;
                }
                if !file_type.is_file() {
                    warn!(path = %entry_path.display(), "skipping non-regular file");
                    continue;
                }

                let file = self.stage_file(entry_path)?;
                debug!(path = %file.path, hash = %file.hash, "staged file");
                index.add(file.clone());
                staged.push(StagedFile {
                    path: file.path,
                    hash: file.hash,
                });
            }
        }

        self.save_index(&index)?;
        Ok(staged)
    }

    /// Store one file as a blob and build its index entry.
    fn stage_file(&self, path: &Path) -> Result<IndexEntry> {
        let relative = repo_relative(self.work_tree(), path)?;
        let metadata = fs::metadata(path)?;
        let content = fs::read(path)?;
        let size = content.len() as u64;
        let hash = self.store(&Object::Blob(Blob::new(content)))?;

        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(IndexEntry {
            path: relative,
            hash,
            mode: get_file_mode(&metadata).to_string(),
            size,
            modified,
        })
    }
}

/// Path of `path` relative to `root`, joined with `/`.
fn repo_relative(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| Error::path_outside_repository(path))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            Error::invalid_tree_entry(format!("Non UTF-8 path: {}", path.display()))
        })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Get the file mode (permissions) from metadata.
#[cfg(unix)]
fn get_file_mode(metadata: &fs::Metadata) -> &'static str {
    use std::os::unix::fs::PermissionsExt;
    let mode = metadata.permissions().mode();

    // Check if executable
    if mode & 0o111 != 0 {
        file_modes::EXECUTABLE
    } else {
        file_modes::REGULAR
    }
}

/// Get the file mode (permissions) from metadata (Windows fallback).
#[cfg(not(unix))]
fn get_file_mode(_metadata: &fs::Metadata) -> &'static str {
    file_modes::REGULAR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_add_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("a.txt"), b"hello").unwrap();
        let staged = repo.add_paths(&["a.txt"]).unwrap();

        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].path, "a.txt");
        assert_eq!(
            staged[0].hash.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let index = repo.load_index().unwrap();
        let entry = index.get("a.txt").unwrap();
        assert_eq!(entry.mode, file_modes::REGULAR);
        assert_eq!(entry.size, 5);
        assert_eq!(repo.load(&entry.hash).unwrap(), b"hello");
    }

    #[test]
    fn test_add_directory_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let dir = temp_dir.path().join("src");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("b.rs"), b"b").unwrap();
        fs::write(dir.join("a.rs"), b"a").unwrap();
        fs::write(dir.join("nested").join("c.rs"), b"c").unwrap();

        let staged = repo.add_paths(&[dir]).unwrap();
        let paths: Vec<&str> = staged.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.rs", "src/b.rs", "src/nested/c.rs"]);
    }

    #[test]
    fn test_add_work_tree_skips_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("a.txt"), b"a").unwrap();
        fs::write(temp_dir.path().join(".hidden"), b"h").unwrap();

        let staged = repo.add_paths(&["."]).unwrap();
        let paths: Vec<&str> = staged.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec![".hidden", "a.txt"]);
    }

    #[test]
    fn test_add_respects_gitignore() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join(".gitignore"), b"*.log\n").unwrap();
        fs::write(temp_dir.path().join("keep.txt"), b"k").unwrap();
        fs::write(temp_dir.path().join("drop.log"), b"d").unwrap();

        let staged = repo.add_paths(&["."]).unwrap();
        assert!(staged.iter().any(|s| s.path == "keep.txt"));
        assert!(!staged.iter().any(|s| s.path == "drop.log"));
    }

    #[test]
    fn test_re_add_updates_entry() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let file = temp_dir.path().join("a.txt");
        fs::write(&file, b"one").unwrap();
        repo.add_paths(&[&file]).unwrap();
        fs::write(&file, b"two").unwrap();
        repo.add_paths(&[&file]).unwrap();

        let index = repo.load_index().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a.txt").unwrap().hash, Hash::hash_bytes(b"two"));
    }

    #[test]
    fn test_add_nonexistent_path() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let err = repo.add_paths(&["missing.txt"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_add_outside_repository() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path().join("repo")).unwrap();

        let outside = temp_dir.path().join("outside.txt");
        fs::write(&outside, b"x").unwrap();

        let err = repo.add_paths(&[&outside]).unwrap_err();
        assert!(matches!(err, Error::PathOutsideRepository { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_executable_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let script = temp_dir.path().join("script.sh");
        fs::write(&script, b"#!/bin/bash\necho hello").unwrap();
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();

        repo.add_paths(&[&script]).unwrap();
        let index = repo.load_index().unwrap();
        assert_eq!(index.get("script.sh").unwrap().mode, file_modes::EXECUTABLE);
    }
}
