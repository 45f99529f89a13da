//! Branches, HEAD and ref resolution.
//!
//! Branch files live at `refs/heads/<name>` and hold a commit hash. `HEAD`
//! holds either `ref: <path>` (one level of indirection, normally to a branch)
//! or a literal commit hash (detached).

use crate::error::{Error, Result};
use crate::hash::{HASH_HEX_LEN, Hash};
use crate::store::write_atomic;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Name of the HEAD file and of the ref that resolves it.
pub const HEAD: &str = "HEAD";

/// Directory, relative to the metadata directory, holding branch files.
pub const HEADS_PREFIX: &str = "refs/heads/";

const SYMBOLIC_PREFIX: &str = "ref: ";

/// Where HEAD points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// `ref: <path>`; the path is relative to the metadata directory.
    Symbolic(String),
    /// A literal commit hash.
    Detached(Hash),
}

impl Head {
    /// Branch name when HEAD points into `refs/heads/`.
    pub fn branch_name(&self) -> Option<&str> {
        match self {
            Head::Symbolic(target) => target.strip_prefix(HEADS_PREFIX),
            Head::Detached(_) => None,
        }
    }
}

/// A branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub hash: Hash,
    /// Whether HEAD points at this branch.
    pub current: bool,
}

/// Reads and writes refs under a repository's metadata directory.
pub struct RefManager<'a> {
    meta_dir: &'a Path,
}

impl<'a> RefManager<'a> {
    pub(crate) fn new(meta_dir: &'a Path) -> Self {
        Self { meta_dir }
    }

    fn head_path(&self) -> PathBuf {
        self.meta_dir.join(HEAD)
    }

    fn heads_dir(&self) -> PathBuf {
        self.meta_dir.join("refs").join("heads")
    }

    /// Get the path to a branch file.
    fn branch_path(&self, name: &str) -> Result<PathBuf> {
        validate_branch_name(name)?;
        Ok(self.heads_dir().join(name))
    }

    /// Resolve a literal hash, branch name or `HEAD` to a commit hash.
    ///
    /// A 64-character name is taken as a literal hash without checking that
    /// the object exists.
    pub fn resolve(&self, name: &str) -> Result<Hash> {
        if name.len() == HASH_HEX_LEN {
            return Hash::from_hex(name);
        }

        if validate_branch_name(name).is_ok()
            && let Some(hash) = self.branch(name)?
        {
            return Ok(hash);
        }

        if name == HEAD {
            return match self.head()? {
                Head::Detached(hash) => Ok(hash),
                Head::Symbolic(target) => self.resolve_symbolic(&target),
            };
        }

        Err(Error::ref_not_found(name))
    }

    /// Resolve `HEAD`, returning `None` when there are no commits yet.
    pub fn resolve_head(&self) -> Result<Option<Hash>> {
        match self.resolve(HEAD) {
            Ok(hash) => Ok(Some(hash)),
            Err(Error::NoCommits { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn resolve_symbolic(&self, target: &str) -> Result<Hash> {
        let path = self.symbolic_path(target)?;
        match read_ref_file(&path, target)? {
            Some(hash) => Ok(hash),
            // A branch without a file is an unborn branch, not a broken one
            None if target.starts_with(HEADS_PREFIX) => Err(Error::no_commits(format!(
                "branch '{}' has no commits",
                &target[HEADS_PREFIX.len()..]
            ))),
            None => Err(Error::broken_ref(target)),
        }
    }

    /// Map an indirection target to a file, refusing anything outside `refs/`.
    fn symbolic_path(&self, target: &str) -> Result<PathBuf> {
        let relative = Path::new(target);
        let contained = target.starts_with("refs/")
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(Error::broken_ref(target));
        }
        Ok(self.meta_dir.join(relative))
    }

    /// Read HEAD.
    pub fn head(&self) -> Result<Head> {
        let content = match fs::read_to_string(self.head_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(Error::no_commits("HEAD does not exist"));
            }
            Err(e) => return Err(e.into()),
        };

        let content = content.trim();
        if let Some(target) = content.strip_prefix(SYMBOLIC_PREFIX) {
            return Ok(Head::Symbolic(target.trim().to_string()));
        }
        Hash::from_hex(content)
            .map(Head::Detached)
            .map_err(|_| Error::broken_ref(HEAD))
    }

    /// Point HEAD at a branch, which need not exist yet.
    pub fn set_head_branch(&self, name: &str) -> Result<()> {
        validate_branch_name(name)?;
        let content = format!("{}{}{}", SYMBOLIC_PREFIX, HEADS_PREFIX, name);
        write_atomic(&self.head_path(), content.as_bytes(), false)?;
        debug!(branch = name, "HEAD now points at branch");
        Ok(())
    }

    /// Point HEAD directly at a commit.
    pub fn set_head_detached(&self, hash: &Hash) -> Result<()> {
        write_atomic(&self.head_path(), hash.to_hex().as_bytes(), false)?;
        debug!(%hash, "HEAD detached");
        Ok(())
    }

    /// Advance whatever HEAD points to.
    ///
    /// Fails with `DetachedHead` when HEAD is a literal hash.
    pub fn update_head_target(&self, hash: &Hash) -> Result<()> {
        match self.head()? {
            Head::Symbolic(target) => {
                let path = self.symbolic_path(&target)?;
                write_atomic(&path, hash.to_hex().as_bytes(), false)?;
                debug!(target = %target, %hash, "updated ref");
                Ok(())
            }
            Head::Detached(_) => Err(Error::DetachedHead),
        }
    }

    /// Get the commit a branch points at.
    pub fn branch(&self, name: &str) -> Result<Option<Hash>> {
        let path = self.branch_path(name)?;
        read_ref_file(&path, name)
    }

    /// Create a branch, failing if it already exists.
    pub fn create_branch(&self, name: &str, hash: &Hash) -> Result<()> {
        let path = self.branch_path(name)?;
        if path.exists() {
            return Err(Error::already_exists(format!("branch '{}'", name)));
        }
        write_atomic(&path, hash.to_hex().as_bytes(), false)?;
        debug!(branch = name, %hash, "created branch");
        Ok(())
    }

    /// Create or move a branch.
    pub fn update_branch(&self, name: &str, hash: &Hash) -> Result<()> {
        let path = self.branch_path(name)?;
        write_atomic(&path, hash.to_hex().as_bytes(), false)?;
        debug!(branch = name, %hash, "updated branch");
        Ok(())
    }

    /// Name of the branch HEAD points at, `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.head()?.branch_name().map(str::to_string))
    }

    /// List all branches sorted by name.
    pub fn list_branches(&self) -> Result<Vec<BranchInfo>> {
        let heads_dir = self.heads_dir();
        let mut branches = Vec::new();

        if !heads_dir.exists() {
            return Ok(branches);
        }

        let current = match self.head() {
            Ok(head) => head.branch_name().map(str::to_string),
            Err(Error::NoCommits { .. }) => None,
            Err(e) => return Err(e),
        };

        for entry in fs::read_dir(&heads_dir)? {
            let path = entry?.path();

            if path.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
                && validate_branch_name(name).is_ok()
                && let Some(hash) = self.branch(name)?
            {
                branches.push(BranchInfo {
                    name: name.to_string(),
                    hash,
                    current: current.as_deref() == Some(name),
                });
            }
        }

        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }
}

/// Read a ref file, returning `None` if it does not exist.
fn read_ref_file(path: &Path, name: &str) -> Result<Option<Hash>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    Hash::from_hex(content.trim())
        .map(Some)
        .map_err(|_| Error::broken_ref(name))
}

/// Validate a branch name: non-empty, no path traversal, not `HEAD`.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_ref("Branch name cannot be empty"));
    }

    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(Error::invalid_ref(format!(
            "Invalid branch name: {} (must not contain .. or path separators)",
            name
        )));
    }

    if name == HEAD || name.starts_with('.') || name.starts_with('-') {
        return Err(Error::invalid_ref(format!("Invalid branch name: {}", name)));
    }

    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::invalid_ref(format!(
            "Invalid branch name: {:?} (must not contain whitespace)",
            name
        )));
    }

    Ok(())
}
