//! Repository layout, creation and discovery.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::lock::RepoLock;
use crate::object::{Blob, Commit, Object, Tree};
use crate::refs::{HEAD, HEADS_PREFIX, RefManager};
use crate::staging::Index;
use crate::store::{ObjectStore, write_atomic};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the metadata directory inside the working tree.
pub const META_DIR: &str = ".kestrel";

/// Branch HEAD points at in a new repository.
pub const DEFAULT_BRANCH: &str = "main";

/// A working tree and its metadata directory.
///
/// Every path is derived from the root given at construction; nothing is
/// process-wide.
#[derive(Debug, Clone)]
pub struct Repository {
    work_tree: PathBuf,
    meta_dir: PathBuf,
    objects: ObjectStore,
    config: Config,
}

impl Repository {
    /// Initialize a new repository at the given path.
    ///
    /// Creates:
    /// - `.kestrel/objects/` and `.kestrel/pack/`
    /// - `.kestrel/refs/heads/` and `.kestrel/refs/tags/`
    /// - `config` with defaults
    /// - `HEAD` pointing at the unborn `main` branch
    /// - an empty staging `index`
    pub fn init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        let work_tree = fs::canonicalize(path)?;
        let meta_dir = work_tree.join(META_DIR);

        if meta_dir.exists() {
            return Err(Error::already_exists(format!(
                "repository at {}",
                work_tree.display()
            )));
        }

        for dir in ["objects", "pack", "refs/heads", "refs/tags"] {
            fs::create_dir_all(meta_dir.join(dir))?;
        }

        let config = Config::default();
        config.save(&meta_dir.join("config"))?;

        let head = format!("ref: {}{}", HEADS_PREFIX, DEFAULT_BRANCH);
        write_atomic(&meta_dir.join(HEAD), head.as_bytes(), false)?;
        Index::new().save(&meta_dir.join("index"))?;

        info!(path = %work_tree.display(), "initialized repository");
        Ok(Self::from_parts(work_tree, meta_dir, config))
    }

    /// Open an existing repository whose working tree is `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let work_tree = fs::canonicalize(path).map_err(|_| Error::not_a_repository(path))?;
        let meta_dir = work_tree.join(META_DIR);

        if !meta_dir.is_dir() {
            return Err(Error::not_a_repository(&work_tree));
        }

        let config_path = meta_dir.join("config");
        if !config_path.exists() {
            return Err(Error::invalid_repository(&meta_dir, "config file not found"));
        }
        let config = Config::load(&config_path)?;

        for dir in ["objects", "refs/heads"] {
            if !meta_dir.join(dir).is_dir() {
                return Err(Error::invalid_repository(
                    &meta_dir,
                    format!("{} directory not found", dir),
                ));
            }
        }

        debug!(path = %work_tree.display(), "opened repository");
        Ok(Self::from_parts(work_tree, meta_dir, config))
    }

    /// Open the repository containing `start`, searching parent directories.
    pub fn discover<P: AsRef<Path>>(start: P) -> Result<Self> {
        let start = start.as_ref();
        let start = fs::canonicalize(start).map_err(|_| Error::not_a_repository(start))?;

        for dir in start.ancestors() {
            if dir.join(META_DIR).is_dir() {
                return Self::open(dir);
            }
        }

        Err(Error::not_a_repository(start))
    }

    fn from_parts(work_tree: PathBuf, meta_dir: PathBuf, config: Config) -> Self {
        let objects = ObjectStore::new(meta_dir.join("objects"), meta_dir.join("pack"));
        Self {
            work_tree,
            meta_dir,
            objects,
            config,
        }
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The object store backing this repository.
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// Get a reference manager for this repository.
    pub fn refs(&self) -> RefManager<'_> {
        RefManager::new(&self.meta_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        self.meta_dir.join("index")
    }

    /// Take the repository's exclusive lock.
    pub fn lock(&self) -> Result<RepoLock> {
        RepoLock::acquire(&self.meta_dir.join("lock"))
    }

    pub fn load_index(&self) -> Result<Index> {
        Index::load_or_default(&self.index_path())
    }

    pub fn save_index(&self, index: &Index) -> Result<()> {
        index.save(&self.index_path())
    }

    /// Store an object as a loose object.
    pub fn store(&self, object: &Object) -> Result<Hash> {
        self.objects.store(object)
    }

    /// Load an object's canonical bytes.
    pub fn load(&self, hash: &Hash) -> Result<Vec<u8>> {
        self.objects.load(hash)
    }

    /// Resolve a literal hash, branch name or `HEAD`.
    pub fn resolve_ref(&self, name: &str) -> Result<Hash> {
        self.refs().resolve(name)
    }

    /// Number of loose objects awaiting packing.
    pub fn object_count(&self) -> Result<usize> {
        Ok(self.objects.loose_objects()?.len())
    }

    /// Load an object and decode it as whichever kind it parses as.
    ///
    /// Stored bytes carry no type tag; commits and trees are recognised by
    /// their JSON shape and anything else is a blob.
    pub fn read_object(&self, hash: &Hash) -> Result<Object> {
        let bytes = self.load(hash)?;
        if let Ok(commit) = Commit::decode(&bytes) {
            return Ok(Object::Commit(commit));
        }
        if let Ok(tree) = Tree::decode(&bytes) {
            return Ok(Object::Tree(tree));
        }
        Ok(Object::Blob(Blob::new(bytes)))
    }

    pub fn read_commit(&self, hash: &Hash) -> Result<Commit> {
        self.objects.read_commit(hash)
    }

    pub fn read_tree(&self, hash: &Hash) -> Result<Tree> {
        self.objects.read_tree(hash)
    }
}
