//! Loose object storage and object lookup.
//!
//! Loose objects live at `objects/<first 2 hex chars>/<remaining 62>` and
//! contain the zlib-wrapped DEFLATE stream of the object's canonical bytes.
//! Lookups that miss the loose set fall through to every pack in `pack/`.

use crate::delta::apply_delta;
use crate::error::{Error, ErrorKind, Result};
use crate::hash::{HASH_HEX_LEN, Hash};
use crate::object::{Commit, Object, Tree};
use crate::pack_reader::{PackFile, PackRecord};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Longest delta chain followed before the pack is declared corrupt.
const MAX_DELTA_DEPTH: usize = 64;

/// Content-addressed object storage rooted at a repository's metadata directory.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    objects_dir: PathBuf,
    pack_dir: PathBuf,
    /// Packs already opened, keyed by index path. Shared between clones.
    pack_cache: Arc<Mutex<Vec<(PathBuf, Arc<PackFile>)>>>,
}

impl ObjectStore {
    /// Create a store over existing `objects/` and `pack/` directories.
    pub fn new(objects_dir: impl Into<PathBuf>, pack_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
            pack_dir: pack_dir.into(),
            pack_cache: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn pack_dir(&self) -> &Path {
        &self.pack_dir
    }

    /// Get the path to a loose object file given its hash.
    ///
    /// Returns: `objects/{prefix}/{suffix}`
    pub fn object_path(&self, hash: &Hash) -> PathBuf {
        self.objects_dir.join(hash.prefix()).join(hash.suffix())
    }

    /// Store an object as a loose object, returning its hash.
    ///
    /// Storing an object that already exists loose leaves the existing file
    /// untouched; identical hashes imply identical bytes.
    pub fn store(&self, object: &Object) -> Result<Hash> {
        let hash = object.hash();
        let obj_path = self.object_path(&hash);
        if obj_path.exists() {
            debug!(%hash, kind = object.kind().as_str(), "loose object already present");
            return Ok(hash);
        }

        let compressed = deflate(object.serialize())?;
        write_atomic(&obj_path, &compressed, false)?;
        debug!(
            %hash,
            kind = object.kind().as_str(),
            size = object.serialize().len(),
            "stored loose object"
        );
        Ok(hash)
    }

    /// Load an object's canonical bytes, checking loose objects first and
    /// then every pack.
    pub fn load(&self, hash: &Hash) -> Result<Vec<u8>> {
        self.load_at_depth(hash, 0)
    }

    /// Whether the object can be found loose or in a pack.
    pub fn contains(&self, hash: &Hash) -> Result<bool> {
        match self.load(hash) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Load and decode a tree.
    pub fn read_tree(&self, hash: &Hash) -> Result<Tree> {
        Tree::decode(&self.load(hash)?)
    }

    /// Load and decode a commit.
    pub fn read_commit(&self, hash: &Hash) -> Result<Commit> {
        Commit::decode(&self.load(hash)?)
    }

    fn load_at_depth(&self, hash: &Hash, depth: usize) -> Result<Vec<u8>> {
        if let Some(data) = self.read_loose(hash)? {
            debug!(%hash, "loaded loose object");
            return Ok(data);
        }

        for pack in self.packs()? {
            if let Some(record) = pack.read_record(hash)? {
                debug!(%hash, pack = %pack.pack_path().display(), "loaded packed object");
                return self.resolve_record(hash, record, depth);
            }
        }

        Err(Error::object_not_found(hash.to_hex()))
    }

    fn resolve_record(&self, hash: &Hash, record: PackRecord, depth: usize) -> Result<Vec<u8>> {
        let data = match record {
            PackRecord::Full(data) => data,
            PackRecord::RefDelta { base, delta } => {
                if depth >= MAX_DELTA_DEPTH {
                    return Err(Error::corrupted_object(
                        hash.to_hex(),
                        format!("Delta chain deeper than {}", MAX_DELTA_DEPTH),
                    ));
                }
                let base_data = self.load_at_depth(&base, depth + 1)?;
                apply_delta(&base_data, &delta).map_err(|e| {
                    Error::corrupted_object(hash.to_hex(), format!("Delta against {}: {}", base, e))
                })?
            }
        };

        verify_hash(hash, &data)?;
        Ok(data)
    }

    /// Read a loose object, returning `None` if it is not stored loose.
    pub(crate) fn read_loose(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        let obj_path = self.object_path(hash);
        let compressed = match fs::read(&obj_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let data = inflate(&compressed)
            .map_err(|e| Error::corrupted_object(hash.to_hex(), format!("Failed to inflate: {}", e)))?;
        verify_hash(hash, &data)?;
        Ok(Some(data))
    }

    /// Hashes of every loose object currently on disk, sorted.
    pub fn loose_objects(&self) -> Result<Vec<Hash>> {
        let mut hashes = Vec::new();
        if !self.objects_dir.exists() {
            return Ok(hashes);
        }

        for shard_entry in fs::read_dir(&self.objects_dir)? {
            let shard_entry = shard_entry?;
            let shard_path = shard_entry.path();
            if !shard_path.is_dir() {
                continue;
            }
            let prefix = match shard_path.file_name().and_then(|n| n.to_str()) {
                Some(name) if name.len() == 2 => name.to_string(),
                _ => continue,
            };

            for obj_entry in fs::read_dir(&shard_path)? {
                let obj_entry = obj_entry?;
                let obj_path = obj_entry.path();
                if !obj_path.is_file() {
                    continue;
                }
                let suffix = match obj_path.file_name().and_then(|n| n.to_str()) {
                    Some(name) if name.len() == HASH_HEX_LEN - 2 => name,
                    _ => continue,
                };

                // Temp files and stray names are not hex and fail to parse.
                if let Ok(hash) = Hash::from_hex(&format!("{}{}", prefix, suffix)) {
                    hashes.push(hash);
                }
            }
        }

        hashes.sort();
        Ok(hashes)
    }

    /// Every object hash stored loose or in a readable pack, deduplicated.
    pub fn object_hashes(&self) -> Result<BTreeSet<Hash>> {
        let mut hashes: BTreeSet<Hash> = self.loose_objects()?.into_iter().collect();
        for pack in self.packs()? {
            hashes.extend(pack.index().entries().iter().map(|entry| entry.hash));
        }
        Ok(hashes)
    }

    /// Open every readable pack, ordered by file name.
    ///
    /// Packs are named by their checksum, so an index path seen before maps
    /// to the same pack and is served from the cache. Packs whose index
    /// cannot be read are skipped with a warning so one damaged pack does
    /// not hide objects stored elsewhere.
    pub fn packs(&self) -> Result<Vec<Arc<PackFile>>> {
        let mut index_paths = Vec::new();
        match fs::read_dir(&self.pack_dir) {
            Ok(entries) => {
                for entry in entries {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("idx") {
                        index_paths.push(path);
                    }
                }
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }
        index_paths.sort();

        let mut cache = self
            .pack_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut packs = Vec::with_capacity(index_paths.len());
        let mut opened = Vec::with_capacity(index_paths.len());
        for index_path in index_paths {
            let cached = cache
                .iter()
                .find(|(path, _)| *path == index_path)
                .map(|(_, pack)| Arc::clone(pack));
            let pack = match cached {
                Some(pack) => pack,
                None => match PackFile::open(&index_path) {
                    Ok(pack) => {
                        debug!(index = %index_path.display(), "opened pack");
                        Arc::new(pack)
                    }
                    Err(e) => {
                        warn!(index = %index_path.display(), error = %e, "skipping unreadable pack");
                        continue;
                    }
                },
            };
            opened.push((index_path, Arc::clone(&pack)));
            packs.push(pack);
        }
        // Packs removed from disk drop out of the cache here.
        *cache = opened;
        Ok(packs)
    }
}

fn verify_hash(hash: &Hash, data: &[u8]) -> Result<()> {
    let computed = Hash::hash_bytes(data);
    if computed != *hash {
        return Err(Error::corrupted_object(
            hash.to_hex(),
            format!("Hash mismatch: content hashes to {}", computed),
        ));
    }
    Ok(())
}

/// Compress data with zlib-wrapped DEFLATE.
pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a complete zlib-wrapped DEFLATE stream.
pub(crate) fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Write a file atomically using a temp file in the destination directory.
///
/// With `durable`, the data is synced to disk before the rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], durable: bool) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Io {
            source: std::io::Error::other(format!("No parent directory for {}", path.display())),
        })?;
    fs::create_dir_all(parent)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    if durable {
        temp_file.as_file().sync_all()?;
    }
    temp_file.persist(path)?;
    Ok(())
}

/// Flush directory metadata so renames into it survive a crash.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
