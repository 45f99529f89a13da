//! Pack file format and the loose-to-pack encoder.
//!
//! ```text
//! "PACK"  u32 BE version = 2  u32 BE object count
//! record*:
//!   header  byte 0: bit 7 continuation, bits 4-6 record type, bits 0-3 size low bits
//!           byte n: bit 7 continuation, bits 0-6 next seven size bits
//!   payload zlib stream of `size` uncompressed bytes
//! SHA-256 of every preceding byte
//! ```
//!
//! Full records carry an object's canonical bytes. Ref-delta records carry the
//! 32-byte base hash followed by an edit script against that base.

use crate::delta::{CopyInsertDelta, DeltaStrategy};
use crate::error::{Error, Result};
use crate::hash::{HASH_SIZE, Hash};
use crate::pack_index::{PackEntry, PackIndex};
use crate::store::{ObjectStore, deflate, sync_dir, write_atomic};
use std::fs;
use std::io::{ErrorKind as IoErrorKind, Read};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Magic bytes at the start of every pack.
pub const PACK_MAGIC: [u8; 4] = *b"PACK";

/// Current pack format version.
pub const PACK_VERSION: u32 = 2;

/// Length of the fixed pack header.
pub const PACK_HEADER_LEN: usize = 12;

/// Kind of record stored in a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Reserved for typed commit records; read as a full record.
    Commit,
    /// Reserved for typed tree records; read as a full record.
    Tree,
    /// Full object bytes.
    Raw,
    /// Edit script against a base identified by hash.
    RefDelta,
}

impl RecordType {
    pub fn tag(self) -> u8 {
        match self {
            RecordType::Commit => 1,
            RecordType::Tree => 2,
            RecordType::Raw => 3,
            RecordType::RefDelta => 7,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(RecordType::Commit),
            2 => Some(RecordType::Tree),
            3 => Some(RecordType::Raw),
            7 => Some(RecordType::RefDelta),
            _ => None,
        }
    }
}

/// Encode a record header for a payload of `size` uncompressed bytes.
pub fn encode_record_header(kind: RecordType, size: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(4);
    let mut byte = (kind.tag() << 4) | (size as u8 & 0x0f);
    let mut rest = size >> 4;
    while rest > 0 {
        out.push(byte | 0x80);
        byte = rest as u8 & 0x7f;
        rest >>= 7;
    }
    out.push(byte);
    out
}

/// Decode a record header, returning the record type and payload size.
///
/// Returns `Ok(None)` for an unknown type tag so callers can attach context.
pub fn decode_record_header<R: Read>(reader: &mut R) -> std::io::Result<Option<(RecordType, u64)>> {
    let mut byte = read_byte(reader)?;
    let tag = (byte >> 4) & 0x07;
    let mut size = u64::from(byte & 0x0f);
    let mut shift = 4;

    while byte & 0x80 != 0 {
        byte = read_byte(reader)?;
        if shift > 57 {
            return Err(std::io::Error::new(
                IoErrorKind::InvalidData,
                "record size overflows 64 bits",
            ));
        }
        size |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }

    Ok(RecordType::from_tag(tag).map(|kind| (kind, size)))
}

fn read_byte<R: Read>(reader: &mut R) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Outcome of a successful packing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    /// Trailing checksum of the pack; also names the pack and index files.
    pub hash: Hash,
    /// Objects written to the pack.
    pub objects: usize,
    /// How many of those were stored as deltas.
    pub deltas: usize,
    /// Total pack size in bytes.
    pub pack_size: u64,
    /// Bytes of loose object files removed after the pack became durable.
    pub loose_bytes_removed: u64,
}

impl PackSummary {
    pub fn pack_file_name(&self) -> String {
        format!("pack-{}.pack", self.hash)
    }

    pub fn index_file_name(&self) -> String {
        format!("pack-{}.idx", self.hash)
    }
}

/// An object already written during the current run, available as a delta base.
struct PackedCandidate {
    hash: Hash,
    data: Vec<u8>,
}

/// Packs every loose object into a single pack and index.
///
/// The set of loose objects is captured at construction; objects stored after
/// that are left loose for the next run. Records are written in hash order,
/// so the same object set always yields the same pack.
pub struct PackEncoder<'a, D: DeltaStrategy = CopyInsertDelta> {
    store: &'a ObjectStore,
    loose: Vec<Hash>,
    strategy: D,
    candidates: Vec<PackedCandidate>,
}

impl<'a> PackEncoder<'a> {
    /// Create an encoder using the default copy/insert delta strategy.
    pub fn new(store: &'a ObjectStore) -> Result<Self> {
        Self::with_strategy(store, CopyInsertDelta)
    }
}

impl<'a, D: DeltaStrategy> PackEncoder<'a, D> {
    /// Create an encoder with a custom delta strategy.
    pub fn with_strategy(store: &'a ObjectStore, strategy: D) -> Result<Self> {
        let loose = store.loose_objects()?;
        debug!(count = loose.len(), "captured loose objects for packing");
        Ok(Self {
            store,
            loose,
            strategy,
            candidates: Vec::new(),
        })
    }

    /// Number of loose objects this encoder will pack.
    pub fn object_count(&self) -> usize {
        self.loose.len()
    }

    /// Write every captured loose object into a new pack, then delete the
    /// loose files.
    ///
    /// The pack and its index are fully durable before any loose file is
    /// removed, so a crash at any point leaves every object readable.
    pub fn pack_objects(&mut self) -> Result<PackSummary> {
        if self.loose.is_empty() {
            return Err(Error::NoLooseObjects);
        }

        let count = u32::try_from(self.loose.len())
            .map_err(|_| Error::PackTooLarge { size: self.loose.len() as u64 })?;

        let mut pack = Vec::new();
        pack.extend_from_slice(&PACK_MAGIC);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&count.to_be_bytes());

        let mut entries = Vec::with_capacity(self.loose.len());
        let mut deltas = 0;

        for hash in self.loose.clone() {
            let data = self
                .store
                .read_loose(&hash)?
                .ok_or_else(|| Error::object_not_found(hash.to_hex()))?;

            let offset = u32::try_from(pack.len())
                .map_err(|_| Error::PackTooLarge { size: pack.len() as u64 })?;

            let (kind, payload) = match self.best_delta(&data) {
                Some((base, script)) => {
                    debug!(%hash, %base, raw = data.len(), delta = script.len(), "delta record");
                    let mut payload = Vec::with_capacity(HASH_SIZE + script.len());
                    payload.extend_from_slice(base.as_bytes());
                    payload.extend_from_slice(&script);
                    deltas += 1;
                    (RecordType::RefDelta, payload)
                }
                None => (RecordType::Raw, data.clone()),
            };

            pack.extend_from_slice(&encode_record_header(kind, payload.len() as u64));
            pack.extend_from_slice(&deflate(&payload)?);
            entries.push(PackEntry {
                hash,
                offset,
                crc: 0,
            });

            self.candidates.push(PackedCandidate { hash, data });
        }

        let checksum = Hash::hash_bytes(&pack);
        pack.extend_from_slice(checksum.as_bytes());
        let pack_size = pack.len() as u64;
        if pack_size > u64::from(u32::MAX) {
            return Err(Error::PackTooLarge { size: pack_size });
        }

        let summary_names = PackSummary {
            hash: checksum,
            objects: entries.len(),
            deltas,
            pack_size,
            loose_bytes_removed: 0,
        };
        let pack_dir = self.store.pack_dir().to_path_buf();
        let pack_path = pack_dir.join(summary_names.pack_file_name());
        let index_path = pack_dir.join(summary_names.index_file_name());

        write_atomic(&pack_path, &pack, true)?;
        let index = PackIndex::build(entries, checksum);
        write_atomic(&index_path, &index.encode(), true)?;
        sync_dir(&pack_dir)?;
        info!(
            pack = %pack_path.display(),
            objects = summary_names.objects,
            deltas,
            bytes = pack_size,
            "wrote pack"
        );

        let loose_bytes_removed = self.remove_loose();
        self.loose.clear();
        self.candidates.clear();

        Ok(PackSummary {
            loose_bytes_removed,
            ..summary_names
        })
    }

    /// Pick the base producing the smallest edit script, if any script is
    /// smaller than the raw bytes.
    fn best_delta(&self, data: &[u8]) -> Option<(Hash, Vec<u8>)> {
        let lower = data.len() / 2;
        let upper = data.len().saturating_mul(2);
        let mut best: Option<(Hash, Vec<u8>)> = None;

        for candidate in &self.candidates {
            let size = candidate.data.len();
            if size < lower || size > upper {
                continue;
            }
            let Some(script) = self.strategy.propose_delta(&candidate.data, data) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, current)| script.len() < current.len()) {
                best = Some((candidate.hash, script));
            }
        }

        best.filter(|(_, script)| HASH_SIZE + script.len() < data.len())
    }

    /// Delete the packed loose files and any shard directories left empty.
    ///
    /// Failures here leave redundant copies behind, which is harmless, so
    /// they are logged rather than returned.
    fn remove_loose(&self) -> u64 {
        let mut removed = 0u64;
        let mut shards: Vec<PathBuf> = Vec::new();

        for hash in &self.loose {
            let path = self.store.object_path(hash);
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(&path) {
                Ok(()) => removed += size,
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => {
                    warn!(%hash, error = %e, "failed to remove packed loose object");
                    continue;
                }
            }
            if let Some(shard) = path.parent() {
                if !shards.iter().any(|s| s == shard) {
                    shards.push(shard.to_path_buf());
                }
            }
        }

        for shard in shards {
            let is_empty = fs::read_dir(&shard)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if is_empty {
                if let Err(e) = fs::remove_dir(&shard) {
                    warn!(shard = %shard.display(), error = %e, "failed to remove empty shard");
                }
            }
        }

        removed
    }
}
