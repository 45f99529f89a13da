//! Pack index format and lookup.
//!
//! ```text
//! 0x0000  4        magic 0xff 't' 'O' 'c'
//! 0x0004  4        version (u32 BE) = 2
//! 0x0008  256*4    cumulative fanout (u32 BE); entry i = objects with first byte <= i
//! 0x0408  N*32     object hashes, sorted
//!         N*4      CRC slots (u32 BE), reserved and written as zero
//!         N*4      pack offsets (u32 BE), parallel to the hash table
//!         32       checksum of the referenced pack
//!         32       SHA-256 of every preceding index byte
//! ```
//!
//! Offsets are 32-bit, so a pack cannot grow past 4 GiB; the encoder enforces
//! this ceiling before anything is written.

use crate::error::{Error, Result};
use crate::hash::{HASH_SIZE, Hash};
use std::path::Path;

/// Magic bytes at the start of every index file.
pub const INDEX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];

/// Current index format version.
pub const INDEX_VERSION: u32 = 2;

const FANOUT_LEN: usize = 256;
const HEADER_LEN: usize = 8 + FANOUT_LEN * 4;
const PER_OBJECT_LEN: usize = HASH_SIZE + 4 + 4;
const TRAILER_LEN: usize = HASH_SIZE * 2;

/// One object's location inside a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackEntry {
    /// Hash of the object.
    pub hash: Hash,
    /// Byte offset of the record header within the pack.
    pub offset: u32,
    /// Reserved integrity slot, currently always zero.
    pub crc: u32,
}

/// A decoded pack index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackIndex {
    fanout: [u32; FANOUT_LEN],
    entries: Vec<PackEntry>,
    pack_checksum: Hash,
}

impl PackIndex {
    /// Build an index from the entries written to a pack.
    pub fn build(mut entries: Vec<PackEntry>, pack_checksum: Hash) -> Self {
        entries.sort_by(|a, b| a.hash.cmp(&b.hash));

        let mut fanout = [0u32; FANOUT_LEN];
        for entry in &entries {
            fanout[entry.hash.first_byte() as usize] += 1;
        }
        for i in 1..FANOUT_LEN {
            fanout[i] += fanout[i - 1];
        }

        Self {
            fanout,
            entries,
            pack_checksum,
        }
    }

    /// Number of objects in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in hash order.
    pub fn entries(&self) -> &[PackEntry] {
        &self.entries
    }

    /// Checksum of the pack this index describes.
    pub fn pack_checksum(&self) -> Hash {
        self.pack_checksum
    }

    /// Locate an object's pack offset.
    ///
    /// The fanout table narrows the search to hashes sharing the leading
    /// byte; that range is then bisected.
    pub fn lookup(&self, hash: &Hash) -> Option<u32> {
        let first = hash.first_byte() as usize;
        let lo = if first == 0 {
            0
        } else {
            self.fanout[first - 1] as usize
        };
        let hi = self.fanout[first] as usize;

        self.entries[lo..hi]
            .binary_search_by(|entry| entry.hash.cmp(hash))
            .ok()
            .map(|i| self.entries[lo + i].offset)
    }

    /// Encode to the on-disk format, including the trailing checksum.
    pub fn encode(&self) -> Vec<u8> {
        let n = self.entries.len();
        let mut buf = Vec::with_capacity(HEADER_LEN + n * PER_OBJECT_LEN + TRAILER_LEN);

        buf.extend_from_slice(&INDEX_MAGIC);
        buf.extend_from_slice(&INDEX_VERSION.to_be_bytes());

        for count in &self.fanout {
            buf.extend_from_slice(&count.to_be_bytes());
        }

        for entry in &self.entries {
            buf.extend_from_slice(entry.hash.as_bytes());
        }

        for entry in &self.entries {
            buf.extend_from_slice(&entry.crc.to_be_bytes());
        }

        for entry in &self.entries {
            buf.extend_from_slice(&entry.offset.to_be_bytes());
        }

        buf.extend_from_slice(self.pack_checksum.as_bytes());

        let checksum = Hash::hash_bytes(&buf);
        buf.extend_from_slice(checksum.as_bytes());

        buf
    }

    /// Decode and validate an index. `path` is used for error context only.
    pub fn decode(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() < HEADER_LEN + TRAILER_LEN {
            return Err(Error::invalid_pack(
                path,
                format!("Index too short: {} bytes", bytes.len()),
            ));
        }

        if bytes[0..4] != INDEX_MAGIC {
            return Err(Error::invalid_pack(
                path,
                format!("Invalid index magic: {:?}", &bytes[0..4]),
            ));
        }

        let version = read_u32(bytes, 4);
        if version != INDEX_VERSION {
            return Err(Error::invalid_pack(
                path,
                format!("Unsupported index version: {}", version),
            ));
        }

        let body_len = bytes.len() - HASH_SIZE;
        let expected = Hash::hash_bytes(&bytes[..body_len]);
        if expected.as_bytes()[..] != bytes[body_len..] {
            return Err(Error::invalid_pack(path, "Index checksum mismatch"));
        }

        let mut fanout = [0u32; FANOUT_LEN];
        for (i, slot) in fanout.iter_mut().enumerate() {
            *slot = read_u32(bytes, 8 + i * 4);
        }
        if fanout.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::invalid_pack(path, "Fanout table is not cumulative"));
        }

        let n = fanout[FANOUT_LEN - 1] as usize;
        let expected_len = HEADER_LEN + n * PER_OBJECT_LEN + TRAILER_LEN;
        if bytes.len() != expected_len {
            return Err(Error::invalid_pack(
                path,
                format!(
                    "Index length mismatch: expected {} bytes for {} objects, got {}",
                    expected_len,
                    n,
                    bytes.len()
                ),
            ));
        }

        let hashes_at = HEADER_LEN;
        let crcs_at = hashes_at + n * HASH_SIZE;
        let offsets_at = crcs_at + n * 4;
        let pack_checksum_at = offsets_at + n * 4;

        let mut entries = Vec::with_capacity(n);
        for i in 0..n {
            let start = hashes_at + i * HASH_SIZE;
            let hash = Hash::from_slice(&bytes[start..start + HASH_SIZE])?;
            entries.push(PackEntry {
                hash,
                crc: read_u32(bytes, crcs_at + i * 4),
                offset: read_u32(bytes, offsets_at + i * 4),
            });
        }

        if entries.windows(2).any(|w| w[0].hash >= w[1].hash) {
            return Err(Error::invalid_pack(path, "Index hashes are not sorted"));
        }

        for (i, entry) in entries.iter().enumerate() {
            let first = entry.hash.first_byte() as usize;
            let lo = if first == 0 { 0 } else { fanout[first - 1] as usize };
            if i < lo || i >= fanout[first] as usize {
                return Err(Error::invalid_pack(
                    path,
                    format!("Fanout table disagrees with hash {}", entry.hash),
                ));
            }
        }

        let pack_checksum = Hash::from_slice(&bytes[pack_checksum_at..pack_checksum_at + HASH_SIZE])?;

        Ok(Self {
            fanout,
            entries,
            pack_checksum,
        })
    }

    /// Read and decode an index file.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes, path)
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_be_bytes(buf)
}
