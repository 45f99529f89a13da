//! Random access to objects stored in a pack.

use crate::error::{Error, Result};
use crate::hash::{HASH_SIZE, Hash};
use crate::pack::{PACK_HEADER_LEN, PACK_MAGIC, PACK_VERSION, RecordType, decode_record_header};
use crate::pack_index::PackIndex;
use flate2::read::ZlibDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A record as stored in the pack, before delta resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackRecord {
    /// Canonical object bytes.
    Full(Vec<u8>),
    /// Edit script to apply to the object named by `base`.
    RefDelta { base: Hash, delta: Vec<u8> },
}

/// A pack file paired with its decoded index.
#[derive(Debug, Clone)]
pub struct PackFile {
    pack_path: PathBuf,
    index: PackIndex,
}

impl PackFile {
    /// Open a pack through its `.idx` file.
    ///
    /// The pack's header and trailing checksum are checked against the index
    /// so a mismatched pair is rejected up front.
    pub fn open(index_path: &Path) -> Result<Self> {
        let index = PackIndex::open(index_path)?;
        let pack_path = index_path.with_extension("pack");

        let mut file = File::open(&pack_path)?;
        let len = file.metadata()?.len();
        if len < (PACK_HEADER_LEN + HASH_SIZE) as u64 {
            return Err(Error::invalid_pack(
                &pack_path,
                format!("Pack too short: {} bytes", len),
            ));
        }

        let mut header = [0u8; PACK_HEADER_LEN];
        file.read_exact(&mut header)?;
        if header[0..4] != PACK_MAGIC {
            return Err(Error::invalid_pack(&pack_path, "Invalid pack magic"));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != PACK_VERSION {
            return Err(Error::invalid_pack(
                &pack_path,
                format!("Unsupported pack version: {}", version),
            ));
        }
        let count = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        if count as usize != index.len() {
            return Err(Error::invalid_pack(
                &pack_path,
                format!(
                    "Pack holds {} objects but its index lists {}",
                    count,
                    index.len()
                ),
            ));
        }

        let mut trailer = [0u8; HASH_SIZE];
        file.seek(SeekFrom::End(-(HASH_SIZE as i64)))?;
        file.read_exact(&mut trailer)?;
        if Hash::from_bytes(trailer) != index.pack_checksum() {
            return Err(Error::invalid_pack(
                &pack_path,
                "Pack checksum does not match its index",
            ));
        }

        Ok(Self { pack_path, index })
    }

    pub fn pack_path(&self) -> &Path {
        &self.pack_path
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Checksum naming this pack.
    pub fn hash(&self) -> Hash {
        self.index.pack_checksum()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.index.lookup(hash).is_some()
    }

    /// Read the record for `hash`, or `None` if this pack does not hold it.
    pub fn read_record(&self, hash: &Hash) -> Result<Option<PackRecord>> {
        let Some(offset) = self.index.lookup(hash) else {
            return Ok(None);
        };

        let mut file = File::open(&self.pack_path)?;
        file.seek(SeekFrom::Start(u64::from(offset)))?;
        let mut reader = BufReader::new(file);

        let (kind, size) = decode_record_header(&mut reader)
            .map_err(|e| self.corrupt(hash, format!("Bad record header: {}", e)))?
            .ok_or_else(|| self.corrupt(hash, "Unknown record type"))?;

        let mut payload = Vec::new();
        ZlibDecoder::new(reader)
            .take(size)
            .read_to_end(&mut payload)
            .map_err(|e| self.corrupt(hash, format!("Failed to inflate record: {}", e)))?;
        if payload.len() as u64 != size {
            return Err(self.corrupt(
                hash,
                format!("Record inflated to {} bytes, header says {}", payload.len(), size),
            ));
        }

        match kind {
            RecordType::RefDelta => {
                if payload.len() < HASH_SIZE {
                    return Err(self.corrupt(hash, "Delta record shorter than its base hash"));
                }
                let delta = payload.split_off(HASH_SIZE);
                let base = Hash::from_slice(&payload)?;
                Ok(Some(PackRecord::RefDelta { base, delta }))
            }
            RecordType::Commit | RecordType::Tree | RecordType::Raw => {
                Ok(Some(PackRecord::Full(payload)))
            }
        }
    }

    /// Recompute the pack's checksum over every byte before the trailer.
    pub fn verify(&self) -> Result<()> {
        let file = File::open(&self.pack_path)?;
        let body_len = file.metadata()?.len() - HASH_SIZE as u64;

        let mut hasher = Sha256::new();
        let mut reader = BufReader::new(file).take(body_len);
        let mut buffer = [0u8; 8192];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        let computed = Hash::from_bytes(hasher.finalize().into());
        if computed != self.index.pack_checksum() {
            return Err(Error::invalid_pack(
                &self.pack_path,
                format!("Pack content hashes to {}", computed),
            ));
        }
        Ok(())
    }

    fn corrupt(&self, hash: &Hash, reason: impl Into<String>) -> Error {
        Error::corrupted_object(
            hash.to_hex(),
            format!("{} (in {})", reason.into(), self.pack_path.display()),
        )
    }
}
