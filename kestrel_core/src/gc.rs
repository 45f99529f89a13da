//! Packing loose objects.

use crate::error::Result;
use crate::hash::Hash;
use crate::pack::PackEncoder;
use crate::repository::Repository;

/// Statistics from a packing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcStats {
    /// Checksum naming the new pack.
    pub pack_hash: Hash,
    /// Number of loose objects moved into the pack.
    pub objects_packed: usize,
    /// How many of those were stored as deltas.
    pub deltas: usize,
    /// Size of the new pack in bytes.
    pub pack_size: u64,
    /// Bytes of loose object files removed.
    pub bytes_freed: u64,
}

impl Repository {
    /// Move every loose object into a new pack.
    ///
    /// Fails with `NoLooseObjects` when there is nothing to pack.
    pub fn gc(&self) -> Result<GcStats> {
        let _lock = self.lock()?;

        let mut encoder = PackEncoder::new(self.objects())?;
        let summary = encoder.pack_objects()?;

        Ok(GcStats {
            pack_hash: summary.hash,
            objects_packed: summary.objects,
            deltas: summary.deltas,
            pack_size: summary.pack_size,
            bytes_freed: summary.loose_bytes_removed,
        })
    }
}
