//! # Kestrel Core
//!
//! A content-addressed version-control object store using SHA-256 hashing.
//!
//! Files are stored as blobs, snapshots as ordered trees, and history as a
//! linear chain of commits. New objects are written loose (one DEFLATE
//! compressed file each) and later batched into packs, where similar objects
//! are stored as deltas against one another.
//!
//! ## Features
//!
//! - Content-addressed blobs, trees and commits with deterministic hashes
//! - Loose object store sharded by hash prefix
//! - Pack files with reference deltas and a fanout-indexed lookup table
//! - Branches, HEAD indirection and detached HEAD
//! - Staging index, commit, checkout and history
//! - Commit search by author and message across every stored object
//!
//! ## Example
//!
//! ```no_run
//! use kestrel_core::Repository;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Initialize a repository
//! let repo = Repository::init("./my-project")?;
//!
//! // Stage files and commit them
//! repo.add_paths(&["README.md"])?;
//! let commit = repo.commit("Initial commit")?;
//!
//! // Branch, then walk history
//! repo.create_branch("feature")?;
//! for entry in repo.history()? {
//!     let (hash, commit) = entry?;
//!     println!("{} {}", hash.short(), commit.message());
//! }
//!
//! // Move loose objects into a pack
//! let stats = repo.gc()?;
//! println!("Packed {} objects", stats.objects_packed);
//! # let _ = commit;
//! # Ok(())
//! # }
//! ```

mod branch;
mod checkout;
mod commit;
mod config;
mod delta;
mod error;
mod gc;
mod hash;
mod history;
mod lock;
mod object;
mod pack;
mod pack_index;
mod pack_reader;
mod refs;
mod repository;
mod search;
mod staging;
mod store;
mod walk;

pub use config::{Config, UserConfig};
pub use delta::{CopyInsertDelta, DeltaStrategy, apply_delta};
pub use error::{Error, ErrorKind, Result};
pub use gc::GcStats;
pub use hash::{Algorithm, HASH_HEX_LEN, HASH_SIZE, Hash};
pub use history::History;
pub use lock::RepoLock;
pub use object::{Blob, Commit, EntryKind, Object, ObjectKind, Tree, TreeEntry, file_modes};
pub use pack::{PackEncoder, PackSummary, RecordType};
pub use pack_index::{PackEntry, PackIndex};
pub use pack_reader::{PackFile, PackRecord};
pub use refs::{BranchInfo, Head, RefManager};
pub use repository::{META_DIR, Repository};
pub use search::CommitFilter;
pub use staging::{Index, IndexEntry};
pub use store::ObjectStore;
pub use walk::StagedFile;
