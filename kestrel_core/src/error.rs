//! Error types for kestrel_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using kestrel_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of every [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A missing object, ref, branch, HEAD or repository.
    NotFound,
    /// A name collision (e.g. creating an existing branch).
    AlreadyExists,
    /// The repository is not in a state that permits the operation.
    InvalidState,
    /// Malformed objects, refs, packs or indexes.
    Corruption,
    /// Filesystem failures other than absence.
    Io,
}

/// Errors that can occur during repository operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Object not present loose or in any pack.
    #[error("Object not found: {hash}")]
    ObjectNotFound { hash: String },

    /// Reference (branch or literal name) could not be resolved.
    #[error("Reference not found: {name}")]
    RefNotFound { name: String },

    /// HEAD does not exist or points at a branch without commits.
    #[error("No commits yet: {reason}")]
    NoCommits { reason: String },

    /// No repository metadata directory at the given path.
    #[error("Not a repository: {path}")]
    NotARepository { path: PathBuf },

    /// Branch or repository already exists.
    #[error("Already exists: {what}")]
    AlreadyExists { what: String },

    /// Commit requested with nothing staged.
    #[error("Nothing to commit, index is empty")]
    EmptyIndex,

    /// Commit requested while HEAD points directly at a commit.
    #[error("Cannot commit in detached HEAD state")]
    DetachedHead,

    /// Pack requested with no loose objects present.
    #[error("No loose objects to pack")]
    NoLooseObjects,

    /// Pack would exceed the 32-bit offset ceiling of the index format.
    #[error("Pack too large: {size} bytes exceeds the 4 GiB offset limit")]
    PackTooLarge { size: u64 },

    /// Object bytes are corrupted or could not be decoded.
    #[error("Corrupted object {hash}: {reason}")]
    CorruptedObject { hash: String, reason: String },

    /// A symbolic ref points at a file that does not exist.
    #[error("Broken reference: {name}")]
    BrokenRef { name: String },

    /// Pack or pack index bytes are malformed.
    #[error("Invalid pack {path}: {reason}")]
    InvalidPack { path: PathBuf, reason: String },

    /// Repository metadata (config, index) is malformed.
    #[error("Invalid repository at {path}: {reason}")]
    InvalidRepository { path: PathBuf, reason: String },

    /// Invalid hash format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Invalid reference name.
    #[error("Invalid reference: {reason}")]
    InvalidRef { reason: String },

    /// Invalid tree entry.
    #[error("Invalid tree entry: {reason}")]
    InvalidTreeEntry { reason: String },

    /// Delta instructions are malformed or do not match their base.
    #[error("Invalid delta: {reason}")]
    InvalidDelta { reason: String },

    /// A path handed to `add` lies outside the working tree.
    #[error("Path is outside the repository: {path}")]
    PathOutsideRepository { path: PathBuf },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// JSON encoding or decoding failure.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } => ErrorKind::Io,
            Error::ObjectNotFound { .. }
            | Error::RefNotFound { .. }
            | Error::NoCommits { .. }
            | Error::NotARepository { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::EmptyIndex
            | Error::DetachedHead
            | Error::NoLooseObjects
            | Error::PackTooLarge { .. }
            | Error::InvalidRef { .. }
            | Error::PathOutsideRepository { .. } => ErrorKind::InvalidState,
            Error::CorruptedObject { .. }
            | Error::BrokenRef { .. }
            | Error::InvalidPack { .. }
            | Error::InvalidRepository { .. }
            | Error::InvalidHash { .. }
            | Error::InvalidTreeEntry { .. }
            | Error::InvalidDelta { .. }
            | Error::UnsupportedAlgorithm { .. }
            | Error::Json { .. } => ErrorKind::Corruption,
        }
    }

    /// Create an ObjectNotFound error.
    pub fn object_not_found(hash: impl Into<String>) -> Self {
        Error::ObjectNotFound { hash: hash.into() }
    }

    /// Create a RefNotFound error.
    pub fn ref_not_found(name: impl Into<String>) -> Self {
        Error::RefNotFound { name: name.into() }
    }

    /// Create a NoCommits error.
    pub fn no_commits(reason: impl Into<String>) -> Self {
        Error::NoCommits {
            reason: reason.into(),
        }
    }

    /// Create a NotARepository error.
    pub fn not_a_repository(path: impl Into<PathBuf>) -> Self {
        Error::NotARepository { path: path.into() }
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Error::AlreadyExists { what: what.into() }
    }

    /// Create a CorruptedObject error.
    pub fn corrupted_object(hash: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            hash: hash.into(),
            reason: reason.into(),
        }
    }

    /// Create a BrokenRef error.
    pub fn broken_ref(name: impl Into<String>) -> Self {
        Error::BrokenRef { name: name.into() }
    }

    /// Create an InvalidPack error.
    pub fn invalid_pack(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidPack {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidRepository error.
    pub fn invalid_repository(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidRepository {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an InvalidRef error.
    pub fn invalid_ref(reason: impl Into<String>) -> Self {
        Error::InvalidRef {
            reason: reason.into(),
        }
    }

    /// Create an InvalidTreeEntry error.
    pub fn invalid_tree_entry(reason: impl Into<String>) -> Self {
        Error::InvalidTreeEntry {
            reason: reason.into(),
        }
    }

    /// Create an InvalidDelta error.
    pub fn invalid_delta(reason: impl Into<String>) -> Self {
        Error::InvalidDelta {
            reason: reason.into(),
        }
    }

    /// Create a PathOutsideRepository error.
    pub fn path_outside_repository(path: impl Into<PathBuf>) -> Self {
        Error::PathOutsideRepository { path: path.into() }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}
