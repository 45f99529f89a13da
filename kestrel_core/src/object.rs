//! Immutable object model: blobs, trees and commits.
//!
//! Every object is identified by the SHA-256 digest of its canonical
//! serialization:
//!
//! ```text
//! blob    raw content bytes
//! tree    JSON array of {"mode","name","hash","type"} in the order given
//! commit  JSON object {"tree","parent"?,"author","email","timestamp","message"}
//! ```
//!
//! Tree identity is order-sensitive: entries are never sorted. Commit fields
//! are always emitted in the fixed order above; `parent` is omitted for root
//! commits.

use crate::error::{Error, Result};
use crate::hash::Hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File mode strings recorded in tree and index entries.
pub mod file_modes {
    /// Regular file (non-executable).
    pub const REGULAR: &str = "100644";

    /// Executable file.
    pub const EXECUTABLE: &str = "100755";
}

/// The three object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Snapshot with metadata and parent link.
    Commit,
}

impl ObjectKind {
    /// Get the string name of this object kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }
}

/// Raw file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    content: Vec<u8>,
    hash: Hash,
}

impl Blob {
    /// Create a blob, hashing its content.
    pub fn new(content: Vec<u8>) -> Self {
        let hash = Hash::hash_bytes(&content);
        Self { content, hash }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }
}

/// Kind of object a tree entry points at. Trees are flat; only blobs are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
}

/// An entry in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Permission string (`100644` or `100755`).
    pub mode: String,
    /// Repository-relative path using `/` separators.
    pub name: String,
    /// Hash of the referenced blob.
    pub hash: Hash,
    /// Kind of the referenced object.
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl TreeEntry {
    /// Create a new blob entry, validating mode and name.
    pub fn new(mode: impl Into<String>, name: impl Into<String>, hash: Hash) -> Result<Self> {
        let entry = Self {
            mode: mode.into(),
            name: name.into(),
            hash,
            kind: EntryKind::Blob,
        };
        entry.validate()?;
        Ok(entry)
    }

    fn validate(&self) -> Result<()> {
        if self.mode != file_modes::REGULAR && self.mode != file_modes::EXECUTABLE {
            return Err(Error::invalid_tree_entry(format!(
                "Unsupported mode {} for {}",
                self.mode, self.name
            )));
        }

        if self.name.is_empty() {
            return Err(Error::invalid_tree_entry("Name cannot be empty"));
        }

        if self.name.contains('\0') {
            return Err(Error::invalid_tree_entry("Name cannot contain null bytes"));
        }

        if self.name.starts_with('/')
            || self
                .name
                .split('/')
                .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(Error::invalid_tree_entry(format!(
                "Name must be a normalized relative path: {}",
                self.name
            )));
        }

        Ok(())
    }
}

/// An ordered directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
    encoded: Vec<u8>,
    hash: Hash,
}

impl Tree {
    /// Create a tree from entries in the exact order given.
    pub fn new(entries: Vec<TreeEntry>) -> Result<Self> {
        let encoded = serde_json::to_vec(&entries)?;
        let hash = Hash::hash_bytes(&encoded);
        Ok(Self {
            entries,
            encoded,
            hash,
        })
    }

    /// Decode a tree from its canonical serialization.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let hash = Hash::hash_bytes(bytes);
        let entries: Vec<TreeEntry> = serde_json::from_slice(bytes)
            .map_err(|e| Error::corrupted_object(hash.to_hex(), format!("Invalid tree: {}", e)))?;
        for entry in &entries {
            entry.validate()?;
        }
        Ok(Self {
            entries,
            encoded: bytes.to_vec(),
            hash,
        })
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn serialize(&self) -> &[u8] {
        &self.encoded
    }
}

#[derive(Serialize)]
struct CommitRecord<'a> {
    tree: &'a Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a Hash>,
    author: &'a str,
    email: &'a str,
    timestamp: &'a DateTime<Utc>,
    message: &'a str,
}

#[derive(Deserialize)]
struct OwnedCommitRecord {
    tree: Hash,
    #[serde(default)]
    parent: Option<Hash>,
    author: String,
    email: String,
    timestamp: DateTime<Utc>,
    message: String,
}

/// A snapshot of the staged tree with authorship and a single parent link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    tree: Hash,
    parent: Option<Hash>,
    author: String,
    email: String,
    timestamp: DateTime<Utc>,
    message: String,
    encoded: Vec<u8>,
    hash: Hash,
}

impl Commit {
    /// Create a commit stamped with the current time.
    pub fn new(
        tree: Hash,
        parent: Option<Hash>,
        author: impl Into<String>,
        email: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self> {
        Self::new_at(tree, parent, author, email, message, Utc::now())
    }

    /// Create a commit with an explicit timestamp.
    pub fn new_at(
        tree: Hash,
        parent: Option<Hash>,
        author: impl Into<String>,
        email: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let mut commit = Self {
            tree,
            parent,
            author: author.into(),
            email: email.into(),
            timestamp,
            message: message.into(),
            encoded: Vec::new(),
            hash: Hash::from_bytes([0; 32]),
        };
        commit.rehash()?;
        Ok(commit)
    }

    /// Return a copy with a replaced message and a freshly computed hash.
    ///
    /// Signers append their signature through this; the old hash is never
    /// carried over.
    pub fn with_message(&self, message: impl Into<String>) -> Result<Self> {
        let mut commit = self.clone();
        commit.message = message.into();
        commit.rehash()?;
        Ok(commit)
    }

    fn rehash(&mut self) -> Result<()> {
        let record = CommitRecord {
            tree: &self.tree,
            parent: self.parent.as_ref(),
            author: &self.author,
            email: &self.email,
            timestamp: &self.timestamp,
            message: &self.message,
        };
        self.encoded = serde_json::to_vec(&record)?;
        self.hash = Hash::hash_bytes(&self.encoded);
        Ok(())
    }

    /// Decode a commit from its canonical serialization.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let hash = Hash::hash_bytes(bytes);
        let record: OwnedCommitRecord = serde_json::from_slice(bytes).map_err(|e| {
            Error::corrupted_object(hash.to_hex(), format!("Invalid commit: {}", e))
        })?;
        Ok(Self {
            tree: record.tree,
            parent: record.parent,
            author: record.author,
            email: record.email,
            timestamp: record.timestamp,
            message: record.message,
            encoded: bytes.to_vec(),
            hash,
        })
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn tree(&self) -> Hash {
        self.tree
    }

    /// Parent commit, `None` for a root commit.
    pub fn parent(&self) -> Option<Hash> {
        self.parent
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn serialize(&self) -> &[u8] {
        &self.encoded
    }
}

/// Any storable object. The set of kinds is closed; adding one is a format change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    /// Content hash of the object.
    pub fn hash(&self) -> Hash {
        match self {
            Object::Blob(blob) => blob.hash(),
            Object::Tree(tree) => tree.hash(),
            Object::Commit(commit) => commit.hash(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Blob(_) => ObjectKind::Blob,
            Object::Tree(_) => ObjectKind::Tree,
            Object::Commit(_) => ObjectKind::Commit,
        }
    }

    /// Canonical bytes; their digest is [`Object::hash`].
    pub fn serialize(&self) -> &[u8] {
        match self {
            Object::Blob(blob) => blob.content(),
            Object::Tree(tree) => tree.serialize(),
            Object::Commit(commit) => commit.serialize(),
        }
    }
}

impl From<Blob> for Object {
    fn from(blob: Blob) -> Self {
        Object::Blob(blob)
    }
}

impl From<Tree> for Object {
    fn from(tree: Tree) -> Self {
        Object::Tree(tree)
    }
}

impl From<Commit> for Object {
    fn from(commit: Commit) -> Self {
        Object::Commit(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str, content: &[u8]) -> TreeEntry {
        TreeEntry::new(file_modes::REGULAR, name, Hash::hash_bytes(content)).unwrap()
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_blob_hash_is_content_digest() {
        let blob = Blob::new(b"hello".to_vec());
        assert_eq!(
            blob.hash().to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(Object::from(blob).serialize(), b"hello");
    }

    #[test]
    fn test_tree_serialization_shape() {
        let tree = Tree::new(vec![entry("a.txt", b"hello")]).unwrap();
        let json: serde_json::Value = serde_json::from_slice(tree.serialize()).unwrap();
        let first = &json[0];
        assert_eq!(first["mode"], "100644");
        assert_eq!(first["name"], "a.txt");
        assert_eq!(first["type"], "blob");
        assert_eq!(first["hash"], Hash::hash_bytes(b"hello").to_hex());
        assert_eq!(tree.hash(), Hash::hash_bytes(tree.serialize()));
    }

    #[test]
    fn test_tree_order_sensitive() {
        let a = entry("a.txt", b"a");
        let b = entry("b.txt", b"b");
        let ab = Tree::new(vec![a.clone(), b.clone()]).unwrap();
        let ba = Tree::new(vec![b, a]).unwrap();
        assert_ne!(ab.hash(), ba.hash());
        // No implicit sort
        assert_eq!(ba.entries()[0].name, "b.txt");
    }

    #[test]
    fn test_tree_decode_preserves_hash() {
        let tree = Tree::new(vec![entry("dir/x.rs", b"x"), entry("a", b"y")]).unwrap();
        let decoded = Tree::decode(tree.serialize()).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_tree_decode_rejects_garbage() {
        let err = Tree::decode(b"not json").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Corruption);
    }

    #[test]
    fn test_entry_name_validation() {
        let hash = Hash::hash_bytes(b"test");
        assert!(TreeEntry::new(file_modes::REGULAR, "", hash).is_err());
        assert!(TreeEntry::new(file_modes::REGULAR, "a\0b", hash).is_err());
        assert!(TreeEntry::new(file_modes::REGULAR, "/etc/passwd", hash).is_err());
        assert!(TreeEntry::new(file_modes::REGULAR, "../up", hash).is_err());
        assert!(TreeEntry::new(file_modes::REGULAR, "a//b", hash).is_err());
        assert!(TreeEntry::new("040000", "dir", hash).is_err());
        assert!(TreeEntry::new(file_modes::EXECUTABLE, "bin/run.sh", hash).is_ok());
    }

    #[test]
    fn test_commit_root_omits_parent() {
        let tree = Hash::hash_bytes(b"tree");
        let commit =
            Commit::new_at(tree, None, "User", "user@example.com", "init", fixed_time()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(commit.serialize()).unwrap();
        assert!(json.get("parent").is_none());
        assert_eq!(json["tree"], tree.to_hex());
        assert_eq!(commit.parent(), None);
    }

    #[test]
    fn test_commit_field_order_fixed() {
        let parent = Hash::hash_bytes(b"parent");
        let commit = Commit::new_at(
            Hash::hash_bytes(b"tree"),
            Some(parent),
            "User",
            "user@example.com",
            "msg",
            fixed_time(),
        )
        .unwrap();
        let text = String::from_utf8(commit.serialize().to_vec()).unwrap();
        let positions: Vec<usize> = [
            "\"tree\"",
            "\"parent\"",
            "\"author\"",
            "\"email\"",
            "\"timestamp\"",
            "\"message\"",
        ]
        .iter()
        .map(|k| text.find(k).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_commit_decode_roundtrip() {
        let commit = Commit::new(
            Hash::hash_bytes(b"tree"),
            Some(Hash::hash_bytes(b"p")),
            "User",
            "user@example.com",
            "second",
        )
        .unwrap();
        let decoded = Commit::decode(commit.serialize()).unwrap();
        assert_eq!(decoded.hash(), commit.hash());
        assert_eq!(decoded.parent(), commit.parent());
        assert_eq!(decoded.timestamp(), commit.timestamp());
    }

    #[test]
    fn test_commit_with_message_rehashes() {
        let commit = Commit::new_at(
            Hash::hash_bytes(b"tree"),
            None,
            "User",
            "user@example.com",
            "msg",
            fixed_time(),
        )
        .unwrap();
        let signed = commit
            .with_message(format!("{}\n\nsignature: abc", commit.message()))
            .unwrap();
        assert_ne!(signed.hash(), commit.hash());
        assert_eq!(signed.hash(), Hash::hash_bytes(signed.serialize()));
    }

    #[test]
    fn test_object_kind_dispatch() {
        let blob: Object = Blob::new(b"x".to_vec()).into();
        let tree: Object = Tree::new(vec![]).unwrap().into();
        assert_eq!(blob.kind(), ObjectKind::Blob);
        assert_eq!(tree.kind().as_str(), "tree");
        assert_eq!(tree.serialize(), b"[]");
    }

    // Property-based tests
    use proptest::prelude::*;

    fn arb_entry() -> impl Strategy<Value = TreeEntry> {
        (
            "[a-z0-9_]{1,12}(/[a-z0-9_]{1,12}){0,2}",
            prop::array::uniform32(any::<u8>()),
        )
            .prop_map(|(name, bytes)| {
                TreeEntry::new(file_modes::REGULAR, name, Hash::from_bytes(bytes)).unwrap()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Blob hashing is reproducible
        #[test]
        fn prop_blob_hash_deterministic(data: Vec<u8>) {
            prop_assert_eq!(Blob::new(data.clone()).hash(), Blob::new(data).hash());
        }

        /// Any reordering of distinct entries changes the tree hash
        #[test]
        fn prop_tree_reorder_changes_hash(
            entries in prop::collection::vec(arb_entry(), 2..8),
            rotate in 1usize..8,
        ) {
            let mut reordered = entries.clone();
            let len = reordered.len();
            reordered.rotate_left(rotate % len);
            prop_assume!(reordered != entries);

            let original = Tree::new(entries)?;
            let shuffled = Tree::new(reordered)?;
            prop_assert_ne!(original.hash(), shuffled.hash());
        }
    }
}
