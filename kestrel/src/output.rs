//! Output formatting for CLI commands.
//!
//! Every command reports either human-readable text or a JSON document.

use anyhow::Result;
use chrono::{DateTime, Utc};
use kestrel_core::Hash;
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write `data` as JSON, or the text produced by `text_fn`.
    ///
    /// `text_fn` only runs in text mode.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(out, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(out, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error to stderr in the selected format.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init`.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub meta_dir: String,
    pub algorithm: String,
}

/// File staged by `add`.
#[derive(Debug, Clone, Serialize)]
pub struct StagedInfo {
    pub path: String,
    pub hash: Hash,
}

/// Output for `add`.
#[derive(Debug, Serialize)]
pub struct AddOutput {
    pub success: bool,
    pub result_code: u8,
    pub staged: Vec<StagedInfo>,
}

/// Output for `commit`.
#[derive(Debug, Serialize)]
pub struct CommitOutput {
    pub success: bool,
    pub result_code: u8,
    pub hash: Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub message: String,
}

/// Branch listed by `branch`.
#[derive(Debug, Clone, Serialize)]
pub struct BranchEntry {
    pub name: String,
    pub hash: Hash,
    pub current: bool,
}

/// Output for `branch` without a name.
#[derive(Debug, Serialize)]
pub struct BranchListOutput {
    pub success: bool,
    pub result_code: u8,
    pub branches: Vec<BranchEntry>,
}

/// Output for `branch <name>`.
#[derive(Debug, Serialize)]
pub struct BranchCreateOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub hash: Hash,
}

/// Output for `checkout`.
#[derive(Debug, Serialize)]
pub struct CheckoutOutput {
    pub success: bool,
    pub result_code: u8,
    pub hash: Hash,
    /// Branch HEAD now follows; absent when detached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Commit shown by `log`.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub hash: Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Hash>,
    pub author: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Output for `log`.
#[derive(Debug, Serialize)]
pub struct LogOutput {
    pub success: bool,
    pub result_code: u8,
    pub commits: Vec<LogEntry>,
}

/// Output for `search`.
#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub success: bool,
    pub result_code: u8,
    pub commits: Vec<LogEntry>,
}

/// Output for `gc`.
#[derive(Debug, Serialize)]
pub struct GcOutput {
    pub success: bool,
    pub result_code: u8,
    pub pack_hash: Hash,
    pub objects_packed: usize,
    pub deltas: usize,
    pub pack_size: u64,
    pub bytes_freed: u64,
}

/// Tree entry shown by `cat-object`.
#[derive(Debug, Clone, Serialize)]
pub struct TreeEntryInfo {
    pub mode: String,
    pub name: String,
    pub hash: Hash,
}

/// Commit fields shown by `cat-object`.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub tree: Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Hash>,
    pub author: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Data variants for `cat-object`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObjectData {
    Blob {
        size: u64,
        /// Content decoded as UTF-8, with invalid sequences replaced.
        content: String,
    },
    Tree {
        entries: Vec<TreeEntryInfo>,
    },
    Commit(CommitInfo),
}

/// Output for `cat-object`.
#[derive(Debug, Serialize)]
pub struct CatObjectOutput {
    pub success: bool,
    pub result_code: u8,
    pub hash: Hash,
    #[serde(flatten)]
    pub data: ObjectData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_data_is_tagged() {
        let output = CatObjectOutput {
            success: true,
            result_code: 0,
            hash: Hash::hash_bytes(b"x"),
            data: ObjectData::Blob {
                size: 1,
                content: "x".to_string(),
            },
        };
        let json: serde_json::Value = serde_json::to_value(&output).unwrap();
        assert_eq!(json["type"], "blob");
        assert_eq!(json["size"], 1);
        assert_eq!(json["hash"], Hash::hash_bytes(b"x").to_hex());
    }

    #[test]
    fn test_commit_object_lists_tree() {
        let tree = Hash::hash_bytes(b"tree");
        let output = CatObjectOutput {
            success: true,
            result_code: 0,
            hash: Hash::hash_bytes(b"commit"),
            data: ObjectData::Commit(CommitInfo {
                tree,
                parent: None,
                author: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                timestamp: Utc::now(),
                message: "first".to_string(),
            }),
        };
        let json = serde_json::to_string(&output).unwrap();
        assert_eq!(json.matches("\"hash\"").count(), 1);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "commit");
        assert_eq!(value["tree"], tree.to_hex());
        assert!(value.get("parent").is_none());
    }

    #[test]
    fn test_detached_checkout_omits_branch() {
        let output = CheckoutOutput {
            success: true,
            result_code: 0,
            hash: Hash::hash_bytes(b"c"),
            branch: None,
        };
        let json: serde_json::Value = serde_json::to_value(&output).unwrap();
        assert!(json.get("branch").is_none());
    }
}
