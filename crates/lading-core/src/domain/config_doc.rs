//! Declarative-config documents and commits against the config store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Revision of the config store a document was read at (e.g. a commit SHA).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreRevision(pub String);

impl std::fmt::Display for StoreRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A config document together with the store revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub path: String,
    pub content: String,
    pub base: StoreRevision,
}

/// Result of an image-tag update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub path: String,
    /// Store revision after the commit (the base when nothing changed).
    pub revision: StoreRevision,
    pub message: String,
    pub changed: bool,
    pub previous_digest: String,
    pub new_digest: String,
}

/// SHA-256 hex digest of document content.
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
