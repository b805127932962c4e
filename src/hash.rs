//! Content hashing for schema deduplication

use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256 digest of schema text, used as the durable dedup key
///
/// Hashes the UTF-8 bytes verbatim; no normalization, so texts that differ
/// only in whitespace are distinct schemas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash schema text
    pub fn of(schema: &str) -> Self {
        let digest = Sha256::digest(schema.as_bytes());
        Self(format!("{:x}", digest))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that `schema` hashes to this digest
    pub fn matches(&self, schema: &str) -> bool {
        Self::of(schema) == *self
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
