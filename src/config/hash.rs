//! Hashing for resource identity and configuration fingerprints.
//!
//! Resource identifiers are derived from names with SHA-1 so that the same
//! name always resolves to the same id. Whole configurations are
//! fingerprinted with SHA-256 to label plans and reports.

use sha1::Sha1;
use sha2::{Digest, Sha256};

use super::model::Configuration;

/// Derives the stable identifier of a resource from its (qualified) name.
///
/// Returns the lowercase hex SHA-1 digest of the name.
#[must_use]
pub fn generate_id(name: &str) -> String {
    hex::encode(Sha1::digest(name.as_bytes()))
}

/// Hasher for computing configuration fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a fingerprint of the entire configuration.
    ///
    /// Object keys serialize in sorted order, so two configurations that
    /// differ only in key order share a fingerprint.
    #[must_use]
    pub fn fingerprint(&self, config: &Configuration) -> String {
        let mut hasher = Sha256::new();
        // Serializing a plain data tree cannot fail; an empty buffer still hashes.
        let canonical = serde_json::to_vec(config).unwrap_or_default();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
