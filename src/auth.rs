use sha2::{Digest, Sha256};

/// Hash a clinic API key for storage/lookup (SHA-256 hex). Only the hash is
/// kept in the clinic row.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}
