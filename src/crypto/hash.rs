//! Hashing utilities for the host
//!
//! Provides the SHA-256 derivation of async call identifiers.

use sha2::{Digest, Sha256};

/// Length of a derived identifier in bytes
pub const HASH_LENGTH: usize = 32;

/// Derive the identifier of the `counter`-th async call created under `seed`.
///
/// The seed is the hash of the transaction that owns the async context, so
/// every node replaying the transaction derives the same identifiers.
pub fn derive_call_id(seed: &[u8], counter: u64) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(counter.to_be_bytes());
    hasher.finalize().to_vec()
}
