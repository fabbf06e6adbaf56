//! Cryptographic utilities for the host
//!
//! Deterministic async call identifiers.

pub mod hash;

pub use hash::{derive_call_id, HASH_LENGTH};
