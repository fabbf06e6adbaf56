//! Contract storage
//!
//! Key-value storage of the contract that owns the current execution context.

use std::collections::BTreeMap;

/// Storage of the current contract
pub trait StorageContext {
    fn get_storage(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn set_storage(&mut self, key: &[u8], value: Vec<u8>);
    fn remove_storage(&mut self, key: &[u8]) -> Option<Vec<u8>>;
}

impl StorageContext for BTreeMap<Vec<u8>, Vec<u8>> {
    fn get_storage(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.get(key).cloned()
    }

    fn set_storage(&mut self, key: &[u8], value: Vec<u8>) {
        self.insert(key.to_vec(), value);
    }

    fn remove_storage(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.remove(key)
    }
}
