//! Accounts of the reference host

use crate::contract::Module;
use num_bigint::BigUint;
use std::collections::BTreeMap;

/// A user account or a deployed contract
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub address: Vec<u8>,
    pub shard: u32,
    pub balance: BigUint,
    /// Deployed code; `None` for user accounts
    pub code: Option<Module>,
    pub storage: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Account {
    pub fn new(address: impl Into<Vec<u8>>, shard: u32) -> Self {
        Self {
            address: address.into(),
            shard,
            ..Default::default()
        }
    }

    pub fn with_balance(mut self, balance: BigUint) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_code(mut self, module: Module) -> Self {
        self.code = Some(module);
        self
    }

    pub fn has_code(&self) -> bool {
        self.code.is_some()
    }
}
