//! Contract call output
//!
//! The result record returned by the destination-execution collaborator.

use crate::core::return_code::ReturnCode;
use crate::core::vm_input::CallType;
use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value transfer (optionally carrying a call) produced by an activation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputTransfer {
    #[serde(with = "hex::serde")]
    pub sender: Vec<u8>,
    pub value: BigUint,
    /// Payload; empty for a plain value transfer
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub gas_locked: u64,
    pub call_type: CallType,
    /// Async call identifier for cross-shard async transfers
    #[serde(with = "hex::serde")]
    pub call_id: Vec<u8>,
}

/// Per-account side effects of an activation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputAccount {
    #[serde(with = "hex::serde")]
    pub address: Vec<u8>,
    pub balance_delta: BigInt,
    pub output_transfers: Vec<OutputTransfer>,
}

impl OutputAccount {
    pub fn new(address: &[u8]) -> Self {
        Self {
            address: address.to_vec(),
            ..Default::default()
        }
    }
}

/// Result of one contract activation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VMOutput {
    pub return_code: ReturnCode,
    pub return_message: String,
    pub return_data: Vec<Vec<u8>>,
    pub gas_remaining: u64,
    /// Side effects keyed by account address
    pub output_accounts: BTreeMap<Vec<u8>, OutputAccount>,
}

impl VMOutput {
    /// Output of a failed activation
    pub fn failed(return_code: ReturnCode, message: impl Into<String>, gas_remaining: u64) -> Self {
        Self {
            return_code,
            return_message: message.into(),
            gas_remaining,
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.return_code.is_ok()
    }

    /// Get or create the output account for an address
    pub fn account_mut(&mut self, address: &[u8]) -> &mut OutputAccount {
        self.output_accounts
            .entry(address.to_vec())
            .or_insert_with(|| OutputAccount::new(address))
    }

    /// Append a transfer to an account's output
    pub fn add_transfer(&mut self, recipient: &[u8], transfer: OutputTransfer) {
        self.account_mut(recipient).output_transfers.push(transfer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_transfer_creates_account() {
        let mut output = VMOutput::default();
        output.add_transfer(
            b"alice",
            OutputTransfer {
                value: BigUint::from(5u8),
                ..Default::default()
            },
        );
        output.add_transfer(b"alice", OutputTransfer::default());

        let account = output.output_accounts.get(b"alice".as_slice()).unwrap();
        assert_eq!(account.address, b"alice".to_vec());
        assert_eq!(account.output_transfers.len(), 2);
    }

    #[test]
    fn test_failed_output() {
        let output = VMOutput::failed(ReturnCode::OutOfGas, "not enough gas", 50);
        assert!(!output.is_ok());
        assert_eq!(output.gas_remaining, 50);
        assert!(output.return_data.is_empty());
    }
}
