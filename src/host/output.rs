//! Output accumulator
//!
//! Collects the return data and per-account side effects of the transaction.
//! The order of return data items is observable by contracts and must match
//! call order exactly.

use crate::core::{OutputAccount, ReturnCode, VMOutput};
use std::collections::{BTreeMap, VecDeque};

/// Accumulated output of the current transaction
#[derive(Debug, Clone, Default)]
pub struct OutputContext {
    return_data: VecDeque<Vec<u8>>,
    return_code: ReturnCode,
    return_message: String,
    output_accounts: BTreeMap<Vec<u8>, OutputAccount>,
}

impl OutputContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one return data item
    pub fn finish(&mut self, data: Vec<u8>) {
        self.return_data.push_back(data);
    }

    /// Insert one return data item at the front
    pub fn prepend_finish(&mut self, data: Vec<u8>) {
        self.return_data.push_front(data);
    }

    /// Remove the front return data item
    pub fn delete_first_return_data(&mut self) -> Option<Vec<u8>> {
        self.return_data.pop_front()
    }

    /// Remove the return data item at `index`, counted from the front
    pub fn delete_return_data_at(&mut self, index: usize) -> Option<Vec<u8>> {
        self.return_data.remove(index)
    }

    pub fn return_data_at(&self, index: usize) -> Option<&[u8]> {
        self.return_data.get(index).map(Vec::as_slice)
    }

    pub fn return_data_len(&self) -> usize {
        self.return_data.len()
    }

    pub fn return_data(&self) -> Vec<Vec<u8>> {
        self.return_data.iter().cloned().collect()
    }

    pub fn return_code(&self) -> ReturnCode {
        self.return_code
    }

    pub fn set_return_code(&mut self, code: ReturnCode) {
        self.return_code = code;
    }

    pub fn return_message(&self) -> &str {
        &self.return_message
    }

    pub fn set_return_message(&mut self, message: impl Into<String>) {
        self.return_message = message.into();
    }

    pub fn output_account(&self, address: &[u8]) -> Option<&OutputAccount> {
        self.output_accounts.get(address)
    }

    pub fn output_account_mut(&mut self, address: &[u8]) -> &mut OutputAccount {
        self.output_accounts
            .entry(address.to_vec())
            .or_insert_with(|| OutputAccount::new(address))
    }

    /// Merge the output of a finished child activation: its return data is
    /// appended in order and its account side effects are accumulated.
    pub fn merge_vm_output(&mut self, child: &VMOutput) {
        self.return_data.extend(child.return_data.iter().cloned());
        for (address, account) in &child.output_accounts {
            let merged = self.output_account_mut(address);
            merged.balance_delta += &account.balance_delta;
            merged
                .output_transfers
                .extend(account.output_transfers.iter().cloned());
        }
    }

    /// Snapshot the accumulated output
    pub fn to_vm_output(&self, gas_remaining: u64) -> VMOutput {
        VMOutput {
            return_code: self.return_code,
            return_message: self.return_message.clone(),
            return_data: self.return_data(),
            gas_remaining,
            output_accounts: self.output_accounts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OutputTransfer;
    use num_bigint::{BigInt, BigUint};

    #[test]
    fn test_return_data_ordering() {
        let mut output = OutputContext::new();
        output.finish(b"b".to_vec());
        output.finish(b"c".to_vec());
        output.prepend_finish(b"a".to_vec());
        assert_eq!(output.return_data(), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        assert_eq!(output.delete_first_return_data(), Some(b"a".to_vec()));
        assert_eq!(output.return_data(), vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_delete_on_empty_queue() {
        let mut output = OutputContext::new();
        assert_eq!(output.delete_first_return_data(), None);
        assert_eq!(output.delete_return_data_at(0), None);
    }

    #[test]
    fn test_delete_inside_the_queue() {
        let mut output = OutputContext::new();
        for item in [b"mine".as_slice(), b"theirs", b"more"] {
            output.finish(item.to_vec());
        }
        assert_eq!(output.return_data_len(), 3);
        assert_eq!(output.return_data_at(1), Some(b"theirs".as_slice()));

        assert_eq!(output.delete_return_data_at(1), Some(b"theirs".to_vec()));
        assert_eq!(output.return_data(), vec![b"mine".to_vec(), b"more".to_vec()]);
        assert_eq!(output.delete_return_data_at(2), None);
    }

    #[test]
    fn test_merge_child_output() {
        let mut output = OutputContext::new();
        output.finish(b"parent".to_vec());

        let mut child = VMOutput::default();
        child.return_data.push(b"child".to_vec());
        child.account_mut(b"bob").balance_delta = BigInt::from(5);
        child.add_transfer(
            b"bob",
            OutputTransfer {
                value: BigUint::from(5u8),
                ..Default::default()
            },
        );

        output.merge_vm_output(&child);
        output.merge_vm_output(&child);

        assert_eq!(output.return_data().len(), 3);
        let bob = output.output_account(b"bob").unwrap();
        assert_eq!(bob.balance_delta, BigInt::from(10));
        assert_eq!(bob.output_transfers.len(), 2);
    }
}
