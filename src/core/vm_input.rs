//! Contract call input
//!
//! The record handed to the destination-execution collaborator for every
//! contract activation: plain calls, async calls and callbacks alike.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// How a contract activation was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallType {
    /// A plain call inside the current transaction
    #[default]
    DirectCall,
    /// The destination half of an async call
    AsynchronousCall,
    /// The callback half of an async call
    AsynchronousCallBack,
    /// A token transfer followed by a contract call
    ESDTTransferAndExecute,
}

/// Identifiers linking an activation to the async call that caused it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AsyncArguments {
    /// Identifier of this activation
    #[serde(with = "hex::serde")]
    pub call_id: Vec<u8>,
    /// For callbacks: identifier of the async call being answered
    #[serde(with = "hex::serde")]
    pub caller_call_id: Vec<u8>,
    /// Gas reported back by completed children so far
    pub gas_accumulated: u64,
}

/// Input of one contract activation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractCallInput {
    /// Address that started the transaction
    #[serde(with = "hex::serde")]
    pub original_caller: Vec<u8>,
    /// Immediate caller
    #[serde(with = "hex::serde")]
    pub caller: Vec<u8>,
    /// Contract being activated
    #[serde(with = "hex::serde")]
    pub recipient: Vec<u8>,
    /// Function to run on the recipient
    pub function: String,
    /// Decoded arguments
    pub arguments: Vec<Vec<u8>>,
    /// Value transferred with the call
    pub call_value: BigUint,
    pub call_type: CallType,
    pub gas_price: u64,
    /// Gas the activation may spend
    pub gas_provided: u64,
    /// Gas reserved for a callback, not spendable by the activation
    pub gas_locked: u64,
    #[serde(with = "hex::serde")]
    pub current_tx_hash: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub original_tx_hash: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub prev_tx_hash: Vec<u8>,
    /// Set on callbacks that answer a failed call
    pub return_call_after_error: bool,
    pub async_arguments: Option<AsyncArguments>,
}

impl ContractCallInput {
    /// Total length of all arguments in bytes
    pub fn arguments_len(&self) -> usize {
        self.arguments.iter().map(Vec::len).sum()
    }

    /// Identifier assigned to this activation, if it belongs to an async call
    pub fn call_id(&self) -> Option<&[u8]> {
        self.async_arguments.as_ref().map(|args| args.call_id.as_slice())
    }
}
