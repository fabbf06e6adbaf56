//! Host capabilities
//!
//! The async call engine never reaches into a concrete host. Everything it
//! needs (execution, gas, output, storage, shard topology) goes through the
//! [`Host`] trait, which the in-memory [`crate::world::WorldHost`] implements.

pub mod metering;
pub mod output;
pub mod storage;

pub use metering::{
    GasMeter, GasSchedule, MeteringError, DEFAULT_ASYNC_CALL_STEP, DEFAULT_DATA_COPY_PER_BYTE,
};
pub use output::OutputContext;
pub use storage::StorageContext;

use crate::core::{CallType, ContractCallInput, ReturnCode, VMOutput};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error reported by the execution engine alongside its output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("execution failed with '{return_code}': {message}")]
pub struct ExecutionError {
    pub return_code: ReturnCode,
    pub message: String,
}

impl ExecutionError {
    pub fn new(return_code: ReturnCode, message: impl Into<String>) -> Self {
        Self {
            return_code,
            message: message.into(),
        }
    }
}

/// What executing a call on a destination context produced
#[derive(Debug, Clone, Default)]
pub struct DestinationExecution {
    /// Missing only when the engine broke an invariant
    pub output: Option<VMOutput>,
    /// False only for cross-shard built-in calls
    pub is_complete: bool,
    pub error: Option<ExecutionError>,
}

impl DestinationExecution {
    pub fn completed(output: VMOutput) -> Self {
        let error = if output.is_ok() {
            None
        } else {
            Some(ExecutionError::new(
                output.return_code,
                output.return_message.clone(),
            ))
        };
        Self {
            output: Some(output),
            is_complete: true,
            error,
        }
    }
}

/// Execution context of the instance currently running
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFrame {
    /// Contract whose code is running
    #[serde(with = "hex::serde")]
    pub context_address: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub caller: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub original_caller: Vec<u8>,
    pub call_type: CallType,
    pub gas_price: u64,
    #[serde(with = "hex::serde")]
    pub current_tx_hash: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub original_tx_hash: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub prev_tx_hash: Vec<u8>,
}

/// Capability handle through which the async engine talks to the host
pub trait Host {
    /// The instance currently executing
    fn runtime(&self) -> &RuntimeFrame;

    fn metering(&mut self) -> &mut GasMeter;

    fn output(&mut self) -> &mut OutputContext;

    fn storage(&mut self) -> &mut dyn StorageContext;

    /// Run `input` on its recipient.
    ///
    /// Deducts `input.gas_provided` from the current instance before running
    /// and gives the remaining gas back afterwards; the child's return data is
    /// merged into the transaction output.
    fn execute_on_dest_context(&mut self, input: &ContractCallInput) -> DestinationExecution;

    fn are_in_same_shard(&self, left: &[u8], right: &[u8]) -> bool;

    fn is_builtin_function(&self, function: &str) -> bool;

    /// Whether a contract is deployed at `address`
    fn has_code(&self, address: &[u8]) -> bool;
}
