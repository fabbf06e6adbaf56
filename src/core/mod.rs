//! Core VM types
//!
//! This module contains the records exchanged between the host and the
//! bytecode execution engine:
//! - Return codes and their callback encoding
//! - Contract call inputs (plain calls, async calls, callbacks)
//! - Contract call outputs (return data, gas, per-account side effects)

pub mod return_code;
pub mod vm_input;
pub mod vm_output;

pub use return_code::ReturnCode;
pub use vm_input::{AsyncArguments, CallType, ContractCallInput};
pub use vm_output::{OutputAccount, OutputTransfer, VMOutput};
