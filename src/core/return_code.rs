//! Return codes
//!
//! The enumerated outcome of a contract call, shared by the execution engine,
//! the async call engine and the callback protocol.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a contract call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReturnCode {
    /// Execution finished successfully
    #[default]
    Ok = 0,
    /// The called function does not exist
    FunctionNotFound = 1,
    /// The function was called with the wrong arguments
    FunctionWrongSignature = 2,
    /// No contract code at the called address
    ContractNotFound = 3,
    /// The contract explicitly signalled an error
    UserError = 4,
    /// The call ran out of gas
    OutOfGas = 5,
    /// Account address collision
    AccountCollision = 6,
    /// Not enough balance for the call value
    OutOfFunds = 7,
    /// Call depth limit exceeded
    CallStackOverFlow = 8,
    /// Contract code failed validation
    ContractInvalid = 9,
    /// Any other execution failure
    ExecutionFailed = 10,
}

impl ReturnCode {
    /// Convert a raw code back into a return code
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(ReturnCode::Ok),
            1 => Some(ReturnCode::FunctionNotFound),
            2 => Some(ReturnCode::FunctionWrongSignature),
            3 => Some(ReturnCode::ContractNotFound),
            4 => Some(ReturnCode::UserError),
            5 => Some(ReturnCode::OutOfGas),
            6 => Some(ReturnCode::AccountCollision),
            7 => Some(ReturnCode::OutOfFunds),
            8 => Some(ReturnCode::CallStackOverFlow),
            9 => Some(ReturnCode::ContractInvalid),
            10 => Some(ReturnCode::ExecutionFailed),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == ReturnCode::Ok
    }

    /// Encoding used as the first argument of every callback.
    ///
    /// `Ok` is a single zero byte; every other code is its integer value in
    /// minimal big-endian form.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ReturnCode::Ok => vec![0],
            other => BigUint::from(*other as u8).to_bytes_be(),
        }
    }

    /// Human-readable name, also used as the default return message
    pub fn message(&self) -> &'static str {
        match self {
            ReturnCode::Ok => "ok",
            ReturnCode::FunctionNotFound => "function not found",
            ReturnCode::FunctionWrongSignature => "wrong signature for function",
            ReturnCode::ContractNotFound => "contract not found",
            ReturnCode::UserError => "user error",
            ReturnCode::OutOfGas => "out of gas",
            ReturnCode::AccountCollision => "account collision",
            ReturnCode::OutOfFunds => "out of funds",
            ReturnCode::CallStackOverFlow => "call stack overflow",
            ReturnCode::ContractInvalid => "contract invalid",
            ReturnCode::ExecutionFailed => "execution failed",
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_encodes_as_single_zero_byte() {
        assert_eq!(ReturnCode::Ok.to_bytes(), vec![0]);
    }

    #[test]
    fn test_failure_codes_encode_minimal_big_endian() {
        assert_eq!(ReturnCode::UserError.to_bytes(), vec![4]);
        assert_eq!(ReturnCode::ExecutionFailed.to_bytes(), vec![10]);
    }

    #[test]
    fn test_code_roundtrip() {
        for code in 0..=10u8 {
            let rc = ReturnCode::from_u8(code).unwrap();
            assert_eq!(rc as u8, code);
        }
        assert!(ReturnCode::from_u8(11).is_none());
    }
}
