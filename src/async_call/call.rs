//! Async call record
//!
//! An [`AsyncCall`] describes one pending cross-contract invocation. Its
//! addresses, payload and callbacks never change after creation; the engine
//! only moves its status forward, assigns its identifier and, for cross-shard
//! built-in calls, narrows its gas limit to what the in-shard half left over.

use crate::async_call::AsyncError;
use crate::core::ReturnCode;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Lifecycle of an async call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AsyncCallStatus {
    #[default]
    Pending,
    /// Handed to the cross-shard dispatcher, awaiting its result
    Sent,
    Resolved,
    Rejected,
}

impl AsyncCallStatus {
    /// Integer code used by the persisted form
    pub fn code(self) -> u8 {
        match self {
            AsyncCallStatus::Pending => 0,
            AsyncCallStatus::Resolved => 1,
            AsyncCallStatus::Rejected => 2,
            AsyncCallStatus::Sent => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AsyncCallStatus::Pending),
            1 => Some(AsyncCallStatus::Resolved),
            2 => Some(AsyncCallStatus::Rejected),
            3 => Some(AsyncCallStatus::Sent),
            _ => None,
        }
    }

    /// Resolved and Rejected are final
    pub fn is_terminal(self) -> bool {
        match self {
            AsyncCallStatus::Resolved | AsyncCallStatus::Rejected => true,
            AsyncCallStatus::Pending | AsyncCallStatus::Sent => false,
        }
    }
}

/// How an async call is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AsyncCallExecutionMode {
    /// Contract call in the same shard
    SyncCall,
    /// Built-in function whose effects stay in this shard
    AsyncBuiltinFunc,
    /// Built-in function whose receiver is in another shard
    AsyncBuiltinFuncCrossShard,
    /// Token transfer back to the caller, delivered as return data
    ESDTTransferOnCallBack,
    /// Destination unknown to this shard
    #[default]
    Unknown,
}

impl AsyncCallExecutionMode {
    /// Integer code used by the persisted form
    pub fn code(self) -> u8 {
        match self {
            AsyncCallExecutionMode::SyncCall => 0,
            AsyncCallExecutionMode::AsyncBuiltinFunc => 1,
            AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard => 2,
            AsyncCallExecutionMode::ESDTTransferOnCallBack => 3,
            AsyncCallExecutionMode::Unknown => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AsyncCallExecutionMode::SyncCall),
            1 => Some(AsyncCallExecutionMode::AsyncBuiltinFunc),
            2 => Some(AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard),
            3 => Some(AsyncCallExecutionMode::ESDTTransferOnCallBack),
            4 => Some(AsyncCallExecutionMode::Unknown),
            _ => None,
        }
    }

    /// Whether calls in this mode must leave the shard
    pub fn is_remote(self) -> bool {
        match self {
            AsyncCallExecutionMode::Unknown | AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard => {
                true
            }
            AsyncCallExecutionMode::SyncCall
            | AsyncCallExecutionMode::AsyncBuiltinFunc
            | AsyncCallExecutionMode::ESDTTransferOnCallBack => false,
        }
    }
}

/// One pending cross-contract invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsyncCall {
    call_id: Vec<u8>,
    status: AsyncCallStatus,
    execution_mode: AsyncCallExecutionMode,
    source: Vec<u8>,
    destination: Vec<u8>,
    data: Vec<u8>,
    gas_limit: u64,
    extra_gas_locked: u64,
    value_bytes: Vec<u8>,
    success_callback: String,
    error_callback: String,
}

impl AsyncCall {
    /// Create a pending call without value or callbacks
    pub fn new(
        destination: impl Into<Vec<u8>>,
        data: impl Into<Vec<u8>>,
        gas_limit: u64,
        extra_gas_locked: u64,
    ) -> Self {
        Self {
            destination: destination.into(),
            data: data.into(),
            gas_limit,
            extra_gas_locked,
            ..Default::default()
        }
    }

    /// Set the big-endian value transferred with the call
    pub fn with_value(mut self, value_bytes: impl Into<Vec<u8>>) -> Self {
        self.value_bytes = value_bytes.into();
        self
    }

    pub fn with_callbacks(mut self, success: impl Into<String>, error: impl Into<String>) -> Self {
        self.success_callback = success.into();
        self.error_callback = error.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<Vec<u8>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_execution_mode(mut self, mode: AsyncCallExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn call_id(&self) -> &[u8] {
        &self.call_id
    }

    pub fn status(&self) -> AsyncCallStatus {
        self.status
    }

    pub fn execution_mode(&self) -> AsyncCallExecutionMode {
        self.execution_mode
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn destination(&self) -> &[u8] {
        &self.destination
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn gas_locked(&self) -> u64 {
        self.extra_gas_locked
    }

    pub fn value_bytes(&self) -> &[u8] {
        &self.value_bytes
    }

    pub fn value(&self) -> BigUint {
        BigUint::from_bytes_be(&self.value_bytes)
    }

    pub fn success_callback(&self) -> &str {
        &self.success_callback
    }

    pub fn error_callback(&self) -> &str {
        &self.error_callback
    }

    /// Gas limit plus locked gas; overflow is an invariant violation
    pub fn total_gas(&self) -> Result<u64, AsyncError> {
        self.gas_limit
            .checked_add(self.extra_gas_locked)
            .ok_or(AsyncError::GasOverflow(self.gas_limit, self.extra_gas_locked))
    }

    pub fn is_local(&self) -> bool {
        !self.is_remote()
    }

    pub fn is_remote(&self) -> bool {
        self.execution_mode.is_remote()
    }

    /// Whether the callback selected by the current status exists
    pub fn has_callback(&self) -> bool {
        !self.callback_name().is_empty()
    }

    /// Whether either callback is defined, regardless of status
    pub fn has_defined_any_callback(&self) -> bool {
        !self.success_callback.is_empty() || !self.error_callback.is_empty()
    }

    /// Success callback once resolved, error callback otherwise
    pub fn callback_name(&self) -> &str {
        match self.status {
            AsyncCallStatus::Resolved => &self.success_callback,
            AsyncCallStatus::Pending | AsyncCallStatus::Sent | AsyncCallStatus::Rejected => {
                &self.error_callback
            }
        }
    }

    /// Resolve or reject the call from the destination's return code
    pub fn update_status(&mut self, return_code: ReturnCode) -> Result<(), AsyncError> {
        let next = if return_code.is_ok() {
            AsyncCallStatus::Resolved
        } else {
            AsyncCallStatus::Rejected
        };
        self.transition(next)
    }

    /// Reject the call before its destination could run
    pub fn reject(&mut self) -> Result<(), AsyncError> {
        self.transition(AsyncCallStatus::Rejected)
    }

    /// Record that the call left the shard
    pub fn mark_sent(&mut self) -> Result<(), AsyncError> {
        if self.status != AsyncCallStatus::Pending {
            return Err(self.invalid_transition(AsyncCallStatus::Sent));
        }
        self.status = AsyncCallStatus::Sent;
        Ok(())
    }

    fn transition(&mut self, next: AsyncCallStatus) -> Result<(), AsyncError> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(next));
        }
        self.status = next;
        Ok(())
    }

    fn invalid_transition(&self, to: AsyncCallStatus) -> AsyncError {
        AsyncError::InvalidStatusTransition {
            call: hex::encode(&self.call_id),
            from: self.status,
            to,
        }
    }

    pub(crate) fn set_call_id(&mut self, call_id: Vec<u8>) {
        self.call_id = call_id;
    }

    pub(crate) fn set_source(&mut self, source: Vec<u8>) {
        self.source = source;
    }

    pub(crate) fn set_execution_mode(&mut self, mode: AsyncCallExecutionMode) {
        self.execution_mode = mode;
    }

    pub(crate) fn set_gas_limit(&mut self, gas_limit: u64) {
        self.gas_limit = gas_limit;
    }

    pub fn to_serializable(&self) -> SerializableAsyncCall {
        SerializableAsyncCall {
            call_id: self.call_id.clone(),
            status: self.status.code(),
            execution_mode: self.execution_mode.code(),
            source: self.source.clone(),
            destination: self.destination.clone(),
            data: self.data.clone(),
            gas_limit: self.gas_limit,
            extra_gas_locked: self.extra_gas_locked,
            value_bytes: self.value_bytes.clone(),
            success_callback: self.success_callback.clone(),
            error_callback: self.error_callback.clone(),
        }
    }
}

/// Persisted form of an [`AsyncCall`], with integer-coded enums
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableAsyncCall {
    #[serde(with = "hex::serde")]
    pub call_id: Vec<u8>,
    pub status: u8,
    pub execution_mode: u8,
    #[serde(with = "hex::serde")]
    pub source: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub destination: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub extra_gas_locked: u64,
    #[serde(with = "hex::serde")]
    pub value_bytes: Vec<u8>,
    pub success_callback: String,
    pub error_callback: String,
}

impl TryFrom<SerializableAsyncCall> for AsyncCall {
    type Error = AsyncError;

    fn try_from(ser: SerializableAsyncCall) -> Result<Self, Self::Error> {
        let status = AsyncCallStatus::from_code(ser.status)
            .ok_or(AsyncError::UnknownStatusCode(ser.status))?;
        let execution_mode = AsyncCallExecutionMode::from_code(ser.execution_mode)
            .ok_or(AsyncError::UnknownExecutionModeCode(ser.execution_mode))?;

        Ok(AsyncCall {
            call_id: ser.call_id,
            status,
            execution_mode,
            source: ser.source,
            destination: ser.destination,
            data: ser.data,
            gas_limit: ser.gas_limit,
            extra_gas_locked: ser.extra_gas_locked,
            value_bytes: ser.value_bytes,
            success_callback: ser.success_callback,
            error_callback: ser.error_callback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_with_callbacks() -> AsyncCall {
        AsyncCall::new(b"dest".to_vec(), b"f@01".to_vec(), 1_000, 50).with_callbacks("ok", "err")
    }

    #[test]
    fn test_locality_follows_execution_mode() {
        let locals = [
            AsyncCallExecutionMode::SyncCall,
            AsyncCallExecutionMode::AsyncBuiltinFunc,
            AsyncCallExecutionMode::ESDTTransferOnCallBack,
        ];
        for mode in locals {
            let call = AsyncCall::default().with_execution_mode(mode);
            assert!(call.is_local() && !call.is_remote(), "{:?}", mode);
        }

        let remotes = [
            AsyncCallExecutionMode::Unknown,
            AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard,
        ];
        for mode in remotes {
            let call = AsyncCall::default().with_execution_mode(mode);
            assert!(call.is_remote() && !call.is_local(), "{:?}", mode);
        }
    }

    #[test]
    fn test_callback_selection_on_success() {
        let mut call = call_with_callbacks();
        call.update_status(ReturnCode::Ok).unwrap();
        assert_eq!(call.status(), AsyncCallStatus::Resolved);
        assert_eq!(call.callback_name(), "ok");
        assert!(call.has_callback());
    }

    #[test]
    fn test_callback_selection_on_any_failure() {
        for code in [ReturnCode::UserError, ReturnCode::OutOfGas, ReturnCode::FunctionNotFound] {
            let mut call = call_with_callbacks();
            call.update_status(code).unwrap();
            assert_eq!(call.status(), AsyncCallStatus::Rejected);
            assert_eq!(call.callback_name(), "err");
        }
    }

    #[test]
    fn test_no_callbacks_defined() {
        let mut call = AsyncCall::new(b"dest".to_vec(), b"f".to_vec(), 10, 0);
        assert!(!call.has_defined_any_callback());
        call.update_status(ReturnCode::Ok).unwrap();
        assert!(!call.has_callback());
    }

    #[test]
    fn test_has_callback_depends_on_status() {
        let mut call = AsyncCall::new(b"dest".to_vec(), b"f".to_vec(), 10, 0).with_callbacks("ok", "");
        assert!(call.has_defined_any_callback());

        call.update_status(ReturnCode::UserError).unwrap();
        assert!(!call.has_callback());
        assert!(call.has_defined_any_callback());
    }

    #[test]
    fn test_status_never_leaves_terminal_state() {
        let mut call = call_with_callbacks();
        call.update_status(ReturnCode::Ok).unwrap();

        assert!(matches!(
            call.update_status(ReturnCode::UserError),
            Err(AsyncError::InvalidStatusTransition { .. })
        ));
        assert!(call.reject().is_err());
        assert!(call.mark_sent().is_err());
        assert_eq!(call.status(), AsyncCallStatus::Resolved);
    }

    #[test]
    fn test_sent_call_can_still_resolve() {
        let mut call = call_with_callbacks();
        call.mark_sent().unwrap();
        assert!(call.mark_sent().is_err());
        call.update_status(ReturnCode::UserError).unwrap();
        assert_eq!(call.status(), AsyncCallStatus::Rejected);
    }

    #[test]
    fn test_total_gas_overflow() {
        let call = AsyncCall::new(b"d".to_vec(), b"f".to_vec(), u64::MAX, 1);
        assert!(matches!(call.total_gas(), Err(AsyncError::GasOverflow(u64::MAX, 1))));

        let call = AsyncCall::new(b"d".to_vec(), b"f".to_vec(), 1_000, 50);
        assert_eq!(call.total_gas().unwrap(), 1_050);
    }

    #[test]
    fn test_clone_is_independent() {
        let original = call_with_callbacks().with_value(vec![1, 2]);
        let mut copy = original.clone();
        copy.set_source(b"other".to_vec());
        copy.update_status(ReturnCode::Ok).unwrap();

        assert!(original.source().is_empty());
        assert_eq!(original.status(), AsyncCallStatus::Pending);
        assert_eq!(copy.value_bytes(), original.value_bytes());
    }

    #[test]
    fn test_serializable_roundtrip() {
        let mut call = AsyncCall::new(vec![], vec![], 0, u64::MAX)
            .with_source(vec![0xff; 32])
            .with_value(vec![0, 0, 1])
            .with_callbacks("", "onError")
            .with_execution_mode(AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard);
        call.set_call_id(vec![]);
        call.reject().unwrap();

        let json = serde_json::to_string(&call.to_serializable()).unwrap();
        let ser: SerializableAsyncCall = serde_json::from_str(&json).unwrap();
        let restored = AsyncCall::try_from(ser).unwrap();

        assert_eq!(restored, call);
    }

    #[test]
    fn test_unknown_codes_are_rejected() {
        let mut ser = call_with_callbacks().to_serializable();
        ser.status = 9;
        assert!(matches!(
            AsyncCall::try_from(ser.clone()),
            Err(AsyncError::UnknownStatusCode(9))
        ));

        ser.status = 0;
        ser.execution_mode = 7;
        assert!(matches!(
            AsyncCall::try_from(ser),
            Err(AsyncError::UnknownExecutionModeCode(7))
        ));
    }
}
