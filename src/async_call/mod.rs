//! Asynchronous cross-contract calls
//!
//! A running contract registers async calls in named groups. Once its own
//! execution ends, the [`AsyncContext`] runs every call whose destination is
//! reachable in this shard, feeds each result to the matching callback,
//! accounts for gas at every boundary and hands the rest to the cross-shard
//! dispatcher.
//!
//! Layout:
//! - [`call`]: the async call record and its lifecycle
//! - [`group`]: ordered call groups with optional group callbacks
//! - [`gas`]: gas movement at call and callback boundaries
//! - [`context`]: registration, routing, completion and persistence
//! - [`local`]: in-shard execution and failure recovery
//! - [`callback`]: building contract and callback inputs
//! - [`builtin`]: the in-shard half of cross-shard built-in calls
//! - [`remote`]: dispatch and resumption of cross-shard calls

pub mod builtin;
pub mod call;
pub mod callback;
pub mod context;
pub mod gas;
pub mod group;
pub mod local;
pub mod remote;

pub use call::{AsyncCall, AsyncCallExecutionMode, AsyncCallStatus, SerializableAsyncCall};
pub use callback::PreparedCallback;
pub use context::{AsyncContext, SerializableAsyncContext, ASYNC_CONTEXT_PREFIX};
pub use gas::AsyncGasAccountant;
pub use group::{AsyncCallGroup, SerializableAsyncCallGroup};
pub use local::LocalCallOutcome;

use crate::host::MeteringError;
use crate::parsers::CallDataError;
use thiserror::Error;

/// Async call engine errors
#[derive(Error, Debug)]
pub enum AsyncError {
    #[error("not enough gas")]
    NotEnoughGas,

    #[error("gas overflow adding {0} and {1}")]
    GasOverflow(u64, u64),

    #[error("destination returned {remaining} gas out of a {limit} gas limit")]
    GasNotConserved { remaining: u64, limit: u64 },

    #[error("destination call produced no output")]
    NilDestinationCallVMOutput,

    #[error("callback produced no output")]
    AsyncNoOutputFromCallback,

    #[error("invalid call data: {0}")]
    CallData(#[from] CallDataError),

    #[error("metering: {0}")]
    Metering(#[from] MeteringError),

    #[error("async call not found: {0}")]
    CallNotFound(String),

    #[error("async call already completed: {0}")]
    CallAlreadyCompleted(String),

    #[error("async call group not found: {0}")]
    GroupNotFound(String),

    #[error("async call {call}: cannot move from {from:?} to {to:?}")]
    InvalidStatusTransition {
        call: String,
        from: AsyncCallStatus,
        to: AsyncCallStatus,
    },

    #[error("unknown async call status code {0}")]
    UnknownStatusCode(u8),

    #[error("unknown execution mode code {0}")]
    UnknownExecutionModeCode(u8),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AsyncError {
    /// Fatal errors abort the whole async step. The others only affect the
    /// call that raised them, which is then rejected.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AsyncError::NotEnoughGas | AsyncError::CallData(_) | AsyncError::Metering(_)
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support;
