//! Async call groups
//!
//! A group is an ordered set of async calls that complete together. Order only
//! matters for deterministic iteration; each call is independent. When the last
//! call of a group is completed the group itself completes and its optional
//! group callback runs.

use crate::async_call::call::{AsyncCall, SerializableAsyncCall};
use crate::async_call::AsyncError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ordered collection of async calls with an optional completion callback
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsyncCallGroup {
    identifier: String,
    callback: String,
    callback_data: Vec<u8>,
    gas_locked: u64,
    gas_recovered: u64,
    calls: Vec<AsyncCall>,
    /// Positions of calls that are terminal and whose callback has finished
    completed: BTreeSet<usize>,
}

impl AsyncCallGroup {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn calls(&self) -> &[AsyncCall] {
        &self.calls
    }

    pub fn callback(&self) -> &str {
        &self.callback
    }

    pub fn callback_data(&self) -> &[u8] {
        &self.callback_data
    }

    /// Gas set aside for the group callback
    pub fn gas_locked(&self) -> u64 {
        self.gas_locked
    }

    /// Gas reported back by completed calls
    pub fn gas_recovered(&self) -> u64 {
        self.gas_recovered
    }

    pub fn has_callback(&self) -> bool {
        !self.callback.is_empty()
    }

    pub fn add_call(&mut self, call: AsyncCall) {
        self.calls.push(call);
    }

    pub(crate) fn set_callback(&mut self, callback: String, data: Vec<u8>, gas_locked: u64) {
        self.callback = callback;
        self.callback_data = data;
        self.gas_locked = gas_locked;
    }

    pub(crate) fn call_mut(&mut self, index: usize) -> Option<&mut AsyncCall> {
        self.calls.get_mut(index)
    }

    /// Position of the call carrying `call_id`
    pub fn find_call(&self, call_id: &[u8]) -> Option<usize> {
        if call_id.is_empty() {
            return None;
        }
        self.calls.iter().position(|call| call.call_id() == call_id)
    }

    pub fn is_call_completed(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    /// Record that the call at `index` finished, callback included
    pub(crate) fn mark_completed(&mut self, index: usize, gas_recovered: u64) -> Result<(), AsyncError> {
        let call = self.calls.get(index).ok_or_else(|| {
            AsyncError::CallNotFound(format!("{}#{}", self.identifier, index))
        })?;
        if !self.completed.insert(index) {
            return Err(AsyncError::CallAlreadyCompleted(hex::encode(call.call_id())));
        }
        self.gas_recovered = self
            .gas_recovered
            .checked_add(gas_recovered)
            .ok_or(AsyncError::GasOverflow(self.gas_recovered, gas_recovered))?;
        Ok(())
    }

    /// Calls not yet completed
    pub fn pending_count(&self) -> usize {
        self.calls.len() - self.completed.len()
    }

    /// A group completes once every call in it has completed
    pub fn is_complete(&self) -> bool {
        self.pending_count() == 0
    }

    /// Take completed calls out of the group, in order
    pub(crate) fn remove_completed(&mut self) -> Vec<AsyncCall> {
        let completed = std::mem::take(&mut self.completed);
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.calls)
            .into_iter()
            .enumerate()
            .partition(|(index, _)| completed.contains(index));
        self.calls = pending.into_iter().map(|(_, call)| call).collect();
        done.into_iter().map(|(_, call)| call).collect()
    }

    pub fn to_serializable(&self) -> SerializableAsyncCallGroup {
        SerializableAsyncCallGroup {
            identifier: self.identifier.clone(),
            callback: self.callback.clone(),
            callback_data: self.callback_data.clone(),
            gas_locked: self.gas_locked,
            gas_recovered: self.gas_recovered,
            calls: self
                .calls
                .iter()
                .enumerate()
                .filter(|(index, _)| !self.completed.contains(index))
                .map(|(_, call)| call.to_serializable())
                .collect(),
        }
    }
}

/// Persisted form of an [`AsyncCallGroup`]; completed calls are not kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableAsyncCallGroup {
    pub identifier: String,
    pub callback: String,
    #[serde(with = "hex::serde")]
    pub callback_data: Vec<u8>,
    pub gas_locked: u64,
    pub gas_recovered: u64,
    pub calls: Vec<SerializableAsyncCall>,
}

impl TryFrom<SerializableAsyncCallGroup> for AsyncCallGroup {
    type Error = AsyncError;

    fn try_from(ser: SerializableAsyncCallGroup) -> Result<Self, Self::Error> {
        let calls = ser
            .calls
            .into_iter()
            .map(AsyncCall::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AsyncCallGroup {
            identifier: ser.identifier,
            callback: ser.callback,
            callback_data: ser.callback_data,
            gas_locked: ser.gas_locked,
            gas_recovered: ser.gas_recovered,
            calls,
            completed: BTreeSet::new(),
        })
    }
}
