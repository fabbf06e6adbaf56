//! Async context
//!
//! One [`AsyncContext`] exists per contract activation that registers async
//! calls. It owns the call groups, routes every registered call, records
//! completions, runs group callbacks and persists itself when calls are left
//! waiting for another shard.

use crate::async_call::call::{AsyncCall, AsyncCallExecutionMode};
use crate::async_call::gas::AsyncGasAccountant;
use crate::async_call::group::{AsyncCallGroup, SerializableAsyncCallGroup};
use crate::async_call::AsyncError;
use crate::core::{AsyncArguments, CallType, ContractCallInput};
use crate::crypto::derive_call_id;
use crate::host::{GasSchedule, Host, RuntimeFrame};
use crate::parsers::{
    BuiltinEsdtTransferParser, CallArgsParser, EsdtTransferParser, HexCallArgsParser,
    ParsedEsdtTransfers,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage key prefix under which a context is persisted
pub const ASYNC_CONTEXT_PREFIX: &[u8] = b"ASYNC_CONTEXT_";

/// Position of a call inside the context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallLocation {
    pub(crate) group: usize,
    pub(crate) call: usize,
}

/// Async calls registered by one contract activation
pub struct AsyncContext {
    address: Vec<u8>,
    caller: Vec<u8>,
    call_id_seed: Vec<u8>,
    call_id_counter: u64,
    gas_accumulated: u64,
    groups: Vec<AsyncCallGroup>,
    /// Calls removed from their group after completing, in completion order
    completed_calls: Vec<AsyncCall>,
    pub(crate) gas: AsyncGasAccountant,
    pub(crate) call_args_parser: Box<dyn CallArgsParser>,
    pub(crate) esdt_parser: Box<dyn EsdtTransferParser>,
}

impl fmt::Debug for AsyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncContext")
            .field("address", &hex::encode(&self.address))
            .field("caller", &hex::encode(&self.caller))
            .field("call_id_counter", &self.call_id_counter)
            .field("gas_accumulated", &self.gas_accumulated)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

impl AsyncContext {
    /// Create an empty context for the instance described by `runtime`
    pub fn new(runtime: &RuntimeFrame, schedule: GasSchedule) -> Self {
        Self {
            address: runtime.context_address.clone(),
            caller: runtime.caller.clone(),
            call_id_seed: runtime.current_tx_hash.clone(),
            call_id_counter: 0,
            gas_accumulated: 0,
            groups: Vec::new(),
            completed_calls: Vec::new(),
            gas: AsyncGasAccountant::new(schedule),
            call_args_parser: Box::new(HexCallArgsParser),
            esdt_parser: Box::new(BuiltinEsdtTransferParser),
        }
    }

    /// Replace the default call-data and token-transfer parsers
    pub fn with_parsers(
        mut self,
        call_args_parser: Box<dyn CallArgsParser>,
        esdt_parser: Box<dyn EsdtTransferParser>,
    ) -> Self {
        self.call_args_parser = call_args_parser;
        self.esdt_parser = esdt_parser;
        self
    }

    pub fn address(&self) -> &[u8] {
        &self.address
    }

    pub fn caller(&self) -> &[u8] {
        &self.caller
    }

    pub fn groups(&self) -> &[AsyncCallGroup] {
        &self.groups
    }

    pub fn group(&self, identifier: &str) -> Option<&AsyncCallGroup> {
        self.groups.iter().find(|group| group.identifier() == identifier)
    }

    /// Calls that completed during this activation, in completion order
    pub fn completed_calls(&self) -> &[AsyncCall] {
        &self.completed_calls
    }

    /// Gas reported back by every completed call so far
    pub fn gas_accumulated(&self) -> u64 {
        self.gas_accumulated
    }

    /// Complete once every group has completed
    pub fn is_complete(&self) -> bool {
        self.groups.is_empty()
    }

    /// Look up a registered call by identifier
    pub fn find_call(&self, call_id: &[u8]) -> Option<&AsyncCall> {
        let location = self.locate(call_id)?;
        self.groups[location.group].calls().get(location.call)
    }

    /// Iterate every call still held by a group
    pub fn calls(&self) -> impl Iterator<Item = &AsyncCall> {
        self.groups.iter().flat_map(|group| group.calls().iter())
    }

    /// Derive the next unique call identifier
    pub fn next_call_id(&mut self) -> Vec<u8> {
        let call_id = derive_call_id(&self.call_id_seed, self.call_id_counter);
        self.call_id_counter += 1;
        call_id
    }

    /// Register an async call in `group_id`, routing it and charging
    /// `gas_limit + gas_locked` to the current instance.
    pub fn add_call(
        &mut self,
        host: &mut dyn Host,
        group_id: &str,
        call: AsyncCall,
    ) -> Result<(), AsyncError> {
        let mode = self.determine_execution_mode(host, call.destination(), call.data())?;
        self.add_call_with_mode(host, group_id, call, mode)
    }

    /// Register an async call whose route is already known
    pub fn add_call_with_mode(
        &mut self,
        host: &mut dyn Host,
        group_id: &str,
        mut call: AsyncCall,
        mode: AsyncCallExecutionMode,
    ) -> Result<(), AsyncError> {
        let total_gas = call.total_gas()?;
        host.metering().use_gas_bounded(total_gas)?;

        call.set_source(self.address.clone());
        call.set_execution_mode(mode);
        log::trace!(
            "async call registered: group={} dest={} mode={:?} gas_limit={} gas_locked={}",
            group_id,
            hex::encode(call.destination()),
            mode,
            call.gas_limit(),
            call.gas_locked()
        );
        self.group_or_create(group_id).add_call(call);
        Ok(())
    }

    /// Attach a callback to an existing group, charging `gas` for it.
    ///
    /// Gas locked by a previous group callback is given back first.
    pub fn set_group_callback(
        &mut self,
        host: &mut dyn Host,
        group_id: &str,
        callback: &str,
        data: Vec<u8>,
        gas: u64,
    ) -> Result<(), AsyncError> {
        let index = self
            .groups
            .iter()
            .position(|group| group.identifier() == group_id)
            .ok_or_else(|| AsyncError::GroupNotFound(group_id.to_string()))?;

        let previous = self.groups[index].gas_locked();
        host.metering().restore_gas(previous);
        if let Err(err) = host.metering().use_gas_bounded(gas) {
            host.metering().use_gas_bounded(previous)?;
            return Err(err.into());
        }
        self.groups[index].set_callback(callback.to_string(), data, gas);
        Ok(())
    }

    /// Decide how a call to `destination` carrying `data` is routed
    pub fn determine_execution_mode(
        &self,
        host: &dyn Host,
        destination: &[u8],
        data: &[u8],
    ) -> Result<AsyncCallExecutionMode, AsyncError> {
        let (function, args) = self.call_args_parser.parse_data(data)?;
        let transfer = self.parse_transfer(&self.address, destination, &function, &args);
        let actual_destination = transfer
            .as_ref()
            .map(|parsed| parsed.receiver.as_slice())
            .unwrap_or(destination);

        let runtime = host.runtime();
        if transfer.is_some()
            && runtime.call_type == CallType::AsynchronousCall
            && actual_destination == runtime.caller.as_slice()
        {
            return Ok(AsyncCallExecutionMode::ESDTTransferOnCallBack);
        }

        let same_shard = host.are_in_same_shard(&self.address, actual_destination);
        if host.is_builtin_function(&function) {
            return Ok(if same_shard {
                AsyncCallExecutionMode::AsyncBuiltinFunc
            } else {
                AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard
            });
        }
        if same_shard && host.has_code(actual_destination) {
            return Ok(AsyncCallExecutionMode::SyncCall);
        }
        Ok(AsyncCallExecutionMode::Unknown)
    }

    /// Account that actually receives a call: the real receiver of a token
    /// transfer, the declared destination otherwise
    pub fn determine_destination_for_async_call(&self, destination: &[u8], data: &[u8]) -> Vec<u8> {
        self.call_args_parser
            .parse_data(data)
            .ok()
            .and_then(|(function, args)| {
                self.parse_transfer(&self.address, destination, &function, &args)
            })
            .map(|parsed| parsed.receiver)
            .unwrap_or_else(|| destination.to_vec())
    }

    pub(crate) fn parse_transfer(
        &self,
        sender: &[u8],
        receiver: &[u8],
        function: &str,
        args: &[Vec<u8>],
    ) -> Option<ParsedEsdtTransfers> {
        self.esdt_parser
            .parse_esdt_transfers(sender, receiver, function, args)
            .ok()
    }

    /// Record that a call is terminal and its callback finished, then drop
    /// every completed call and group
    pub fn complete_child(
        &mut self,
        host: &mut dyn Host,
        call_id: &[u8],
        gas_recovered: u64,
    ) -> Result<(), AsyncError> {
        let location = self
            .locate(call_id)
            .ok_or_else(|| AsyncError::CallNotFound(hex::encode(call_id)))?;
        self.complete_child_at(location, gas_recovered)?;
        self.sweep_completed_groups(host)
    }

    pub(crate) fn complete_child_at(
        &mut self,
        location: CallLocation,
        gas_recovered: u64,
    ) -> Result<(), AsyncError> {
        let group = self
            .groups
            .get_mut(location.group)
            .ok_or_else(|| AsyncError::CallNotFound(format!("group #{}", location.group)))?;
        group.mark_completed(location.call, gas_recovered)?;
        self.gas_accumulated = self
            .gas_accumulated
            .checked_add(gas_recovered)
            .ok_or(AsyncError::GasOverflow(self.gas_accumulated, gas_recovered))?;
        Ok(())
    }

    /// Remove completed calls and groups, running the callback of every group
    /// that just completed
    pub fn sweep_completed_groups(&mut self, host: &mut dyn Host) -> Result<(), AsyncError> {
        let mut finished = Vec::new();
        let mut remaining = Vec::with_capacity(self.groups.len());
        for mut group in std::mem::take(&mut self.groups) {
            let removed = group.remove_completed();
            self.completed_calls.extend(removed);
            if group.calls().is_empty() {
                finished.push(group);
            } else {
                remaining.push(group);
            }
        }
        self.groups = remaining;

        for group in &finished {
            log::debug!("async call group '{}' complete", group.identifier());
            self.execute_group_callback(host, group)?;
        }
        Ok(())
    }

    fn execute_group_callback(
        &mut self,
        host: &mut dyn Host,
        group: &AsyncCallGroup,
    ) -> Result<(), AsyncError> {
        if !group.has_callback() {
            return Ok(());
        }
        let step = self.gas.schedule().async_call_step;
        if group.gas_locked() <= step {
            log::warn!(
                "group callback '{}' skipped: {} gas locked, step costs {}",
                group.callback(),
                group.gas_locked(),
                step
            );
            return Ok(());
        }

        host.metering().restore_gas(group.gas_locked());
        host.metering().use_gas_bounded(step)?;

        let runtime = host.runtime().clone();
        let input = ContractCallInput {
            original_caller: runtime.original_caller,
            caller: self.address.clone(),
            recipient: self.address.clone(),
            function: group.callback().to_string(),
            arguments: vec![group.callback_data().to_vec()],
            call_value: BigUint::default(),
            call_type: CallType::AsynchronousCallBack,
            gas_price: runtime.gas_price,
            gas_provided: group.gas_locked() - step,
            gas_locked: 0,
            current_tx_hash: runtime.current_tx_hash,
            original_tx_hash: runtime.original_tx_hash,
            prev_tx_hash: runtime.prev_tx_hash,
            return_call_after_error: false,
            async_arguments: Some(AsyncArguments {
                call_id: self.next_call_id(),
                caller_call_id: Vec::new(),
                gas_accumulated: group.gas_recovered(),
            }),
        };

        let execution = host.execute_on_dest_context(&input);
        let output = execution.output.ok_or(AsyncError::AsyncNoOutputFromCallback)?;
        log::trace!(
            "group callback '{}' returned {} with {} gas remaining",
            group.callback(),
            output.return_code,
            output.gas_remaining
        );
        Ok(())
    }

    pub(crate) fn locate(&self, call_id: &[u8]) -> Option<CallLocation> {
        self.groups.iter().enumerate().find_map(|(group, calls)| {
            calls
                .find_call(call_id)
                .map(|call| CallLocation { group, call })
        })
    }

    /// Locations of not-yet-completed calls accepted by `filter`, in
    /// registration order
    pub(crate) fn call_locations(&self, filter: impl Fn(&AsyncCall) -> bool) -> Vec<CallLocation> {
        let mut locations = Vec::new();
        for (group_index, group) in self.groups.iter().enumerate() {
            for (call_index, call) in group.calls().iter().enumerate() {
                if !group.is_call_completed(call_index) && filter(call) {
                    locations.push(CallLocation {
                        group: group_index,
                        call: call_index,
                    });
                }
            }
        }
        locations
    }

    pub(crate) fn call_at(&self, location: CallLocation) -> Result<&AsyncCall, AsyncError> {
        self.groups
            .get(location.group)
            .and_then(|group| group.calls().get(location.call))
            .ok_or_else(|| Self::missing(location))
    }

    pub(crate) fn call_at_mut(&mut self, location: CallLocation) -> Result<&mut AsyncCall, AsyncError> {
        self.groups
            .get_mut(location.group)
            .and_then(|group| group.call_mut(location.call))
            .ok_or_else(|| Self::missing(location))
    }

    pub(crate) fn is_completed_at(&self, location: CallLocation) -> bool {
        self.groups
            .get(location.group)
            .map(|group| group.is_call_completed(location.call))
            .unwrap_or(false)
    }

    fn missing(location: CallLocation) -> AsyncError {
        AsyncError::CallNotFound(format!("group #{} call #{}", location.group, location.call))
    }

    fn group_or_create(&mut self, group_id: &str) -> &mut AsyncCallGroup {
        let index = match self
            .groups
            .iter()
            .position(|group| group.identifier() == group_id)
        {
            Some(index) => index,
            None => {
                self.groups.push(AsyncCallGroup::new(group_id));
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }

    /// Storage key for a context created in transaction `tx_hash`
    pub fn storage_key(tx_hash: &[u8]) -> Vec<u8> {
        let mut key = ASYNC_CONTEXT_PREFIX.to_vec();
        key.extend_from_slice(tx_hash);
        key
    }

    /// Persist the context in the current contract's storage
    pub fn save(&self, host: &mut dyn Host) -> Result<(), AsyncError> {
        let encoded = serde_json::to_vec(&self.to_serializable())?;
        let key = Self::storage_key(&self.call_id_seed);
        log::debug!(
            "saving async context of {} ({} groups)",
            hex::encode(&self.address),
            self.groups.len()
        );
        host.storage().set_storage(&key, encoded);
        Ok(())
    }

    /// Load the context persisted by transaction `tx_hash`, if any
    pub fn load(
        host: &mut dyn Host,
        tx_hash: &[u8],
        schedule: GasSchedule,
    ) -> Result<Option<Self>, AsyncError> {
        let key = Self::storage_key(tx_hash);
        let Some(encoded) = host.storage().get_storage(&key) else {
            return Ok(None);
        };
        let ser: SerializableAsyncContext = serde_json::from_slice(&encoded)?;
        Self::from_serializable(ser, schedule).map(Some)
    }

    /// Remove the persisted form of this context
    pub fn delete(&self, host: &mut dyn Host) {
        let key = Self::storage_key(&self.call_id_seed);
        host.storage().remove_storage(&key);
    }

    pub fn to_serializable(&self) -> SerializableAsyncContext {
        SerializableAsyncContext {
            address: self.address.clone(),
            caller: self.caller.clone(),
            call_id_seed: self.call_id_seed.clone(),
            call_id_counter: self.call_id_counter,
            gas_accumulated: self.gas_accumulated,
            groups: self
                .groups
                .iter()
                .map(AsyncCallGroup::to_serializable)
                .collect(),
        }
    }

    pub fn from_serializable(
        ser: SerializableAsyncContext,
        schedule: GasSchedule,
    ) -> Result<Self, AsyncError> {
        let groups = ser
            .groups
            .into_iter()
            .map(AsyncCallGroup::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            address: ser.address,
            caller: ser.caller,
            call_id_seed: ser.call_id_seed,
            call_id_counter: ser.call_id_counter,
            gas_accumulated: ser.gas_accumulated,
            groups,
            completed_calls: Vec::new(),
            gas: AsyncGasAccountant::new(schedule),
            call_args_parser: Box::new(HexCallArgsParser),
            esdt_parser: Box::new(BuiltinEsdtTransferParser),
        })
    }
}

/// Persisted form of an [`AsyncContext`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableAsyncContext {
    #[serde(with = "hex::serde")]
    pub address: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub caller: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub call_id_seed: Vec<u8>,
    pub call_id_counter: u64,
    pub gas_accumulated: u64,
    pub groups: Vec<SerializableAsyncCallGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_call::test_support::{context, data, enter, schedule, world, STEP, TX_HASH};
    use crate::async_call::{AsyncCall, AsyncCallStatus};
    use crate::parsers::CallDataError;

    #[test]
    fn test_registration_charges_gas_and_routes() {
        let mut world = world(2);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        let transfer = data("ESDTTransfer", &[b"TOK-01", &[1]]);

        ctx.add_call(&mut world, "g", AsyncCall::new(b"callee".to_vec(), data("echo", &[]), 1_000, 50))
            .unwrap();
        ctx.add_call(&mut world, "g", AsyncCall::new(b"remote".to_vec(), data("echo", &[]), 1_000, 50))
            .unwrap();
        ctx.add_call(&mut world, "g", AsyncCall::new(b"callee".to_vec(), transfer.clone(), 500, 0))
            .unwrap();
        ctx.add_call(&mut world, "g", AsyncCall::new(b"remote".to_vec(), transfer, 500, 0))
            .unwrap();

        assert_eq!(world.metering().gas_left(), 10_000 - 2 * 1_050 - 2 * 500);
        let modes: Vec<AsyncCallExecutionMode> = ctx.calls().map(AsyncCall::execution_mode).collect();
        assert_eq!(
            modes,
            vec![
                AsyncCallExecutionMode::SyncCall,
                AsyncCallExecutionMode::Unknown,
                AsyncCallExecutionMode::AsyncBuiltinFunc,
                AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard,
            ]
        );
        assert!(ctx.calls().all(|call| call.source() == b"caller"));
        assert_eq!(ctx.groups().len(), 1);
    }

    #[test]
    fn test_registration_without_gas_changes_nothing() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 500);
        let mut ctx = context(&world);

        let result = ctx.add_call(&mut world, "g", AsyncCall::new(b"callee".to_vec(), data("echo", &[]), 1_000, 0));

        assert!(matches!(result, Err(AsyncError::Metering(_))));
        assert_eq!(world.metering().gas_left(), 500);
        assert!(ctx.group("g").is_none());
    }

    /// `function|arg|arg` with plain-text arguments
    struct PlainCallArgsParser;

    impl CallArgsParser for PlainCallArgsParser {
        fn parse_data(&self, data: &[u8]) -> Result<(String, Vec<Vec<u8>>), CallDataError> {
            let mut segments = data.split(|byte| *byte == b'|');
            let function = segments
                .next()
                .filter(|function| !function.is_empty())
                .ok_or(CallDataError::MissingFunction)?;
            let function = String::from_utf8(function.to_vec())
                .map_err(|_| CallDataError::InvalidFunctionName)?;
            Ok((function, segments.map(<[u8]>::to_vec).collect()))
        }
    }

    #[test]
    fn test_custom_call_data_parser() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world)
            .with_parsers(Box::new(PlainCallArgsParser), Box::new(BuiltinEsdtTransferParser));
        ctx.add_call(&mut world, "g", AsyncCall::new(b"callee".to_vec(), b"echo|hi".to_vec(), 500, 0))
            .unwrap();
        assert_eq!(
            ctx.calls().next().unwrap().execution_mode(),
            AsyncCallExecutionMode::SyncCall
        );

        ctx.execute(&mut world).unwrap();

        assert_eq!(world.journal()[0].function, "echo");
        assert_eq!(world.journal()[0].arguments, vec![b"hi".to_vec()]);
        assert_eq!(world.output().return_data(), vec![b"hi".to_vec()]);
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_nft_transfer_destination_is_the_named_receiver() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let ctx = context(&world);
        let nft = data("ESDTNFTTransfer", &[b"NFT-01", &[1], &[1], b"remote"]);

        assert_eq!(ctx.determine_destination_for_async_call(b"caller", &nft), b"remote".to_vec());
        assert_eq!(
            ctx.determine_destination_for_async_call(b"callee", &data("echo", &[])),
            b"callee".to_vec()
        );
    }

    #[test]
    fn test_group_callback_runs_once_all_calls_complete() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        for word in [b"one".as_slice(), b"two".as_slice()] {
            ctx.add_call(&mut world, "g", AsyncCall::new(b"callee".to_vec(), data("echo", &[word]), 500, 0))
                .unwrap();
        }
        ctx.set_group_callback(&mut world, "g", "all_done", b"done".to_vec(), 300)
            .unwrap();

        ctx.execute(&mut world).unwrap();

        let functions: Vec<String> = world.journal().iter().map(|input| input.function.clone()).collect();
        assert_eq!(functions, vec!["echo", "echo", "all_done"]);
        let group_callback = world.journal()[2].clone();
        assert_eq!(group_callback.arguments, vec![b"done".to_vec()]);
        assert_eq!(group_callback.gas_provided, 300 - STEP);
        assert_eq!(
            world.account(b"caller").unwrap().storage.get(b"group".as_slice()),
            Some(&b"done".to_vec())
        );
        assert!(ctx.is_complete());
        assert_eq!(ctx.completed_calls().len(), 2);
    }

    #[test]
    fn test_group_callback_without_gas_for_its_step_is_skipped() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        ctx.add_call(&mut world, "g", AsyncCall::new(b"callee".to_vec(), data("echo", &[b"x"]), 500, 0))
            .unwrap();
        ctx.set_group_callback(&mut world, "g", "all_done", Vec::new(), STEP)
            .unwrap();

        ctx.execute(&mut world).unwrap();

        assert_eq!(world.journal().len(), 1);
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_replacing_a_group_callback_refunds_the_previous_one() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        ctx.add_call(&mut world, "g", AsyncCall::new(b"callee".to_vec(), data("echo", &[]), 1_000, 0))
            .unwrap();

        ctx.set_group_callback(&mut world, "g", "all_done", Vec::new(), 400)
            .unwrap();
        ctx.set_group_callback(&mut world, "g", "all_done", Vec::new(), 300)
            .unwrap();
        assert_eq!(world.metering().gas_left(), 10_000 - 1_000 - 300);

        assert!(matches!(
            ctx.set_group_callback(&mut world, "missing", "all_done", Vec::new(), 1),
            Err(AsyncError::GroupNotFound(_))
        ));
    }

    #[test]
    fn test_persisted_context_roundtrip() {
        let mut world = world(2);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        let call = AsyncCall::new(b"remote".to_vec(), data("echo", &[b"hi"]), 1_000, 50)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(&mut world, "g", call).unwrap();
        ctx.set_group_callback(&mut world, "g", "all_done", b"x".to_vec(), 300)
            .unwrap();
        ctx.send_remote_calls(&mut world).unwrap();

        ctx.save(&mut world).unwrap();
        let loaded = AsyncContext::load(&mut world, &TX_HASH, schedule())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.to_serializable(), ctx.to_serializable());
        assert_eq!(loaded.calls().next().unwrap().status(), AsyncCallStatus::Sent);
        assert_eq!(loaded.group("g").unwrap().callback(), "all_done");

        ctx.delete(&mut world);
        assert!(AsyncContext::load(&mut world, &TX_HASH, schedule())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unknown_call_cannot_complete() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        assert!(matches!(
            ctx.complete_child(&mut world, b"nope", 0),
            Err(AsyncError::CallNotFound(_))
        ));
    }
}
