//! In-memory reference host
//!
//! [`WorldHost`] keeps every account of every shard in one process and
//! implements [`Host`] on top of a stack of execution frames. Each frame owns
//! the gas meter and output of one activation; a child's output is merged
//! into its parent when it returns.
//!
//! Contract activations run on the bytecode [`VM`]. When a contract
//! registered async calls, its [`AsyncContext`] runs right after it, inside
//! the same frame, and is saved in the contract's storage if calls are left
//! waiting for another shard.

pub mod account;
pub mod builtin;
pub mod transaction;

pub use account::Account;
pub use transaction::{PendingAsyncCall, Transaction, TransactionResult};

use crate::async_call::{AsyncCall, AsyncCallStatus, AsyncContext, AsyncError};
use crate::config::HostConfig;
use crate::contract::{ExecutionContext, ExecutionResult, Module, VM};
use crate::core::{CallType, ContractCallInput, OutputTransfer, ReturnCode, VMOutput};
use crate::host::{
    DestinationExecution, ExecutionError, GasMeter, Host, MeteringError, OutputContext,
    RuntimeFrame, StorageContext,
};
use crate::parsers::is_esdt_transfer_function;
use crate::token::{EsdtLedger, TokenError};
use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Reference host errors
#[derive(Error, Debug)]
pub enum WorldError {
    #[error("Account already exists: {0}")]
    AccountExists(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Insufficient funds in {address}: have {have}, need {need}")]
    InsufficientFunds {
        address: String,
        have: BigUint,
        need: BigUint,
    },
    #[error("No pending async context for transaction {0}")]
    NoPendingContext(String),
    #[error("Async error: {0}")]
    Async(#[from] AsyncError),
    #[error("Token error: {0}")]
    Token(#[from] TokenError),
}

/// An async call that finished, as observed by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsyncCallRecord {
    #[serde(with = "hex::serde")]
    pub source: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub destination: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub call_id: Vec<u8>,
    pub status: AsyncCallStatus,
}

/// One activation on the execution stack
#[derive(Debug, Clone)]
struct Frame {
    runtime: RuntimeFrame,
    meter: GasMeter,
    output: OutputContext,
}

/// All shards of a toy chain, in memory
pub struct WorldHost {
    config: HostConfig,
    accounts: BTreeMap<Vec<u8>, Account>,
    ledger: EsdtLedger,
    /// Frame used while nothing executes
    idle: Frame,
    frames: Vec<Frame>,
    /// Every input handed to an execution, in order
    journal: Vec<ContractCallInput>,
    async_log: Vec<AsyncCallRecord>,
    tx_nonce: u64,
    /// Set while delivering a built-in transfer on its receiving shard
    incoming_transfer: bool,
}

impl WorldHost {
    pub fn new(config: HostConfig) -> Self {
        let idle = Frame {
            runtime: RuntimeFrame::default(),
            meter: GasMeter::new(config.gas_schedule, 0),
            output: OutputContext::new(),
        };
        Self {
            config,
            accounts: BTreeMap::new(),
            ledger: EsdtLedger::new(),
            idle,
            frames: Vec::new(),
            journal: Vec::new(),
            async_log: Vec::new(),
            tx_nonce: 0,
            incoming_transfer: false,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn add_account(&mut self, account: Account) -> Result<(), WorldError> {
        if self.accounts.contains_key(&account.address) {
            return Err(WorldError::AccountExists(display_address(&account.address)));
        }
        log::debug!(
            "account {} added to shard {}{}",
            display_address(&account.address),
            account.shard,
            if account.has_code() { " with code" } else { "" }
        );
        self.accounts.insert(account.address.clone(), account);
        Ok(())
    }

    pub fn account(&self, address: &[u8]) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn account_mut(&mut self, address: &[u8]) -> Option<&mut Account> {
        self.accounts.get_mut(address)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn balance_of(&self, address: &[u8]) -> BigUint {
        self.accounts
            .get(address)
            .map(|account| account.balance.clone())
            .unwrap_or_default()
    }

    pub fn ledger(&self) -> &EsdtLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut EsdtLedger {
        &mut self.ledger
    }

    /// Shard of an account; unknown addresses are placed by their last byte
    pub fn shard_of(&self, address: &[u8]) -> u32 {
        match self.accounts.get(address) {
            Some(account) => account.shard,
            None => address
                .last()
                .map(|byte| u32::from(*byte) % self.config.num_shards.max(1))
                .unwrap_or(0),
        }
    }

    pub fn journal(&self) -> &[ContractCallInput] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// Async calls that finished so far, in completion order
    pub fn async_log(&self) -> &[AsyncCallRecord] {
        &self.async_log
    }

    /// Open an activation for `runtime` with `gas` to spend
    pub fn begin_execution(&mut self, runtime: RuntimeFrame, gas: u64) {
        self.frames.push(Frame {
            runtime,
            meter: GasMeter::new(self.config.gas_schedule, gas),
            output: OutputContext::new(),
        });
    }

    /// Close the innermost activation and return what it produced
    pub fn end_execution(&mut self) -> Option<VMOutput> {
        self.frames
            .pop()
            .map(|frame| frame.output.to_vm_output(frame.meter.gas_left()))
    }

    fn current(&self) -> &Frame {
        self.frames.last().unwrap_or(&self.idle)
    }

    fn current_mut(&mut self) -> &mut Frame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => &mut self.idle,
        }
    }

    /// Run `input` without touching the caller's gas or output
    fn run_on_dest(&mut self, input: &ContractCallInput) -> DestinationExecution {
        self.journal.push(input.clone());
        if self.frames.len() > self.config.max_call_depth {
            return DestinationExecution::completed(VMOutput::failed(
                ReturnCode::CallStackOverFlow,
                format!("call depth above {}", self.config.max_call_depth),
                0,
            ));
        }

        let accounts = self.accounts.clone();
        let ledger = self.ledger.clone();
        let execution = if self.is_builtin_function(&input.function) {
            self.run_builtin(input)
        } else {
            self.run_contract(input)
        };

        let succeeded = execution.output.as_ref().map(VMOutput::is_ok).unwrap_or(false);
        if !succeeded {
            log::debug!(
                "{} on {} failed, reverting: {}",
                input.function,
                display_address(&input.recipient),
                execution
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            );
            self.accounts = accounts;
            self.ledger = ledger;
        }
        execution
    }

    fn run_contract(&mut self, input: &ContractCallInput) -> DestinationExecution {
        let Some(module) = self
            .accounts
            .get(&input.recipient)
            .and_then(|account| account.code.clone())
        else {
            return DestinationExecution::completed(VMOutput::failed(
                ReturnCode::ContractNotFound,
                format!("no code at {}", display_address(&input.recipient)),
                0,
            ));
        };

        self.begin_execution(runtime_for(input, self.config.default_gas_price), input.gas_provided);
        let result = self.run_frame(&module, input);
        let output = match (self.end_execution(), result) {
            (Some(output), Ok(())) => output,
            (_, Err(err)) => VMOutput::failed(err.return_code, err.message, 0),
            (None, Ok(())) => VMOutput::failed(
                ReturnCode::ExecutionFailed,
                "execution frame lost",
                0,
            ),
        };
        DestinationExecution::completed(output)
    }

    fn run_frame(&mut self, module: &Module, input: &ContractCallInput) -> Result<(), ExecutionError> {
        if input.call_type != CallType::AsynchronousCallBack {
            self.move_balance(&input.caller, &input.recipient, &input.call_value)
                .map_err(|err| ExecutionError::new(ReturnCode::OutOfFunds, err.to_string()))?;
        }

        let storage = self
            .accounts
            .get(&input.recipient)
            .map(|account| account.storage.clone())
            .unwrap_or_default();
        let context = ExecutionContext {
            caller: input.caller.clone(),
            contract_address: input.recipient.clone(),
            function: input.function.clone(),
            args: input.arguments.clone(),
            call_value: input.call_value.clone(),
            gas_limit: input.gas_provided,
        };
        let result = VM::new(module, storage, context)
            .execute()
            .map_err(|err| ExecutionError::new(err.return_code(), err.to_string()))?;
        log::trace!(
            "{}::{} used {} gas",
            display_address(&input.recipient),
            input.function,
            input
                .gas_provided
                .saturating_sub(result.gas_remaining + result.gas_reserved)
        );

        self.apply_result(&input.recipient, &result)?;
        if result.async_calls.is_empty() && result.group_callbacks.is_empty() {
            return Ok(());
        }
        self.run_async_step(&result).map_err(|err| {
            let return_code = match err {
                AsyncError::Metering(_) | AsyncError::NotEnoughGas => ReturnCode::OutOfGas,
                _ => ReturnCode::ExecutionFailed,
            };
            ExecutionError::new(return_code, err.to_string())
        })
    }

    fn apply_result(&mut self, address: &[u8], result: &ExecutionResult) -> Result<(), ExecutionError> {
        if let Some(account) = self.accounts.get_mut(address) {
            account.storage.extend(
                result
                    .storage_changes
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone())),
            );
        }

        for data in &result.return_data {
            self.current_mut().output.finish(data.clone());
        }

        for (to, amount) in &result.transfers {
            self.move_balance(address, to, amount)
                .map_err(|err| ExecutionError::new(ReturnCode::OutOfFunds, err.to_string()))?;
            self.current_mut()
                .output
                .output_account_mut(to)
                .output_transfers
                .push(OutputTransfer {
                    sender: address.to_vec(),
                    value: amount.clone(),
                    ..Default::default()
                });
        }

        let gas_left = result
            .gas_remaining
            .checked_add(result.gas_reserved)
            .ok_or_else(|| ExecutionError::new(ReturnCode::ExecutionFailed, "gas overflow"))?;
        self.current_mut().meter.set_gas_left(gas_left);
        Ok(())
    }

    /// Register, execute and dispatch the async calls of the current frame
    fn run_async_step(&mut self, result: &ExecutionResult) -> Result<(), AsyncError> {
        let runtime = self.current().runtime.clone();
        let mut context = AsyncContext::new(&runtime, self.config.gas_schedule);

        for request in &result.async_calls {
            let call = AsyncCall::new(
                request.destination.clone(),
                request.data.clone(),
                request.gas_limit,
                request.gas_locked,
            )
            .with_value(request.value.clone())
            .with_callbacks(
                request.success_callback.clone(),
                request.error_callback.clone(),
            );
            context.add_call(self, &request.group, call)?;
        }
        for request in &result.group_callbacks {
            context.set_group_callback(
                self,
                &request.group,
                &request.callback,
                request.data.clone(),
                request.gas,
            )?;
        }

        context.execute(self)?;
        let sent = context.send_remote_calls(self)?;
        self.record_completed(&context);
        if !context.is_complete() {
            log::debug!(
                "{} async calls of {} left for other shards",
                sent,
                display_address(context.address())
            );
            context.save(self)?;
        }
        Ok(())
    }

    fn record_completed(&mut self, context: &AsyncContext) {
        for call in context.completed_calls() {
            self.async_log.push(AsyncCallRecord {
                source: context.address().to_vec(),
                destination: call.destination().to_vec(),
                call_id: call.call_id().to_vec(),
                status: call.status(),
            });
        }
    }

    /// Move native value between accounts, recording the deltas in the
    /// current output
    fn move_balance(&mut self, from: &[u8], to: &[u8], amount: &BigUint) -> Result<(), WorldError> {
        if amount.is_zero() || from == to {
            return Ok(());
        }
        let sender = self
            .accounts
            .get_mut(from)
            .ok_or_else(|| WorldError::AccountNotFound(display_address(from)))?;
        if sender.balance < *amount {
            return Err(WorldError::InsufficientFunds {
                address: display_address(from),
                have: sender.balance.clone(),
                need: amount.clone(),
            });
        }
        sender.balance -= amount;

        let shard = self.shard_of(to);
        self.accounts
            .entry(to.to_vec())
            .or_insert_with(|| Account::new(to.to_vec(), shard))
            .balance += amount;

        let delta = BigInt::from(amount.clone());
        let output = &mut self.current_mut().output;
        output.output_account_mut(from).balance_delta -= &delta;
        output.output_account_mut(to).balance_delta += &delta;
        Ok(())
    }

    fn next_tx_hash(&mut self, sender: &[u8]) -> Vec<u8> {
        let mut seed = sender.to_vec();
        seed.extend_from_slice(b"tx");
        let hash = crate::crypto::derive_call_id(&seed, self.tx_nonce);
        self.tx_nonce += 1;
        hash
    }
}

impl Host for WorldHost {
    fn runtime(&self) -> &RuntimeFrame {
        &self.current().runtime
    }

    fn metering(&mut self) -> &mut GasMeter {
        &mut self.current_mut().meter
    }

    fn output(&mut self) -> &mut OutputContext {
        &mut self.current_mut().output
    }

    fn storage(&mut self) -> &mut dyn StorageContext {
        let address = self.current().runtime.context_address.clone();
        let shard = self.shard_of(&address);
        &mut self
            .accounts
            .entry(address.clone())
            .or_insert_with(|| Account::new(address, shard))
            .storage
    }

    fn execute_on_dest_context(&mut self, input: &ContractCallInput) -> DestinationExecution {
        if let Err(MeteringError::OutOfGas { needed, left }) =
            self.current_mut().meter.use_gas_bounded(input.gas_provided)
        {
            return DestinationExecution::completed(VMOutput::failed(
                ReturnCode::OutOfGas,
                format!("caller has {} gas, call needs {}", left, needed),
                0,
            ));
        }

        let execution = self.run_on_dest(input);
        if let Some(output) = &execution.output {
            let frame = self.current_mut();
            frame.meter.restore_gas(output.gas_remaining);
            frame.output.merge_vm_output(output);
        }
        execution
    }

    fn are_in_same_shard(&self, left: &[u8], right: &[u8]) -> bool {
        self.shard_of(left) == self.shard_of(right)
    }

    fn is_builtin_function(&self, function: &str) -> bool {
        is_esdt_transfer_function(function)
    }

    fn has_code(&self, address: &[u8]) -> bool {
        self.accounts
            .get(address)
            .map(Account::has_code)
            .unwrap_or(false)
    }
}

/// Runtime frame of the activation `input` starts
fn runtime_for(input: &ContractCallInput, default_gas_price: u64) -> RuntimeFrame {
    RuntimeFrame {
        context_address: input.recipient.clone(),
        caller: input.caller.clone(),
        original_caller: input.original_caller.clone(),
        call_type: input.call_type,
        gas_price: if input.gas_price == 0 {
            default_gas_price
        } else {
            input.gas_price
        },
        current_tx_hash: input.current_tx_hash.clone(),
        original_tx_hash: input.original_tx_hash.clone(),
        prev_tx_hash: input.prev_tx_hash.clone(),
    }
}

/// Addresses are shown as text when printable, hex otherwise
pub fn display_address(address: &[u8]) -> String {
    match std::str::from_utf8(address) {
        Ok(text) if !text.is_empty() && text.chars().all(|c| c.is_ascii_graphic()) => text.to_string(),
        _ => hex::encode(address),
    }
}
