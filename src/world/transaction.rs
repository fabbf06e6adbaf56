//! Transactions on the reference host
//!
//! A transaction starts with [`WorldHost::execute_transaction`] on the
//! sender's shard. Async calls that have to leave the shard show up as
//! [`PendingAsyncCall`]s in its result; delivering one on the destination
//! shard and resuming the caller with the outcome is what a real network
//! would do between blocks.

use crate::async_call::{AsyncContext, LocalCallOutcome};
use crate::core::{AsyncArguments, CallType, ContractCallInput, OutputTransfer, VMOutput};
use crate::host::{Host, RuntimeFrame};
use crate::parsers::{CallArgsParser, HexCallArgsParser};
use crate::world::{display_address, WorldError, WorldHost};
use num_bigint::BigUint;
use serde::Serialize;

/// A user transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub sender: Vec<u8>,
    pub receiver: Vec<u8>,
    /// Function to call; empty for a plain value transfer
    pub function: String,
    pub arguments: Vec<Vec<u8>>,
    pub value: BigUint,
    pub gas_limit: u64,
    /// Falls back to the configured default price
    pub gas_price: Option<u64>,
}

impl Transaction {
    pub fn new(sender: impl Into<Vec<u8>>, receiver: impl Into<Vec<u8>>, function: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            function: function.into(),
            ..Default::default()
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<Vec<u8>>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_value(mut self, value: BigUint) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }
}

/// An async call waiting to be delivered on another shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAsyncCall {
    #[serde(with = "hex::serde")]
    pub tx_hash: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub destination: Vec<u8>,
    pub transfer: OutputTransfer,
}

impl PendingAsyncCall {
    /// Contract that registered the call
    pub fn source(&self) -> &[u8] {
        &self.transfer.sender
    }

    pub fn call_id(&self) -> &[u8] {
        &self.transfer.call_id
    }
}

/// Outcome of one transaction, delivery or resumption
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionResult {
    #[serde(with = "hex::serde")]
    pub tx_hash: Vec<u8>,
    pub output: VMOutput,
    /// False while async calls of this step still wait on another shard
    pub is_complete: bool,
}

impl TransactionResult {
    fn new(tx_hash: Vec<u8>, output: VMOutput, execution_complete: bool) -> Self {
        let mut result = Self {
            tx_hash,
            output,
            is_complete: execution_complete,
        };
        result.is_complete &= result.pending_async_calls().is_empty();
        result
    }

    /// Cross-shard async calls produced by this step
    pub fn pending_async_calls(&self) -> Vec<PendingAsyncCall> {
        self.output
            .output_accounts
            .iter()
            .flat_map(|(address, account)| {
                account
                    .output_transfers
                    .iter()
                    .filter(|transfer| {
                        transfer.call_type == CallType::AsynchronousCall
                            && !transfer.call_id.is_empty()
                    })
                    .map(move |transfer| PendingAsyncCall {
                        tx_hash: self.tx_hash.clone(),
                        destination: address.clone(),
                        transfer: transfer.clone(),
                    })
            })
            .collect()
    }
}

impl WorldHost {
    /// Run a user transaction on the sender's shard
    pub fn execute_transaction(&mut self, tx: &Transaction) -> Result<TransactionResult, WorldError> {
        if !self.accounts.contains_key(&tx.sender) {
            return Err(WorldError::AccountNotFound(display_address(&tx.sender)));
        }
        let tx_hash = self.next_tx_hash(&tx.sender);
        let gas_price = tx.gas_price.unwrap_or(self.config.default_gas_price);
        log::info!(
            "tx {}: {} -> {} {}",
            hex::encode(&tx_hash[..8]),
            display_address(&tx.sender),
            display_address(&tx.receiver),
            if tx.function.is_empty() { "(transfer)" } else { tx.function.as_str() }
        );

        let runtime = RuntimeFrame {
            context_address: tx.sender.clone(),
            caller: tx.sender.clone(),
            original_caller: tx.sender.clone(),
            call_type: CallType::DirectCall,
            gas_price,
            current_tx_hash: tx_hash.clone(),
            original_tx_hash: tx_hash.clone(),
            prev_tx_hash: Vec::new(),
        };
        self.begin_execution(runtime, tx.gas_limit);

        if tx.function.is_empty() {
            let moved = self.move_balance(&tx.sender, &tx.receiver, &tx.value);
            let output = self.close_root()?;
            moved?;
            return Ok(TransactionResult::new(tx_hash, output, true));
        }

        let input = ContractCallInput {
            original_caller: tx.sender.clone(),
            caller: tx.sender.clone(),
            recipient: tx.receiver.clone(),
            function: tx.function.clone(),
            arguments: tx.arguments.clone(),
            call_value: tx.value.clone(),
            call_type: CallType::DirectCall,
            gas_price,
            gas_provided: tx.gas_limit,
            current_tx_hash: tx_hash.clone(),
            original_tx_hash: tx_hash.clone(),
            ..Default::default()
        };
        let execution = self.execute_on_dest_context(&input);
        let mut output = self.close_root()?;
        if let Some(child) = &execution.output {
            output.return_code = child.return_code;
            output.return_message = child.return_message.clone();
        }
        log::info!(
            "tx {} finished with '{}', {} gas left",
            hex::encode(&tx_hash[..8]),
            output.return_code,
            output.gas_remaining
        );
        Ok(TransactionResult::new(tx_hash, output, execution.is_complete))
    }

    /// Run a cross-shard async call on its destination shard
    pub fn deliver_async_call(&mut self, pending: &PendingAsyncCall) -> Result<TransactionResult, WorldError> {
        let transfer = &pending.transfer;
        let (function, arguments) = HexCallArgsParser
            .parse_data(&transfer.data)
            .map_err(crate::async_call::AsyncError::from)?;
        log::info!(
            "delivering {} from {} to {}",
            function,
            display_address(&transfer.sender),
            display_address(&pending.destination)
        );

        let input = ContractCallInput {
            original_caller: transfer.sender.clone(),
            caller: transfer.sender.clone(),
            recipient: pending.destination.clone(),
            function,
            arguments,
            call_value: transfer.value.clone(),
            call_type: transfer.call_type,
            gas_price: self.config.default_gas_price,
            gas_provided: transfer.gas_limit,
            gas_locked: transfer.gas_locked,
            current_tx_hash: pending.tx_hash.clone(),
            original_tx_hash: pending.tx_hash.clone(),
            async_arguments: Some(AsyncArguments {
                call_id: transfer.call_id.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let runtime = RuntimeFrame {
            context_address: transfer.sender.clone(),
            caller: transfer.sender.clone(),
            original_caller: transfer.sender.clone(),
            call_type: transfer.call_type,
            gas_price: input.gas_price,
            current_tx_hash: pending.tx_hash.clone(),
            original_tx_hash: pending.tx_hash.clone(),
            prev_tx_hash: Vec::new(),
        };

        self.begin_execution(runtime, transfer.gas_limit);
        self.incoming_transfer = self.is_builtin_function(&input.function);
        let execution = self.execute_on_dest_context(&input);
        self.incoming_transfer = false;

        let mut output = self.close_root()?;
        if let Some(child) = &execution.output {
            output.return_code = child.return_code;
            output.return_message = child.return_message.clone();
        }
        Ok(TransactionResult::new(
            pending.tx_hash.clone(),
            output,
            execution.is_complete,
        ))
    }

    /// Resume the caller of a delivered async call with its outcome,
    /// running the callback and any group callback it unblocks
    pub fn resume_async_call(
        &mut self,
        pending: &PendingAsyncCall,
        destination_output: &VMOutput,
    ) -> Result<TransactionResult, WorldError> {
        let source = pending.source().to_vec();
        let runtime = RuntimeFrame {
            context_address: source.clone(),
            caller: pending.destination.clone(),
            original_caller: source.clone(),
            call_type: CallType::AsynchronousCallBack,
            gas_price: self.config.default_gas_price,
            current_tx_hash: pending.tx_hash.clone(),
            original_tx_hash: pending.tx_hash.clone(),
            prev_tx_hash: Vec::new(),
        };

        let accounts = self.accounts.clone();
        let ledger = self.ledger.clone();
        self.begin_execution(runtime, 0);
        let resumed = self.resume_in_frame(pending, destination_output);
        let output = self.close_root()?;

        match resumed {
            Ok(outcome) => {
                log::debug!(
                    "resumed {} for call {}: {:?}",
                    display_address(&source),
                    hex::encode(pending.call_id()),
                    outcome
                );
                Ok(TransactionResult::new(
                    pending.tx_hash.clone(),
                    output,
                    outcome != LocalCallOutcome::Pending,
                ))
            }
            Err(err) => {
                self.accounts = accounts;
                self.ledger = ledger;
                Err(err)
            }
        }
    }

    fn resume_in_frame(
        &mut self,
        pending: &PendingAsyncCall,
        destination_output: &VMOutput,
    ) -> Result<LocalCallOutcome, WorldError> {
        let schedule = self.config.gas_schedule;
        let mut context = AsyncContext::load(self, &pending.tx_hash, schedule)?
            .ok_or_else(|| WorldError::NoPendingContext(hex::encode(&pending.tx_hash)))?;

        let outcome = context.postprocess_cross_shard_callback(self, pending.call_id(), destination_output)?;
        self.record_completed(&context);
        if context.is_complete() {
            context.delete(self);
        } else {
            context.save(self)?;
        }
        Ok(outcome)
    }

    /// Close the transaction-level frame
    fn close_root(&mut self) -> Result<VMOutput, WorldError> {
        self.end_execution()
            .ok_or_else(|| WorldError::NoPendingContext("execution stack is empty".to_string()))
    }
}
