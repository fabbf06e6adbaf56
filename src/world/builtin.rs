//! Built-in token transfer functions of the reference host
//!
//! A transfer whose sender and receiver live in the same shard moves the
//! tokens at once. Otherwise only the sending half runs here: the tokens are
//! debited and an output transfer carrying the original call data is
//! addressed to the receiver, which credits them when the transfer is
//! delivered on its own shard.

use crate::core::{CallType, ContractCallInput, OutputTransfer, ReturnCode, VMOutput};
use crate::host::{DestinationExecution, ExecutionError, Host, OutputContext};
use crate::parsers::{build_call_data, BuiltinEsdtTransferParser, EsdtTransferParser, ParsedEsdtTransfers};
use crate::token::{TokenError, TokenKey};
use crate::world::{display_address, WorldHost};
use num_bigint::BigUint;

impl WorldHost {
    pub(super) fn run_builtin(&mut self, input: &ContractCallInput) -> DestinationExecution {
        let incoming = std::mem::take(&mut self.incoming_transfer);
        match self.transfer_tokens(input, incoming) {
            Ok(execution) => execution,
            Err(err) => DestinationExecution::completed(VMOutput::failed(
                err.return_code,
                err.message,
                0,
            )),
        }
    }

    fn transfer_tokens(
        &mut self,
        input: &ContractCallInput,
        incoming: bool,
    ) -> Result<DestinationExecution, ExecutionError> {
        let cost = self.config.builtin_function_cost;
        let remaining = input.gas_provided.checked_sub(cost).ok_or_else(|| {
            ExecutionError::new(
                ReturnCode::OutOfGas,
                format!("{} costs {} gas, got {}", input.function, cost, input.gas_provided),
            )
        })?;

        let parsed = BuiltinEsdtTransferParser
            .parse_esdt_transfers(&input.caller, &input.recipient, &input.function, &input.arguments)
            .map_err(|err| ExecutionError::new(ReturnCode::FunctionWrongSignature, err.to_string()))?;
        let cross_shard = !incoming && !self.are_in_same_shard(&parsed.sender, &parsed.receiver);

        for transfer in &parsed.transfers {
            let token = TokenKey::new(transfer.token_identifier.clone(), transfer.nonce);
            let moved = if incoming {
                self.ledger.credit(&parsed.receiver, &token, &transfer.value);
                Ok(())
            } else if cross_shard {
                self.ledger.debit(&parsed.sender, &token, &transfer.value)
            } else {
                self.ledger
                    .transfer(&parsed.sender, &parsed.receiver, &token, &transfer.value)
                    .map(|_| ())
            };
            moved.map_err(token_error)?;
        }
        log::debug!(
            "{}: {} token transfer(s) {} -> {}{}",
            input.function,
            parsed.transfers.len(),
            display_address(&parsed.sender),
            display_address(&parsed.receiver),
            if cross_shard { " (cross-shard)" } else { "" }
        );

        let mut output = OutputContext::new();
        if cross_shard {
            output
                .output_account_mut(&parsed.receiver)
                .output_transfers
                .push(OutputTransfer {
                    sender: parsed.sender.clone(),
                    value: BigUint::default(),
                    data: build_call_data(&input.function, &input.arguments),
                    gas_limit: remaining,
                    gas_locked: input.gas_locked,
                    call_type: input.call_type,
                    call_id: input.call_id().unwrap_or_default().to_vec(),
                });
            return Ok(DestinationExecution {
                output: Some(output.to_vm_output(remaining)),
                is_complete: false,
                error: None,
            });
        }

        if !parsed.has_call_after() {
            return Ok(DestinationExecution::completed(output.to_vm_output(remaining)));
        }

        let child = self.run_call_after_transfer(input, &parsed, remaining)?;
        if !child.is_ok() {
            return Ok(DestinationExecution::completed(child));
        }
        output.merge_vm_output(&child);
        Ok(DestinationExecution::completed(
            output.to_vm_output(child.gas_remaining),
        ))
    }

    /// Run the function named after the transfer arguments on the receiver
    fn run_call_after_transfer(
        &mut self,
        input: &ContractCallInput,
        parsed: &ParsedEsdtTransfers,
        gas: u64,
    ) -> Result<VMOutput, ExecutionError> {
        if !self.has_code(&parsed.receiver) {
            return Err(ExecutionError::new(
                ReturnCode::ContractNotFound,
                format!(
                    "cannot call {} on {}: no code",
                    parsed.call_function,
                    display_address(&parsed.receiver)
                ),
            ));
        }

        let call_type = if input.call_type == CallType::AsynchronousCallBack {
            CallType::AsynchronousCallBack
        } else {
            CallType::ESDTTransferAndExecute
        };
        let call = ContractCallInput {
            original_caller: input.original_caller.clone(),
            caller: parsed.sender.clone(),
            recipient: parsed.receiver.clone(),
            function: parsed.call_function.clone(),
            arguments: parsed.call_args.clone(),
            call_value: BigUint::default(),
            call_type,
            gas_price: input.gas_price,
            gas_provided: gas,
            gas_locked: input.gas_locked,
            current_tx_hash: input.current_tx_hash.clone(),
            original_tx_hash: input.original_tx_hash.clone(),
            prev_tx_hash: input.prev_tx_hash.clone(),
            return_call_after_error: input.return_call_after_error,
            async_arguments: input.async_arguments.clone(),
        };

        self.run_on_dest(&call).output.ok_or_else(|| {
            ExecutionError::new(ReturnCode::ExecutionFailed, "call after transfer produced no output")
        })
    }
}

fn token_error(err: TokenError) -> ExecutionError {
    let return_code = match err {
        TokenError::InsufficientBalance { .. } => ReturnCode::OutOfFunds,
        TokenError::InvalidAmount | TokenError::InvalidIdentifier => ReturnCode::UserError,
    };
    ExecutionError::new(return_code, err.to_string())
}
