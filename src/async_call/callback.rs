//! Destination and callback inputs
//!
//! Builds the [`ContractCallInput`] for an async call's destination and for
//! the callback that receives its result.
//!
//! A callback's arguments are the encoded return code followed by the
//! destination's return data on success, or by its return message on failure.
//! When the destination answered with a plain token transfer back to the
//! caller, the callback input is rewritten into that transfer, with the
//! original callback name, the return code and the remaining return data
//! appended as trailing arguments.

use crate::async_call::context::{AsyncContext, CallLocation};
use crate::async_call::AsyncError;
use crate::core::{AsyncArguments, CallType, ContractCallInput, VMOutput};
use crate::host::{ExecutionError, Host};
use crate::parsers::is_nft_transfer_function;
use num_bigint::BigUint;

/// A callback input together with the overhead charged before it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCallback {
    pub input: ContractCallInput,
    pub overhead: u64,
}

impl AsyncContext {
    /// Input for the destination half of the call at `location`.
    ///
    /// Assigns the call its identifier.
    pub(crate) fn create_contract_call_input(
        &mut self,
        host: &dyn Host,
        location: CallLocation,
    ) -> Result<ContractCallInput, AsyncError> {
        let call = self.call_at(location)?;
        let (function, arguments) = self.call_args_parser.parse_data(call.data())?;
        self.gas.check_destination_gas(call.gas_limit())?;

        let caller = call.source().to_vec();
        let recipient = call.destination().to_vec();
        let call_value = call.value();
        let gas_provided = call.gas_limit();
        let gas_locked = call.gas_locked();

        let call_id = self.next_call_id();
        self.call_at_mut(location)?.set_call_id(call_id.clone());

        let runtime = host.runtime();
        Ok(ContractCallInput {
            original_caller: runtime.original_caller.clone(),
            caller,
            recipient,
            function,
            arguments,
            call_value,
            call_type: CallType::AsynchronousCall,
            gas_price: runtime.gas_price,
            gas_provided,
            gas_locked,
            current_tx_hash: runtime.current_tx_hash.clone(),
            original_tx_hash: runtime.original_tx_hash.clone(),
            prev_tx_hash: runtime.prev_tx_hash.clone(),
            return_call_after_error: false,
            async_arguments: Some(AsyncArguments {
                call_id,
                caller_call_id: Vec::new(),
                gas_accumulated: 0,
            }),
        })
    }

    /// Input for the callback answering the call at `location`, given what
    /// its destination produced.
    ///
    /// `data_offset` is where the destination's first return data item sits
    /// in the transaction output.
    ///
    /// Fails with [`AsyncError::NotEnoughGas`] when the destination's
    /// remaining gas plus the locked gas does not cover the callback overhead.
    pub(crate) fn create_callback_input_at(
        &mut self,
        host: &mut dyn Host,
        location: CallLocation,
        destination_output: &VMOutput,
        destination_error: Option<&ExecutionError>,
        data_offset: usize,
    ) -> Result<PreparedCallback, AsyncError> {
        let call = self.call_at(location)?.clone();
        let succeeded = destination_error.is_none() && destination_output.is_ok();
        let arguments = callback_arguments(destination_output, succeeded);

        let data_length: usize = arguments.iter().map(Vec::len).sum();
        let gas_provided = self.gas.callback_gas_limit(
            destination_output.gas_remaining,
            call.gas_locked(),
            data_length,
        )?;
        let overhead = self.gas.callback_overhead(data_length)?;

        let initiator = self.determine_destination_for_async_call(call.destination(), call.data());
        let runtime = host.runtime().clone();
        let mut input = ContractCallInput {
            original_caller: runtime.original_caller,
            caller: initiator,
            recipient: self.address().to_vec(),
            function: call.callback_name().to_string(),
            arguments,
            call_value: self.compute_callback_value(destination_output),
            call_type: CallType::AsynchronousCallBack,
            gas_price: runtime.gas_price,
            gas_provided,
            gas_locked: 0,
            current_tx_hash: runtime.current_tx_hash,
            original_tx_hash: runtime.original_tx_hash,
            prev_tx_hash: runtime.prev_tx_hash,
            return_call_after_error: !succeeded,
            async_arguments: Some(AsyncArguments {
                call_id: self.next_call_id(),
                caller_call_id: call.call_id().to_vec(),
                gas_accumulated: self.gas_accumulated(),
            }),
        };

        if succeeded {
            self.rewrite_transfer_on_callback(host, &mut input, destination_output, data_offset);
        }

        Ok(PreparedCallback { input, overhead })
    }

    /// Value passed to a callback: the single plain transfer the destination
    /// made back to this contract, when it returned no data
    pub fn compute_callback_value(&self, destination_output: &VMOutput) -> BigUint {
        if !destination_output.return_data.is_empty() {
            return BigUint::default();
        }
        match destination_output.output_accounts.get(self.address()) {
            Some(account)
                if account.output_transfers.len() == 1
                    && account.output_transfers[0].data.is_empty() =>
            {
                account.output_transfers[0].value.clone()
            }
            _ => BigUint::default(),
        }
    }

    /// Turn a callback into the token transfer found in the destination's
    /// first return data item, when that item is a transfer with no call.
    /// The item is then dropped from the transaction output at `data_offset`.
    fn rewrite_transfer_on_callback(
        &self,
        host: &mut dyn Host,
        input: &mut ContractCallInput,
        destination_output: &VMOutput,
        data_offset: usize,
    ) {
        let Some(first) = destination_output.return_data.first() else {
            return;
        };
        let Ok((function, transfer_args)) = self.call_args_parser.parse_data(first) else {
            return;
        };
        match self.parse_transfer(&input.caller, &input.recipient, &function, &transfer_args) {
            Some(parsed) if !parsed.has_call_after() => {}
            _ => return,
        }

        let callback_function = std::mem::replace(&mut input.function, function);
        let mut arguments = transfer_args;
        arguments.push(callback_function.into_bytes());
        arguments.push(destination_output.return_code.to_bytes());
        arguments.extend(destination_output.return_data.iter().skip(1).cloned());
        input.arguments = arguments;

        if is_nft_transfer_function(&input.function)
            && host.are_in_same_shard(&input.caller, &input.recipient)
        {
            input.recipient = input.caller.clone();
        }

        log::trace!(
            "callback rewritten into {} from {}",
            input.function,
            hex::encode(&input.caller)
        );
        let output = host.output();
        if output.return_data_at(data_offset) == Some(first.as_slice()) {
            output.delete_return_data_at(data_offset);
        } else {
            log::warn!("transfer not found in return data at {}", data_offset);
        }
    }
}

fn callback_arguments(destination_output: &VMOutput, succeeded: bool) -> Vec<Vec<u8>> {
    let mut arguments = vec![destination_output.return_code.to_bytes()];
    if succeeded {
        arguments.extend(destination_output.return_data.iter().cloned());
    } else {
        arguments.push(destination_output.return_message.clone().into_bytes());
    }
    arguments
}

#[cfg(test)]
mod tests {
    use crate::async_call::test_support::{context, data, enter, world, TX_HASH};
    use crate::async_call::AsyncCall;
    use crate::core::{CallType, OutputTransfer, ReturnCode, VMOutput};
    use crate::host::Host;
    use crate::token::TokenKey;
    use num_bigint::BigUint;

    #[test]
    fn test_destination_input() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        let call = AsyncCall::new(b"callee".to_vec(), data("echo", &[b"hi"]), 1_000, 20).with_value(vec![5]);
        ctx.add_call(&mut world, "g", call).unwrap();

        let location = ctx.call_locations(|_| true)[0];
        let input = ctx.create_contract_call_input(&world, location).unwrap();

        assert_eq!(input.caller, b"caller".to_vec());
        assert_eq!(input.recipient, b"callee".to_vec());
        assert_eq!(input.function, "echo");
        assert_eq!(input.arguments, vec![b"hi".to_vec()]);
        assert_eq!(input.call_value, BigUint::from(5u8));
        assert_eq!(input.call_type, CallType::AsynchronousCall);
        assert_eq!((input.gas_provided, input.gas_locked), (1_000, 20));
        assert_eq!(input.current_tx_hash, TX_HASH.to_vec());
        assert_eq!(input.call_id(), Some(ctx.calls().next().unwrap().call_id()));
    }

    #[test]
    fn test_callback_value_is_the_single_plain_transfer_back() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let ctx = context(&world);

        let mut output = VMOutput::default();
        output.add_transfer(
            b"caller",
            OutputTransfer {
                value: BigUint::from(25u8),
                ..Default::default()
            },
        );
        assert_eq!(ctx.compute_callback_value(&output), BigUint::from(25u8));

        output.return_data.push(b"x".to_vec());
        assert_eq!(ctx.compute_callback_value(&output), BigUint::default());

        output.return_data.clear();
        output.add_transfer(b"caller", OutputTransfer::default());
        assert_eq!(ctx.compute_callback_value(&output), BigUint::default());
    }

    #[test]
    fn test_transfer_result_becomes_the_callback() {
        let token = TokenKey::new(b"TOK-01".to_vec(), 0);
        let mut world = world(1);
        world
            .ledger_mut()
            .mint(b"callee", token.clone(), BigUint::from(100u32))
            .unwrap();
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        let call = AsyncCall::new(b"callee".to_vec(), data("pay", &[]), 1_000, 500)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(&mut world, "g", call).unwrap();

        ctx.execute(&mut world).unwrap();

        let journal = world.journal().to_vec();
        assert_eq!(journal.len(), 3);
        let transfer = &journal[1];
        assert_eq!(transfer.function, "ESDTTransfer");
        assert_eq!(transfer.caller, b"callee".to_vec());
        assert_eq!(transfer.recipient, b"caller".to_vec());
        assert_eq!(
            transfer.arguments,
            vec![b"TOK-01".to_vec(), vec![10], b"on_done".to_vec(), vec![0]]
        );

        let callback = &journal[2];
        assert_eq!(callback.function, "on_done");
        assert_eq!(callback.call_type, CallType::AsynchronousCallBack);
        assert_eq!(callback.arguments, vec![vec![0]]);

        assert!(world.output().return_data().is_empty());
        assert_eq!(world.ledger().balance_of(b"caller", &token), BigUint::from(10u32));
    }

    #[test]
    fn test_transfer_result_leaves_earlier_return_data_alone() {
        let token = TokenKey::new(b"TOK-01".to_vec(), 0);
        let mut world = world(1);
        world
            .ledger_mut()
            .mint(b"callee", token.clone(), BigUint::from(100u32))
            .unwrap();
        enter(&mut world, CallType::DirectCall, 10_000);
        world.output().finish(b"mine".to_vec());
        let mut ctx = context(&world);
        let call = AsyncCall::new(b"callee".to_vec(), data("pay", &[]), 1_000, 500)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(&mut world, "g", call).unwrap();

        ctx.execute(&mut world).unwrap();

        assert_eq!(world.journal()[1].function, "ESDTTransfer");
        assert_eq!(world.output().return_data(), vec![b"mine".to_vec()]);
        assert_eq!(world.ledger().balance_of(b"caller", &token), BigUint::from(10u32));
    }

    #[test]
    fn test_nft_result_is_sent_from_the_destination_to_itself() {
        let nft = TokenKey::new(b"NFT-01".to_vec(), 3);
        let mut world = world(1);
        world
            .ledger_mut()
            .mint(b"callee", nft.clone(), BigUint::from(1u8))
            .unwrap();
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        let call = AsyncCall::new(b"callee".to_vec(), data("pay_nft", &[]), 1_000, 500)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(&mut world, "g", call).unwrap();

        ctx.execute(&mut world).unwrap();

        let journal = world.journal().to_vec();
        let functions: Vec<&str> = journal.iter().map(|input| input.function.as_str()).collect();
        assert_eq!(functions, vec!["pay_nft", "ESDTNFTTransfer", "on_done"]);

        let transfer = &journal[1];
        assert_eq!(transfer.caller, b"callee".to_vec());
        assert_eq!(transfer.recipient, transfer.caller);
        assert_eq!(
            transfer.arguments,
            vec![
                b"NFT-01".to_vec(),
                vec![3],
                vec![1],
                b"caller".to_vec(),
                b"on_done".to_vec(),
                vec![0]
            ]
        );
        assert_eq!(journal[2].recipient, b"caller".to_vec());
        assert_eq!(journal[2].call_type, CallType::AsynchronousCallBack);

        assert_eq!(world.ledger().balance_of(b"caller", &nft), BigUint::from(1u8));
        assert_eq!(world.ledger().balance_of(b"callee", &nft), BigUint::default());
        assert!(world.output().return_data().is_empty());
    }

    #[test]
    fn test_nft_result_from_another_shard_keeps_its_recipient() {
        let mut world = world(2);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        let call = AsyncCall::new(b"remote".to_vec(), data("pay_nft", &[]), 1_000, 500)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(&mut world, "g", call).unwrap();
        ctx.execute(&mut world).unwrap();
        ctx.send_remote_calls(&mut world).unwrap();

        let location = ctx.call_locations(|_| true)[0];
        ctx.call_at_mut(location).unwrap().update_status(ReturnCode::Ok).unwrap();
        let nft = data("ESDTNFTTransfer", &[b"NFT-01", &[3], &[1], b"caller"]);
        let output = VMOutput {
            return_data: vec![nft.clone()],
            gas_remaining: 800,
            ..Default::default()
        };
        let data_offset = world.output().return_data_len();
        world.output().finish(nft);

        let prepared = ctx
            .create_callback_input_at(&mut world, location, &output, None, data_offset)
            .unwrap();

        assert_eq!(prepared.input.function, "ESDTNFTTransfer");
        assert_eq!(prepared.input.caller, b"remote".to_vec());
        assert_eq!(prepared.input.recipient, b"caller".to_vec());
        assert_eq!(
            prepared.input.arguments[4..].to_vec(),
            vec![b"on_done".to_vec(), vec![0]]
        );
        assert!(world.output().return_data().is_empty());
    }

    #[test]
    fn test_transfer_with_call_is_not_rewritten() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        let call = AsyncCall::new(b"callee".to_vec(), data("echo", &[b"x"]), 1_000, 500)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(&mut world, "g", call).unwrap();

        let location = ctx.call_locations(|_| true)[0];
        ctx.call_at_mut(location).unwrap().update_status(ReturnCode::Ok).unwrap();
        let mut output = VMOutput::default();
        output.return_data = vec![b"ESDTTransfer@544f4b2d3031@0a@6465706f736974".to_vec()];
        output.gas_remaining = 800;
        let prepared = ctx
            .create_callback_input_at(&mut world, location, &output, None, 0)
            .unwrap();

        assert_eq!(prepared.input.function, "on_done");
        assert_eq!(prepared.input.arguments, vec![vec![0], output.return_data[0].clone()]);
        assert_eq!(prepared.overhead, 100 + prepared.input.arguments_len() as u64);
        assert_eq!(prepared.input.gas_provided, 800 + 500 - prepared.overhead);
    }
}
