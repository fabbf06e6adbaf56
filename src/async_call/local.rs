//! In-shard execution
//!
//! Runs every async call whose destination lives in this shard, in group
//! order and call order, and feeds each result to its callback. A call that
//! cannot be built (bad call data, not enough gas) is rejected on its own
//! and its error callback runs with a synthesized failure; invariant
//! violations abort the whole step.

use crate::async_call::call::AsyncCallExecutionMode;
use crate::async_call::context::{AsyncContext, CallLocation};
use crate::async_call::AsyncError;
use crate::core::{ReturnCode, VMOutput};
use crate::host::{ExecutionError, Host};

/// What happened to a call processed in this shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCallOutcome {
    /// The call is terminal and its callback, if any, has finished
    Completed { gas_recovered: u64 },
    /// Waiting on a continuation from another shard
    Pending,
}

impl AsyncContext {
    /// Run local calls, then the in-shard halves of cross-shard built-in
    /// calls. Calls left over are the cross-shard dispatcher's.
    pub fn execute(&mut self, host: &mut dyn Host) -> Result<(), AsyncError> {
        self.execute_async_local_calls(host)?;
        self.execute_sync_halves_of_builtin_functions(host)
    }

    /// Run every pending call routed to this shard
    pub fn execute_async_local_calls(&mut self, host: &mut dyn Host) -> Result<(), AsyncError> {
        let locations = self.call_locations(|call| call.is_local() && !call.status().is_terminal());
        log::debug!("executing {} local async calls", locations.len());

        for location in locations {
            match self.execute_async_local_call(host, location) {
                Ok(outcome) => log::trace!("local async call finished: {:?}", outcome),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    log::debug!("local async call failed: {}", err);
                    self.recover_failed_call(host, location, err)?;
                }
            }
        }
        self.sweep_completed_groups(host)
    }

    pub(crate) fn execute_async_local_call(
        &mut self,
        host: &mut dyn Host,
        location: CallLocation,
    ) -> Result<LocalCallOutcome, AsyncError> {
        if self.call_at(location)?.execution_mode() == AsyncCallExecutionMode::ESDTTransferOnCallBack {
            self.execute_transfer_on_callback(host, location)?;
            self.complete_child_at(location, 0)?;
            return Ok(LocalCallOutcome::Completed { gas_recovered: 0 });
        }

        let input = self.create_contract_call_input(host, location)?;
        log::trace!(
            "async call: dest={} function={} gas_provided={} gas_locked={} call_id={}",
            hex::encode(&input.recipient),
            input.function,
            input.gas_provided,
            input.gas_locked,
            hex::encode(input.call_id().unwrap_or_default())
        );

        let call = self.call_at(location)?.clone();
        self.gas.prime_destination(host.metering(), &call);
        let data_offset = host.output().return_data_len();
        let execution = host.execute_on_dest_context(&input);
        let output = execution
            .output
            .ok_or(AsyncError::NilDestinationCallVMOutput)?;
        log::trace!(
            "async call returned {} with {} gas remaining",
            output.return_code,
            output.gas_remaining
        );

        self.call_at_mut(location)?.update_status(output.return_code)?;
        if !execution.is_complete {
            return Ok(LocalCallOutcome::Pending);
        }
        self.finish_destination(host, location, &output, execution.error.as_ref(), data_offset)
    }

    /// Token transfer back to the caller: its data becomes the first return
    /// data item and no callback runs
    fn execute_transfer_on_callback(
        &mut self,
        host: &mut dyn Host,
        location: CallLocation,
    ) -> Result<(), AsyncError> {
        let call = self.call_at(location)?.clone();
        self.call_at_mut(location)?.update_status(ReturnCode::Ok)?;
        host.output().prepend_finish(call.data().to_vec());
        self.gas.refund_transfer_on_callback(host.metering(), &call);
        log::trace!(
            "token transfer on callback to {} delivered as return data",
            hex::encode(call.destination())
        );
        Ok(())
    }

    /// Run the callback for a terminal call whose destination has finished,
    /// then complete it. The destination's return data starts at
    /// `data_offset` in the transaction output.
    pub(crate) fn finish_destination(
        &mut self,
        host: &mut dyn Host,
        location: CallLocation,
        output: &VMOutput,
        error: Option<&ExecutionError>,
        data_offset: usize,
    ) -> Result<LocalCallOutcome, AsyncError> {
        if !self.call_at(location)?.has_callback() {
            self.complete_child_at(location, 0)?;
            return Ok(LocalCallOutcome::Completed { gas_recovered: 0 });
        }

        let prepared = self.create_callback_input_at(host, location, output, error, data_offset);
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(AsyncError::NotEnoughGas) => {
                log::warn!("callback skipped: not enough gas left for its overhead");
                self.complete_child_at(location, 0)?;
                return Ok(LocalCallOutcome::Completed { gas_recovered: 0 });
            }
            Err(err) => return Err(err),
        };

        let gas_locked = self.call_at(location)?.gas_locked();
        self.gas
            .prime_callback(host.metering(), gas_locked, prepared.overhead)?;
        log::trace!(
            "callback: function={} gas_provided={} args={}",
            prepared.input.function,
            prepared.input.gas_provided,
            prepared.input.arguments.len()
        );

        let execution = host.execute_on_dest_context(&prepared.input);
        let callback_output = execution
            .output
            .ok_or(AsyncError::AsyncNoOutputFromCallback)?;
        log::trace!(
            "callback returned {} with {} gas remaining",
            callback_output.return_code,
            callback_output.gas_remaining
        );
        if !execution.is_complete {
            return Ok(LocalCallOutcome::Pending);
        }

        let gas_recovered = callback_output.gas_remaining;
        self.complete_child_at(location, gas_recovered)?;
        Ok(LocalCallOutcome::Completed { gas_recovered })
    }

    /// Reject a call that could not be executed and answer it through its
    /// error callback as if its destination had failed without spending gas
    pub(crate) fn recover_failed_call(
        &mut self,
        host: &mut dyn Host,
        location: CallLocation,
        err: AsyncError,
    ) -> Result<(), AsyncError> {
        if self.is_completed_at(location) {
            return Ok(());
        }
        if self.call_at(location)?.status().is_terminal() {
            // the destination already ran; only its callback failed
            return self.complete_child_at(location, 0);
        }

        let call = self.call_at_mut(location)?;
        call.reject()?;
        let gas_limit = call.gas_limit();

        let return_code = match err {
            AsyncError::CallData(_) => ReturnCode::FunctionNotFound,
            _ => ReturnCode::OutOfGas,
        };
        let message = err.to_string();
        // as if the destination had returned its whole allotment
        host.metering().restore_gas(gas_limit);

        let output = VMOutput::failed(return_code, message.clone(), gas_limit);
        let error = ExecutionError::new(return_code, message);
        let data_offset = host.output().return_data_len();
        self.finish_destination(host, location, &output, Some(&error), data_offset)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use crate::async_call::test_support::{context, data, enter, schedule, world, STEP};
    use crate::async_call::{AsyncCall, AsyncCallExecutionMode, AsyncCallStatus, AsyncContext};
    use crate::core::{CallType, ReturnCode};
    use crate::host::Host;

    #[test]
    fn test_callback_gets_remaining_plus_locked_minus_overhead() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        // 7 gas of instructions plus 293 burned: the destination uses 300
        let call = AsyncCall::new(b"callee".to_vec(), data("burn", &[&[0x01, 0x25]]), 1_000, 50)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(&mut world, "g", call).unwrap();
        assert_eq!(world.metering().gas_left(), 8_950);

        ctx.execute(&mut world).unwrap();

        let callback = world.journal().last().unwrap().clone();
        assert_eq!(callback.function, "on_done");
        assert_eq!(callback.call_type, CallType::AsynchronousCallBack);
        assert_eq!(callback.arguments, vec![vec![0], b"nineteen-bytes-long".to_vec()]);
        assert_eq!(callback.gas_provided, 630);
        assert!(!callback.return_call_after_error);

        // 300 used by the destination, 120 of callback overhead
        assert_eq!(world.metering().gas_left(), 9_580);
        assert!(ctx.is_complete());
        assert_eq!(ctx.completed_calls()[0].status(), AsyncCallStatus::Resolved);
        assert_eq!(ctx.gas_accumulated(), 630);
    }

    #[test]
    fn test_terminal_call_from_a_saved_context_is_not_run_again() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        for word in [b"one".as_slice(), b"two".as_slice()] {
            ctx.add_call(&mut world, "g", AsyncCall::new(b"callee".to_vec(), data("echo", &[word]), 500, 0))
                .unwrap();
        }
        let first = ctx.call_locations(|_| true)[0];
        ctx.call_at_mut(first).unwrap().update_status(ReturnCode::Ok).unwrap();

        let mut ctx = AsyncContext::from_serializable(ctx.to_serializable(), schedule()).unwrap();
        assert_eq!(ctx.calls().next().unwrap().status(), AsyncCallStatus::Resolved);

        ctx.execute_async_local_calls(&mut world).unwrap();

        assert_eq!(world.journal().len(), 1);
        assert_eq!(world.journal()[0].arguments, vec![b"two".to_vec()]);
        assert_eq!(world.output().return_data(), vec![b"two".to_vec()]);
    }

    #[test]
    fn test_call_below_step_never_reaches_destination() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        let call = AsyncCall::new(b"callee".to_vec(), data("echo", &[b"hi"]), 50, 0)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(&mut world, "g", call).unwrap();

        ctx.execute(&mut world).unwrap();

        assert!(world.journal().is_empty());
        assert_eq!(ctx.completed_calls()[0].status(), AsyncCallStatus::Rejected);
        assert_eq!(world.metering().gas_left(), 10_000);
    }

    #[test]
    fn test_rejected_call_runs_error_callback_on_locked_gas() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        let call = AsyncCall::new(b"callee".to_vec(), data("echo", &[b"hi"]), 50, 500)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(&mut world, "g", call).unwrap();

        ctx.execute(&mut world).unwrap();

        assert_eq!(world.journal().len(), 1);
        let callback = world.journal()[0].clone();
        assert_eq!(callback.function, "on_error");
        assert!(callback.return_call_after_error);
        assert_eq!(callback.arguments[0], ReturnCode::OutOfGas.to_bytes());
        assert_eq!(callback.gas_provided, 550 - STEP - callback.arguments_len() as u64);
    }

    #[test]
    fn test_bad_call_data_is_rejected_alone() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        ctx.add_call_with_mode(
            &mut world,
            "g",
            AsyncCall::new(b"callee".to_vec(), b"echo@zz".to_vec(), 1_000, 500)
                .with_callbacks("on_done", "on_error"),
            AsyncCallExecutionMode::SyncCall,
        )
        .unwrap();
        ctx.add_call(&mut world, "g", AsyncCall::new(b"callee".to_vec(), data("echo", &[b"ok"]), 1_000, 0))
            .unwrap();

        ctx.execute(&mut world).unwrap();

        let functions: Vec<String> = world.journal().iter().map(|input| input.function.clone()).collect();
        assert_eq!(functions, vec!["on_error".to_string(), "echo".to_string()]);
        assert_eq!(world.journal()[0].arguments[0], ReturnCode::FunctionNotFound.to_bytes());
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_failed_destination_runs_error_callback() {
        let mut world = world(1);
        enter(&mut world, CallType::DirectCall, 10_000);
        let mut ctx = context(&world);
        let call = AsyncCall::new(b"callee".to_vec(), data("fail", &[]), 1_000, 200)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(&mut world, "g", call).unwrap();

        ctx.execute(&mut world).unwrap();

        let callback = world.journal().last().unwrap().clone();
        assert_eq!(callback.function, "on_error");
        assert_eq!(callback.arguments[0], ReturnCode::UserError.to_bytes());
        assert!(String::from_utf8_lossy(&callback.arguments[1]).contains("boom"));
        assert!(callback.return_call_after_error);
        assert_eq!(ctx.completed_calls()[0].status(), AsyncCallStatus::Rejected);

        // the failed destination keeps nothing; the callback spends nothing
        let overhead = STEP + callback.arguments_len() as u64;
        assert_eq!(world.metering().gas_left(), 10_000 - 1_000 - overhead);
    }

    #[test]
    fn test_transfer_back_to_caller_is_delivered_as_return_data() {
        let mut world = world(1);
        enter(&mut world, CallType::AsynchronousCall, 10_000);
        let mut ctx = context(&world);
        let transfer = data("ESDTTransfer", &[b"TOK-01", &[10]]);
        ctx.add_call(
            &mut world,
            "g",
            AsyncCall::new(b"user".to_vec(), transfer.clone(), 1_000, 100)
                .with_callbacks("on_done", "on_error"),
        )
        .unwrap();
        ctx.add_call(&mut world, "g", AsyncCall::new(b"callee".to_vec(), data("echo", &[b"hi"]), 1_000, 0))
            .unwrap();
        assert_eq!(
            ctx.calls().next().unwrap().execution_mode(),
            AsyncCallExecutionMode::ESDTTransferOnCallBack
        );

        ctx.execute(&mut world).unwrap();

        // only the ordinary call reached a destination, and no callback ran
        assert_eq!(world.journal().len(), 1);
        assert_eq!(world.journal()[0].function, "echo");
        assert_eq!(world.output().return_data(), vec![transfer, b"hi".to_vec()]);
        assert_eq!(world.metering().gas_left(), 9_995);
        assert!(ctx
            .completed_calls()
            .iter()
            .all(|call| call.status() == AsyncCallStatus::Resolved));
    }
}
