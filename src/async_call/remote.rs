//! Cross-shard dispatch
//!
//! Calls the local step could not run are handed to the cross-shard
//! dispatcher as outgoing transfers and marked as sent. When the destination
//! shard answers, [`AsyncContext::postprocess_cross_shard_callback`] resumes
//! the call: its result goes to the callback exactly as for a local call.

use crate::async_call::call::{AsyncCallExecutionMode, AsyncCallStatus};
use crate::async_call::context::AsyncContext;
use crate::async_call::local::LocalCallOutcome;
use crate::async_call::AsyncError;
use crate::core::{CallType, OutputTransfer, VMOutput};
use crate::host::{ExecutionError, Host};

impl AsyncContext {
    /// Emit an outgoing transfer for every call bound for another shard and
    /// mark it sent. Returns how many calls were dispatched.
    ///
    /// The in-shard half of a cross-shard built-in call already produced its
    /// own transfer, so those calls are only marked.
    pub fn send_remote_calls(&mut self, host: &mut dyn Host) -> Result<usize, AsyncError> {
        let locations = self
            .call_locations(|call| call.is_remote() && call.status() == AsyncCallStatus::Pending);

        for &location in &locations {
            let call = self.call_at(location)?.clone();
            if call.execution_mode() == AsyncCallExecutionMode::Unknown {
                let call_id = self.next_call_id();
                let transfer = OutputTransfer {
                    sender: self.address().to_vec(),
                    value: call.value(),
                    data: call.data().to_vec(),
                    gas_limit: call.gas_limit(),
                    gas_locked: call.gas_locked(),
                    call_type: CallType::AsynchronousCall,
                    call_id: call_id.clone(),
                };
                host.output()
                    .output_account_mut(call.destination())
                    .output_transfers
                    .push(transfer);
                self.call_at_mut(location)?.set_call_id(call_id);
                log::debug!(
                    "async call to {} sent to its shard",
                    hex::encode(call.destination())
                );
            }
            self.call_at_mut(location)?.mark_sent()?;
        }
        Ok(locations.len())
    }

    /// Resume the sent call `call_id` with the output its destination shard
    /// produced: restore the gas it returned, resolve or reject it and run its
    /// callback.
    pub fn postprocess_cross_shard_callback(
        &mut self,
        host: &mut dyn Host,
        call_id: &[u8],
        destination_output: &VMOutput,
    ) -> Result<LocalCallOutcome, AsyncError> {
        let location = self
            .locate(call_id)
            .ok_or_else(|| AsyncError::CallNotFound(hex::encode(call_id)))?;
        let call = self.call_at(location)?;
        if self.is_completed_at(location) || call.status().is_terminal() {
            return Err(AsyncError::CallAlreadyCompleted(hex::encode(call_id)));
        }
        if destination_output.gas_remaining > call.gas_limit() {
            return Err(AsyncError::GasNotConserved {
                remaining: destination_output.gas_remaining,
                limit: call.gas_limit(),
            });
        }

        host.metering().restore_gas(destination_output.gas_remaining);
        self.call_at_mut(location)?
            .update_status(destination_output.return_code)?;
        let data_offset = host.output().return_data_len();
        for item in &destination_output.return_data {
            host.output().finish(item.clone());
        }

        let error = if destination_output.is_ok() {
            None
        } else {
            Some(ExecutionError::new(
                destination_output.return_code,
                destination_output.return_message.clone(),
            ))
        };
        let outcome = self.finish_destination(
            host,
            location,
            destination_output,
            error.as_ref(),
            data_offset,
        )?;
        self.sweep_completed_groups(host)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use crate::async_call::test_support::{compile, context, data, enter, world};
    use crate::async_call::{AsyncCall, AsyncCallStatus, AsyncContext, AsyncError, LocalCallOutcome};
    use crate::core::{CallType, VMOutput};
    use crate::host::Host;
    use crate::world::{Account, Transaction};

    fn sent_call(world: &mut crate::world::WorldHost) -> (AsyncContext, AsyncCall) {
        enter(world, CallType::DirectCall, 10_000);
        let mut ctx = context(world);
        let call = AsyncCall::new(b"remote".to_vec(), data("echo", &[b"hi"]), 1_000, 200)
            .with_callbacks("on_done", "on_error");
        ctx.add_call(world, "g", call).unwrap();
        ctx.execute(world).unwrap();
        assert!(world.journal().is_empty());
        assert_eq!(ctx.send_remote_calls(world).unwrap(), 1);
        let call = ctx.calls().next().unwrap().clone();
        (ctx, call)
    }

    #[test]
    fn test_remote_call_is_sent_as_transfer() {
        let mut world = world(2);
        let (_, call) = sent_call(&mut world);

        assert_eq!(call.status(), AsyncCallStatus::Sent);
        let transfer = world.output().output_account(b"remote").unwrap().output_transfers[0].clone();
        assert_eq!(transfer.sender, b"caller".to_vec());
        assert_eq!(transfer.call_id, call.call_id().to_vec());
        assert_eq!(transfer.data, data("echo", &[b"hi"]));
        assert_eq!((transfer.gas_limit, transfer.gas_locked), (1_000, 200));
        assert_eq!(transfer.call_type, CallType::AsynchronousCall);
    }

    #[test]
    fn test_remote_call_resumes_at_most_once() {
        let mut world = world(2);
        let (mut ctx, call) = sent_call(&mut world);
        let answer = VMOutput {
            return_data: vec![b"hi".to_vec()],
            gas_remaining: 900,
            ..Default::default()
        };

        let outcome = ctx
            .postprocess_cross_shard_callback(&mut world, call.call_id(), &answer)
            .unwrap();
        assert!(matches!(outcome, LocalCallOutcome::Completed { .. }));
        let callback = world.journal().last().unwrap().clone();
        assert_eq!(callback.function, "on_done");
        assert_eq!(callback.arguments, vec![vec![0], b"hi".to_vec()]);
        assert!(ctx.is_complete());

        let again = ctx.postprocess_cross_shard_callback(&mut world, call.call_id(), &answer);
        assert!(matches!(
            again,
            Err(AsyncError::CallNotFound(_)) | Err(AsyncError::CallAlreadyCompleted(_))
        ));
        assert_eq!(world.journal().len(), 1);
    }

    #[test]
    fn test_resumed_call_cannot_return_more_gas_than_it_got() {
        let mut world = world(2);
        let (mut ctx, call) = sent_call(&mut world);
        let answer = VMOutput {
            gas_remaining: 1_001,
            ..Default::default()
        };

        assert!(matches!(
            ctx.postprocess_cross_shard_callback(&mut world, call.call_id(), &answer),
            Err(AsyncError::GasNotConserved { remaining: 1_001, limit: 1_000 })
        ));
        assert_eq!(ctx.calls().next().unwrap().status(), AsyncCallStatus::Sent);
    }

    #[test]
    fn test_cross_shard_round_trip_through_the_world() {
        let mut world = world(2);
        let starter = compile(
            "
            :start
            PUSHB str:g
            PUSHB str:remote
            PUSHB str:echo@6869
            PUSHB
            PUSH 2000
            PUSH 500
            PUSHB str:on_done
            PUSHB str:on_error
            ASYNC
            HALT
            :on_done
            PUSHB str:answer
            ARG 1
            SSTORE
            HALT
            :on_error
            HALT
        ",
        );
        world
            .add_account(Account::new(b"starter".to_vec(), 0).with_code(starter))
            .unwrap();

        let tx = Transaction::new(b"user".to_vec(), b"starter".to_vec(), "start").with_gas_limit(10_000);
        let result = world.execute_transaction(&tx).unwrap();
        assert!(result.output.is_ok());
        assert!(!result.is_complete);
        let key = AsyncContext::storage_key(&result.tx_hash);
        assert!(world.account(b"starter").unwrap().storage.contains_key(&key));

        let pending = result.pending_async_calls();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].destination, b"remote".to_vec());

        let delivered = world.deliver_async_call(&pending[0]).unwrap();
        assert_eq!(delivered.output.return_data, vec![b"hi".to_vec()]);
        assert_eq!(delivered.output.gas_remaining, 1_995);

        let resumed = world.resume_async_call(&pending[0], &delivered.output).unwrap();
        assert!(resumed.is_complete);

        let starter = world.account(b"starter").unwrap();
        assert_eq!(starter.storage.get(b"answer".as_slice()), Some(&b"hi".to_vec()));
        assert!(!starter.storage.contains_key(&key));
        assert_eq!(world.async_log().len(), 1);
        assert_eq!(world.async_log()[0].status, AsyncCallStatus::Resolved);

        assert!(world.resume_async_call(&pending[0], &delivered.output).is_err());
    }
}
