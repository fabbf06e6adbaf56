//! Cross-shard built-in calls
//!
//! A built-in function whose receiver lives in another shard runs in two
//! halves. The sender-side half runs here: on success the call keeps only the
//! gas the half left over and waits for the receiver's shard; on failure the
//! call is rejected on the spot and its error callback runs.

use crate::async_call::call::{AsyncCallExecutionMode, AsyncCallStatus};
use crate::async_call::context::{AsyncContext, CallLocation};
use crate::async_call::AsyncError;
use crate::host::Host;

impl AsyncContext {
    /// Run the in-shard half of every pending cross-shard built-in call
    pub fn execute_sync_halves_of_builtin_functions(
        &mut self,
        host: &mut dyn Host,
    ) -> Result<(), AsyncError> {
        let locations = self.call_locations(|call| {
            call.execution_mode() == AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard
                && call.status() == AsyncCallStatus::Pending
        });

        for location in locations {
            match self.execute_sync_half_of_builtin_function(host, location) {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    log::debug!("built-in call half failed: {}", err);
                    self.recover_failed_call(host, location, err)?;
                }
            }
        }
        self.sweep_completed_groups(host)
    }

    pub(crate) fn execute_sync_half_of_builtin_function(
        &mut self,
        host: &mut dyn Host,
        location: CallLocation,
    ) -> Result<(), AsyncError> {
        let input = self.create_contract_call_input(host, location)?;
        let call = self.call_at(location)?.clone();
        self.gas.prime_destination(host.metering(), &call);

        let data_offset = host.output().return_data_len();
        let execution = host.execute_on_dest_context(&input);
        let output = execution
            .output
            .ok_or(AsyncError::NilDestinationCallVMOutput)?;
        log::trace!(
            "built-in {} half returned {} with {} gas remaining",
            input.function,
            output.return_code,
            output.gas_remaining
        );

        if !output.is_ok() {
            self.call_at_mut(location)?.reject()?;
            self.finish_destination(
                host,
                location,
                &output,
                execution.error.as_ref(),
                data_offset,
            )?;
            return Ok(());
        }

        // hold what is left for the receiving shard
        host.metering().use_gas_bounded(output.gas_remaining)?;
        self.call_at_mut(location)?.set_gas_limit(output.gas_remaining);
        Ok(())
    }
}
