//! Gas accounting at async call boundaries
//!
//! The caller pays `gas_limit + extra_gas_locked` when an async call is
//! registered. From then on gas is only moved, never created:
//!
//! - before the destination runs, `gas_limit` is restored to the current
//!   instance, because executing on a destination context deducts the full
//!   allotment again and gives back only what remains;
//! - before a callback runs, `extra_gas_locked` is restored and the callback
//!   overhead is charged, so the callback receives exactly
//!   `remaining + extra_gas_locked - overhead`;
//! - without a callback, the locked gas stays consumed.

use crate::async_call::{AsyncCall, AsyncError};
use crate::host::{GasMeter, GasSchedule};

/// Computes and moves gas across call and callback boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AsyncGasAccountant {
    schedule: GasSchedule,
}

impl AsyncGasAccountant {
    pub fn new(schedule: GasSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    /// The destination must receive more than the base cost of an async step
    pub fn check_destination_gas(&self, gas_limit: u64) -> Result<(), AsyncError> {
        if gas_limit <= self.schedule.async_call_step {
            return Err(AsyncError::NotEnoughGas);
        }
        Ok(())
    }

    /// Overhead charged before a callback carrying `data_length` argument bytes
    pub fn callback_overhead(&self, data_length: usize) -> Result<u64, AsyncError> {
        let length = data_length as u64;
        let copy_cost = self
            .schedule
            .data_copy_per_byte
            .checked_mul(length)
            .ok_or(AsyncError::GasOverflow(self.schedule.data_copy_per_byte, length))?;
        self.schedule
            .async_call_step
            .checked_add(copy_cost)
            .ok_or(AsyncError::GasOverflow(self.schedule.async_call_step, copy_cost))
    }

    /// Gas provided to a callback: what the destination left plus the locked
    /// gas, minus the callback overhead
    pub fn callback_gas_limit(
        &self,
        destination_remaining: u64,
        gas_locked: u64,
        data_length: usize,
    ) -> Result<u64, AsyncError> {
        let available = destination_remaining
            .checked_add(gas_locked)
            .ok_or(AsyncError::GasOverflow(destination_remaining, gas_locked))?;
        let required = self.callback_overhead(data_length)?;
        if available <= required {
            return Err(AsyncError::NotEnoughGas);
        }
        Ok(available - required)
    }

    /// Re-present the destination's gas limit to the current instance
    pub fn prime_destination(&self, meter: &mut GasMeter, call: &AsyncCall) {
        meter.restore_gas(call.gas_limit());
    }

    /// Release the locked gas and charge the callback overhead
    pub fn prime_callback(&self, meter: &mut GasMeter, gas_locked: u64, overhead: u64) -> Result<(), AsyncError> {
        meter.restore_gas(gas_locked);
        meter.use_gas_bounded(overhead)?;
        Ok(())
    }

    /// Token transfers delivered on callback spend nothing here: the receiving
    /// account pays for the transfer, and no callback will run
    pub fn refund_transfer_on_callback(&self, meter: &mut GasMeter, call: &AsyncCall) {
        meter.restore_gas(call.gas_limit());
        meter.restore_gas(call.gas_locked());
    }
}
