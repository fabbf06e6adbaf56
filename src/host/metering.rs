//! Gas metering
//!
//! Tracks the gas left to the currently executing instance. Gas only leaves
//! the meter through [`GasMeter::use_gas_bounded`] and only comes back through
//! [`GasMeter::restore_gas`], so the meter never goes negative.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default base cost of one async call step
pub const DEFAULT_ASYNC_CALL_STEP: u64 = 100_000;

/// Default cost of copying one byte of call data
pub const DEFAULT_DATA_COPY_PER_BYTE: u64 = 50;

/// Metering errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeteringError {
    #[error("Out of gas: need {needed}, have {left}")]
    OutOfGas { needed: u64, left: u64 },
}

/// Fixed costs used at async call boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSchedule {
    /// Base cost of every async call and callback activation
    pub async_call_step: u64,
    /// Cost per byte of data copied into a callback
    pub data_copy_per_byte: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            async_call_step: DEFAULT_ASYNC_CALL_STEP,
            data_copy_per_byte: DEFAULT_DATA_COPY_PER_BYTE,
        }
    }
}

/// Gas ledger of the current instance
#[derive(Debug, Clone)]
pub struct GasMeter {
    schedule: GasSchedule,
    gas_left: u64,
}

impl GasMeter {
    pub fn new(schedule: GasSchedule, gas_left: u64) -> Self {
        Self { schedule, gas_left }
    }

    pub fn gas_schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    pub fn gas_left(&self) -> u64 {
        self.gas_left
    }

    /// Reset the ledger for a new transaction
    pub fn set_gas_left(&mut self, gas: u64) {
        self.gas_left = gas;
    }

    /// Give `gas` back to the current instance
    pub fn restore_gas(&mut self, gas: u64) {
        self.gas_left = match self.gas_left.checked_add(gas) {
            Some(total) => total,
            None => {
                log::error!("gas restore overflow: {} + {}", self.gas_left, gas);
                u64::MAX
            }
        };
    }

    /// Take `gas` from the current instance, failing without side effects if
    /// not enough is left
    pub fn use_gas_bounded(&mut self, gas: u64) -> Result<(), MeteringError> {
        if self.gas_left < gas {
            return Err(MeteringError::OutOfGas {
                needed: gas,
                left: self.gas_left,
            });
        }
        self.gas_left -= gas;
        Ok(())
    }
}
