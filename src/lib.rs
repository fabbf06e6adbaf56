//! Mini-VMHost: a metered contract VM host with asynchronous cross-contract calls
//!
//! This crate provides:
//! - An async call engine: call groups, callbacks, group callbacks and gas
//!   accounting at every call boundary
//! - Local execution of in-shard calls and dispatch of cross-shard ones
//! - The in-shard half of cross-shard built-in token transfers
//! - A small stack-based bytecode VM with an assembler
//! - An in-memory multi-shard host with an ESDT token ledger
//! - JSON scenarios to drive all of the above
//!
//! # Example
//!
//! ```rust
//! use mini_vmhost::contract::Compiler;
//! use mini_vmhost::world::{Account, Transaction, WorldHost};
//! use mini_vmhost::HostConfig;
//!
//! let module = Compiler::new()
//!     .compile(":ping\nPUSHB str:pong\nFINISH\nHALT")
//!     .unwrap();
//!
//! let mut world = WorldHost::new(HostConfig::default());
//! world.add_account(Account::new(b"user".to_vec(), 0)).unwrap();
//! world
//!     .add_account(Account::new(b"pingpong".to_vec(), 0).with_code(module))
//!     .unwrap();
//!
//! let tx = Transaction::new(b"user".to_vec(), b"pingpong".to_vec(), "ping").with_gas_limit(10_000);
//! let result = world.execute_transaction(&tx).unwrap();
//! assert_eq!(result.output.return_data, vec![b"pong".to_vec()]);
//! ```

pub mod async_call;
pub mod cli;
pub mod config;
pub mod contract;
pub mod core;
pub mod crypto;
pub mod host;
pub mod parsers;
pub mod scenario;
pub mod token;
pub mod world;

// Re-export commonly used types
pub use async_call::{
    AsyncCall, AsyncCallExecutionMode, AsyncCallGroup, AsyncCallStatus, AsyncContext, AsyncError,
};
pub use config::HostConfig;
pub use contract::{Compiler, Module, OpCode, VM};
pub use core::{CallType, ContractCallInput, ReturnCode, VMOutput};
pub use host::{GasSchedule, Host};
pub use scenario::{Scenario, ScenarioRunner};
pub use token::{EsdtLedger, TokenKey};
pub use world::{Account, Transaction, WorldHost};
