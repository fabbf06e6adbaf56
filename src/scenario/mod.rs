//! JSON scenarios
//!
//! A scenario describes a set of accounts and a list of steps run against a
//! fresh [`crate::world::WorldHost`]: transactions, deliveries of pending
//! cross-shard calls and expectations on the resulting state.
//!
//! Values (arguments, return data, storage) are written as `str:text`,
//! `0x` hex, a decimal number or the empty string.
//!
//! ```json
//! {
//!   "name": "ping",
//!   "accounts": [
//!     { "address": "user", "balance": "1000" },
//!     { "address": "pingpong", "code": ":ping\nPUSHB str:pong\nFINISH\nHALT" }
//!   ],
//!   "steps": [
//!     {
//!       "step": "tx",
//!       "tx": { "from": "user", "to": "pingpong", "function": "ping", "gas_limit": 10000 },
//!       "expect": { "return_code": "Ok", "return_data": ["str:pong"] }
//!     }
//!   ]
//! }
//! ```

pub mod runner;

pub use runner::{run_file, ScenarioReport, ScenarioRunner};

use crate::async_call::AsyncCallStatus;
use crate::config::{ConfigError, HostConfig};
use crate::contract::CompilerError;
use crate::core::ReturnCode;
use crate::token::TokenKey;
use crate::world::WorldError;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Scenario errors
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Cannot compile code of {account}: {source}")]
    Compile {
        account: String,
        source: CompilerError,
    },
    #[error("World error: {0}")]
    World(#[from] WorldError),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Step {step}: {message}")]
    Expectation { step: usize, message: String },
}

/// A scenario file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    /// Overrides the host configuration given on the command line
    pub config: Option<HostConfig>,
    pub accounts: Vec<AccountSpec>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Initial state of one account
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountSpec {
    pub address: String,
    pub shard: Option<u32>,
    pub balance: String,
    /// Contract source in assembly
    pub code: Option<String>,
    /// Token balances keyed by `TOKEN` or `TOKEN#nonce`
    pub esdt: BTreeMap<String, String>,
    pub storage: BTreeMap<String, String>,
}

/// One step of a scenario
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Run a user transaction
    Tx {
        tx: TxSpec,
        #[serde(default)]
        expect: Option<TxExpectation>,
    },
    /// Deliver every pending cross-shard call and resume its caller, until
    /// none is left
    DeliverPending {
        #[serde(default)]
        expect: Option<StateExpectation>,
    },
    /// Only check the state
    Check { expect: StateExpectation },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TxSpec {
    pub from: String,
    pub to: String,
    pub function: String,
    pub arguments: Vec<String>,
    pub value: String,
    pub gas_limit: u64,
    pub gas_price: Option<u64>,
}

/// Expectations on a transaction result and the state after it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TxExpectation {
    pub return_code: Option<ReturnCode>,
    /// Substring of the return message
    pub message: Option<String>,
    pub return_data: Option<Vec<String>>,
    pub gas_remaining: Option<u64>,
    pub complete: Option<bool>,
    #[serde(flatten)]
    pub state: StateExpectation,
}

/// Expectations on the world state
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateExpectation {
    pub balances: BTreeMap<String, String>,
    /// address -> token -> amount
    pub esdt: BTreeMap<String, BTreeMap<String, String>>,
    /// address -> key -> value
    pub storage: BTreeMap<String, BTreeMap<String, String>>,
    /// Statuses of every finished async call so far, in completion order
    pub async_calls: Option<Vec<AsyncCallStatus>>,
}

/// Decode a scenario value
pub fn parse_value(value: &str) -> Result<Vec<u8>, ScenarioError> {
    if let Some(text) = value.strip_prefix("str:") {
        return Ok(text.as_bytes().to_vec());
    }
    if let Some(hex) = value.strip_prefix("0x") {
        return hex::decode(hex).map_err(|e| ScenarioError::InvalidValue(format!("{}: {}", value, e)));
    }
    if value.is_empty() {
        return Ok(Vec::new());
    }
    let number = parse_amount(value)?;
    if number.is_zero() {
        return Ok(vec![0]);
    }
    Ok(number.to_bytes_be())
}

/// Decode a decimal amount; empty means zero
pub fn parse_amount(value: &str) -> Result<BigUint, ScenarioError> {
    if value.is_empty() {
        return Ok(BigUint::default());
    }
    value
        .replace('_', "")
        .parse::<BigUint>()
        .map_err(|_| ScenarioError::InvalidValue(value.to_string()))
}

/// Decode `TOKEN` or `TOKEN#nonce`
pub fn parse_token(value: &str) -> Result<TokenKey, ScenarioError> {
    match value.split_once('#') {
        Some((identifier, nonce)) => {
            let nonce = nonce
                .parse::<u64>()
                .map_err(|_| ScenarioError::InvalidValue(value.to_string()))?;
            Ok(TokenKey::new(identifier.as_bytes().to_vec(), nonce))
        }
        None => Ok(TokenKey::new(value.as_bytes().to_vec(), 0)),
    }
}
