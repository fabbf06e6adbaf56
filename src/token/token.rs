//! ESDT token ledger
//!
//! Fungible and non-fungible token balances per account. A balance is keyed
//! by token identifier and nonce; fungible tokens always use nonce 0.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Transfer events kept by the ledger
const MAX_HISTORY: usize = 100;

/// Token-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Insufficient balance of {token}: have {have}, need {need}")]
    InsufficientBalance {
        token: String,
        have: BigUint,
        need: BigUint,
    },
    #[error("Invalid amount: amount must be greater than 0")]
    InvalidAmount,
    #[error("Invalid token identifier")]
    InvalidIdentifier,
}

/// Token identifier plus nonce
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenKey {
    #[serde(with = "hex::serde")]
    pub identifier: Vec<u8>,
    pub nonce: u64,
}

impl TokenKey {
    pub fn new(identifier: impl Into<Vec<u8>>, nonce: u64) -> Self {
        Self {
            identifier: identifier.into(),
            nonce,
        }
    }

    /// Printable form, `TOKEN-01` or `NFT-01#3`
    pub fn display_name(&self) -> String {
        let identifier = String::from_utf8_lossy(&self.identifier);
        if self.nonce == 0 {
            identifier.into_owned()
        } else {
            format!("{}#{}", identifier, self.nonce)
        }
    }
}

/// Emitted when tokens move between accounts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub token: TokenKey,
    #[serde(with = "hex::serde")]
    pub from: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub to: Vec<u8>,
    pub amount: BigUint,
}

/// Token balances of every account
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EsdtLedger {
    /// address -> (token -> amount)
    balances: BTreeMap<Vec<u8>, BTreeMap<TokenKey, BigUint>>,
    /// Transfer history (last 100)
    history: Vec<TransferEvent>,
}

impl EsdtLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get balance of an address
    pub fn balance_of(&self, address: &[u8], token: &TokenKey) -> BigUint {
        self.balances
            .get(address)
            .and_then(|tokens| tokens.get(token))
            .cloned()
            .unwrap_or_default()
    }

    /// Every non-zero balance of an address
    pub fn tokens_of(&self, address: &[u8]) -> Vec<(TokenKey, BigUint)> {
        self.balances
            .get(address)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter(|(_, amount)| !amount.is_zero())
                    .map(|(token, amount)| (token.clone(), amount.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn history(&self) -> &[TransferEvent] {
        &self.history
    }

    /// Create tokens out of nothing, for genesis balances
    pub fn mint(&mut self, address: &[u8], token: TokenKey, amount: BigUint) -> Result<(), TokenError> {
        if token.identifier.is_empty() {
            return Err(TokenError::InvalidIdentifier);
        }
        self.credit(address, &token, &amount);
        Ok(())
    }

    /// Remove tokens from an address
    pub fn debit(&mut self, address: &[u8], token: &TokenKey, amount: &BigUint) -> Result<(), TokenError> {
        if amount.is_zero() {
            return Err(TokenError::InvalidAmount);
        }
        let have = self.balance_of(address, token);
        if have < *amount {
            return Err(TokenError::InsufficientBalance {
                token: token.display_name(),
                have,
                need: amount.clone(),
            });
        }
        let balance = self
            .balances
            .entry(address.to_vec())
            .or_default()
            .entry(token.clone())
            .or_default();
        *balance -= amount;
        Ok(())
    }

    /// Add tokens to an address
    pub fn credit(&mut self, address: &[u8], token: &TokenKey, amount: &BigUint) {
        *self
            .balances
            .entry(address.to_vec())
            .or_default()
            .entry(token.clone())
            .or_default() += amount;
    }

    /// Move tokens from one address to another
    pub fn transfer(
        &mut self,
        from: &[u8],
        to: &[u8],
        token: &TokenKey,
        amount: &BigUint,
    ) -> Result<TransferEvent, TokenError> {
        self.debit(from, token, amount)?;
        self.credit(to, token, amount);

        let event = TransferEvent {
            token: token.clone(),
            from: from.to_vec(),
            to: to.to_vec(),
            amount: amount.clone(),
        };
        self.record(event.clone());
        Ok(event)
    }

    /// Store event (keep last 100)
    pub fn record(&mut self, event: TransferEvent) {
        self.history.push(event);
        if self.history.len() > MAX_HISTORY {
            self.history.remove(0);
        }
    }
}
