//! ESDT token balances
//!
//! Backs the reference host's built-in transfer functions.
//!
//! # Example
//!
//! ```rust
//! use mini_vmhost::token::{EsdtLedger, TokenKey};
//! use num_bigint::BigUint;
//!
//! let mut ledger = EsdtLedger::new();
//! let token = TokenKey::new(b"TOK-01".to_vec(), 0);
//! ledger.mint(b"alice", token.clone(), BigUint::from(100u32)).unwrap();
//! ledger.transfer(b"alice", b"bob", &token, &BigUint::from(40u32)).unwrap();
//!
//! assert_eq!(ledger.balance_of(b"bob", &token), BigUint::from(40u32));
//! ```

pub mod token;

pub use token::{EsdtLedger, TokenError, TokenKey, TransferEvent};
