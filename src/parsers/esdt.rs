//! ESDT transfer parser
//!
//! Recognizes the built-in token transfer functions and decodes their
//! arguments into a structured transfer descriptor:
//!
//! - `ESDTTransfer@token@amount[@function@args…]`, sent to the receiver
//! - `ESDTNFTTransfer@token@nonce@amount@receiver[@function@args…]`
//! - `MultiESDTNFTTransfer@receiver@count(@token@nonce@amount)*[@function@args…]`
//!
//! NFT transfers are issued on the sender's own account and name the real
//! receiver in their arguments. When sender and receiver differ the call is the
//! receiving side of such a transfer and the given receiver is kept.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ESDT_TRANSFER: &str = "ESDTTransfer";
pub const ESDT_NFT_TRANSFER: &str = "ESDTNFTTransfer";
pub const MULTI_ESDT_NFT_TRANSFER: &str = "MultiESDTNFTTransfer";

/// All recognized token transfer functions
pub const ESDT_TRANSFER_FUNCTIONS: [&str; 3] =
    [ESDT_TRANSFER, ESDT_NFT_TRANSFER, MULTI_ESDT_NFT_TRANSFER];

/// ESDT parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EsdtParseError {
    #[error("Not a token transfer function: {0}")]
    NotTransferFunction(String),
    #[error("Not enough arguments for {function}: got {got}, need {need}")]
    NotEnoughArguments {
        function: String,
        got: usize,
        need: usize,
    },
    #[error("Invalid nonce: more than 8 bytes")]
    InvalidNonce,
    #[error("Invalid transfer count: {0}")]
    InvalidCount(String),
    #[error("Call function name is not valid UTF-8")]
    InvalidCallFunction,
}

/// A single token movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsdtTransfer {
    #[serde(with = "hex::serde")]
    pub token_identifier: Vec<u8>,
    /// Zero for fungible tokens
    pub nonce: u64,
    pub value: BigUint,
}

/// Decoded token transfer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEsdtTransfers {
    pub sender: Vec<u8>,
    /// Real receiver of the tokens
    pub receiver: Vec<u8>,
    pub transfers: Vec<EsdtTransfer>,
    /// Function to call on the receiver after the transfer; empty if none
    pub call_function: String,
    pub call_args: Vec<Vec<u8>>,
}

impl ParsedEsdtTransfers {
    pub fn has_call_after(&self) -> bool {
        !self.call_function.is_empty()
    }
}

/// Decodes token transfer calls
pub trait EsdtTransferParser {
    fn parse_esdt_transfers(
        &self,
        sender: &[u8],
        receiver: &[u8],
        function: &str,
        args: &[Vec<u8>],
    ) -> Result<ParsedEsdtTransfers, EsdtParseError>;
}

/// Parser for the built-in ESDT transfer functions
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEsdtTransferParser;

/// Whether `function` is one of the token transfer functions
pub fn is_esdt_transfer_function(function: &str) -> bool {
    ESDT_TRANSFER_FUNCTIONS.contains(&function)
}

/// Whether `function` moves non-fungible tokens
pub fn is_nft_transfer_function(function: &str) -> bool {
    function == ESDT_NFT_TRANSFER || function == MULTI_ESDT_NFT_TRANSFER
}

impl EsdtTransferParser for BuiltinEsdtTransferParser {
    fn parse_esdt_transfers(
        &self,
        sender: &[u8],
        receiver: &[u8],
        function: &str,
        args: &[Vec<u8>],
    ) -> Result<ParsedEsdtTransfers, EsdtParseError> {
        match function {
            ESDT_TRANSFER => parse_single_transfer(sender, receiver, args),
            ESDT_NFT_TRANSFER => parse_nft_transfer(sender, receiver, args),
            MULTI_ESDT_NFT_TRANSFER => parse_multi_transfer(sender, receiver, args),
            other => Err(EsdtParseError::NotTransferFunction(other.to_string())),
        }
    }
}

fn require_args(function: &str, args: &[Vec<u8>], need: usize) -> Result<(), EsdtParseError> {
    if args.len() < need {
        return Err(EsdtParseError::NotEnoughArguments {
            function: function.to_string(),
            got: args.len(),
            need,
        });
    }
    Ok(())
}

/// Real receiver of an NFT transfer issued on `sender`'s own account
fn nft_receiver(sender: &[u8], receiver: &[u8], named: &[u8]) -> Vec<u8> {
    if sender == receiver {
        named.to_vec()
    } else {
        receiver.to_vec()
    }
}

/// Big-endian bytes to u64
pub fn bytes_to_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn split_call(rest: &[Vec<u8>]) -> Result<(String, Vec<Vec<u8>>), EsdtParseError> {
    match rest.split_first() {
        None => Ok((String::new(), Vec::new())),
        Some((function, args)) => {
            let function = String::from_utf8(function.clone())
                .map_err(|_| EsdtParseError::InvalidCallFunction)?;
            Ok((function, args.to_vec()))
        }
    }
}

fn parse_single_transfer(
    sender: &[u8],
    receiver: &[u8],
    args: &[Vec<u8>],
) -> Result<ParsedEsdtTransfers, EsdtParseError> {
    require_args(ESDT_TRANSFER, args, 2)?;
    let (call_function, call_args) = split_call(&args[2..])?;
    Ok(ParsedEsdtTransfers {
        sender: sender.to_vec(),
        receiver: receiver.to_vec(),
        transfers: vec![EsdtTransfer {
            token_identifier: args[0].clone(),
            nonce: 0,
            value: BigUint::from_bytes_be(&args[1]),
        }],
        call_function,
        call_args,
    })
}

fn parse_nft_transfer(
    sender: &[u8],
    receiver: &[u8],
    args: &[Vec<u8>],
) -> Result<ParsedEsdtTransfers, EsdtParseError> {
    require_args(ESDT_NFT_TRANSFER, args, 4)?;
    let nonce = bytes_to_u64(&args[1]).ok_or(EsdtParseError::InvalidNonce)?;
    let (call_function, call_args) = split_call(&args[4..])?;
    Ok(ParsedEsdtTransfers {
        sender: sender.to_vec(),
        receiver: nft_receiver(sender, receiver, &args[3]),
        transfers: vec![EsdtTransfer {
            token_identifier: args[0].clone(),
            nonce,
            value: BigUint::from_bytes_be(&args[2]),
        }],
        call_function,
        call_args,
    })
}

fn parse_multi_transfer(
    sender: &[u8],
    receiver: &[u8],
    args: &[Vec<u8>],
) -> Result<ParsedEsdtTransfers, EsdtParseError> {
    require_args(MULTI_ESDT_NFT_TRANSFER, args, 2)?;

    let count = bytes_to_u64(&args[1])
        .and_then(|count| usize::try_from(count).ok())
        .ok_or_else(|| EsdtParseError::InvalidCount(hex::encode(&args[1])))?;
    let need = count
        .checked_mul(3)
        .and_then(|n| n.checked_add(2))
        .ok_or_else(|| EsdtParseError::InvalidCount(count.to_string()))?;
    require_args(MULTI_ESDT_NFT_TRANSFER, args, need)?;

    let transfers = args[2..need]
        .chunks(3)
        .map(|chunk| {
            Ok(EsdtTransfer {
                token_identifier: chunk[0].clone(),
                nonce: bytes_to_u64(&chunk[1]).ok_or(EsdtParseError::InvalidNonce)?,
                value: BigUint::from_bytes_be(&chunk[2]),
            })
        })
        .collect::<Result<Vec<_>, EsdtParseError>>()?;

    let (call_function, call_args) = split_call(&args[need..])?;
    Ok(ParsedEsdtTransfers {
        sender: sender.to_vec(),
        receiver: nft_receiver(sender, receiver, &args[0]),
        transfers,
        call_function,
        call_args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(
        sender: &[u8],
        receiver: &[u8],
        function: &str,
        args: &[Vec<u8>],
    ) -> Result<ParsedEsdtTransfers, EsdtParseError> {
        BuiltinEsdtTransferParser.parse_esdt_transfers(sender, receiver, function, args)
    }

    #[test]
    fn test_fungible_transfer_without_call() {
        let parsed = parse(b"a", b"b", ESDT_TRANSFER, &[b"TKN-01".to_vec(), vec![0x64]]).unwrap();
        assert_eq!(parsed.receiver, b"b".to_vec());
        assert_eq!(parsed.transfers[0].value, BigUint::from(100u8));
        assert!(!parsed.has_call_after());
    }

    #[test]
    fn test_fungible_transfer_with_call() {
        let args = vec![b"TKN-01".to_vec(), vec![1], b"deposit".to_vec(), vec![7]];
        let parsed = parse(b"a", b"b", ESDT_TRANSFER, &args).unwrap();
        assert_eq!(parsed.call_function, "deposit");
        assert_eq!(parsed.call_args, vec![vec![7]]);
    }

    #[test]
    fn test_nft_transfer_receiver() {
        let args = vec![b"NFT-01".to_vec(), vec![3], vec![1], b"bob".to_vec()];

        let parsed = parse(b"alice", b"alice", ESDT_NFT_TRANSFER, &args).unwrap();
        assert_eq!(parsed.receiver, b"bob".to_vec());
        assert_eq!(parsed.transfers[0].nonce, 3);

        // receiving side keeps the given receiver
        let parsed = parse(b"alice", b"carol", ESDT_NFT_TRANSFER, &args).unwrap();
        assert_eq!(parsed.receiver, b"carol".to_vec());
    }

    #[test]
    fn test_multi_transfer() {
        let args = vec![
            b"bob".to_vec(),
            vec![2],
            b"AAA-01".to_vec(),
            vec![],
            vec![5],
            b"NFT-02".to_vec(),
            vec![9],
            vec![1],
            b"claim".to_vec(),
        ];
        let parsed = parse(b"alice", b"alice", MULTI_ESDT_NFT_TRANSFER, &args).unwrap();
        assert_eq!(parsed.receiver, b"bob".to_vec());
        assert_eq!(parsed.transfers.len(), 2);
        assert_eq!(parsed.transfers[1].nonce, 9);
        assert_eq!(parsed.call_function, "claim");
        assert!(parsed.call_args.is_empty());
    }

    #[test]
    fn test_multi_transfer_missing_entries() {
        let args = vec![b"bob".to_vec(), vec![2], b"AAA-01".to_vec(), vec![], vec![5]];
        let err = parse(b"alice", b"alice", MULTI_ESDT_NFT_TRANSFER, &args).unwrap_err();
        assert!(matches!(err, EsdtParseError::NotEnoughArguments { need: 8, .. }));
    }

    #[test]
    fn test_unknown_function() {
        assert!(matches!(
            parse(b"a", b"b", "transfer", &[]),
            Err(EsdtParseError::NotTransferFunction(_))
        ));
    }
}
