//! Parsers for call payloads
//!
//! - Call data (`function@hexarg…`)
//! - Built-in token transfer arguments

pub mod call_data;
pub mod esdt;

pub use call_data::{build_call_data, CallArgsParser, CallDataError, HexCallArgsParser};
pub use esdt::{
    is_esdt_transfer_function, is_nft_transfer_function, BuiltinEsdtTransferParser, EsdtParseError,
    EsdtTransfer, EsdtTransferParser, ParsedEsdtTransfers, ESDT_NFT_TRANSFER, ESDT_TRANSFER,
    MULTI_ESDT_NFT_TRANSFER,
};
