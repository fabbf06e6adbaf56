//! Shared fixtures for the async engine tests

use crate::async_call::AsyncContext;
use crate::config::HostConfig;
use crate::contract::{Compiler, Module};
use crate::core::CallType;
use crate::host::{GasSchedule, Host, RuntimeFrame};
use crate::world::{Account, WorldHost};
use num_bigint::BigUint;

pub(crate) const STEP: u64 = 100;
pub(crate) const TX_HASH: [u8; 32] = [7; 32];

/// Caller contract: records what its callbacks received
pub(crate) const CALLER: &str = "
    :on_done
    HALT
    :on_error
    HALT
    :all_done
    PUSHB str:group
    ARG 0
    SSTORE
    HALT
";

/// Destination contract
pub(crate) const CALLEE: &str = "
    :burn
    PUSHB str:nineteen-bytes-long
    FINISH
    ARG 0
    USEGAS
    HALT
    :echo
    ARG 0
    FINISH
    HALT
    :fail
    PUSHB str:boom
    REVERT
    :pay
    PUSHB str:ESDTTransfer@544f4b2d3031@0a
    FINISH
    HALT
    :pay_nft
    PUSHB str:ESDTNFTTransfer@4e46542d3031@03@01@63616c6c6572
    FINISH
    HALT
";

pub(crate) fn schedule() -> GasSchedule {
    GasSchedule {
        async_call_step: STEP,
        data_copy_per_byte: 1,
    }
}

pub(crate) fn compile(source: &str) -> Module {
    Compiler::new().compile(source).unwrap()
}

/// Accounts `user` and `caller` in shard 0, `callee` in shard 0 and
/// `remote` in the last shard
pub(crate) fn world(num_shards: u32) -> WorldHost {
    let mut world = WorldHost::new(HostConfig {
        gas_schedule: schedule(),
        num_shards,
        builtin_function_cost: 10,
        ..Default::default()
    });
    world
        .add_account(Account::new(b"user".to_vec(), 0).with_balance(BigUint::from(1_000_000u32)))
        .unwrap();
    world
        .add_account(Account::new(b"caller".to_vec(), 0).with_code(compile(CALLER)))
        .unwrap();
    world
        .add_account(Account::new(b"callee".to_vec(), 0).with_code(compile(CALLEE)))
        .unwrap();
    world
        .add_account(Account::new(b"remote".to_vec(), num_shards - 1).with_code(compile(CALLEE)))
        .unwrap();
    world
}

/// Enter an activation of `caller` with `gas` to spend
pub(crate) fn enter(world: &mut WorldHost, call_type: CallType, gas: u64) {
    world.begin_execution(
        RuntimeFrame {
            context_address: b"caller".to_vec(),
            caller: b"user".to_vec(),
            original_caller: b"user".to_vec(),
            call_type,
            gas_price: 1,
            current_tx_hash: TX_HASH.to_vec(),
            original_tx_hash: TX_HASH.to_vec(),
            prev_tx_hash: Vec::new(),
        },
        gas,
    );
}

pub(crate) fn context(world: &WorldHost) -> AsyncContext {
    AsyncContext::new(world.runtime(), schedule())
}

/// Hex call data for `function` with the given arguments
pub(crate) fn data(function: &str, args: &[&[u8]]) -> Vec<u8> {
    let args: Vec<Vec<u8>> = args.iter().map(|arg| arg.to_vec()).collect();
    crate::parsers::build_call_data(function, &args)
}
