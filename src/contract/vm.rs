//! Contract virtual machine
//!
//! A stack-based VM executing one exported function of a contract module.
//! Stack values are byte strings; arithmetic reads them as big-endian
//! unsigned 64-bit integers.
//!
//! The VM never touches the host directly. Storage writes, transfers, async
//! call registrations and group callbacks are collected in the
//! [`ExecutionResult`] and applied by the host once execution succeeds. Gas
//! for async calls and group callbacks is reserved when they are registered
//! and reported separately, so the host can charge it again through its own
//! metering.

use crate::contract::opcodes::OpCode;
use crate::core::ReturnCode;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum stack size
const MAX_STACK_SIZE: usize = 1024;

/// Largest value arithmetic accepts, in bytes
const MAX_NUMBER_SIZE: usize = 8;

/// Default gas limit
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

/// VM execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u8),
    #[error("Unexpected end of code at {0}")]
    TruncatedCode(usize),
    #[error("Out of gas")]
    OutOfGas,
    #[error("Invalid jump destination: {0}")]
    InvalidJump(u32),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Arithmetic overflow")]
    Overflow,
    #[error("Value of {0} bytes is not a number")]
    NotANumber(usize),
    #[error("Invalid argument index: {0}")]
    InvalidArgument(u8),
    #[error("Value is not valid UTF-8")]
    InvalidUtf8,
    #[error("Function not found: {0}")]
    FunctionNotFound(String),
    #[error("{0}")]
    Reverted(String),
}

impl VmError {
    /// Return code reported for this failure
    pub fn return_code(&self) -> ReturnCode {
        match self {
            VmError::OutOfGas => ReturnCode::OutOfGas,
            VmError::FunctionNotFound(_) => ReturnCode::FunctionNotFound,
            VmError::InvalidArgument(_) => ReturnCode::FunctionWrongSignature,
            VmError::Reverted(_) => ReturnCode::UserError,
            VmError::InvalidOpcode(_) | VmError::TruncatedCode(_) | VmError::InvalidJump(_) => {
                ReturnCode::ContractInvalid
            }
            VmError::StackOverflow
            | VmError::StackUnderflow
            | VmError::DivisionByZero
            | VmError::Overflow
            | VmError::NotANumber(_)
            | VmError::InvalidUtf8 => ReturnCode::ExecutionFailed,
        }
    }
}

/// Deployable contract: bytecode plus exported entry points
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    #[serde(with = "hex::serde")]
    pub code: Vec<u8>,
    /// Function name -> code offset
    pub functions: BTreeMap<String, u32>,
}

impl Module {
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

/// Execution context for the VM
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub caller: Vec<u8>,
    pub contract_address: Vec<u8>,
    /// Exported function to run
    pub function: String,
    pub args: Vec<Vec<u8>>,
    pub call_value: BigUint,
    /// Available gas
    pub gas_limit: u64,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            caller: Vec::new(),
            contract_address: Vec::new(),
            function: String::new(),
            args: Vec::new(),
            call_value: BigUint::default(),
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

/// An async call registered by the contract
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncCallRequest {
    pub group: String,
    pub destination: Vec<u8>,
    pub data: Vec<u8>,
    pub value: Vec<u8>,
    pub gas_limit: u64,
    pub gas_locked: u64,
    pub success_callback: String,
    pub error_callback: String,
}

/// A group callback set by the contract
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupCallbackRequest {
    pub group: String,
    pub callback: String,
    pub data: Vec<u8>,
    pub gas: u64,
}

/// Result of a successful execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub return_data: Vec<Vec<u8>>,
    /// Gas left, not counting gas reserved for async calls
    pub gas_remaining: u64,
    /// Gas reserved by async calls and group callbacks
    pub gas_reserved: u64,
    pub storage_changes: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Transfer requests: (to, amount)
    pub transfers: Vec<(Vec<u8>, BigUint)>,
    pub async_calls: Vec<AsyncCallRequest>,
    pub group_callbacks: Vec<GroupCallbackRequest>,
}

/// The contract virtual machine
pub struct VM<'a> {
    /// Stack for computation
    stack: Vec<Vec<u8>>,
    /// Program counter
    pc: usize,
    /// Gas remaining
    gas: u64,
    /// Gas set aside for async calls
    reserved: u64,
    /// Contract storage
    storage: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Pending storage changes
    storage_changes: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Pending transfers
    transfers: Vec<(Vec<u8>, BigUint)>,
    return_data: Vec<Vec<u8>>,
    async_calls: Vec<AsyncCallRequest>,
    group_callbacks: Vec<GroupCallbackRequest>,
    /// Module being executed
    module: &'a Module,
    /// Execution context
    context: ExecutionContext,
    /// Whether execution has halted
    halted: bool,
}

impl<'a> VM<'a> {
    /// Create a new VM instance
    pub fn new(
        module: &'a Module,
        storage: BTreeMap<Vec<u8>, Vec<u8>>,
        context: ExecutionContext,
    ) -> Self {
        Self {
            stack: Vec::with_capacity(256),
            pc: 0,
            gas: context.gas_limit,
            reserved: 0,
            storage,
            storage_changes: BTreeMap::new(),
            transfers: Vec::new(),
            return_data: Vec::new(),
            async_calls: Vec::new(),
            group_callbacks: Vec::new(),
            module,
            context,
            halted: false,
        }
    }

    /// Run the context's function to completion
    pub fn execute(mut self) -> Result<ExecutionResult, VmError> {
        let entry = *self
            .module
            .functions
            .get(&self.context.function)
            .ok_or_else(|| VmError::FunctionNotFound(self.context.function.clone()))?;
        self.pc = entry as usize;

        while !self.halted && self.pc < self.module.code.len() {
            self.step()?;
        }

        Ok(ExecutionResult {
            return_data: self.return_data,
            gas_remaining: self.gas,
            gas_reserved: self.reserved,
            storage_changes: self.storage_changes,
            transfers: self.transfers,
            async_calls: self.async_calls,
            group_callbacks: self.group_callbacks,
        })
    }

    /// Consume gas
    fn consume_gas(&mut self, amount: u64) -> Result<(), VmError> {
        if self.gas < amount {
            return Err(VmError::OutOfGas);
        }
        self.gas -= amount;
        Ok(())
    }

    /// Consume gas and remember it was set aside for the host
    fn reserve_gas(&mut self, amount: u64) -> Result<(), VmError> {
        self.consume_gas(amount)?;
        self.reserved = self.reserved.checked_add(amount).ok_or(VmError::Overflow)?;
        Ok(())
    }

    /// Execute a single instruction
    fn step(&mut self) -> Result<(), VmError> {
        let opcode_byte = self.module.code[self.pc];
        let opcode = OpCode::from_byte(opcode_byte).ok_or(VmError::InvalidOpcode(opcode_byte))?;

        self.consume_gas(gas_cost(&opcode))?;
        self.pc += 1;

        match opcode {
            OpCode::Push => {
                let value = self.read_u64()?;
                self.push_number(value)?;
            }
            OpCode::PushBytes => {
                let len = self.read_u16()? as usize;
                let bytes = self.read_bytes(len)?;
                self.push(bytes)?;
            }
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::Dup => {
                let value = self.stack.last().cloned().ok_or(VmError::StackUnderflow)?;
                self.push(value)?;
            }
            OpCode::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(VmError::StackUnderflow);
                }
                self.stack.swap(len - 1, len - 2);
            }
            OpCode::Add => self.binary(|a, b| a.checked_add(b).ok_or(VmError::Overflow))?,
            OpCode::Sub => self.binary(|a, b| a.checked_sub(b).ok_or(VmError::Overflow))?,
            OpCode::Mul => self.binary(|a, b| a.checked_mul(b).ok_or(VmError::Overflow))?,
            OpCode::Div => self.binary(|a, b| a.checked_div(b).ok_or(VmError::DivisionByZero))?,
            OpCode::Mod => self.binary(|a, b| a.checked_rem(b).ok_or(VmError::DivisionByZero))?,
            OpCode::Eq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push_number(u64::from(a == b))?;
            }
            OpCode::Lt => self.binary(|a, b| Ok(u64::from(a < b)))?,
            OpCode::Gt => self.binary(|a, b| Ok(u64::from(a > b)))?,
            OpCode::IsZero => {
                let a = self.pop_number()?;
                self.push_number(u64::from(a == 0))?;
            }
            OpCode::And => self.binary(|a, b| Ok(u64::from(a != 0 && b != 0)))?,
            OpCode::Or => self.binary(|a, b| Ok(u64::from(a != 0 || b != 0)))?,
            OpCode::Not => {
                let a = self.pop_number()?;
                self.push_number(u64::from(a == 0))?;
            }
            OpCode::Jump => {
                let offset = self.read_u32()?;
                self.jump(offset)?;
            }
            OpCode::JumpIf => {
                let offset = self.read_u32()?;
                let condition = self.pop_number()?;
                if condition != 0 {
                    self.jump(offset)?;
                }
            }
            OpCode::Halt => {
                self.halted = true;
            }
            OpCode::Return => {
                let value = self.pop()?;
                self.return_data.push(value);
                self.halted = true;
            }
            OpCode::Revert => {
                let message = self.pop()?;
                return Err(VmError::Reverted(
                    String::from_utf8_lossy(&message).into_owned(),
                ));
            }
            OpCode::SStore => {
                let value = self.pop()?;
                let key = self.pop()?;
                self.storage.insert(key.clone(), value.clone());
                self.storage_changes.insert(key, value);
            }
            OpCode::SLoad => {
                let key = self.pop()?;
                let value = self.storage.get(&key).cloned().unwrap_or_default();
                self.push(value)?;
            }
            OpCode::Transfer => {
                let amount = self.pop()?;
                let to = self.pop()?;
                self.transfers.push((to, BigUint::from_bytes_be(&amount)));
            }
            OpCode::Caller => {
                self.push(self.context.caller.clone())?;
            }
            OpCode::Self_ => {
                self.push(self.context.contract_address.clone())?;
            }
            OpCode::CallValue => {
                self.push(self.context.call_value.to_bytes_be())?;
            }
            OpCode::GasLeft => {
                self.push_number(self.gas)?;
            }
            OpCode::Arg => {
                let index = self.read_u8()?;
                let value = self
                    .context
                    .args
                    .get(index as usize)
                    .cloned()
                    .ok_or(VmError::InvalidArgument(index))?;
                self.push(value)?;
            }
            OpCode::ArgCount => {
                self.push_number(self.context.args.len() as u64)?;
            }
            OpCode::Finish => {
                let value = self.pop()?;
                self.return_data.push(value);
            }
            OpCode::Concat => {
                let b = self.pop()?;
                let mut a = self.pop()?;
                a.extend_from_slice(&b);
                self.push(a)?;
            }
            OpCode::Hex => {
                let value = self.pop()?;
                self.push(hex::encode(value).into_bytes())?;
            }
            OpCode::UseGas => {
                let amount = self.pop_number()?;
                self.consume_gas(amount)?;
            }
            OpCode::AsyncCall => {
                let error_callback = self.pop_string()?;
                let success_callback = self.pop_string()?;
                let gas_locked = self.pop_number()?;
                let gas_limit = self.pop_number()?;
                let value = self.pop()?;
                let data = self.pop()?;
                let destination = self.pop()?;
                let group = self.pop_string()?;
                self.reserve_gas(gas_limit.checked_add(gas_locked).ok_or(VmError::Overflow)?)?;
                self.async_calls.push(AsyncCallRequest {
                    group,
                    destination,
                    data,
                    value,
                    gas_limit,
                    gas_locked,
                    success_callback,
                    error_callback,
                });
            }
            OpCode::GroupCallback => {
                let gas = self.pop_number()?;
                let data = self.pop()?;
                let callback = self.pop_string()?;
                let group = self.pop_string()?;
                self.reserve_gas(gas)?;
                self.group_callbacks.push(GroupCallbackRequest {
                    group,
                    callback,
                    data,
                    gas,
                });
            }
            OpCode::Nop => {}
        }

        Ok(())
    }

    fn binary(&mut self, op: impl Fn(u64, u64) -> Result<u64, VmError>) -> Result<(), VmError> {
        let b = self.pop_number()?;
        let a = self.pop_number()?;
        self.push_number(op(a, b)?)
    }

    fn jump(&mut self, offset: u32) -> Result<(), VmError> {
        if offset as usize >= self.module.code.len() {
            return Err(VmError::InvalidJump(offset));
        }
        self.pc = offset as usize;
        Ok(())
    }

    /// Push value onto stack
    fn push(&mut self, value: Vec<u8>) -> Result<(), VmError> {
        if self.stack.len() >= MAX_STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn push_number(&mut self, value: u64) -> Result<(), VmError> {
        self.push(BigUint::from(value).to_bytes_be())
    }

    /// Pop value from stack
    fn pop(&mut self) -> Result<Vec<u8>, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn pop_number(&mut self) -> Result<u64, VmError> {
        let value = self.pop()?;
        if value.len() > MAX_NUMBER_SIZE {
            return Err(VmError::NotANumber(value.len()));
        }
        Ok(value.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
    }

    fn pop_string(&mut self) -> Result<String, VmError> {
        String::from_utf8(self.pop()?).map_err(|_| VmError::InvalidUtf8)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, VmError> {
        let end = self.pc + len;
        if end > self.module.code.len() {
            return Err(VmError::TruncatedCode(self.pc));
        }
        let bytes = self.module.code[self.pc..end].to_vec();
        self.pc = end;
        Ok(bytes)
    }

    /// Read u8 from bytecode
    fn read_u8(&mut self) -> Result<u8, VmError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, VmError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read u32 from bytecode
    fn read_u32(&mut self) -> Result<u32, VmError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read u64 from bytecode
    fn read_u64(&mut self) -> Result<u64, VmError> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(u64::from_be_bytes(buf))
    }
}

/// Get gas cost for opcode
pub fn gas_cost(opcode: &OpCode) -> u64 {
    match opcode {
        OpCode::Push | OpCode::PushBytes | OpCode::Pop | OpCode::Dup | OpCode::Swap => 2,
        OpCode::Add | OpCode::Sub | OpCode::Mul => 3,
        OpCode::Div | OpCode::Mod => 5,
        OpCode::Eq | OpCode::Lt | OpCode::Gt | OpCode::IsZero => 3,
        OpCode::And | OpCode::Or | OpCode::Not => 3,
        OpCode::Jump | OpCode::JumpIf => 8,
        OpCode::SStore => 20,
        OpCode::SLoad => 5,
        OpCode::Transfer => 50,
        OpCode::Caller | OpCode::Self_ | OpCode::CallValue | OpCode::GasLeft => 2,
        OpCode::Arg | OpCode::ArgCount => 2,
        OpCode::Finish | OpCode::Concat | OpCode::Hex => 3,
        OpCode::AsyncCall | OpCode::GroupCallback => 10,
        OpCode::Halt | OpCode::Return | OpCode::Revert | OpCode::UseGas => 0,
        OpCode::Nop => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_push(value: u64) -> Vec<u8> {
        let mut bytes = vec![OpCode::Push as u8];
        bytes.extend_from_slice(&value.to_be_bytes());
        bytes
    }

    fn make_push_bytes(value: &[u8]) -> Vec<u8> {
        let mut bytes = vec![OpCode::PushBytes as u8];
        bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        bytes.extend_from_slice(value);
        bytes
    }

    fn module(code: Vec<u8>) -> Module {
        let mut functions = BTreeMap::new();
        functions.insert("main".to_string(), 0);
        Module { code, functions }
    }

    fn context() -> ExecutionContext {
        ExecutionContext {
            function: "main".to_string(),
            ..Default::default()
        }
    }

    fn run(code: Vec<u8>, context: ExecutionContext) -> Result<ExecutionResult, VmError> {
        let module = module(code);
        VM::new(&module, BTreeMap::new(), context).execute()
    }

    #[test]
    fn test_simple_addition() {
        let mut code = make_push(10);
        code.extend(make_push(20));
        code.push(OpCode::Add as u8);
        code.push(OpCode::Return as u8);

        let result = run(code, context()).unwrap();
        assert_eq!(result.return_data, vec![vec![30]]);
    }

    #[test]
    fn test_comparison() {
        let mut code = make_push(10);
        code.extend(make_push(20));
        code.push(OpCode::Lt as u8);
        code.push(OpCode::Return as u8);

        let result = run(code, context()).unwrap();
        assert_eq!(result.return_data, vec![vec![1]]); // 10 < 20
    }

    #[test]
    fn test_storage() {
        let mut code = make_push_bytes(b"counter");
        code.extend(make_push(42));
        code.push(OpCode::SStore as u8);
        code.extend(make_push_bytes(b"counter"));
        code.push(OpCode::SLoad as u8);
        code.push(OpCode::Return as u8);

        let result = run(code, context()).unwrap();
        assert_eq!(result.return_data, vec![vec![42]]);
        assert_eq!(result.storage_changes.get(b"counter".as_slice()), Some(&vec![42]));
    }

    #[test]
    fn test_out_of_gas() {
        let mut code = Vec::new();
        for _ in 0..100 {
            code.extend(make_push(1));
        }

        let mut context = context();
        context.gas_limit = 10;

        let err = run(code, context).unwrap_err();
        assert_eq!(err, VmError::OutOfGas);
        assert_eq!(err.return_code(), ReturnCode::OutOfGas);
    }

    #[test]
    fn test_unknown_function() {
        let mut context = context();
        context.function = "missing".to_string();
        let err = run(vec![OpCode::Halt as u8], context).unwrap_err();
        assert_eq!(err.return_code(), ReturnCode::FunctionNotFound);
    }

    #[test]
    fn test_revert_carries_message() {
        let mut code = make_push_bytes(b"insufficient");
        code.push(OpCode::Revert as u8);

        let err = run(code, context()).unwrap_err();
        assert_eq!(err, VmError::Reverted("insufficient".to_string()));
        assert_eq!(err.return_code(), ReturnCode::UserError);
    }

    #[test]
    fn test_use_gas_burns_exactly() {
        let mut code = make_push(300);
        code.push(OpCode::UseGas as u8);
        code.push(OpCode::Halt as u8);

        let mut context = context();
        context.gas_limit = 1000;
        let result = run(code, context).unwrap();
        // PUSH costs 2
        assert_eq!(result.gas_remaining, 698);
    }

    #[test]
    fn test_async_call_reserves_gas() {
        let mut code = make_push_bytes(b"g");
        code.extend(make_push_bytes(b"bob"));
        code.extend(make_push_bytes(b"ping@01"));
        code.extend(make_push_bytes(b""));
        code.extend(make_push(500));
        code.extend(make_push(50));
        code.extend(make_push_bytes(b"ok"));
        code.extend(make_push_bytes(b"err"));
        code.push(OpCode::AsyncCall as u8);

        let mut context = context();
        context.gas_limit = 1000;
        let result = run(code, context).unwrap();

        assert_eq!(result.gas_reserved, 550);
        // 8 pushes at 2, async at 10
        assert_eq!(result.gas_remaining, 1000 - 16 - 10 - 550);
        let call = &result.async_calls[0];
        assert_eq!(call.destination, b"bob".to_vec());
        assert_eq!(call.data, b"ping@01".to_vec());
        assert_eq!(call.success_callback, "ok");
    }

    #[test]
    fn test_byte_strings() {
        let mut code = make_push_bytes(b"ping@");
        code.extend(make_push(10));
        code.push(OpCode::Hex as u8);
        code.push(OpCode::Concat as u8);
        code.push(OpCode::Finish as u8);
        code.push(OpCode::Halt as u8);

        let result = run(code, context()).unwrap();
        assert_eq!(result.return_data, vec![b"ping@0a".to_vec()]);
    }
}
