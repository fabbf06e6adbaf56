//! Contract opcodes
//!
//! Defines the instruction set for the contract virtual machine.

use serde::{Deserialize, Serialize};

/// Opcodes for the contract VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpCode {
    // Stack operations (0x00 - 0x0F)
    /// Push a 64-bit value onto the stack
    Push = 0x00,
    /// Pop the top value from the stack
    Pop = 0x01,
    /// Duplicate the top value
    Dup = 0x02,
    /// Swap the top two values
    Swap = 0x03,
    /// Push a byte string of up to 65535 bytes
    PushBytes = 0x04,

    // Arithmetic (0x10 - 0x1F)
    /// Add top two values
    Add = 0x10,
    /// Subtract top from second
    Sub = 0x11,
    /// Multiply top two values
    Mul = 0x12,
    /// Divide second by top
    Div = 0x13,
    /// Modulo second by top
    Mod = 0x14,

    // Comparison (0x20 - 0x2F)
    /// Equal: push 1 if the two byte strings are identical, 0 otherwise
    Eq = 0x20,
    /// Less than
    Lt = 0x21,
    /// Greater than
    Gt = 0x22,
    /// Check if zero
    IsZero = 0x26,

    // Logic (0x30 - 0x3F)
    /// Logical AND
    And = 0x30,
    /// Logical OR
    Or = 0x31,
    /// Logical NOT
    Not = 0x32,

    // Control flow (0x40 - 0x4F)
    /// Unconditional jump
    Jump = 0x40,
    /// Conditional jump (if top of stack is non-zero)
    JumpIf = 0x41,
    /// Halt execution
    Halt = 0x42,
    /// Finish the top value and halt
    Return = 0x43,
    /// Fail with the top value as message
    Revert = 0x44,

    // Storage (0x50 - 0x5F)
    /// Store value: key, value -> storage
    SStore = 0x50,
    /// Load value: key -> value
    SLoad = 0x51,

    // Execution context (0x60 - 0x6F)
    /// Transfer value: to, amount
    Transfer = 0x61,
    /// Push caller address
    Caller = 0x62,
    /// Push contract address
    Self_ = 0x63,
    /// Push the value sent with the call
    CallValue = 0x67,
    /// Push the gas left
    GasLeft = 0x68,

    // Arguments (0x70 - 0x7F)
    /// Load argument by index
    Arg = 0x70,
    /// Get number of arguments
    ArgCount = 0x71,

    // Byte strings and output (0x80 - 0x8F)
    /// Append the top value to the return data
    Finish = 0x80,
    /// Concatenate the top two values
    Concat = 0x81,
    /// Replace the top value with its lowercase hex encoding
    Hex = 0x82,

    // Gas and async calls (0x90 - 0x9F)
    /// Burn the amount of gas on top of the stack
    UseGas = 0x90,
    /// Register an async call:
    /// group, dest, data, value, gas, locked, success, error
    AsyncCall = 0x91,
    /// Set a group callback: group, callback, data, gas
    GroupCallback = 0x92,

    // No operation
    Nop = 0xFF,
}

impl OpCode {
    /// Convert byte to opcode
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(OpCode::Push),
            0x01 => Some(OpCode::Pop),
            0x02 => Some(OpCode::Dup),
            0x03 => Some(OpCode::Swap),
            0x04 => Some(OpCode::PushBytes),
            0x10 => Some(OpCode::Add),
            0x11 => Some(OpCode::Sub),
            0x12 => Some(OpCode::Mul),
            0x13 => Some(OpCode::Div),
            0x14 => Some(OpCode::Mod),
            0x20 => Some(OpCode::Eq),
            0x21 => Some(OpCode::Lt),
            0x22 => Some(OpCode::Gt),
            0x26 => Some(OpCode::IsZero),
            0x30 => Some(OpCode::And),
            0x31 => Some(OpCode::Or),
            0x32 => Some(OpCode::Not),
            0x40 => Some(OpCode::Jump),
            0x41 => Some(OpCode::JumpIf),
            0x42 => Some(OpCode::Halt),
            0x43 => Some(OpCode::Return),
            0x44 => Some(OpCode::Revert),
            0x50 => Some(OpCode::SStore),
            0x51 => Some(OpCode::SLoad),
            0x61 => Some(OpCode::Transfer),
            0x62 => Some(OpCode::Caller),
            0x63 => Some(OpCode::Self_),
            0x67 => Some(OpCode::CallValue),
            0x68 => Some(OpCode::GasLeft),
            0x70 => Some(OpCode::Arg),
            0x71 => Some(OpCode::ArgCount),
            0x80 => Some(OpCode::Finish),
            0x81 => Some(OpCode::Concat),
            0x82 => Some(OpCode::Hex),
            0x90 => Some(OpCode::UseGas),
            0x91 => Some(OpCode::AsyncCall),
            0x92 => Some(OpCode::GroupCallback),
            0xFF => Some(OpCode::Nop),
            _ => None,
        }
    }

    /// Get the number of fixed immediate bytes after the opcode.
    ///
    /// `PushBytes` has a 2-byte length followed by that many bytes.
    pub fn arg_bytes(&self) -> usize {
        match self {
            OpCode::Push => 8,      // 64-bit value
            OpCode::PushBytes => 2, // 16-bit length
            OpCode::Jump => 4,      // 32-bit offset
            OpCode::JumpIf => 4,    // 32-bit offset
            OpCode::Arg => 1,       // 8-bit index
            _ => 0,
        }
    }

    /// Get opcode name for disassembly
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Push => "PUSH",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::Swap => "SWAP",
            OpCode::PushBytes => "PUSHB",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Eq => "EQ",
            OpCode::Lt => "LT",
            OpCode::Gt => "GT",
            OpCode::IsZero => "ISZERO",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Not => "NOT",
            OpCode::Jump => "JUMP",
            OpCode::JumpIf => "JUMPI",
            OpCode::Halt => "HALT",
            OpCode::Return => "RETURN",
            OpCode::Revert => "REVERT",
            OpCode::SStore => "SSTORE",
            OpCode::SLoad => "SLOAD",
            OpCode::Transfer => "TRANSFER",
            OpCode::Caller => "CALLER",
            OpCode::Self_ => "SELF",
            OpCode::CallValue => "CALLVALUE",
            OpCode::GasLeft => "GASLEFT",
            OpCode::Arg => "ARG",
            OpCode::ArgCount => "ARGCOUNT",
            OpCode::Finish => "FINISH",
            OpCode::Concat => "CONCAT",
            OpCode::Hex => "HEX",
            OpCode::UseGas => "USEGAS",
            OpCode::AsyncCall => "ASYNC",
            OpCode::GroupCallback => "GROUPCALLBACK",
            OpCode::Nop => "NOP",
        }
    }

    /// Opcode for an assembler mnemonic without immediates
    pub fn from_name(name: &str) -> Option<Self> {
        let op = match name {
            "POP" => OpCode::Pop,
            "DUP" => OpCode::Dup,
            "SWAP" => OpCode::Swap,
            "ADD" => OpCode::Add,
            "SUB" => OpCode::Sub,
            "MUL" => OpCode::Mul,
            "DIV" => OpCode::Div,
            "MOD" => OpCode::Mod,
            "EQ" => OpCode::Eq,
            "LT" => OpCode::Lt,
            "GT" => OpCode::Gt,
            "ISZERO" => OpCode::IsZero,
            "AND" => OpCode::And,
            "OR" => OpCode::Or,
            "NOT" => OpCode::Not,
            "HALT" => OpCode::Halt,
            "RETURN" => OpCode::Return,
            "REVERT" => OpCode::Revert,
            "SSTORE" => OpCode::SStore,
            "SLOAD" => OpCode::SLoad,
            "TRANSFER" => OpCode::Transfer,
            "CALLER" => OpCode::Caller,
            "SELF" => OpCode::Self_,
            "CALLVALUE" => OpCode::CallValue,
            "GASLEFT" => OpCode::GasLeft,
            "ARGCOUNT" => OpCode::ArgCount,
            "FINISH" => OpCode::Finish,
            "CONCAT" => OpCode::Concat,
            "HEX" => OpCode::Hex,
            "USEGAS" => OpCode::UseGas,
            "ASYNC" => OpCode::AsyncCall,
            "GROUPCALLBACK" => OpCode::GroupCallback,
            "NOP" => OpCode::Nop,
            _ => return None,
        };
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        let opcodes = [
            OpCode::Push,
            OpCode::PushBytes,
            OpCode::Add,
            OpCode::Eq,
            OpCode::Jump,
            OpCode::SStore,
            OpCode::Caller,
            OpCode::AsyncCall,
        ];

        for op in opcodes {
            let byte = op as u8;
            let decoded = OpCode::from_byte(byte).unwrap();
            assert_eq!(op, decoded);
        }
    }

    #[test]
    fn test_mnemonics_match_names() {
        for op in [OpCode::Finish, OpCode::UseGas, OpCode::AsyncCall, OpCode::Revert] {
            assert_eq!(OpCode::from_name(op.name()), Some(op));
        }
        // immediates are handled by the assembler
        assert_eq!(OpCode::from_name("PUSH"), None);
    }
}
