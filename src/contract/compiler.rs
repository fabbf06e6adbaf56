//! Contract assembler
//!
//! Compiles assembly-like syntax to a [`Module`]. Every `:label` is both a
//! jump target and an exported function callable by name.
//!
//! ```text
//! ; comment
//! :ping
//!     PUSHB str:pong
//!     FINISH
//!     HALT
//! ```
//!
//! `PUSHB` takes the rest of the line as its literal: `str:` followed by
//! UTF-8 text, `0x` followed by hex, or a decimal number.

use crate::contract::opcodes::OpCode;
use crate::contract::vm::Module;
use num_bigint::BigUint;
use std::collections::BTreeMap;
use thiserror::Error;

/// Compiler errors
#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Undefined label: {0}")]
    UndefinedLabel(String),
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Literal of {0} bytes is too long")]
    LiteralTooLong(usize),
}

/// Assembler for contract modules
pub struct Compiler {
    /// Output bytecode
    code: Vec<u8>,
    /// Label positions
    labels: BTreeMap<String, u32>,
    /// Pending label references (position, label_name)
    label_refs: Vec<(usize, String)>,
}

impl Compiler {
    /// Create a new compiler
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            labels: BTreeMap::new(),
            label_refs: Vec::new(),
        }
    }

    /// Compile source code to a module
    pub fn compile(&mut self, source: &str) -> Result<Module, CompilerError> {
        self.code.clear();
        self.labels.clear();
        self.label_refs.clear();

        // First pass: emit code and collect labels
        for line in source.lines() {
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // Check for label definition
            if let Some(label) = line.strip_prefix(':') {
                let label = label.trim().to_string();
                if self.labels.contains_key(&label) {
                    return Err(CompilerError::DuplicateLabel(label));
                }
                self.labels.insert(label, self.code.len() as u32);
                continue;
            }

            // Parse instruction
            self.compile_instruction(line)?;
        }

        // Second pass: resolve label references
        for (pos, label) in &self.label_refs {
            let addr = self
                .labels
                .get(label)
                .ok_or_else(|| CompilerError::UndefinedLabel(label.clone()))?;
            self.code[*pos..*pos + 4].copy_from_slice(&addr.to_be_bytes());
        }

        Ok(Module {
            code: self.code.clone(),
            functions: self.labels.clone(),
        })
    }

    /// Compile a single instruction
    fn compile_instruction(&mut self, line: &str) -> Result<(), CompilerError> {
        let (instruction, operand) = match line.split_once(char::is_whitespace) {
            Some((instruction, operand)) => (instruction.to_uppercase(), operand.trim()),
            None => (line.to_uppercase(), ""),
        };

        match instruction.as_str() {
            "PUSH" => {
                self.code.push(OpCode::Push as u8);
                let value = parse_number(if operand.is_empty() { "0" } else { operand })?;
                self.code.extend_from_slice(&value.to_be_bytes());
            }
            "PUSHB" => {
                let bytes = parse_literal(operand)?;
                let len = u16::try_from(bytes.len())
                    .map_err(|_| CompilerError::LiteralTooLong(bytes.len()))?;
                self.code.push(OpCode::PushBytes as u8);
                self.code.extend_from_slice(&len.to_be_bytes());
                self.code.extend_from_slice(&bytes);
            }
            "JUMP" | "JUMPI" => {
                let opcode = if instruction == "JUMP" {
                    OpCode::Jump
                } else {
                    OpCode::JumpIf
                };
                if operand.is_empty() {
                    return Err(CompilerError::InvalidArgument(format!(
                        "{} requires label",
                        instruction
                    )));
                }
                self.code.push(opcode as u8);
                self.label_refs.push((self.code.len(), operand.to_string()));
                self.code.extend_from_slice(&[0, 0, 0, 0]); // Placeholder
            }
            "ARG" => {
                let index = operand
                    .parse::<u8>()
                    .map_err(|_| CompilerError::InvalidNumber(operand.to_string()))?;
                self.code.push(OpCode::Arg as u8);
                self.code.push(index);
            }
            other => {
                let opcode = OpCode::from_name(other)
                    .ok_or_else(|| CompilerError::UnknownInstruction(instruction.clone()))?;
                self.code.push(opcode as u8);
            }
        }

        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a number (decimal or hex)
fn parse_number(s: &str) -> Result<u64, CompilerError> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|_| CompilerError::InvalidNumber(s.to_string()))
    } else {
        s.parse::<u64>()
            .map_err(|_| CompilerError::InvalidNumber(s.to_string()))
    }
}

/// Parse a `PUSHB` literal
fn parse_literal(s: &str) -> Result<Vec<u8>, CompilerError> {
    if let Some(text) = s.strip_prefix("str:") {
        return Ok(text.as_bytes().to_vec());
    }
    if let Some(hex) = s.strip_prefix("0x") {
        return hex::decode(hex).map_err(|_| CompilerError::InvalidNumber(s.to_string()));
    }
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.parse::<BigUint>()
        .map(|value| value.to_bytes_be())
        .map_err(|_| CompilerError::InvalidNumber(s.to_string()))
}

/// Disassemble bytecode to readable format
pub fn disassemble(code: &[u8]) -> String {
    let mut output = String::new();
    let mut pc = 0;

    while pc < code.len() {
        let opcode_byte = code[pc];
        let Some(opcode) = OpCode::from_byte(opcode_byte) else {
            output.push_str(&format!("{:04x}: UNKNOWN 0x{:02x}\n", pc, opcode_byte));
            pc += 1;
            continue;
        };

        output.push_str(&format!("{:04x}: {}", pc, opcode.name()));
        pc += 1;

        let immediate = opcode.arg_bytes();
        if pc + immediate > code.len() {
            output.push_str(" <truncated>\n");
            break;
        }
        let operand = &code[pc..pc + immediate];
        pc += immediate;

        match opcode {
            OpCode::Push => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(operand);
                output.push_str(&format!(" {}", u64::from_be_bytes(buf)));
            }
            OpCode::PushBytes => {
                let len = u16::from_be_bytes([operand[0], operand[1]]) as usize;
                let end = (pc + len).min(code.len());
                output.push_str(&format!(" 0x{}", hex::encode(&code[pc..end])));
                pc = end;
            }
            OpCode::Jump | OpCode::JumpIf => {
                let addr = u32::from_be_bytes([operand[0], operand[1], operand[2], operand[3]]);
                output.push_str(&format!(" 0x{:04x}", addr));
            }
            OpCode::Arg => {
                output.push_str(&format!(" {}", operand[0]));
            }
            _ => {}
        }

        output.push('\n');
    }

    output
}
