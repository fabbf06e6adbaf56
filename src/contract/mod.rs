//! Contract execution engine
//!
//! A small stack-based virtual machine that runs the contracts of the
//! reference host.
//!
//! # Overview
//!
//! This module implements:
//! - A stack-based VM with gas metering
//! - An assembly-like compiler whose labels are the exported functions
//! - Opcodes that register async calls and group callbacks with the host
//!
//! # Example
//!
//! ```rust
//! use mini_vmhost::contract::{Compiler, ExecutionContext, VM};
//! use std::collections::BTreeMap;
//!
//! let module = Compiler::new().compile("
//!     :answer
//!     PUSH 42
//!     RETURN
//! ").unwrap();
//!
//! let context = ExecutionContext {
//!     function: "answer".to_string(),
//!     ..Default::default()
//! };
//! let result = VM::new(&module, BTreeMap::new(), context).execute().unwrap();
//! assert_eq!(result.return_data, vec![vec![42u8]]);
//! ```

pub mod compiler;
pub mod opcodes;
pub mod vm;

pub use compiler::{disassemble, Compiler, CompilerError};
pub use opcodes::OpCode;
pub use vm::{
    AsyncCallRequest, ExecutionContext, ExecutionResult, GroupCallbackRequest, Module, VmError,
    DEFAULT_GAS_LIMIT, VM,
};
