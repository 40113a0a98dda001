//! Symbol table, program builder, and bytecode VM for edmacro macros.
//!
//! This crate provides:
//! - [`SymbolTable`] - Name to value bindings of every kind
//! - [`ProgramBuilder`] - Accumulates instruction cells for a compiler
//! - [`Vm`] - Stack-based interpreter with suspendable continuations
//! - [`listing`] - Disassembly of programs and suspended stacks

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod listing;
pub mod opcode;
pub mod program;
pub mod symbol;
pub mod vm;

pub use config::VmConfig;
pub use opcode::{Inst, Opcode, Operand};
pub use program::{Program, ProgramBuilder};
pub use symbol::{ArgSlot, Promotion, Symbol, SymbolKind, SymbolTable};
pub use vm::{ActionFn, Continuation, ExecStatus, NativeCall, NativeFn, PropertyFn, Vm};
