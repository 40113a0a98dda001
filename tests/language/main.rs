//! Integration tests for Layer 2: Language
//!
//! Tests for the symbol table, the program builder, and the VM.

mod builder;
mod symbols;
mod vm;
