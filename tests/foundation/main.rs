//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: arenas and handles, Value, Error.

mod arena;
mod errors;
mod values;
