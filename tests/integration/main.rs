//! Cross-layer integration tests for edmacro
//!
//! Tests that verify correct interaction between multiple crates.

mod host_session;
mod tracing;
