//! Integration tests for Layer 1: Storage
//!
//! Tests for the heap: sparse arrays, set combination, and collection.

mod arrays;
mod collection;
