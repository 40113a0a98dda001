//! Heap storage for the edmacro VM.
//!
//! This crate provides:
//! - [`StringArena`] - Arena of macro strings
//! - [`ArrayStore`] - Sparse associative arrays as red-black trees with tombstoned deletes
//! - [`Heap`] - Strings and arrays together, with coercions and set combination
//! - [`GcStats`] - Result of a mark-and-sweep collection ([`Heap::collect`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod array;
pub mod gc;
pub mod heap;
pub mod strings;

pub use array::{ArrayNode, ArrayStore};
pub use gc::GcStats;
pub use heap::{ARRAY_DIM_SEP, Heap};
pub use strings::StringArena;
