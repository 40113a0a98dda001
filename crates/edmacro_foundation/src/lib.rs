//! Core types, values, arenas and errors for the edmacro VM.
//!
//! This crate provides:
//! - [`Arena`] - Generational arena with a per-slot mark bit
//! - Typed handles ([`StrId`], [`ArrayId`], [`NodeId`], [`ProgramId`], [`SymbolId`])
//! - [`Value`] - The value type held on the stack, in symbols and in arrays
//! - [`Error`] - Error type with the user-visible message and context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod arena;
pub mod error;
pub mod value;

pub use arena::{Arena, ArrayId, NodeId, ProgramId, RawHandle, StrId, SymbolId};
pub use error::{Error, ErrorContext, ErrorKind};
pub use value::{CodeAddress, Cursor, Value, WindowId, string_to_number};

/// Result type for macro VM operations.
pub type Result<T> = std::result::Result<T, Error>;
