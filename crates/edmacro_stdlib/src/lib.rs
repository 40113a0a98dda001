//! Built-in routines for edmacro macros.
//!
//! This crate provides host routines that only need the macro heap:
//! - String functions (`length`, `substring`, `toupper`, `tolower`)
//! - Number functions (`min`, `max`)
//!
//! [`register_all`] installs every one of them into a [`Vm`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod args;
pub mod number;
pub mod string;

use edmacro_language::Vm;

/// Installs every built-in routine.
pub fn register_all(vm: &mut Vm) {
    string::register(vm);
    number::register(vm);
}
