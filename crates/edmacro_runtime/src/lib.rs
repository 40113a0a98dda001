//! Host session for edmacro.
//!
//! This crate provides:
//! - [`MacroSession`] - Starts macros and schedules their suspended runs
//! - [`SessionConfig`] - VM limits, tracing, and collection policy
//!
//! A session owns the [`Vm`](edmacro_language::Vm) and a
//! [`Tracer`](edmacro_debug::Tracer). Every state change of every run is
//! traced, and collections are postponed while runs are pending.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod session;

pub use config::SessionConfig;
pub use session::{MacroSession, RunId, RunState, RunStatus};
