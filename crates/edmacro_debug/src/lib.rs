//! Tracing of macro runs for the edmacro VM.
//!
//! This crate provides:
//! - [`Tracer`] - Records what happens to every macro run
//! - [`TraceBuffer`] - Ring buffer of [`TraceRecord`]s
//! - [`HumanFormatter`] / [`JsonFormatter`] - Output formats

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod trace;

pub use trace::{
    HumanFormatter, JsonFormatter, TraceBuffer, TraceBufferStats, TraceEvent, TraceFormatter,
    TraceOutput, TraceRecord, Tracer, TracerConfig,
};
