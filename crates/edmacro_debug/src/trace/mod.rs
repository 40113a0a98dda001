//! Tracing of macro runs.
//!
//! The host session reports every state change of every run to a [`Tracer`].
//! Records go to a ring buffer and, optionally, to stderr. A disabled tracer
//! costs one branch per event.

pub mod buffer;
pub mod format;
pub mod record;

pub use buffer::{TraceBuffer, TraceBufferStats};
pub use format::{HumanFormatter, JsonFormatter, TraceFormatter};
pub use record::{TraceEvent, TraceRecord};

use std::io::{self, Write};
use std::time::Instant;

use edmacro_foundation::Error;
use edmacro_storage::GcStats;

/// Run number used for events that belong to no particular run.
pub const SESSION_RUN: u64 = 0;

// =============================================================================
// Trace Output
// =============================================================================

/// Where trace output should be sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TraceOutput {
    /// No output (traces still recorded in buffer).
    #[default]
    None,
    /// Write each record to stderr as it is recorded.
    Stderr,
}

// =============================================================================
// Tracer Configuration
// =============================================================================

/// Configuration for the tracer.
#[derive(Clone, Debug)]
pub struct TracerConfig {
    /// Whether tracing is enabled.
    pub enabled: bool,
    /// Maximum records to keep in buffer.
    pub buffer_size: usize,
    /// Where to output traces.
    pub output: TraceOutput,
    /// Whether to use JSON format.
    pub json_format: bool,
    /// Event types to keep (empty = all).
    pub event_filter: Vec<String>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_size: 10000,
            output: TraceOutput::None,
            json_format: false,
            event_filter: Vec::new(),
        }
    }
}

impl TracerConfig {
    /// Creates a new tracer configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to enable tracing.
    #[must_use]
    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Builder method to set buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Builder method to output to stderr.
    #[must_use]
    pub fn to_stderr(mut self) -> Self {
        self.output = TraceOutput::Stderr;
        self
    }

    /// Builder method to use JSON format.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json_format = true;
        self
    }

    /// Builder method to filter event types.
    #[must_use]
    pub fn filter_events(mut self, types: Vec<String>) -> Self {
        self.event_filter = types;
        self
    }
}

// =============================================================================
// Tracer
// =============================================================================

/// Records what happens to macro runs.
pub struct Tracer {
    config: TracerConfig,
    buffer: TraceBuffer,
    start_time: Instant,
    human_formatter: HumanFormatter,
    json_formatter: JsonFormatter,
}

impl Tracer {
    /// Creates a new tracer with the given configuration.
    #[must_use]
    pub fn new(config: TracerConfig) -> Self {
        let buffer_size = config.buffer_size;
        Self {
            config,
            buffer: TraceBuffer::new(buffer_size),
            start_time: Instant::now(),
            human_formatter: HumanFormatter::new().with_timestamps(),
            json_formatter: JsonFormatter::new(),
        }
    }

    /// Creates a tracer with default configuration (disabled).
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(TracerConfig::default())
    }

    /// Creates an enabled tracer that outputs to stderr.
    #[must_use]
    pub fn to_stderr() -> Self {
        Self::new(TracerConfig::new().enabled().to_stderr())
    }

    /// Returns whether tracing is enabled.
    #[must_use]
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Enables tracing.
    pub fn enable(&mut self) {
        self.config.enabled = true;
    }

    /// Disables tracing.
    pub fn disable(&mut self) {
        self.config.enabled = false;
    }

    /// Sets whether to use JSON output format.
    pub fn set_json_format(&mut self, json: bool) {
        self.config.json_format = json;
    }

    /// Sets the trace output destination.
    pub fn set_output(&mut self, output: TraceOutput) {
        self.config.output = output;
    }

    /// Records an event of `run`.
    #[inline]
    pub fn record(&mut self, run: u64, event: TraceEvent) {
        if !self.config.enabled {
            return;
        }
        self.record_internal(run, event);
    }

    fn record_internal(&mut self, run: u64, event: TraceEvent) {
        if !self.config.event_filter.is_empty()
            && !self
                .config
                .event_filter
                .iter()
                .any(|kind| kind == event.event_type())
        {
            return;
        }

        #[allow(clippy::cast_possible_truncation)]
        let timestamp_ns = self.start_time.elapsed().as_nanos() as u64;
        self.buffer.push(run, timestamp_ns, event);

        if self.config.output == TraceOutput::Stderr {
            if let Some(record) = self.buffer.last() {
                let line = self.format_record(record);
                let _ = writeln!(io::stderr(), "{line}");
            }
        }
    }

    /// Formats a record using the current format settings.
    #[must_use]
    pub fn format_record(&self, record: &TraceRecord) -> String {
        if self.config.json_format {
            self.json_formatter.format(record)
        } else {
            self.human_formatter.format(record)
        }
    }

    /// Formats multiple records.
    #[must_use]
    pub fn format_records(&self, records: &[&TraceRecord]) -> String {
        if self.config.json_format {
            self.json_formatter.format_many(records)
        } else {
            self.human_formatter.format_many(records)
        }
    }

    /// Returns the trace buffer.
    #[must_use]
    pub fn buffer(&self) -> &TraceBuffer {
        &self.buffer
    }

    /// Clears the trace buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Returns buffer statistics.
    #[must_use]
    pub fn stats(&self) -> TraceBufferStats {
        self.buffer.stats()
    }

    // -------------------------------------------------------------------------
    // Convenience methods for common events
    // -------------------------------------------------------------------------

    /// Records the start of a run.
    #[inline]
    pub fn macro_started(&mut self, run: u64, routine: Option<&str>, window: u64) {
        if self.is_enabled() {
            let routine = routine.map(str::to_string);
            self.record(run, TraceEvent::MacroStarted { routine, window });
        }
    }

    /// Records an expired time slice.
    #[inline]
    pub fn slice_expired(&mut self, run: u64, slices: u64) {
        self.record(run, TraceEvent::SliceExpired { slices });
    }

    /// Records a suspension requested by a host routine.
    #[inline]
    pub fn preempted(&mut self, run: u64) {
        self.record(run, TraceEvent::Preempted);
    }

    /// Records a resumption.
    #[inline]
    pub fn resumed(&mut self, run: u64, injected: bool) {
        self.record(run, TraceEvent::Resumed { injected });
    }

    /// Records a finished run.
    #[inline]
    pub fn macro_completed(&mut self, run: u64, has_result: bool) {
        self.record(run, TraceEvent::MacroCompleted { has_result });
    }

    /// Records a failed run.
    #[inline]
    pub fn macro_failed(&mut self, run: u64, error: &Error) {
        if self.is_enabled() {
            self.record(run, TraceEvent::failed(error));
        }
    }

    /// Records a cancelled run.
    #[inline]
    pub fn abandoned(&mut self, run: u64) {
        self.record(run, TraceEvent::ContinuationAbandoned);
    }

    /// Records a collection.
    #[inline]
    pub fn garbage_collected(&mut self, stats: GcStats) {
        self.record(SESSION_RUN, stats.into());
    }

    /// Records a postponed collection.
    #[inline]
    pub fn gc_deferred(&mut self, pending: usize) {
        self.record(SESSION_RUN, TraceEvent::GcDeferred { pending });
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::disabled()
    }
}

// =============================================================================
// Tests
// =============================================================================
