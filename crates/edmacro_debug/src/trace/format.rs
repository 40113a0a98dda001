//! Trace output formatters.
//!
//! Provides human-readable and JSON formatters for trace records.

use std::fmt::Write;

use super::record::{TraceEvent, TraceRecord};

// =============================================================================
// Trace Formatter Trait
// =============================================================================

/// Trait for formatting trace records.
pub trait TraceFormatter {
    /// Formats a single trace record to a string.
    fn format(&self, record: &TraceRecord) -> String;

    /// Formats multiple records.
    fn format_many(&self, records: &[&TraceRecord]) -> String {
        records
            .iter()
            .map(|r| self.format(r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// Human-Readable Formatter
// =============================================================================

/// Formats trace records in human-readable form.
#[derive(Clone, Debug, Default)]
pub struct HumanFormatter {
    /// Whether to include timestamps.
    pub show_timestamps: bool,
    /// Whether to include record IDs.
    pub show_ids: bool,
}

impl HumanFormatter {
    /// Creates a new human formatter with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to show timestamps.
    #[must_use]
    pub fn with_timestamps(mut self) -> Self {
        self.show_timestamps = true;
        self
    }

    /// Builder method to show record IDs.
    #[must_use]
    pub fn with_ids(mut self) -> Self {
        self.show_ids = true;
        self
    }

    /// Formats timestamp in microseconds.
    #[allow(clippy::cast_precision_loss)]
    fn format_timestamp(ns: u64) -> String {
        let us = ns / 1000;
        if us >= 1_000_000 {
            format!("{:.3}s", us as f64 / 1_000_000.0)
        } else if us >= 1000 {
            format!("{:.3}ms", us as f64 / 1000.0)
        } else {
            format!("{us}us")
        }
    }
}

impl TraceFormatter for HumanFormatter {
    fn format(&self, record: &TraceRecord) -> String {
        let mut prefix = String::new();

        if self.show_ids {
            let _ = write!(prefix, "[{:06}] ", record.id);
        }

        let _ = write!(prefix, "R{:04} ", record.run);

        if self.show_timestamps {
            let _ = write!(
                prefix,
                "{:>10} ",
                Self::format_timestamp(record.timestamp_ns)
            );
        }

        let event_str = match &record.event {
            TraceEvent::MacroStarted { routine, window } => {
                let name = routine.as_deref().unwrap_or("<anonymous>");
                format!("START {name} (window {window})")
            }
            TraceEvent::SliceExpired { slices } => format!("  .. time slice {slices} expired"),
            TraceEvent::Preempted => "  || preempted".to_string(),
            TraceEvent::Resumed { injected } => {
                if *injected {
                    "  >> resumed with injected value".to_string()
                } else {
                    "  >> resumed".to_string()
                }
            }
            TraceEvent::MacroCompleted { has_result } => {
                let result = if *has_result { "value" } else { "no value" };
                format!("DONE ({result})")
            }
            TraceEvent::MacroFailed {
                message,
                routine,
                offset,
            } => {
                let mut line = format!("FAILED: {message}");
                if let Some(routine) = routine {
                    let _ = write!(line, " in {routine}");
                }
                if let Some(offset) = offset {
                    let _ = write!(line, " at {offset}");
                }
                line
            }
            TraceEvent::ContinuationAbandoned => "CANCELLED".to_string(),
            TraceEvent::GarbageCollected {
                strings,
                arrays,
                nodes,
            } => format!("GC freed {strings} strings, {arrays} arrays, {nodes} nodes"),
            TraceEvent::GcDeferred { pending } => {
                format!("GC deferred ({pending} pending)")
            }
            TraceEvent::Custom { name, data } => format!("  CUSTOM {name}: {data}"),
        };

        format!("{prefix}{event_str}")
    }
}

// =============================================================================
// JSON Formatter
// =============================================================================

/// Formats trace records as JSON.
#[derive(Clone, Debug, Default)]
pub struct JsonFormatter {
    /// Whether to pretty-print lists of records.
    pub pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method for pretty printing.
    #[must_use]
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Escapes a string for JSON.
    fn escape_string(s: &str) -> String {
        s.replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    fn optional_string(s: Option<&str>) -> String {
        s.map_or_else(
            || "null".to_string(),
            |s| format!("\"{}\"", Self::escape_string(s)),
        )
    }
}

impl TraceFormatter for JsonFormatter {
    fn format(&self, record: &TraceRecord) -> String {
        let event_data = match &record.event {
            TraceEvent::MacroStarted { routine, window } => format!(
                ",\"routine\":{},\"window\":{window}",
                Self::optional_string(routine.as_deref())
            ),
            TraceEvent::SliceExpired { slices } => format!(",\"slices\":{slices}"),
            TraceEvent::Preempted | TraceEvent::ContinuationAbandoned => String::new(),
            TraceEvent::Resumed { injected } => format!(",\"injected\":{injected}"),
            TraceEvent::MacroCompleted { has_result } => {
                format!(",\"has_result\":{has_result}")
            }
            TraceEvent::MacroFailed {
                message,
                routine,
                offset,
            } => format!(
                ",\"message\":\"{}\",\"routine\":{},\"offset\":{}",
                Self::escape_string(message),
                Self::optional_string(routine.as_deref()),
                offset.map_or_else(|| "null".to_string(), |o| o.to_string())
            ),
            TraceEvent::GarbageCollected {
                strings,
                arrays,
                nodes,
            } => format!(",\"strings\":{strings},\"arrays\":{arrays},\"nodes\":{nodes}"),
            TraceEvent::GcDeferred { pending } => format!(",\"pending\":{pending}"),
            TraceEvent::Custom { name, data } => format!(
                ",\"name\":\"{}\",\"data\":\"{}\"",
                Self::escape_string(name),
                Self::escape_string(data)
            ),
        };

        format!(
            "{{\"id\":{},\"run\":{},\"timestamp_ns\":{},\"type\":\"{}\"{}}}",
            record.id,
            record.run,
            record.timestamp_ns,
            record.event_type(),
            event_data
        )
    }

    fn format_many(&self, records: &[&TraceRecord]) -> String {
        let items: Vec<_> = records.iter().map(|r| self.format(r)).collect();
        if self.pretty {
            format!("[\n  {}\n]", items.join(",\n  "))
        } else {
            format!("[{}]", items.join(","))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
