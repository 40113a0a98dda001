//! Trace event and record types.
//!
//! Events describe state changes of macro runs as seen by the host: a run
//! starts, is suspended, resumes, and eventually completes, fails, or is
//! abandoned. Collections are traced as well.

use edmacro_foundation::Error;
use edmacro_storage::GcStats;

// =============================================================================
// Trace Event
// =============================================================================

/// Events that can be traced while macros run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    /// A macro run has started.
    MacroStarted {
        /// Routine name, if the program is bound to one.
        routine: Option<String>,
        /// Window the run was started from.
        window: u64,
    },

    /// A slice used up its instruction quota.
    SliceExpired {
        /// Number of slices the run has executed so far.
        slices: u64,
    },

    /// A host routine suspended the run.
    Preempted,

    /// A suspended run was resumed.
    Resumed {
        /// Whether the host replaced the pending return value.
        injected: bool,
    },

    /// A macro run has finished.
    MacroCompleted {
        /// Whether it returned a value.
        has_result: bool,
    },

    /// A macro run was aborted by an error.
    MacroFailed {
        /// The user-visible message.
        message: String,
        /// Routine that was executing, if known.
        routine: Option<String>,
        /// Offset of the failing instruction, if known.
        offset: Option<usize>,
    },

    /// The host cancelled a suspended run.
    ContinuationAbandoned,

    /// A collection freed heap objects.
    GarbageCollected {
        /// Strings freed.
        strings: usize,
        /// Arrays freed.
        arrays: usize,
        /// Array nodes freed.
        nodes: usize,
    },

    /// A collection was postponed because runs are still pending.
    GcDeferred {
        /// Number of pending runs.
        pending: usize,
    },

    /// Host-defined event.
    Custom {
        /// Event name.
        name: String,
        /// Event data.
        data: String,
    },
}

impl TraceEvent {
    /// Returns a short name for the event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MacroStarted { .. } => "macro-started",
            Self::SliceExpired { .. } => "slice-expired",
            Self::Preempted => "preempted",
            Self::Resumed { .. } => "resumed",
            Self::MacroCompleted { .. } => "macro-completed",
            Self::MacroFailed { .. } => "macro-failed",
            Self::ContinuationAbandoned => "continuation-abandoned",
            Self::GarbageCollected { .. } => "garbage-collected",
            Self::GcDeferred { .. } => "gc-deferred",
            Self::Custom { .. } => "custom",
        }
    }

    /// Returns true if the event ends a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::MacroCompleted { .. } | Self::MacroFailed { .. } | Self::ContinuationAbandoned
        )
    }

    /// Returns true if the event leaves a run suspended.
    #[must_use]
    pub fn is_suspension(&self) -> bool {
        matches!(self, Self::SliceExpired { .. } | Self::Preempted)
    }

    /// Describes a failed run.
    #[must_use]
    pub fn failed(error: &Error) -> Self {
        let context = error.context.as_ref();
        Self::MacroFailed {
            message: error.to_string(),
            routine: context.and_then(|c| c.routine.clone()),
            offset: context.and_then(|c| c.offset),
        }
    }
}

impl From<GcStats> for TraceEvent {
    fn from(stats: GcStats) -> Self {
        Self::GarbageCollected {
            strings: stats.strings,
            arrays: stats.arrays,
            nodes: stats.nodes,
        }
    }
}

// =============================================================================
// Trace Record
// =============================================================================

/// A timestamped trace record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    /// Unique record ID within the session.
    pub id: u64,
    /// Run the event belongs to (0 for session-wide events).
    pub run: u64,
    /// Timestamp in nanoseconds since the tracer was created.
    pub timestamp_ns: u64,
    /// The trace event.
    pub event: TraceEvent,
}

impl TraceRecord {
    /// Creates a new trace record.
    #[must_use]
    pub fn new(id: u64, run: u64, timestamp_ns: u64, event: TraceEvent) -> Self {
        Self {
            id,
            run,
            timestamp_ns,
            event,
        }
    }

    /// Returns the event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use edmacro_foundation::{ErrorContext, ErrorKind};

    #[test]
    fn event_type_names() {
        assert_eq!(TraceEvent::Preempted.event_type(), "preempted");
        assert_eq!(
            TraceEvent::SliceExpired { slices: 1 }.event_type(),
            "slice-expired"
        );
        assert_eq!(
            TraceEvent::GcDeferred { pending: 2 }.event_type(),
            "gc-deferred"
        );
    }

    #[test]
    fn event_categories() {
        assert!(TraceEvent::ContinuationAbandoned.is_terminal());
        assert!(TraceEvent::MacroCompleted { has_result: false }.is_terminal());
        assert!(!TraceEvent::Preempted.is_terminal());
        assert!(TraceEvent::Preempted.is_suspension());
        assert!(!TraceEvent::Resumed { injected: true }.is_suspension());
    }

    #[test]
    fn failure_carries_context() {
        let error = edmacro_foundation::Error::new(ErrorKind::DivisionByZero)
            .with_context(ErrorContext::new().with_routine("calc").with_offset(6));
        let event = TraceEvent::failed(&error);
        assert_eq!(
            event,
            TraceEvent::MacroFailed {
                message: "division by zero".to_string(),
                routine: Some("calc".to_string()),
                offset: Some(6),
            }
        );
    }

    #[test]
    fn gc_stats_convert() {
        let stats = GcStats {
            strings: 3,
            arrays: 1,
            nodes: 7,
        };
        assert_eq!(
            TraceEvent::from(stats),
            TraceEvent::GarbageCollected {
                strings: 3,
                arrays: 1,
                nodes: 7
            }
        );
    }

    #[test]
    fn trace_record_creation() {
        let record = TraceRecord::new(1, 5, 1_000_000, TraceEvent::Preempted);

        assert_eq!(record.id, 1);
        assert_eq!(record.run, 5);
        assert_eq!(record.timestamp_ns, 1_000_000);
        assert_eq!(record.event_type(), "preempted");
    }
}
