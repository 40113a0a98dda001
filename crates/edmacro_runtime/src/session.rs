//! Macro sessions.
//!
//! A [`MacroSession`] starts macros and keeps the runs that did not finish
//! in their first slice. Runs stopped by the time limit are advanced by
//! [`MacroSession::pump`]; runs suspended by a host routine wait for
//! [`MacroSession::resume`]. Collections requested while any run is pending
//! are deferred until the last one finishes.
//!
//! Results handed to the host stay alive through the next collection the
//! session runs. A host that needs a string or array result for longer
//! should store it in a global.

use std::collections::VecDeque;
use std::fmt;

use edmacro_debug::Tracer;
use edmacro_foundation::{Error, ProgramId, Result, Value, WindowId};
use edmacro_language::{Continuation, ExecStatus, Vm};
use edmacro_storage::GcStats;

use crate::config::SessionConfig;

// =============================================================================
// Run identifiers and states
// =============================================================================

/// Identifies one macro run within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    /// Returns the raw run number. Numbers start at 1.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}", self.0)
    }
}

/// Why a pending run is not executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Stopped by the time limit; the next [`MacroSession::pump`] continues it.
    TimeSliced,
    /// Suspended by a host routine until [`MacroSession::resume`].
    Waiting,
}

/// Result of advancing a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// The run finished, possibly with a value.
    Done(Option<Value>),
    /// The run is pending and will be continued by the scheduler.
    TimeSliced,
    /// The run is pending until the host resumes it.
    Waiting,
}

impl RunStatus {
    /// Returns true if the run finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

struct PendingRun {
    id: RunId,
    cont: Continuation,
    state: RunState,
    slices: u64,
}

// =============================================================================
// Session
// =============================================================================

/// A VM together with its pending runs and their trace.
pub struct MacroSession {
    vm: Vm,
    tracer: Tracer,
    config: SessionConfig,
    pending: VecDeque<PendingRun>,
    next_run: u64,
    gc_wanted: bool,
    /// Results returned since the last collection.
    delivered: Vec<Value>,
}

impl MacroSession {
    /// Creates a session.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let mut vm = Vm::with_config(config.vm.clone());
        if config.builtins {
            edmacro_stdlib::register_all(&mut vm);
        }
        Self {
            vm,
            tracer: Tracer::new(config.tracer.clone()),
            config,
            pending: VecDeque::new(),
            next_run: 1,
            gc_wanted: false,
            delivered: Vec::new(),
        }
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the VM.
    #[must_use]
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Returns the VM, for defining routines and building programs.
    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    /// Returns the tracer.
    #[must_use]
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Returns the tracer, for changing its settings.
    pub fn tracer_mut(&mut self) -> &mut Tracer {
        &mut self.tracer
    }

    /// Number of runs that have not finished.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending runs in scheduling order.
    #[must_use]
    pub fn pending_runs(&self) -> Vec<RunId> {
        self.pending.iter().map(|run| run.id).collect()
    }

    /// State of a pending run, or `None` once it has finished.
    #[must_use]
    pub fn state(&self, run: RunId) -> Option<RunState> {
        self.pending
            .iter()
            .find(|pending| pending.id == run)
            .map(|pending| pending.state)
    }

    /// Frame-annotated dump of a pending run's stack.
    ///
    /// # Errors
    ///
    /// Returns a stale handle error if the run is not pending.
    pub fn stack_dump(&self, run: RunId) -> Result<String> {
        self.pending
            .iter()
            .find(|pending| pending.id == run)
            .map(|pending| self.vm.stack_dump(&pending.cont))
            .ok_or_else(|| Error::stale("run"))
    }

    // -------------------------------------------------------------------------
    // Running
    // -------------------------------------------------------------------------

    /// Starts `program` from `window` and runs its first slice.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the run. The run is traced as failed
    /// and is not pending afterwards.
    pub fn start(
        &mut self,
        program: ProgramId,
        window: WindowId,
        args: &[Value],
    ) -> Result<(RunId, RunStatus)> {
        let id = RunId(self.next_run);
        self.next_run += 1;

        if self.tracer.is_enabled() {
            let routine = self.vm.symbols().routine_name(program);
            self.tracer
                .macro_started(id.raw(), routine.as_deref(), window.0);
        }

        let result = self.vm.execute_macro(program, window, args);
        let status = self.settle(id, 0, result)?;
        Ok((id, status))
    }

    /// Gives every time-sliced run one slice, in the order they were queued.
    ///
    /// Waiting runs are skipped. Returns what happened to each run that ran.
    pub fn pump(&mut self) -> Vec<(RunId, Result<RunStatus>)> {
        let mut reports = Vec::new();
        for _ in 0..self.pending.len() {
            let Some(run) = self.pending.pop_front() else {
                break;
            };
            if run.state == RunState::Waiting {
                self.pending.push_back(run);
                continue;
            }
            let result = self.vm.continue_macro(run.cont);
            reports.push((run.id, self.settle(run.id, run.slices, result)));
        }
        reports
    }

    /// Pumps until no run is time-sliced. Waiting runs stay pending.
    pub fn pump_until_idle(&mut self) -> Vec<(RunId, Result<RunStatus>)> {
        let mut reports = Vec::new();
        while self
            .pending
            .iter()
            .any(|run| run.state == RunState::TimeSliced)
        {
            reports.extend(self.pump());
        }
        reports
    }

    /// Continues a pending run for one slice.
    ///
    /// When `value` is given and the suspending call site wanted a result,
    /// `value` replaces the result the host routine returned.
    ///
    /// # Errors
    ///
    /// Returns a stale handle error if the run is not pending, or the error
    /// that aborted the run.
    pub fn resume(&mut self, run: RunId, value: Option<Value>) -> Result<RunStatus> {
        let mut pending = self.take(run)?;
        let injected = match value {
            Some(value) => self.vm.modify_suspended_return_value(&mut pending.cont, value),
            None => false,
        };
        self.tracer.resumed(run.raw(), injected);

        let result = self.vm.continue_macro(pending.cont);
        self.settle(run, pending.slices, result)
    }

    /// Cancels a pending run. Side effects it already made are kept.
    ///
    /// # Errors
    ///
    /// Returns a stale handle error if the run is not pending.
    pub fn abandon(&mut self, run: RunId) -> Result<()> {
        let pending = self.take(run)?;
        self.vm.free_continuation(pending.cont);
        self.tracer.abandoned(run.raw());
        self.after_run()
    }

    /// Cancels every pending run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the completion collection fails.
    pub fn abandon_all(&mut self) -> Result<()> {
        while let Some(pending) = self.pending.pop_front() {
            self.vm.free_continuation(pending.cont);
            self.tracer.abandoned(pending.id.raw());
        }
        self.after_run()
    }

    // -------------------------------------------------------------------------
    // Collection
    // -------------------------------------------------------------------------

    /// Collects garbage if no run is pending.
    ///
    /// Otherwise the collection is deferred until the last pending run
    /// finishes and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns `CollectorBusy` if called from inside a host routine.
    pub fn safe_gc(&mut self) -> Result<Option<GcStats>> {
        if self.pending.is_empty() {
            return self.collect().map(Some);
        }
        self.gc_wanted = true;
        self.tracer.gc_deferred(self.pending.len());
        Ok(None)
    }

    /// Collects garbage now, keeping everything pending runs can reach.
    ///
    /// # Errors
    ///
    /// Returns `CollectorBusy` if called from inside a host routine.
    pub fn collect_with_pending_roots(&mut self) -> Result<GcStats> {
        let stats = self.vm.collect_garbage_keeping(
            self.pending.iter().map(|run| &run.cont),
            &self.delivered,
        )?;
        self.delivered.clear();
        self.tracer.garbage_collected(stats);
        Ok(stats)
    }

    /// Returns true if a deferred collection is waiting for the last run.
    #[must_use]
    pub fn gc_deferred(&self) -> bool {
        self.gc_wanted
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn take(&mut self, run: RunId) -> Result<PendingRun> {
        let index = self
            .pending
            .iter()
            .position(|pending| pending.id == run)
            .ok_or_else(|| Error::stale("run"))?;
        self.pending
            .remove(index)
            .ok_or_else(|| Error::stale("run"))
    }

    /// Records the outcome of a slice and queues the run if it is suspended.
    fn settle(&mut self, id: RunId, slices: u64, result: Result<ExecStatus>) -> Result<RunStatus> {
        match result {
            Ok(ExecStatus::Done(value)) => {
                self.tracer.macro_completed(id.raw(), value.is_some());
                if let Some(value @ (Value::Str(_) | Value::Array(_))) = value {
                    self.delivered.push(value);
                }
                self.after_run()?;
                Ok(RunStatus::Done(value))
            }
            Ok(ExecStatus::TimeLimit(cont)) => {
                let slices = slices + 1;
                self.tracer.slice_expired(id.raw(), slices);
                self.pending.push_back(PendingRun {
                    id,
                    cont,
                    state: RunState::TimeSliced,
                    slices,
                });
                Ok(RunStatus::TimeSliced)
            }
            Ok(ExecStatus::Preempt(cont)) => {
                self.tracer.preempted(id.raw());
                self.pending.push_back(PendingRun {
                    id,
                    cont,
                    state: RunState::Waiting,
                    slices,
                });
                Ok(RunStatus::Waiting)
            }
            Err(err) => {
                self.tracer.macro_failed(id.raw(), &err);
                self.after_run()?;
                Err(err)
            }
        }
    }

    /// Runs the deferred or configured collection once nothing is pending.
    fn after_run(&mut self) -> Result<()> {
        if self.pending.is_empty()
            && (self.gc_wanted || self.config.gc_on_completion)
            && !self.vm.is_running()
        {
            self.collect()?;
        }
        Ok(())
    }

    /// Collects with no run pending. Results already handed out are kept.
    fn collect(&mut self) -> Result<GcStats> {
        let stats = self
            .vm
            .collect_garbage_keeping(std::iter::empty(), &self.delivered)?;
        self.delivered.clear();
        self.gc_wanted = false;
        self.tracer.garbage_collected(stats);
        Ok(stats)
    }
}

impl Default for MacroSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
