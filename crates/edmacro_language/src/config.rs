//! Configuration for the macro VM.

/// Limits and scheduling knobs for a [`Vm`](crate::Vm).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of values on one continuation's stack.
    pub stack_size: usize,

    /// Maximum number of cells in one program.
    pub program_size: usize,

    /// Maximum number of pending break/continue markers (sentinels included).
    pub loop_stack_size: usize,

    /// Instructions executed per slice before a time limit suspends the macro.
    pub instruction_limit: usize,

    /// Whether slices are bounded at all (false = run to completion).
    pub preemption: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_size: 1024,
            program_size: 4096,
            loop_stack_size: 200,
            instruction_limit: 100,
            preemption: true,
        }
    }
}

impl VmConfig {
    /// Creates a configuration that never suspends on a time limit.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            preemption: false,
            ..Self::default()
        }
    }

    /// Builder method to set the stack size.
    #[must_use]
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Builder method to set the program size.
    #[must_use]
    pub fn with_program_size(mut self, size: usize) -> Self {
        self.program_size = size;
        self
    }

    /// Builder method to set the loop stack size.
    #[must_use]
    pub fn with_loop_stack_size(mut self, size: usize) -> Self {
        self.loop_stack_size = size;
        self
    }

    /// Builder method to set the per-slice instruction limit.
    #[must_use]
    pub fn with_instruction_limit(mut self, limit: usize) -> Self {
        self.instruction_limit = limit;
        self
    }

    /// Builder method to enable or disable time-limit preemption.
    #[must_use]
    pub fn with_preemption(mut self, preemption: bool) -> Self {
        self.preemption = preemption;
        self
    }

    /// The slice length, or `None` when slices are unbounded.
    #[must_use]
    pub fn slice_limit(&self) -> Option<usize> {
        self.preemption.then_some(self.instruction_limit.max(1))
    }
}
