//! Session configuration.

use edmacro_debug::TracerConfig;
use edmacro_language::VmConfig;

/// Configuration of a [`MacroSession`](crate::MacroSession).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Limits of the VM.
    pub vm: VmConfig,
    /// Tracer settings.
    pub tracer: TracerConfig,
    /// Collect garbage whenever the last pending run finishes.
    pub gc_on_completion: bool,
    /// Register the built-in string and number routines.
    pub builtins: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vm: VmConfig::default(),
            tracer: TracerConfig::default(),
            gc_on_completion: false,
            builtins: true,
        }
    }
}

impl SessionConfig {
    /// Creates a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the VM limits.
    #[must_use]
    pub fn with_vm(mut self, vm: VmConfig) -> Self {
        self.vm = vm;
        self
    }

    /// Builder method to set the tracer settings.
    #[must_use]
    pub fn with_tracer(mut self, tracer: TracerConfig) -> Self {
        self.tracer = tracer;
        self
    }

    /// Builder method to collect after the last pending run.
    #[must_use]
    pub fn with_gc_on_completion(mut self, enabled: bool) -> Self {
        self.gc_on_completion = enabled;
        self
    }

    /// Builder method to leave out the built-in routines.
    #[must_use]
    pub fn without_builtins(mut self) -> Self {
        self.builtins = false;
        self
    }
}
