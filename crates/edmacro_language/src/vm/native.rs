//! Host routines and the view of the VM they are given.

use std::rc::Rc;

use edmacro_foundation::{ProgramId, Result, Value, WindowId};
use edmacro_storage::Heap;

use super::Vm;
use super::context::{Continuation, ExecStatus};

/// A host routine callable from macros. Returning [`Value::NoValue`] means
/// the routine produced no value.
pub type NativeFn = Rc<dyn Fn(&mut NativeCall<'_>, &[Value]) -> Result<Value>>;

/// A host action: arguments arrive as strings and nothing is returned.
pub type ActionFn = Rc<dyn Fn(&mut NativeCall<'_>, &[String]) -> Result<()>>;

/// Getter of a computed property such as `$cursor`.
pub type PropertyFn = Rc<dyn Fn(&mut NativeCall<'_>) -> Result<Value>>;

/// What a host routine sees while it runs: the VM and the run that called it.
pub struct NativeCall<'a> {
    vm: &'a mut Vm,
    ctx: &'a mut Continuation,
    name: &'a str,
}

impl<'a> NativeCall<'a> {
    pub(crate) fn new(vm: &'a mut Vm, ctx: &'a mut Continuation, name: &'a str) -> Self {
        Self { vm, ctx, name }
    }

    /// Name the routine was called by.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// The VM, for symbol access and nested macro runs.
    pub fn vm(&mut self) -> &mut Vm {
        self.vm
    }

    /// The macro heap.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        self.vm.heap()
    }

    /// The macro heap, for allocating results.
    pub fn heap_mut(&mut self) -> &mut Heap {
        self.vm.heap_mut()
    }

    /// Window the calling macro was started from.
    #[must_use]
    pub fn run_window(&self) -> WindowId {
        self.ctx.run_window()
    }

    /// Window the calling macro's commands act on.
    #[must_use]
    pub fn focus_window(&self) -> WindowId {
        self.ctx.focus_window()
    }

    /// Redirects the calling macro's commands to another window.
    pub fn set_focus_window(&mut self, window: WindowId) {
        self.ctx.set_focus_window(window);
    }

    /// Asks for the calling macro to be suspended once this routine returns.
    ///
    /// The host resumes it later, usually after injecting the real result
    /// with [`Vm::modify_suspended_return_value`].
    pub fn request_preemption(&mut self) {
        self.vm.request_preemption();
    }

    /// Runs `program` as a subroutine of the calling macro.
    ///
    /// The call frame is pushed on the caller's stack and execution moves to
    /// the program's first instruction once this routine returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the program has been freed or the stack is full.
    pub fn run_as_nested_call(&mut self, program: ProgramId) -> Result<()> {
        let locals = self.vm.program(program)?.locals().len();
        let entry = Vm::entry(program);
        let return_pc = self.ctx.pc;
        self.ctx.enter_frame(return_pc, 0, locals, entry)
    }

    /// Starts an independent macro run from inside this routine.
    ///
    /// # Errors
    ///
    /// Returns the nested run's error.
    pub fn execute_macro(&mut self, program: ProgramId, args: &[Value]) -> Result<ExecStatus> {
        let window = self.ctx.focus_window();
        self.vm.execute_macro(program, window, args)
    }

    // =========================================================================
    // Argument helpers
    // =========================================================================

    /// Coerces an argument to an integer.
    ///
    /// # Errors
    ///
    /// Fails for non-numeric strings and arrays.
    pub fn int(&self, value: Value) -> Result<i64> {
        self.vm.heap().value_to_int(value)
    }

    /// Coerces an argument to a string.
    ///
    /// # Errors
    ///
    /// Fails for arrays.
    pub fn string(&self, value: Value) -> Result<String> {
        self.vm.heap().value_to_string(value)
    }

    /// Moves a string into the heap as a value.
    pub fn string_value(&mut self, text: String) -> Value {
        self.vm.heap_mut().string_value(text)
    }
}
