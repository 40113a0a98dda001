//! Execution context of one macro run.
//!
//! A [`Continuation`] owns everything a suspended macro needs to resume: its
//! operand stack, frame pointer, program counter and window references. The
//! VM borrows it for the duration of a slice, so any number of runs can be
//! suspended at once and a native routine can start a nested run without
//! disturbing the one that called it.
//!
//! Stack layout of a call frame, from the bottom up:
//!
//! ```text
//! arg 1 .. arg n | return pc | saved frame | n | $args cache | local 0 .. local m
//!                  frame - 4   frame - 3     frame - 2         ^ frame
//! ```

use edmacro_foundation::{CodeAddress, Error, ErrorKind, Result, Value, WindowId};

/// Frame slot offsets below the frame pointer.
pub(crate) const RET_PC_OFFSET: usize = 4;
pub(crate) const OLD_FRAME_OFFSET: usize = 3;
pub(crate) const ARG_COUNT_OFFSET: usize = 2;
pub(crate) const ARG_ARRAY_OFFSET: usize = 1;

/// The saved state of a macro run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Continuation {
    pub(crate) stack: Vec<Value>,
    pub(crate) frame: usize,
    pub(crate) pc: Option<CodeAddress>,
    /// Start of the instruction being executed, for error reports.
    pub(crate) current: Option<CodeAddress>,
    limit: usize,
    run_window: WindowId,
    focus_window: WindowId,
}

impl Continuation {
    pub(crate) fn new(limit: usize, window: WindowId) -> Self {
        Self {
            stack: Vec::with_capacity(limit.min(256)),
            frame: 0,
            pc: None,
            current: None,
            limit,
            run_window: window,
            focus_window: window,
        }
    }

    /// The operand stack, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Index of the first local of the innermost frame.
    #[must_use]
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Address of the next instruction.
    #[must_use]
    pub fn pc(&self) -> Option<CodeAddress> {
        self.pc
    }

    /// Window the macro was started from.
    #[must_use]
    pub fn run_window(&self) -> WindowId {
        self.run_window
    }

    /// Window the macro's commands currently act on.
    #[must_use]
    pub fn focus_window(&self) -> WindowId {
        self.focus_window
    }

    /// Redirects the macro's commands to another window.
    pub fn set_focus_window(&mut self, window: WindowId) {
        self.focus_window = window;
    }

    // =========================================================================
    // Stack primitives
    // =========================================================================

    pub(crate) fn push(&mut self, value: Value) -> Result<()> {
        if self.stack.len() >= self.limit {
            return Err(Error::new(ErrorKind::StackOverflow));
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| Error::new(ErrorKind::StackUnderflow))
    }

    /// Pops the top `n` values, returned in push order.
    pub(crate) fn pop_n(&mut self, n: usize) -> Result<Vec<Value>> {
        let start = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or_else(|| Error::new(ErrorKind::StackUnderflow))?;
        Ok(self.stack.split_off(start))
    }

    /// Value `depth` slots below the top (0 = top).
    pub(crate) fn peek(&self, depth: usize) -> Result<Value> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map(|index| self.stack[index])
            .ok_or_else(|| Error::new(ErrorKind::StackUnderflow))
    }

    /// The top `n` values, in push order, left on the stack.
    pub(crate) fn top(&self, n: usize) -> Result<&[Value]> {
        let start = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or_else(|| Error::new(ErrorKind::StackUnderflow))?;
        Ok(&self.stack[start..])
    }

    pub(crate) fn replace_top(&mut self, value: Value) -> bool {
        match self.stack.last_mut() {
            Some(top) => {
                *top = value;
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Frame access
    // =========================================================================

    fn frame_index(&self, below: usize) -> Result<usize> {
        self.frame
            .checked_sub(below)
            .filter(|&index| index < self.stack.len())
            .ok_or_else(|| Error::internal("corrupt call frame"))
    }

    /// Bookkeeping value `below` slots under the frame pointer.
    pub(crate) fn frame_value(&self, below: usize) -> Result<Value> {
        Ok(self.stack[self.frame_index(below)?])
    }

    pub(crate) fn set_frame_value(&mut self, below: usize, value: Value) -> Result<()> {
        let index = self.frame_index(below)?;
        self.stack[index] = value;
        Ok(())
    }

    /// Argument count of the innermost frame.
    pub(crate) fn arg_count(&self) -> Result<usize> {
        match self.frame_value(ARG_COUNT_OFFSET)? {
            Value::Int(n) => usize::try_from(n).map_err(|_| Error::internal("corrupt call frame")),
            _ => Err(Error::internal("corrupt call frame")),
        }
    }

    /// Zero-based argument `n` of the innermost frame, if it was passed.
    pub(crate) fn argument(&self, n: usize) -> Result<Option<Value>> {
        let count = self.arg_count()?;
        if n >= count {
            return Ok(None);
        }
        let index = self.frame_index(RET_PC_OFFSET + count - n)?;
        Ok(Some(self.stack[index]))
    }

    pub(crate) fn local(&self, slot: usize) -> Result<Value> {
        self.stack
            .get(self.frame + slot)
            .copied()
            .ok_or_else(|| Error::internal(format!("local slot {slot} outside frame")))
    }

    pub(crate) fn set_local(&mut self, slot: usize, value: Value) -> Result<()> {
        let cell = self
            .stack
            .get_mut(self.frame + slot)
            .ok_or_else(|| Error::internal(format!("local slot {slot} outside frame")))?;
        *cell = value;
        Ok(())
    }

    /// Pushes a call frame: bookkeeping, then one unset slot per local.
    ///
    /// The `arg_count` arguments must already be on the stack. A `None`
    /// return address marks the outermost call.
    pub(crate) fn enter_frame(
        &mut self,
        return_pc: Option<CodeAddress>,
        arg_count: usize,
        locals: usize,
        entry: CodeAddress,
    ) -> Result<()> {
        let saved = return_pc.map(|_| self.frame);
        self.push(Value::Code(return_pc))?;
        self.push(Value::Frame(saved))?;
        self.push(Value::Int(i64::try_from(arg_count).unwrap_or(i64::MAX)))?;
        self.push(Value::NoValue)?;
        self.frame = self.stack.len();
        for _ in 0..locals {
            self.push(Value::NoValue)?;
        }
        self.pc = Some(entry);
        Ok(())
    }

    /// Pops the innermost frame and its arguments.
    ///
    /// Returns the return address saved by the caller; `None` means the
    /// outermost call has returned.
    pub(crate) fn leave_frame(&mut self) -> Result<Option<CodeAddress>> {
        let count = self.arg_count()?;
        let saved = match self.frame_value(OLD_FRAME_OFFSET)? {
            Value::Frame(saved) => saved,
            _ => return Err(Error::internal("corrupt call frame")),
        };
        let return_pc = match self.frame_value(RET_PC_OFFSET)? {
            Value::Code(pc) => pc,
            _ => return Err(Error::internal("corrupt call frame")),
        };
        let base = self.frame_index(RET_PC_OFFSET + count)?;
        self.stack.truncate(base);
        self.frame = saved.unwrap_or(0);
        self.pc = return_pc;
        Ok(return_pc)
    }

    /// Return addresses of the active frames, innermost first.
    pub(crate) fn return_addresses(&self) -> Vec<CodeAddress> {
        let mut addresses = Vec::new();
        let mut frame = self.frame;
        while let (Some(ret), Some(old)) = (
            frame.checked_sub(RET_PC_OFFSET).and_then(|i| self.stack.get(i)),
            frame.checked_sub(OLD_FRAME_OFFSET).and_then(|i| self.stack.get(i)),
        ) {
            match (ret, old) {
                (Value::Code(Some(ret)), Value::Frame(Some(old))) if *old < frame => {
                    addresses.push(*ret);
                    frame = *old;
                }
                _ => break,
            }
        }
        addresses
    }
}

/// Outcome of running a macro slice.
///
/// Errors are reported as `Err` by the running functions and consume the
/// continuation.
#[derive(Debug)]
pub enum ExecStatus {
    /// The macro finished, possibly with a return value.
    Done(Option<Value>),
    /// A native routine asked for the macro to be suspended.
    Preempt(Continuation),
    /// The slice's instruction limit was reached.
    TimeLimit(Continuation),
}

impl ExecStatus {
    /// Returns true if the macro finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// The return value of a finished macro.
    #[must_use]
    pub fn result(&self) -> Option<Value> {
        match self {
            Self::Done(value) => *value,
            _ => None,
        }
    }

    /// The continuation of a suspended macro.
    #[must_use]
    pub fn into_continuation(self) -> Option<Continuation> {
        match self {
            Self::Done(_) => None,
            Self::Preempt(cont) | Self::TimeLimit(cont) => Some(cont),
        }
    }
}
