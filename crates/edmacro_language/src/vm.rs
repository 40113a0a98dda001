//! Stack-based interpreter for macro programs.
//!
//! A run starts with [`Vm::execute_macro`] and is driven by
//! [`Vm::continue_macro`]. Each call executes one slice: it ends when the
//! macro finishes, fails, is preempted by a host routine, or uses up its
//! instruction quota. A suspended run is a [`Continuation`] owned by the
//! host, which decides when (and whether) to resume it.
//!
//! # Calling convention
//!
//! Arguments are pushed by the caller and stay where they are: the callee's
//! frame is built directly on top of them: return address, saved frame
//! pointer, argument count and the `$args` cache, then the callee's locals.
//! Macro routines, host routines and actions share this stack.
//!
//! A call site that wants the routine's result places a
//! [`Opcode::FetchReturnValue`] cell right after the call. Returns check for
//! it and push the value only when it is there, so one routine serves both
//! statement and expression calls.
//!
//! # Host routine errors
//!
//! A host routine fails by returning an error. If an [`ErrorKind::Native`]
//! message contains `%s`, it is replaced by the name the routine was called
//! by.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]

mod arith;
mod context;
mod native;

pub use context::{Continuation, ExecStatus};
pub use native::{ActionFn, NativeCall, NativeFn, PropertyFn};

use std::rc::Rc;

use edmacro_foundation::{
    Arena, CodeAddress, Error, ErrorContext, ErrorKind, ProgramId, Result, SymbolId, Value,
    WindowId, string_to_number,
};
use edmacro_storage::{GcStats, Heap};

use crate::config::VmConfig;
use crate::opcode::{Inst, Opcode};
use crate::program::{Program, ProgramBuilder};
use crate::symbol::{ArgSlot, Promotion, SymbolKind, SymbolTable};

use context::ARG_ARRAY_OFFSET;

/// What an instruction asks the dispatch loop to do next.
enum Step {
    Next,
    Done,
    Preempt,
}

/// How a slice ended.
enum Slice {
    Done,
    Preempt,
    TimeLimit,
}

/// The macro virtual machine: symbols, heap, programs and the interpreter.
pub struct Vm {
    config: VmConfig,
    symbols: SymbolTable,
    heap: Heap,
    programs: Arena<Program>,
    builder: ProgramBuilder,
    preempt_request: bool,
    /// Slices currently executing (more than one when nested).
    active: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Creates a VM with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Creates a VM and installs the argument symbols `$1`..`$9` and `$n_args`.
    #[must_use]
    pub fn with_config(config: VmConfig) -> Self {
        let mut symbols = SymbolTable::new();
        for n in 0..9 {
            symbols.install(
                &format!("${}", n + 1),
                SymbolKind::Argument(ArgSlot::Position(n)),
                Value::NoValue,
            );
        }
        symbols.install("$n_args", SymbolKind::Argument(ArgSlot::Count), Value::NoValue);

        Self {
            builder: ProgramBuilder::new(&config),
            config,
            symbols,
            heap: Heap::new(),
            programs: Arena::new(),
            preempt_request: false,
            active: 0,
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// The symbol table.
    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// The symbol table, for modification.
    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// The heap.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The heap, for allocation.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Returns true while a slice is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active > 0
    }

    // =========================================================================
    // Symbols
    // =========================================================================

    /// Adds a symbol. See [`SymbolTable::install`].
    pub fn install_symbol(&mut self, name: &str, kind: SymbolKind, value: Value) -> SymbolId {
        self.symbols.install(name, kind, value)
    }

    /// Finds a symbol by name.
    #[must_use]
    pub fn lookup_symbol(&self, name: &str) -> Option<SymbolId> {
        self.symbols.lookup(name)
    }

    /// Turns a pending local into a global.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol has been freed.
    pub fn promote_local_to_global(&mut self, symbol: SymbolId) -> Result<Promotion> {
        self.symbols.promote_local_to_global(symbol)
    }

    /// Returns a constant symbol holding `text`.
    pub fn install_string_constant(&mut self, text: &str) -> SymbolId {
        self.symbols.install_string_constant(&mut self.heap, text)
    }

    /// Returns a constant symbol holding `n`.
    pub fn install_int_constant(&mut self, n: i64) -> SymbolId {
        self.symbols.install_int_constant(n)
    }

    /// Adds a hidden iterator local to the program being built.
    pub fn install_iterator_symbol(&mut self) -> SymbolId {
        self.symbols.install_iterator_symbol()
    }

    /// Registers a host routine.
    pub fn define_native<F>(&mut self, name: &str, routine: F) -> SymbolId
    where
        F: Fn(&mut NativeCall<'_>, &[Value]) -> Result<Value> + 'static,
    {
        self.install_symbol(name, SymbolKind::Native(Rc::new(routine)), Value::NoValue)
    }

    /// Registers a host action.
    pub fn define_action<F>(&mut self, name: &str, action: F) -> SymbolId
    where
        F: Fn(&mut NativeCall<'_>, &[String]) -> Result<()> + 'static,
    {
        self.install_symbol(name, SymbolKind::Action(Rc::new(action)), Value::NoValue)
    }

    /// Registers a computed read-only variable.
    pub fn define_property<F>(&mut self, name: &str, getter: F) -> SymbolId
    where
        F: Fn(&mut NativeCall<'_>) -> Result<Value> + 'static,
    {
        self.install_symbol(name, SymbolKind::Computed(Rc::new(getter)), Value::NoValue)
    }

    /// Binds `program` to a routine name.
    pub fn define_macro(&mut self, name: &str, program: ProgramId) -> SymbolId {
        self.install_symbol(name, SymbolKind::Macro(program), Value::NoValue)
    }

    /// Value of the global or constant called `name`.
    #[must_use]
    pub fn global_value(&self, name: &str) -> Option<Value> {
        let symbol = self.symbols.get(self.symbols.lookup(name)?).ok()?;
        match symbol.kind() {
            SymbolKind::Global | SymbolKind::Constant => Some(symbol.value),
            _ => None,
        }
    }

    /// Sets a global variable, creating it if needed. Arrays are copied.
    ///
    /// # Errors
    ///
    /// Fails if `name` is bound to something other than a global.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<SymbolId> {
        let value = self.owned(value)?;
        match self.symbols.lookup(name) {
            Some(id) => {
                let symbol = self.symbols.get_mut(id)?;
                if !matches!(symbol.kind(), SymbolKind::Global) {
                    return Err(ErrorKind::AssignToNonVariable(name.to_string()).into());
                }
                symbol.value = value;
                Ok(id)
            }
            None => Ok(self.install_symbol(name, SymbolKind::Global, value)),
        }
    }

    // =========================================================================
    // Programs
    // =========================================================================

    /// Starts a new program, discarding unfinished code and pending locals.
    pub fn begin_program(&mut self) {
        self.builder.begin();
        self.symbols.discard_pending_locals();
    }

    /// The builder of the program being built.
    #[must_use]
    pub fn builder(&self) -> &ProgramBuilder {
        &self.builder
    }

    /// The builder, for adding cells.
    pub fn builder_mut(&mut self) -> &mut ProgramBuilder {
        &mut self.builder
    }

    /// Completes the program being built. Its pending locals receive frame
    /// slots in declaration order.
    pub fn finish_program(&mut self) -> ProgramId {
        let code = self.builder.take_code();
        let locals = self.symbols.take_pending_locals();
        ProgramId(self.programs.alloc(Program::new(code, locals)))
    }

    /// Frees a program and its local symbols.
    ///
    /// # Errors
    ///
    /// Returns an error if the program was already freed.
    pub fn free_program(&mut self, program: ProgramId) -> Result<()> {
        let removed = self
            .programs
            .remove(program.raw())
            .ok_or_else(|| Error::stale("program"))?;
        self.symbols.remove_locals(removed.locals());
        Ok(())
    }

    /// Returns a program.
    ///
    /// # Errors
    ///
    /// Returns an error if the program has been freed.
    pub fn program(&self, program: ProgramId) -> Result<&Program> {
        self.programs
            .get(program.raw())
            .ok_or_else(|| Error::stale("program"))
    }

    pub(crate) fn entry(program: ProgramId) -> CodeAddress {
        CodeAddress::new(program, 0)
    }

    fn cell(&self, at: CodeAddress) -> Option<Inst> {
        self.programs.get(at.program.raw())?.code().get(at.offset).copied()
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Starts a macro run with `args` as its arguments.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the run.
    pub fn execute_macro(
        &mut self,
        program: ProgramId,
        window: WindowId,
        args: &[Value],
    ) -> Result<ExecStatus> {
        let locals = self.program(program)?.locals().len();
        let mut cont = Continuation::new(self.config.stack_size, window);
        for &arg in args {
            cont.push(arg)?;
        }
        cont.enter_frame(None, args.len(), locals, Self::entry(program))?;
        self.continue_macro(cont)
    }

    /// Runs one slice of a suspended macro.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the run; the continuation is consumed.
    pub fn continue_macro(&mut self, mut cont: Continuation) -> Result<ExecStatus> {
        self.active += 1;
        let slice = self.run_slice(&mut cont);
        self.active -= 1;

        match slice {
            Ok(Slice::Done) => {
                let result = cont.pop().ok().filter(|value| !value.is_unset());
                Ok(ExecStatus::Done(result))
            }
            Ok(Slice::Preempt) => Ok(ExecStatus::Preempt(cont)),
            Ok(Slice::TimeLimit) => Ok(ExecStatus::TimeLimit(cont)),
            Err(err) => Err(self.locate(err, &cont)),
        }
    }

    /// Abandons a suspended macro. Side effects already made are kept.
    pub fn free_continuation(&mut self, cont: Continuation) {
        drop(cont);
    }

    /// Asks for the running macro to be suspended after the current host
    /// routine returns.
    pub fn request_preemption(&mut self) {
        self.preempt_request = true;
    }

    /// Replaces the result a preempted host routine left for its caller.
    ///
    /// Returns false (and changes nothing) if the call site did not want a
    /// result.
    pub fn modify_suspended_return_value(&self, cont: &mut Continuation, value: Value) -> bool {
        let wanted = cont
            .pc
            .and_then(|pc| pc.offset.checked_sub(1).map(|o| CodeAddress::new(pc.program, o)))
            .and_then(|at| self.cell(at))
            == Some(Inst::Op(Opcode::FetchReturnValue));
        wanted && cont.replace_top(value)
    }

    fn run_slice(&mut self, ctx: &mut Continuation) -> Result<Slice> {
        let limit = self.config.slice_limit();
        let mut executed = 0;
        loop {
            match self.step(ctx)? {
                Step::Next => {
                    executed += 1;
                    if limit.is_some_and(|limit| executed >= limit) {
                        return Ok(Slice::TimeLimit);
                    }
                }
                Step::Done => return Ok(Slice::Done),
                Step::Preempt => return Ok(Slice::Preempt),
            }
        }
    }

    /// Attaches the failing routine, offset and call trace to an error.
    fn locate(&self, err: Error, ctx: &Continuation) -> Error {
        if err.context.is_some() {
            return err;
        }
        let mut context = ErrorContext::new();
        if let Some(at) = ctx.current {
            context = context.with_offset(at.offset);
            if let Some(name) = self.symbols.routine_name(at.program) {
                context = context.with_routine(&*name);
            }
        }
        for ret in ctx.return_addresses() {
            let frame = match self.symbols.routine_name(ret.program) {
                Some(name) => format!("{name} at {}", ret.offset),
                None => ret.to_string(),
            };
            context = context.with_frame(frame);
        }
        err.with_context(context)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn step(&mut self, ctx: &mut Continuation) -> Result<Step> {
        ctx.current = ctx.pc;
        let op = match self.fetch(ctx)? {
            Inst::Op(op) => op,
            other => return Err(malformed("opcode", other)),
        };

        match op {
            Opcode::ReturnNoValue => return self.return_from_call(ctx, false),
            Opcode::Return => return self.return_from_call(ctx, true),
            Opcode::CallSubroutine => return self.call_subroutine(ctx),

            Opcode::PushSymbol => {
                let symbol = self.fetch_symbol(ctx)?;
                let value = self.symbol_value(ctx, symbol)?;
                ctx.push(value)?;
            }
            Opcode::Dup => {
                let top = ctx.peek(0)?;
                ctx.push(top)?;
            }

            Opcode::Add | Opcode::Subtract | Opcode::BitAnd | Opcode::BitOr => {
                self.array_aware_math(ctx, op)?;
            }
            Opcode::Multiply
            | Opcode::Divide
            | Opcode::Modulo
            | Opcode::Gt
            | Opcode::Lt
            | Opcode::Ge
            | Opcode::Le
            | Opcode::And
            | Opcode::Or
            | Opcode::Power => {
                let right = self.pop_int(ctx)?;
                let left = self.pop_int(ctx)?;
                ctx.push(Value::Int(arith::binary(op, left, right)?))?;
            }
            Opcode::Negate | Opcode::Increment | Opcode::Decrement | Opcode::Not => {
                let n = self.pop_int(ctx)?;
                ctx.push(Value::Int(arith::unary(op, n)?))?;
            }
            Opcode::Eq | Opcode::Ne => {
                let right = ctx.pop()?;
                let left = ctx.pop()?;
                let equal = self.equal(left, right)?;
                ctx.push(Value::from(equal == (op == Opcode::Eq)))?;
            }
            Opcode::Concat => {
                let right = ctx.pop()?;
                let left = ctx.pop()?;
                let mut text = self.heap.value_to_string(left)?;
                text.push_str(&self.heap.value_to_string(right)?);
                let joined = self.heap.string_value(text);
                ctx.push(joined)?;
            }
            Opcode::Assign => self.assign(ctx)?,
            Opcode::FetchReturnValue => {
                return Err(Error::internal("return value fetch outside a call"));
            }

            Opcode::Branch => {
                let target = self.fetch_branch(ctx)?;
                ctx.pc = Some(target);
            }
            Opcode::BranchTrue | Opcode::BranchFalse => {
                let condition = self.pop_int(ctx)?;
                let target = self.fetch_branch(ctx)?;
                if (condition != 0) == (op == Opcode::BranchTrue) {
                    ctx.pc = Some(target);
                }
            }
            Opcode::BranchNever => {
                self.fetch_branch(ctx)?;
            }

            Opcode::ArrayRef => self.array_ref(ctx)?,
            Opcode::ArrayAssign => self.array_assign(ctx)?,
            Opcode::ArrayRefAssignSetup => self.array_ref_assign_setup(ctx)?,
            Opcode::PushArraySymbol => self.push_array_symbol(ctx)?,
            Opcode::BeginArrayIteration => self.begin_array_iteration(ctx)?,
            Opcode::ArrayIterationStep => self.array_iteration_step(ctx)?,
            Opcode::InArray => self.in_array(ctx)?,
            Opcode::ArrayDelete => self.array_delete(ctx)?,

            Opcode::PushArgument => self.push_argument(ctx)?,
            Opcode::PushArgumentCount => {
                let count = ctx.arg_count()?;
                ctx.push(Value::Int(count as i64))?;
            }
            Opcode::PushArgumentArray => self.push_argument_array(ctx)?,
        }
        Ok(Step::Next)
    }

    fn fetch(&self, ctx: &mut Continuation) -> Result<Inst> {
        let at = ctx
            .pc
            .ok_or_else(|| Error::internal("macro has no program counter"))?;
        let inst = self
            .cell(at)
            .ok_or_else(|| Error::internal(format!("program counter out of range: {at}")))?;
        ctx.pc = Some(at.offset_by(1));
        Ok(inst)
    }

    fn fetch_symbol(&self, ctx: &mut Continuation) -> Result<SymbolId> {
        match self.fetch(ctx)? {
            Inst::Sym(symbol) => Ok(symbol),
            other => Err(malformed("symbol", other)),
        }
    }

    fn fetch_immediate(&self, ctx: &mut Continuation) -> Result<i64> {
        match self.fetch(ctx)? {
            Inst::Imm(n) => Ok(n),
            other => Err(malformed("immediate", other)),
        }
    }

    fn fetch_count(&self, ctx: &mut Continuation) -> Result<usize> {
        let n = self.fetch_immediate(ctx)?;
        usize::try_from(n).map_err(|_| malformed("count", Inst::Imm(n)))
    }

    /// Reads a branch cell and returns where it points.
    fn fetch_branch(&self, ctx: &mut Continuation) -> Result<CodeAddress> {
        match self.fetch(ctx)? {
            Inst::Branch(offset) => ctx
                .pc
                .map(|next| next.offset_by(offset))
                .ok_or_else(|| Error::internal("macro has no program counter")),
            other => Err(malformed("branch offset", other)),
        }
    }

    fn wants_return_value(&self, at: Option<CodeAddress>) -> bool {
        at.and_then(|at| self.cell(at)) == Some(Inst::Op(Opcode::FetchReturnValue))
    }

    // =========================================================================
    // Values
    // =========================================================================

    fn pop_int(&self, ctx: &mut Continuation) -> Result<i64> {
        let value = ctx.pop()?;
        self.heap.value_to_int(value)
    }

    /// Deep-copies arrays so the value can be stored independently.
    fn owned(&mut self, value: Value) -> Result<Value> {
        match value {
            Value::Array(array) => Ok(Value::Array(self.heap.array_copy(array)?)),
            other => Ok(other),
        }
    }

    fn equal(&self, left: Value, right: Value) -> Result<bool> {
        Ok(match (left, right) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => self.heap.string(a)? == self.heap.string(b)?,
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                string_to_number(self.heap.string(s)?) == Some(n)
            }
            _ => return Err(ErrorKind::IncompatibleCompare.into()),
        })
    }

    fn array_aware_math(&mut self, ctx: &mut Continuation, op: Opcode) -> Result<()> {
        if let Value::Array(right) = ctx.peek(0)? {
            ctx.pop()?;
            let Value::Array(left) = ctx.pop()? else {
                return Err(ErrorKind::MixedArrayMath.into());
            };
            let result = match op {
                Opcode::Add => self.heap.array_union(left, right)?,
                Opcode::Subtract => self.heap.array_difference(left, right)?,
                Opcode::BitAnd => self.heap.array_intersection(left, right)?,
                _ => self.heap.array_exclusive_union(left, right)?,
            };
            return ctx.push(Value::Array(result));
        }
        let right = self.pop_int(ctx)?;
        let left = self.pop_int(ctx)?;
        ctx.push(Value::Int(arith::binary(op, left, right)?))
    }

    // =========================================================================
    // Symbols at run time
    // =========================================================================

    fn symbol_parts(&self, id: SymbolId) -> Result<(Rc<str>, SymbolKind, Value)> {
        let symbol = self.symbols.get(id)?;
        Ok((symbol.shared_name(), symbol.kind().clone(), symbol.value))
    }

    fn symbol_value(&mut self, ctx: &mut Continuation, id: SymbolId) -> Result<Value> {
        let (name, kind, stored) = self.symbol_parts(id)?;
        let value = match kind {
            SymbolKind::Local { slot } => ctx.local(slot)?,
            SymbolKind::Global | SymbolKind::Constant => stored,
            SymbolKind::Argument(ArgSlot::Position(n)) => ctx
                .argument(n)?
                .ok_or_else(|| ErrorKind::UndefinedArgument(name.to_string()))?,
            SymbolKind::Argument(ArgSlot::Count) => Value::Int(ctx.arg_count()? as i64),
            SymbolKind::Computed(getter) => getter(&mut NativeCall::new(self, ctx, &name))
                .map_err(|err| with_routine_name(err, &name))?,
            _ => return Err(ErrorKind::ReadingNonVariable(name.to_string()).into()),
        };
        if value.is_unset() {
            return Err(ErrorKind::VariableNotSet(name.to_string()).into());
        }
        Ok(value)
    }

    fn store(&mut self, ctx: &mut Continuation, id: SymbolId, kind: &SymbolKind, value: Value) -> Result<()> {
        match kind {
            SymbolKind::Local { slot } => ctx.set_local(*slot, value),
            _ => {
                self.symbols.get_mut(id)?.value = value;
                Ok(())
            }
        }
    }

    fn assign(&mut self, ctx: &mut Continuation) -> Result<()> {
        let id = self.fetch_symbol(ctx)?;
        let (name, kind, _) = self.symbol_parts(id)?;
        match kind {
            SymbolKind::Global | SymbolKind::Local { .. } => {}
            SymbolKind::Argument(_) => {
                return Err(ErrorKind::AssignToArgument(name.to_string()).into());
            }
            SymbolKind::Computed(_) => {
                return Err(ErrorKind::AssignToReadOnly(name.to_string()).into());
            }
            _ => return Err(ErrorKind::AssignToNonVariable(name.to_string()).into()),
        }
        let value = ctx.pop()?;
        let value = self.owned(value)?;
        self.store(ctx, id, &kind, value)
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call_subroutine(&mut self, ctx: &mut Continuation) -> Result<Step> {
        let id = self.fetch_symbol(ctx)?;
        let arg_count = self.fetch_count(ctx)?;
        let (name, kind, _) = self.symbol_parts(id)?;

        match kind {
            SymbolKind::Native(routine) => {
                let args = ctx.pop_n(arg_count)?;
                self.preempt_request = false;
                let result = routine(&mut NativeCall::new(self, ctx, &name), &args)
                    .map_err(|err| with_routine_name(err, &name))?;
                if self.wants_return_value(ctx.pc) {
                    if result.is_unset() {
                        return Err(ErrorKind::NoReturnValue(name.to_string()).into());
                    }
                    ctx.push(result)?;
                    ctx.pc = ctx.pc.map(|pc| pc.offset_by(1));
                }
                Ok(self.after_host_call())
            }
            SymbolKind::Macro(program) => {
                let locals = self.program(program)?.locals().len();
                let return_pc = ctx.pc;
                ctx.enter_frame(return_pc, arg_count, locals, Self::entry(program))?;
                Ok(Step::Next)
            }
            SymbolKind::Action(action) => {
                let values = ctx.pop_n(arg_count)?;
                let args = values
                    .into_iter()
                    .map(|value| self.heap.value_to_string(value))
                    .collect::<Result<Vec<_>>>()?;
                if self.wants_return_value(ctx.pc) {
                    return Err(ErrorKind::NoReturnValue(name.to_string()).into());
                }
                self.preempt_request = false;
                action(&mut NativeCall::new(self, ctx, &name), &args)
                    .map_err(|err| with_routine_name(err, &name))?;
                Ok(self.after_host_call())
            }
            _ => Err(ErrorKind::NotCallable(name.to_string()).into()),
        }
    }

    fn after_host_call(&mut self) -> Step {
        if std::mem::take(&mut self.preempt_request) {
            Step::Preempt
        } else {
            Step::Next
        }
    }

    fn return_from_call(&mut self, ctx: &mut Continuation, with_value: bool) -> Result<Step> {
        let value = if with_value { Some(ctx.pop()?) } else { None };
        match ctx.leave_frame()? {
            None => {
                ctx.push(value.unwrap_or_default())?;
                Ok(Step::Done)
            }
            Some(ret) => {
                if self.wants_return_value(Some(ret)) {
                    let Some(value) = value else {
                        return Err(ErrorKind::UsingMissingReturnValue(self.callee_name(ret)).into());
                    };
                    ctx.push(value)?;
                    ctx.pc = Some(ret.offset_by(1));
                }
                Ok(Step::Next)
            }
        }
    }

    /// Name of the routine called by the call site that returns to `ret`.
    fn callee_name(&self, ret: CodeAddress) -> String {
        let call = ret
            .offset
            .checked_sub(2)
            .and_then(|offset| self.cell(CodeAddress::new(ret.program, offset)));
        match call {
            Some(Inst::Sym(id)) => self
                .symbols
                .get(id)
                .map_or_else(|_| "?".to_string(), |symbol| symbol.name().to_string()),
            _ => "?".to_string(),
        }
    }

    // =========================================================================
    // Arguments
    // =========================================================================

    fn push_argument(&mut self, ctx: &mut Continuation) -> Result<()> {
        let n = self.pop_int(ctx)?;
        let value = n
            .checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .map(|index| ctx.argument(index))
            .transpose()?
            .flatten()
            .ok_or_else(|| ErrorKind::UndefinedArgument(format!("$args[{n}]")))?;
        ctx.push(value)
    }

    fn push_argument_array(&mut self, ctx: &mut Continuation) -> Result<()> {
        let cached = ctx.frame_value(ARG_ARRAY_OFFSET)?;
        if cached.is_array() {
            return ctx.push(cached);
        }
        let array = self.heap.array_new();
        for index in 0..ctx.arg_count()? {
            if let Some(arg) = ctx.argument(index)? {
                self.heap.array_insert(array, &(index + 1).to_string(), arg)?;
            }
        }
        ctx.set_frame_value(ARG_ARRAY_OFFSET, Value::Array(array))?;
        ctx.push(Value::Array(array))
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    /// Pops `dims` subscripts and joins them into one key.
    fn pop_key(&self, ctx: &mut Continuation, dims: usize) -> Result<String> {
        let subscripts = ctx.pop_n(dims)?;
        self.heap.make_key(&subscripts)
    }

    fn array_ref(&mut self, ctx: &mut Continuation) -> Result<()> {
        let dims = self.fetch_count(ctx)?;
        if dims == 0 {
            let Value::Array(array) = ctx.pop()? else {
                return Err(ErrorKind::IndexNonArray.into());
            };
            let size = self.heap.array_size(array)?;
            return ctx.push(Value::Int(size as i64));
        }
        let key = self.pop_key(ctx, dims)?;
        let Value::Array(array) = ctx.pop()? else {
            return Err(ErrorKind::IndexNonArray.into());
        };
        match self.heap.array_get(array, &key)? {
            Some(value) => ctx.push(value),
            None => Err(ErrorKind::KeyNotFound(key).into()),
        }
    }

    fn array_assign(&mut self, ctx: &mut Continuation) -> Result<()> {
        let dims = self.fetch_count(ctx)?;
        if dims == 0 {
            return Err(ErrorKind::EmptySubscript.into());
        }
        let value = ctx.pop()?;
        let key = self.pop_key(ctx, dims)?;
        match ctx.pop()? {
            Value::Array(array) => self.heap.array_insert(array, &key, value),
            // no array to hold the element; the store is dropped
            Value::NoValue => Ok(()),
            _ => Err(ErrorKind::AssignElementOfNonArray.into()),
        }
    }

    /// Sets up `a[i] op= x`: leaves the array and subscripts in place, pushes
    /// the current element, then puts `x` back on top.
    fn array_ref_assign_setup(&mut self, ctx: &mut Continuation) -> Result<()> {
        let binary = self.fetch_immediate(ctx)? != 0;
        let dims = self.fetch_count(ctx)?;
        let operand = if binary { Some(ctx.pop()?) } else { None };
        if dims == 0 {
            return Err(ErrorKind::EmptyLvalueSubscript.into());
        }
        let key = self.heap.make_key(ctx.top(dims)?)?;
        let Value::Array(array) = ctx.peek(dims)? else {
            return Err(ErrorKind::IndexNonArray.into());
        };
        let current = self
            .heap
            .array_get(array, &key)?
            .ok_or(ErrorKind::KeyNotFound(key))?;
        ctx.push(current)?;
        if let Some(operand) = operand {
            ctx.push(operand)?;
        }
        Ok(())
    }

    fn push_array_symbol(&mut self, ctx: &mut Continuation) -> Result<()> {
        let id = self.fetch_symbol(ctx)?;
        let create = self.fetch_immediate(ctx)? != 0;
        let (name, kind, stored) = self.symbol_parts(id)?;
        let mut value = match kind {
            SymbolKind::Local { slot } => ctx.local(slot)?,
            SymbolKind::Global => stored,
            _ => return Err(ErrorKind::NonLvalueArray(name.to_string()).into()),
        };
        if create && value.is_unset() {
            value = Value::Array(self.heap.array_new());
            self.store(ctx, id, &kind, value)?;
        }
        if value.is_unset() {
            return Err(ErrorKind::VariableNotSet(name.to_string()).into());
        }
        ctx.push(value)
    }

    fn iterator_slot(&self, id: SymbolId) -> Result<usize> {
        let symbol = self.symbols.get(id)?;
        match symbol.kind() {
            SymbolKind::Local { slot } => Ok(*slot),
            _ => Err(ErrorKind::BadIterator(symbol.name().to_string()).into()),
        }
    }

    fn begin_array_iteration(&mut self, ctx: &mut Continuation) -> Result<()> {
        let iterator = self.fetch_symbol(ctx)?;
        let source = ctx.pop()?;
        let slot = self.iterator_slot(iterator)?;
        let Value::Array(array) = source else {
            return Err(ErrorKind::IterateNonArray.into());
        };
        let cursor = self.heap.array_iterate_first(array)?;
        ctx.set_local(slot, Value::Cursor(cursor))
    }

    fn array_iteration_step(&mut self, ctx: &mut Continuation) -> Result<()> {
        let item = self.fetch_symbol(ctx)?;
        let iterator = self.fetch_symbol(ctx)?;
        let exit = self.fetch_branch(ctx)?;

        let (item_name, item_kind, _) = self.symbol_parts(item)?;
        if !item_kind.is_variable() {
            return Err(ErrorKind::CannotAssignTo(item_name.to_string()).into());
        }
        self.store(ctx, item, &item_kind, Value::NoValue)?;

        let slot = self.iterator_slot(iterator)?;
        let Value::Cursor(cursor) = ctx.local(slot)? else {
            let name = self.symbols.get(iterator)?.name().to_string();
            return Err(ErrorKind::BadIterator(name).into());
        };

        match self.heap.cursor_entry(cursor) {
            Some((key, _)) => {
                self.store(ctx, item, &item_kind, Value::Str(key))?;
                let next = self.heap.array_iterate_next(cursor);
                ctx.set_local(slot, Value::Cursor(next))
            }
            None => {
                ctx.pc = Some(exit);
                Ok(())
            }
        }
    }

    fn in_array(&mut self, ctx: &mut Continuation) -> Result<()> {
        let Value::Array(right) = ctx.pop()? else {
            return Err(ErrorKind::InNonArray.into());
        };
        let found = match ctx.pop()? {
            Value::Array(left) => self.heap.array_keys_subset(left, right)?,
            key => {
                let key = self.heap.value_to_string(key)?;
                self.heap.array_get(right, &key)?.is_some()
            }
        };
        ctx.push(Value::from(found))
    }

    fn array_delete(&mut self, ctx: &mut Continuation) -> Result<()> {
        let dims = self.fetch_count(ctx)?;
        let key = if dims > 0 {
            Some(self.pop_key(ctx, dims)?)
        } else {
            None
        };
        let Value::Array(array) = ctx.pop()? else {
            return Err(ErrorKind::DeleteNonArray.into());
        };
        match key {
            Some(key) => self.heap.array_delete(array, &key).map(|_| ()),
            None => self.heap.array_delete_all(array),
        }
    }

    // =========================================================================
    // Garbage collection
    // =========================================================================

    /// Frees strings and arrays unreachable from any symbol.
    ///
    /// Values held only on suspended stacks are not roots; use
    /// [`Vm::collect_garbage_with_roots`] while macros are suspended.
    ///
    /// # Errors
    ///
    /// Returns `CollectorBusy` if called while a slice is executing.
    pub fn collect_garbage(&mut self) -> Result<GcStats> {
        self.collect_garbage_with_roots(std::iter::empty())
    }

    /// Like [`Vm::collect_garbage`], also keeping everything reachable from
    /// the stacks of `suspended`. Arrays under iteration are kept alive.
    ///
    /// # Errors
    ///
    /// Returns `CollectorBusy` if called while a slice is executing.
    pub fn collect_garbage_with_roots<'c, I>(&mut self, suspended: I) -> Result<GcStats>
    where
        I: IntoIterator<Item = &'c Continuation>,
    {
        self.collect_garbage_keeping(suspended, &[])
    }

    /// Like [`Vm::collect_garbage_with_roots`], also keeping `keep`, such as
    /// the result of a run that just finished.
    ///
    /// # Errors
    ///
    /// Returns `CollectorBusy` if called while a slice is executing.
    pub fn collect_garbage_keeping<'c, I>(&mut self, suspended: I, keep: &[Value]) -> Result<GcStats>
    where
        I: IntoIterator<Item = &'c Continuation>,
    {
        if self.is_running() {
            return Err(ErrorKind::CollectorBusy.into());
        }
        let mut roots: Vec<Value> = self.symbols.values().collect();
        roots.extend_from_slice(keep);
        for cont in suspended {
            roots.extend(cont.stack().iter().map(|value| match *value {
                Value::Cursor(cursor) => Value::Array(cursor.array),
                other => other,
            }));
        }
        Ok(self.heap.collect(roots))
    }
}

fn malformed(expected: &str, found: Inst) -> Error {
    Error::internal(format!("malformed program: expected {expected}, found {found:?}"))
}

/// Fills `%s` in a host routine's message with the routine's name.
fn with_routine_name(mut err: Error, name: &str) -> Error {
    if let ErrorKind::Native(message) = &mut err.kind {
        if message.contains("%s") {
            *message = message.replace("%s", name);
        }
    }
    err
}
