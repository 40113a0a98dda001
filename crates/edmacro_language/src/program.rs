//! Programs and the builder a compiler fills them with.
//!
//! Addresses handed out by the builder are cell indices into the program
//! being built. Branch cells store offsets relative to the cell after them,
//! so a block of code keeps its meaning when it is moved with
//! [`ProgramBuilder::swap_code_blocks`].

use edmacro_foundation::{Error, ErrorKind, Result, SymbolId};

use crate::config::VmConfig;
use crate::opcode::{Inst, Opcode};

/// A finished program: its cells and its local symbols.
///
/// Local symbol `locals[i]` lives in frame slot `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    code: Vec<Inst>,
    locals: Vec<SymbolId>,
}

impl Program {
    pub(crate) fn new(code: Vec<Inst>, locals: Vec<SymbolId>) -> Self {
        Self { code, locals }
    }

    /// The instruction cells.
    #[must_use]
    pub fn code(&self) -> &[Inst] {
        &self.code
    }

    /// The local symbols, in frame-slot order.
    #[must_use]
    pub fn locals(&self) -> &[SymbolId] {
        &self.locals
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if the program has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LoopExit {
    Break,
    Continue,
}

/// A branch cell waiting for its loop's exit addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct LoopFixup {
    address: usize,
    exit: LoopExit,
}

/// Accumulates the cells of one program.
#[derive(Clone, Debug)]
pub struct ProgramBuilder {
    code: Vec<Inst>,
    /// Pending fixups; `None` separates nested loops.
    loop_stack: Vec<Option<LoopFixup>>,
    capacity: usize,
    loop_capacity: usize,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new(&VmConfig::default())
    }
}

impl ProgramBuilder {
    /// Creates a builder with the limits from `config`.
    #[must_use]
    pub fn new(config: &VmConfig) -> Self {
        Self {
            code: Vec::new(),
            loop_stack: Vec::new(),
            capacity: config.program_size,
            loop_capacity: config.loop_stack_size,
        }
    }

    /// Discards any accumulated code and loop markers.
    pub fn begin(&mut self) {
        self.code.clear();
        self.loop_stack.clear();
    }

    /// Cells accumulated so far.
    #[must_use]
    pub fn code(&self) -> &[Inst] {
        &self.code
    }

    /// Address of the next cell to be added.
    #[must_use]
    pub fn current_address(&self) -> usize {
        self.code.len()
    }

    fn add(&mut self, inst: Inst) -> Result<usize> {
        if self.code.len() >= self.capacity {
            return Err(Error::new(ErrorKind::ProgramTooLarge));
        }
        self.code.push(inst);
        Ok(self.code.len() - 1)
    }

    /// Appends an opcode cell and returns its address.
    ///
    /// # Errors
    ///
    /// Returns `ProgramTooLarge` once the program is full.
    pub fn add_op(&mut self, op: Opcode) -> Result<usize> {
        self.add(Inst::Op(op))
    }

    /// Appends a symbol operand.
    ///
    /// # Errors
    ///
    /// Returns `ProgramTooLarge` once the program is full.
    pub fn add_symbol(&mut self, symbol: SymbolId) -> Result<usize> {
        self.add(Inst::Sym(symbol))
    }

    /// Appends an immediate operand.
    ///
    /// # Errors
    ///
    /// Returns `ProgramTooLarge` once the program is full.
    pub fn add_immediate(&mut self, value: i64) -> Result<usize> {
        self.add(Inst::Imm(value))
    }

    /// Appends a branch operand that lands on `target`.
    ///
    /// # Errors
    ///
    /// Returns `ProgramTooLarge` once the program is full.
    pub fn add_branch_offset(&mut self, target: usize) -> Result<usize> {
        let next = self.code.len() + 1;
        self.add(Inst::Branch(relative(target, next)))
    }

    /// Re-aims the branch cell at `address` so it lands on `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `address` is past the end of the code.
    pub fn patch_branch(&mut self, address: usize, target: usize) -> Result<()> {
        let cell = self
            .code
            .get_mut(address)
            .ok_or_else(|| Error::internal(format!("branch patch out of range: {address}")))?;
        *cell = Inst::Branch(relative(target, address + 1));
        Ok(())
    }

    /// Exchanges the adjacent blocks `[start, boundary)` and `[boundary, end)`.
    ///
    /// # Errors
    ///
    /// Returns an error unless `start <= boundary <= end <= current_address()`.
    pub fn swap_code_blocks(&mut self, start: usize, boundary: usize, end: usize) -> Result<()> {
        if !(start <= boundary && boundary <= end && end <= self.code.len()) {
            return Err(Error::internal(format!(
                "bad code blocks: {start}..{boundary}..{end}"
            )));
        }
        self.code[start..boundary].reverse();
        self.code[boundary..end].reverse();
        self.code[start..end].reverse();
        Ok(())
    }

    // =========================================================================
    // Loop fixups
    // =========================================================================

    fn push_loop_marker(&mut self, marker: Option<LoopFixup>) -> Result<()> {
        if self.loop_stack.len() >= self.loop_capacity {
            return Err(Error::new(ErrorKind::LoopStackOverflow));
        }
        self.loop_stack.push(marker);
        Ok(())
    }

    fn register(&mut self, address: usize, exit: LoopExit) -> Result<()> {
        if self.loop_stack.is_empty() {
            return Err(Error::new(ErrorKind::OutsideLoop));
        }
        self.push_loop_marker(Some(LoopFixup { address, exit }))
    }

    /// Opens a loop: later break/continue markers belong to it.
    ///
    /// # Errors
    ///
    /// Returns `LoopStackOverflow` if too many loops are open.
    pub fn start_loop_address_list(&mut self) -> Result<()> {
        self.push_loop_marker(None)
    }

    /// Records the branch cell at `address` as a `break` of the innermost loop.
    ///
    /// # Errors
    ///
    /// Returns `OutsideLoop` if no loop is open, or `LoopStackOverflow`.
    pub fn register_break_address(&mut self, address: usize) -> Result<()> {
        self.register(address, LoopExit::Break)
    }

    /// Records the branch cell at `address` as a `continue` of the innermost loop.
    ///
    /// # Errors
    ///
    /// Returns `OutsideLoop` if no loop is open, or `LoopStackOverflow`.
    pub fn register_continue_address(&mut self, address: usize) -> Result<()> {
        self.register(address, LoopExit::Continue)
    }

    /// Closes the innermost loop, aiming its breaks and continues.
    ///
    /// # Errors
    ///
    /// Returns an error if no loop is open.
    pub fn fill_loop_addresses(&mut self, break_target: usize, continue_target: usize) -> Result<()> {
        loop {
            match self.loop_stack.pop() {
                None => return Err(Error::internal("loop stack underflow")),
                Some(None) => return Ok(()),
                Some(Some(fixup)) => {
                    let target = match fixup.exit {
                        LoopExit::Break => break_target,
                        LoopExit::Continue => continue_target,
                    };
                    self.patch_branch(fixup.address, target)?;
                }
            }
        }
    }

    /// Number of loops currently open.
    #[must_use]
    pub fn open_loops(&self) -> usize {
        self.loop_stack.iter().filter(|m| m.is_none()).count()
    }

    /// Takes the accumulated cells, leaving the builder empty.
    pub(crate) fn take_code(&mut self) -> Vec<Inst> {
        self.loop_stack.clear();
        std::mem::take(&mut self.code)
    }
}

#[allow(clippy::cast_possible_wrap)]
fn relative(target: usize, from: usize) -> isize {
    target as isize - from as isize
}
