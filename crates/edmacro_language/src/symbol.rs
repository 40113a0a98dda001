//! Symbol table.
//!
//! Globals live for the life of the VM. Locals are collected while a
//! program is being built and handed to that program when it is finished;
//! each one then owns a frame slot. Lookup prefers locals, then the most
//! recently installed global of that name.

use std::fmt;
use std::rc::Rc;

use edmacro_foundation::{Arena, Error, ProgramId, Result, SymbolId, Value};
use edmacro_storage::Heap;

use crate::vm::{ActionFn, NativeFn, PropertyFn};

/// Positional argument a symbol stands for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgSlot {
    /// `$1`..`$9` (zero-based position).
    Position(usize),
    /// `$n_args`.
    Count,
}

/// What a symbol is bound to.
#[derive(Clone)]
pub enum SymbolKind {
    /// Global variable; the value lives in the symbol.
    Global,
    /// Local variable; the value lives in frame slot `slot`.
    Local {
        /// Frame slot, assigned when the program is finished.
        slot: usize,
    },
    /// Constant; the value lives in the symbol.
    Constant,
    /// Argument of the running routine.
    Argument(ArgSlot),
    /// Host routine returning a value.
    Native(NativeFn),
    /// Host routine taking string arguments and returning nothing.
    Action(ActionFn),
    /// Routine written in the macro language.
    Macro(ProgramId),
    /// Read-only variable computed by a host getter.
    Computed(PropertyFn),
}

impl SymbolKind {
    /// Short name of the kind, for diagnostics.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Local { .. } => "local",
            Self::Constant => "constant",
            Self::Argument(_) => "argument",
            Self::Native(_) => "native routine",
            Self::Action(_) => "action routine",
            Self::Macro(_) => "macro routine",
            Self::Computed(_) => "computed property",
        }
    }

    /// Returns true for variables that can be assigned to.
    #[must_use]
    pub const fn is_variable(&self) -> bool {
        matches!(self, Self::Global | Self::Local { .. })
    }
}

impl fmt::Debug for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { slot } => write!(f, "Local({slot})"),
            Self::Argument(arg) => write!(f, "Argument({arg:?})"),
            Self::Macro(program) => write!(f, "Macro({program:?})"),
            other => f.write_str(other.describe()),
        }
    }
}

/// A named binding.
#[derive(Clone, Debug)]
pub struct Symbol {
    name: Rc<str>,
    kind: SymbolKind,
    /// Value of a global or constant. Unused by other kinds.
    pub value: Value,
}

impl Symbol {
    /// The symbol's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the name.
    #[must_use]
    pub fn shared_name(&self) -> Rc<str> {
        Rc::clone(&self.name)
    }

    /// What the symbol is bound to.
    #[must_use]
    pub fn kind(&self) -> &SymbolKind {
        &self.kind
    }
}

/// Result of [`SymbolTable::promote_local_to_global`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Promotion {
    /// The symbol was not a local; nothing changed.
    NotLocal,
    /// The local became a global.
    Promoted,
    /// The local became a global that hides an older global of the same name.
    Shadowed,
}

/// Every symbol of a VM.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Arena<Symbol>,
    /// Newest last.
    globals: Vec<SymbolId>,
    /// Locals of the program being built, in declaration order.
    locals: Vec<SymbolId>,
    string_constants: usize,
    iterators: usize,
}

impl SymbolTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a symbol. Locals join the program being built, all other kinds
    /// become globals.
    pub fn install(&mut self, name: &str, kind: SymbolKind, value: Value) -> SymbolId {
        let local = matches!(kind, SymbolKind::Local { .. });
        let id = SymbolId(self.symbols.alloc(Symbol {
            name: Rc::from(name),
            kind,
            value,
        }));
        if local {
            self.locals.push(id);
        } else {
            self.globals.push(id);
        }
        id
    }

    /// Adds a local variable to the program being built.
    pub fn install_local(&mut self, name: &str) -> SymbolId {
        self.install(name, SymbolKind::Local { slot: 0 }, Value::NoValue)
    }

    /// Finds a symbol by name: pending locals first, then globals.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.locals
            .iter()
            .rev()
            .chain(self.globals.iter().rev())
            .copied()
            .find(|id| self.symbols.get(id.raw()).is_some_and(|s| &*s.name == name))
    }

    /// Returns a symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol was freed with its program.
    pub fn get(&self, id: SymbolId) -> Result<&Symbol> {
        self.symbols
            .get(id.raw())
            .ok_or_else(|| Error::stale("symbol"))
    }

    /// Returns a symbol for modification.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol was freed with its program.
    pub fn get_mut(&mut self, id: SymbolId) -> Result<&mut Symbol> {
        self.symbols
            .get_mut(id.raw())
            .ok_or_else(|| Error::stale("symbol"))
    }

    /// Turns a pending local into a global.
    ///
    /// Used for routines called before they are defined: the call site and
    /// the later definition must share one symbol. A name collision with an
    /// existing global is reported but the promotion still happens.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol has been freed.
    pub fn promote_local_to_global(&mut self, id: SymbolId) -> Result<Promotion> {
        let symbol = self.get(id)?;
        if !matches!(symbol.kind, SymbolKind::Local { .. }) {
            return Ok(Promotion::NotLocal);
        }
        let name = symbol.shared_name();

        self.locals.retain(|&local| local != id);
        let shadowed = self.lookup(&name).is_some();

        self.get_mut(id)?.kind = SymbolKind::Global;
        self.globals.push(id);
        Ok(if shadowed {
            Promotion::Shadowed
        } else {
            Promotion::Promoted
        })
    }

    /// Returns a constant symbol holding `text`, reusing an existing one.
    pub fn install_string_constant(&mut self, heap: &mut Heap, text: &str) -> SymbolId {
        let existing = self.globals.iter().rev().copied().find(|id| {
            self.symbols.get(id.raw()).is_some_and(|s| {
                matches!(s.kind, SymbolKind::Constant)
                    && matches!(s.value, Value::Str(str_id) if heap.string(str_id).is_ok_and(|t| t == text))
            })
        });
        if let Some(id) = existing {
            return id;
        }
        let name = format!("string #{}", self.string_constants);
        self.string_constants += 1;
        let value = Value::Str(heap.allocate_string_copy(text));
        self.install(&name, SymbolKind::Constant, value)
    }

    /// Returns a constant symbol holding `n`, reusing an existing one.
    pub fn install_int_constant(&mut self, n: i64) -> SymbolId {
        let name = format!("const {n}");
        match self.lookup(&name) {
            Some(id) => id,
            None => self.install(&name, SymbolKind::Constant, Value::Int(n)),
        }
    }

    /// Adds a hidden local that holds the cursor of a `for (k in a)` loop.
    pub fn install_iterator_symbol(&mut self) -> SymbolId {
        let name = format!("aryiter #{}", self.iterators);
        self.iterators += 1;
        self.install_local(&name)
    }

    /// Drops the pending locals of an abandoned program.
    pub fn discard_pending_locals(&mut self) {
        for id in std::mem::take(&mut self.locals) {
            self.symbols.remove(id.raw());
        }
    }

    /// Hands the pending locals to a finished program, assigning slots in
    /// declaration order.
    pub(crate) fn take_pending_locals(&mut self) -> Vec<SymbolId> {
        let locals = std::mem::take(&mut self.locals);
        for (slot, id) in locals.iter().enumerate() {
            if let Some(symbol) = self.symbols.get_mut(id.raw()) {
                symbol.kind = SymbolKind::Local { slot };
            }
        }
        locals
    }

    /// Frees the locals of a program being freed.
    pub(crate) fn remove_locals(&mut self, locals: &[SymbolId]) {
        for id in locals {
            self.symbols.remove(id.raw());
        }
    }

    /// Locals of the program being built, in declaration order.
    #[must_use]
    pub fn pending_locals(&self) -> &[SymbolId] {
        &self.locals
    }

    /// Globals, oldest first.
    #[must_use]
    pub fn globals(&self) -> &[SymbolId] {
        &self.globals
    }

    /// Values held directly by symbols (globals and constants).
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.symbols.iter().map(|(_, symbol)| symbol.value)
    }

    /// Name of the macro routine bound to `program`, if any.
    #[must_use]
    pub fn routine_name(&self, program: ProgramId) -> Option<Rc<str>> {
        self.globals.iter().rev().find_map(|id| {
            let symbol = self.symbols.get(id.raw())?;
            match symbol.kind {
                SymbolKind::Macro(p) if p == program => Some(symbol.shared_name()),
                _ => None,
            }
        })
    }

    /// Number of live symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns true if no symbols are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
