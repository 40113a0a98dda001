//! Instruction set of the macro VM.
//!
//! A program is a flat sequence of [`Inst`] cells. An opcode cell is followed
//! by a fixed number of operand cells, given by [`Opcode::operands`]. Both the
//! builder and the interpreter rely on that layout.

#![allow(clippy::doc_markdown)]

use edmacro_foundation::SymbolId;

/// Operation selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    // === Calls and returns ===
    /// Return from a routine without a value.
    ReturnNoValue,
    /// Return the top of stack from a routine.
    Return,

    // === Stack ===
    /// Push a symbol's value. Operand: symbol.
    PushSymbol,
    /// Duplicate the top of stack.
    Dup,

    // === Arithmetic (array-aware for Add, Subtract, BitAnd, BitOr) ===
    /// `[a, b] -> [a + b]`, or union of two arrays.
    Add,
    /// `[a, b] -> [a - b]`, or difference of two arrays.
    Subtract,
    /// `[a, b] -> [a * b]`
    Multiply,
    /// `[a, b] -> [a / b]`
    Divide,
    /// `[a, b] -> [a % b]`
    Modulo,
    /// `[a] -> [-a]`
    Negate,
    /// `[a] -> [a + 1]`
    Increment,
    /// `[a] -> [a - 1]`
    Decrement,

    // === Comparison ===
    /// `[a, b] -> [a > b]`
    Gt,
    /// `[a, b] -> [a < b]`
    Lt,
    /// `[a, b] -> [a >= b]`
    Ge,
    /// `[a, b] -> [a <= b]`
    Le,
    /// `[a, b] -> [a == b]` (ints, strings, or mixed)
    Eq,
    /// `[a, b] -> [a != b]`
    Ne,

    // === Bitwise and logic ===
    /// `[a, b] -> [a & b]`, or intersection of two arrays.
    BitAnd,
    /// `[a, b] -> [a | b]`, or exclusive union of two arrays.
    BitOr,
    /// `[a, b] -> [a && b]`
    And,
    /// `[a, b] -> [a || b]`
    Or,
    /// `[a] -> [!a]`
    Not,
    /// `[a, b] -> [a ^ b]`
    Power,
    /// `[a, b] -> [a b]` (string concatenation)
    Concat,

    // === Variables and calls ===
    /// Pop into a variable. Operand: symbol.
    Assign,
    /// Call a routine. Operands: symbol, argument count.
    CallSubroutine,
    /// Marker after a call whose result is wanted.
    FetchReturnValue,

    // === Branches (operand: offset relative to the next cell) ===
    /// Unconditional branch.
    Branch,
    /// Pop; branch if nonzero.
    BranchTrue,
    /// Pop; branch if zero.
    BranchFalse,
    /// Never branches. Reserves a patchable offset cell.
    BranchNever,

    // === Arrays ===
    /// Indexed read. Operand: number of subscripts (0 = element count).
    ArrayRef,
    /// Indexed write. Operand: number of subscripts.
    ArrayAssign,
    /// Start a `for (k in a)` loop. Operand: hidden iterator local.
    BeginArrayIteration,
    /// Next key of a `for (k in a)` loop. Operands: item, iterator, exit offset.
    ArrayIterationStep,
    /// `[k, a] -> [k in a]`
    InArray,
    /// Delete one element (or all with 0 subscripts). Operand: number of subscripts.
    ArrayDelete,
    /// Push an array variable. Operands: symbol, create-if-unset flag.
    PushArraySymbol,
    /// Prepare `a[i] op= x`. Operands: binary-op flag, number of subscripts.
    ArrayRefAssignSetup,

    // === Arguments ===
    /// `[n] -> [$args[n]]`
    PushArgument,
    /// Push `$n_args`.
    PushArgumentCount,
    /// Push `$args` as an array.
    PushArgumentArray,
}

/// Kind of an operand cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// A symbol reference.
    Symbol,
    /// An immediate integer.
    Immediate,
    /// A relative branch offset.
    Branch,
}

impl Opcode {
    /// Every opcode, in encoding order.
    pub const ALL: [Opcode; 43] = [
        Self::ReturnNoValue,
        Self::Return,
        Self::PushSymbol,
        Self::Dup,
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Modulo,
        Self::Negate,
        Self::Increment,
        Self::Decrement,
        Self::Gt,
        Self::Lt,
        Self::Ge,
        Self::Le,
        Self::Eq,
        Self::Ne,
        Self::BitAnd,
        Self::BitOr,
        Self::And,
        Self::Or,
        Self::Not,
        Self::Power,
        Self::Concat,
        Self::Assign,
        Self::CallSubroutine,
        Self::FetchReturnValue,
        Self::Branch,
        Self::BranchTrue,
        Self::BranchFalse,
        Self::BranchNever,
        Self::ArrayRef,
        Self::ArrayAssign,
        Self::BeginArrayIteration,
        Self::ArrayIterationStep,
        Self::InArray,
        Self::ArrayDelete,
        Self::PushArraySymbol,
        Self::ArrayRefAssignSetup,
        Self::PushArgument,
        Self::PushArgumentCount,
        Self::PushArgumentArray,
    ];

    /// Mnemonic used in listings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ReturnNoValue => "RETURN_NO_VAL",
            Self::Return => "RETURN",
            Self::PushSymbol => "PUSH_SYM",
            Self::Dup => "DUP",
            Self::Add => "ADD",
            Self::Subtract => "SUB",
            Self::Multiply => "MUL",
            Self::Divide => "DIV",
            Self::Modulo => "MOD",
            Self::Negate => "NEGATE",
            Self::Increment => "INCR",
            Self::Decrement => "DECR",
            Self::Gt => "GT",
            Self::Lt => "LT",
            Self::Ge => "GE",
            Self::Le => "LE",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::BitAnd => "BIT_AND",
            Self::BitOr => "BIT_OR",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Power => "POWER",
            Self::Concat => "CONCAT",
            Self::Assign => "ASSIGN",
            Self::CallSubroutine => "SUBR_CALL",
            Self::FetchReturnValue => "FETCH_RET_VAL",
            Self::Branch => "BRANCH",
            Self::BranchTrue => "BRANCH_TRUE",
            Self::BranchFalse => "BRANCH_FALSE",
            Self::BranchNever => "BRANCH_NEVER",
            Self::ArrayRef => "ARRAY_REF",
            Self::ArrayAssign => "ARRAY_ASSIGN",
            Self::BeginArrayIteration => "BEGIN_ARRAY_ITER",
            Self::ArrayIterationStep => "ARRAY_ITER",
            Self::InArray => "IN_ARRAY",
            Self::ArrayDelete => "ARRAY_DELETE",
            Self::PushArraySymbol => "PUSH_ARRAY_SYM",
            Self::ArrayRefAssignSetup => "ARRAY_REF_ASSIGN_SETUP",
            Self::PushArgument => "PUSH_ARG",
            Self::PushArgumentCount => "PUSH_ARG_COUNT",
            Self::PushArgumentArray => "PUSH_ARG_ARRAY",
        }
    }

    /// Operand cells that follow this opcode, in order.
    #[must_use]
    pub const fn operands(self) -> &'static [Operand] {
        use Operand::{Branch, Immediate, Symbol};
        match self {
            Self::PushSymbol | Self::Assign | Self::BeginArrayIteration => &[Symbol],
            Self::CallSubroutine | Self::PushArraySymbol => &[Symbol, Immediate],
            Self::Branch | Self::BranchTrue | Self::BranchFalse | Self::BranchNever => &[Branch],
            Self::ArrayRef | Self::ArrayAssign | Self::ArrayDelete => &[Immediate],
            Self::ArrayIterationStep => &[Symbol, Symbol, Branch],
            Self::ArrayRefAssignSetup => &[Immediate, Immediate],
            _ => &[],
        }
    }

    /// Total cells taken by this instruction, opcode included.
    #[must_use]
    pub const fn width(self) -> usize {
        1 + self.operands().len()
    }
}

/// One program cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Inst {
    /// Operation selector.
    Op(Opcode),
    /// Symbol operand.
    Sym(SymbolId),
    /// Immediate integer operand.
    Imm(i64),
    /// Branch offset, relative to the cell after this one.
    Branch(isize),
}

impl Inst {
    /// Returns true if this cell matches the operand kind.
    #[must_use]
    pub const fn fits(&self, operand: Operand) -> bool {
        matches!(
            (self, operand),
            (Self::Sym(_), Operand::Symbol)
                | (Self::Imm(_), Operand::Immediate)
                | (Self::Branch(_), Operand::Branch)
        )
    }
}
