//! Error types for the macro VM.
//!
//! Uses `thiserror`. The `Display` of an [`Error`] is the message a user sees
//! when a macro aborts; where it happened is kept separately in
//! [`ErrorContext`].

use std::fmt;

use thiserror::Error;

/// The main error type for macro VM operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an error reported by a native routine.
    #[must_use]
    pub fn native(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Native(message.into()))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    /// Creates a stale handle error.
    #[must_use]
    pub fn stale(what: &'static str) -> Self {
        Self::new(ErrorKind::StaleHandle(what))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Categorized error kinds for pattern matching.
///
/// Variants carrying a `String` hold the name of the offending symbol (or the
/// offending key) that is shown in the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    // -------------------------------------------------------------------------
    // Stack discipline
    // -------------------------------------------------------------------------
    /// Push past the configured stack size.
    #[error("stack overflow")]
    StackOverflow,

    /// Pop from an empty stack.
    #[error("stack underflow")]
    StackUnderflow,

    // -------------------------------------------------------------------------
    // Type errors
    // -------------------------------------------------------------------------
    /// A string operand was not a number.
    #[error("string could not be converted to number")]
    StringToNumber,

    /// An array was used where an integer is required.
    #[error("can't convert array to integer")]
    ArrayToInteger,

    /// An array was used where a string is required.
    #[error("can't convert array to string")]
    ArrayToString,

    /// An unset value used as an operand.
    #[error("use of unset value")]
    UnsetValue,

    /// Read of an unset variable.
    #[error("variable not set: {0}")]
    VariableNotSet(String),

    /// Read of a symbol that holds no value (a routine, for example).
    #[error("reading non-variable: {0}")]
    ReadingNonVariable(String),

    /// Assignment to `$1`..`$9` or `$n_args`.
    #[error("assignment to function argument: {0}")]
    AssignToArgument(String),

    /// Assignment to a constant or computed property.
    #[error("assignment to read-only variable: {0}")]
    AssignToReadOnly(String),

    /// Assignment to a routine symbol.
    #[error("assignment to non-variable: {0}")]
    AssignToNonVariable(String),

    /// Positional argument beyond the argument count.
    #[error("referenced undefined argument: {0}")]
    UndefinedArgument(String),

    /// One operand is an array and the other is not.
    #[error("can't mix math with arrays and non-arrays")]
    MixedArrayMath,

    /// Two operands that cannot be compared.
    #[error("incompatible types to compare")]
    IncompatibleCompare,

    // -------------------------------------------------------------------------
    // Array errors
    // -------------------------------------------------------------------------
    /// Subscript applied to a non-array.
    #[error("operator [] on non-array")]
    IndexNonArray,

    /// Right operand of `in` is not an array.
    #[error("operator in on non-array")]
    InNonArray,

    /// `for (k in x)` where `x` is not an array.
    #[error("can't iterate non-array")]
    IterateNonArray,

    /// `delete x[...]` where `x` is not an array.
    #[error("attempt to delete from non-array")]
    DeleteNonArray,

    /// Element assignment into a non-array.
    #[error("cannot assign array element of non-array")]
    AssignElementOfNonArray,

    /// Array symbol cannot be used as an lvalue.
    #[error("assigning to non-lvalue array or non-array: {0}")]
    NonLvalueArray(String),

    /// Indexed read of a key that is not present.
    #[error("referenced array value not in array: {0}")]
    KeyNotFound(String),

    /// Subscript that is neither a string nor an integer.
    #[error("can only index array with string or int.")]
    BadSubscript,

    /// Element assignment with zero subscripts.
    #[error("empty operator []")]
    EmptySubscript,

    /// Read-modify-write with zero subscripts.
    #[error("array[] not an lvalue")]
    EmptyLvalueSubscript,

    /// Insertion into an array failed.
    #[error("array insertion failure")]
    ArrayInsertion,

    /// Deep copy of an array failed.
    #[error("array copy failed")]
    ArrayCopy,

    /// Hidden iterator local does not hold an iterator.
    #[error("bad temporary iterator: {0}")]
    BadIterator(String),

    /// Loop variable of an array iteration is not assignable.
    #[error("can't assign to: {0}")]
    CannotAssignTo(String),

    // -------------------------------------------------------------------------
    // Arithmetic errors
    // -------------------------------------------------------------------------
    /// Integer division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Integer modulo by zero.
    #[error("modulo by zero")]
    ModuloByZero,

    /// Range error from a numeric operation.
    #[error("{0} result out of range")]
    Range(&'static str),

    // -------------------------------------------------------------------------
    // Call errors
    // -------------------------------------------------------------------------
    /// Call of a symbol that is not a routine.
    #[error("{0} is not a function or subroutine")]
    NotCallable(String),

    /// A routine's result was requested but it produced none.
    #[error("{0} does not return a value")]
    NoReturnValue(String),

    /// A macro subroutine returned without a value into an expression.
    #[error("using return value of {0} which does not return a value")]
    UsingMissingReturnValue(String),

    /// Message reported by a native routine.
    #[error("{0}")]
    Native(String),

    // -------------------------------------------------------------------------
    // Resource and builder errors
    // -------------------------------------------------------------------------
    /// The program builder ran out of cells.
    #[error("macro too large")]
    ProgramTooLarge,

    /// Too many pending break/continue markers.
    #[error("loop stack overflow")]
    LoopStackOverflow,

    /// `break` or `continue` with no enclosing loop.
    #[error("break or continue outside loop")]
    OutsideLoop,

    /// Collection requested while a macro is checked out.
    #[error("garbage collection while a macro is running")]
    CollectorBusy,

    /// A handle refers to an entry that has been freed.
    #[error("stale {0} handle")]
    StaleHandle(&'static str),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Name of the routine that was executing, if known.
    pub routine: Option<String>,
    /// Offset of the failing instruction within its program.
    pub offset: Option<usize>,
    /// Call trace, innermost first.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the routine name.
    #[must_use]
    pub fn with_routine(mut self, routine: impl Into<String>) -> Self {
        self.routine = Some(routine.into());
        self
    }

    /// Sets the instruction offset.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Adds a call trace frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(routine) = &self.routine {
            write!(f, "in {routine}")?;
        }
        if let Some(offset) = self.offset {
            if self.routine.is_some() {
                write!(f, " ")?;
            }
            write!(f, "at {offset}")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  called from {frame}")?;
            }
        }
        Ok(())
    }
}
