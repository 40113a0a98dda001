//! Core value type held on the operand stack, in symbols, and in arrays.

use std::fmt;

use crate::arena::{ArrayId, NodeId, ProgramId, StrId};

/// Opaque host window reference.
///
/// The VM never interprets it; it is carried through continuations so native
/// routines can find the window a macro was started from and the window that
/// currently has its focus.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

/// Absolute position of an instruction cell: a program and an offset into it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CodeAddress {
    /// Program holding the cell.
    pub program: ProgramId,
    /// Cell index within the program.
    pub offset: usize,
}

impl CodeAddress {
    /// Creates an address.
    #[must_use]
    pub const fn new(program: ProgramId, offset: usize) -> Self {
        Self { program, offset }
    }

    /// Returns the address `delta` cells away.
    #[must_use]
    pub fn offset_by(self, delta: isize) -> Self {
        Self {
            program: self.program,
            offset: self.offset.wrapping_add_signed(delta),
        }
    }
}

impl fmt::Display for CodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}+{}", self.program.raw(), self.offset)
    }
}

/// Position of an array iteration: the array and the next node to visit.
///
/// `node == None` means the iteration is exhausted. A cursor holds no
/// ownership; the collector does not trace it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cursor {
    /// Array being iterated.
    pub array: ArrayId,
    /// Node whose key is returned by the next step.
    pub node: Option<NodeId>,
}

/// A macro value.
///
/// Values are `Copy`. Strings and arrays are handles into the heap, so a copy
/// shares the payload until the array is explicitly deep-copied.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Value {
    /// Unset slot. Reading it as an operand is an error.
    #[default]
    NoValue,
    /// Integer.
    Int(i64),
    /// String in the string arena.
    Str(StrId),
    /// Sparse array.
    Array(ArrayId),
    /// Array iteration cursor (stored in hidden iterator locals).
    Cursor(Cursor),
    /// Saved return address. `None` marks the outermost call.
    Code(Option<CodeAddress>),
    /// Saved frame pointer. `None` marks the outermost call.
    Frame(Option<usize>),
}

impl Value {
    /// Returns the name of this value's tag, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::NoValue => "unset",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Cursor(_) => "iterator",
            Self::Code(_) => "code address",
            Self::Frame(_) => "frame",
        }
    }

    /// Returns true for [`Value::NoValue`].
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::NoValue)
    }

    /// Returns true for arrays.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the array handle, if any.
    #[must_use]
    pub const fn as_array(&self) -> Option<ArrayId> {
        match self {
            Self::Array(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the string handle, if any.
    #[must_use]
    pub const fn as_str_id(&self) -> Option<StrId> {
        match self {
            Self::Str(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Int(i64::from(b))
    }
}

impl From<StrId> for Value {
    fn from(id: StrId) -> Self {
        Self::Str(id)
    }
}

impl From<ArrayId> for Value {
    fn from(id: ArrayId) -> Self {
        Self::Array(id)
    }
}

// =============================================================================
// String to number coercion
// =============================================================================

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Converts a macro string to an integer.
///
/// Accepts optional blanks or tabs, an optional sign, decimal digits, and
/// trailing blanks or tabs. An empty (or sign-only) string is 0. Anything
/// else is rejected. Overflow wraps.
#[must_use]
pub fn string_to_number(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    let mut i = 0;

    while i < bytes.len() && is_blank(bytes[i]) {
        i += 1;
    }

    let negative = match bytes.get(i) {
        Some(b'-') => {
            i += 1;
            true
        }
        Some(b'+') => {
            i += 1;
            false
        }
        _ => false,
    };

    let mut n: i64 = 0;
    while let Some(&b) = bytes.get(i) {
        if !b.is_ascii_digit() {
            break;
        }
        n = n.wrapping_mul(10).wrapping_add(i64::from(b - b'0'));
        i += 1;
    }

    while i < bytes.len() && is_blank(bytes[i]) {
        i += 1;
    }

    if i < bytes.len() {
        return None;
    }

    Some(if negative { n.wrapping_neg() } else { n })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::RawHandle;

    #[test]
    fn default_is_unset() {
        assert!(Value::default().is_unset());
    }

    #[test]
    fn bool_converts_to_int() {
        assert_eq!(Value::from(true), Value::Int(1));
        assert_eq!(Value::from(false), Value::Int(0));
    }

    #[test]
    fn accessors() {
        let arr = ArrayId(RawHandle::new(0, 1));
        assert_eq!(Value::Array(arr).as_array(), Some(arr));
        assert_eq!(Value::Int(3).as_array(), None);
        assert_eq!(Value::Int(3).as_int(), Some(3));
        assert!(Value::Array(arr).is_array());
        assert_eq!(Value::Array(arr).type_name(), "array");
    }

    #[test]
    fn code_address_offset() {
        let program = ProgramId(RawHandle::new(0, 1));
        let addr = CodeAddress::new(program, 10);
        assert_eq!(addr.offset_by(-3).offset, 7);
        assert_eq!(addr.offset_by(5).offset, 15);
    }

    #[test]
    fn string_to_number_basics() {
        assert_eq!(string_to_number("42"), Some(42));
        assert_eq!(string_to_number("-17"), Some(-17));
        assert_eq!(string_to_number("+5"), Some(5));
        assert_eq!(string_to_number("  \t12\t "), Some(12));
    }

    #[test]
    fn string_to_number_empty_is_zero() {
        assert_eq!(string_to_number(""), Some(0));
        assert_eq!(string_to_number("   "), Some(0));
        assert_eq!(string_to_number("-"), Some(0));
    }

    #[test]
    fn string_to_number_rejects_garbage() {
        assert_eq!(string_to_number("12a"), None);
        assert_eq!(string_to_number("abc"), None);
        assert_eq!(string_to_number("1 2"), None);
        assert_eq!(string_to_number("--1"), None);
        assert_eq!(string_to_number("\n1"), None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn decimal_rendering_parses_back(n in any::<i64>()) {
            prop_assert_eq!(string_to_number(&n.to_string()), Some(n));
        }

        #[test]
        fn padding_is_ignored(n in -1_000_000i64..1_000_000, lead in "[ \t]{0,4}", trail in "[ \t]{0,4}") {
            let s = format!("{lead}{n}{trail}");
            prop_assert_eq!(string_to_number(&s), Some(n));
        }

        #[test]
        fn letters_are_rejected(s in "[0-9]{0,3}[a-zA-Z][0-9a-zA-Z]{0,5}") {
            prop_assert_eq!(string_to_number(&s), None);
        }
    }
}
