//! Integration tests for Error types
//!
//! The display of an error is the message a macro user sees.

use edmacro_foundation::{Error, ErrorContext, ErrorKind};

// =============================================================================
// Messages
// =============================================================================

#[test]
fn messages() {
    let cases = [
        (ErrorKind::DivisionByZero, "division by zero"),
        (ErrorKind::StackOverflow, "stack overflow"),
        (ErrorKind::UnsetValue, "use of unset value"),
        (ErrorKind::ArrayToString, "can't convert array to string"),
        (ErrorKind::IndexNonArray, "operator [] on non-array"),
        (
            ErrorKind::NotCallable("x".to_string()),
            "x is not a function or subroutine",
        ),
        (ErrorKind::VariableNotSet("y".to_string()), "variable not set: y"),
    ];
    for (kind, message) in cases {
        assert_eq!(Error::new(kind).to_string(), message);
    }
}

#[test]
fn native_message_is_verbatim() {
    let err = Error::native("length requires 1 argument");
    assert!(matches!(err.kind, ErrorKind::Native(_)));
    assert_eq!(err.to_string(), "length requires 1 argument");
}

#[test]
fn stale_handle() {
    assert_eq!(Error::stale("array").to_string(), "stale array handle");
}

// =============================================================================
// Context
// =============================================================================

#[test]
fn context_does_not_change_message() {
    let err = Error::new(ErrorKind::ModuloByZero).with_context(
        ErrorContext::new()
            .with_routine("wrap")
            .with_offset(12)
            .with_frame("called from main"),
    );
    assert_eq!(err.to_string(), "modulo by zero");

    let context = err.context.unwrap();
    assert_eq!(context.routine.as_deref(), Some("wrap"));
    assert_eq!(context.offset, Some(12));
    assert_eq!(context.stack.len(), 1);
}
