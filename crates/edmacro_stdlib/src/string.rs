//! String routines.
//!
//! Positions and lengths count characters, not bytes.

use edmacro_foundation::{Result, Value};
use edmacro_language::{NativeCall, Vm};

use crate::args::{arg_count, int_arg, string_arg};

/// Registers `length`, `substring`, `toupper` and `tolower`.
pub fn register(vm: &mut Vm) {
    vm.define_native("length", length);
    vm.define_native("substring", substring);
    vm.define_native("toupper", toupper);
    vm.define_native("tolower", tolower);
}

/// `length(s)`: number of characters in `s`.
///
/// # Errors
///
/// Fails on a wrong argument count or a non-string argument.
pub fn length(call: &mut NativeCall<'_>, args: &[Value]) -> Result<Value> {
    arg_count(args, 1, 1)?;
    let text = string_arg(call, args[0])?;
    Ok(Value::Int(char_count(&text)))
}

/// `substring(s, from[, to])`: characters `from..to` of `s`.
///
/// Negative positions count from the end. Both ends are clamped to the
/// string, and a `to` before `from` yields the empty string.
///
/// # Errors
///
/// Fails on a wrong argument count or bad argument types.
pub fn substring(call: &mut NativeCall<'_>, args: &[Value]) -> Result<Value> {
    arg_count(args, 2, 3)?;
    let text = string_arg(call, args[0])?;
    let len = char_count(&text);
    let from = clamp_position(int_arg(call, args[1])?, len);
    let to = match args.get(2) {
        Some(&value) => clamp_position(int_arg(call, value)?, len),
        None => len,
    }
    .max(from);

    let slice: String = text
        .chars()
        .skip(position(from))
        .take(position(to - from))
        .collect();
    Ok(call.string_value(slice))
}

/// `toupper(s)`: `s` with ASCII letters upper-cased.
///
/// # Errors
///
/// Fails on a wrong argument count or a non-string argument.
pub fn toupper(call: &mut NativeCall<'_>, args: &[Value]) -> Result<Value> {
    arg_count(args, 1, 1)?;
    let text = string_arg(call, args[0])?;
    Ok(call.string_value(text.to_ascii_uppercase()))
}

/// `tolower(s)`: `s` with ASCII letters lower-cased.
///
/// # Errors
///
/// Fails on a wrong argument count or a non-string argument.
pub fn tolower(call: &mut NativeCall<'_>, args: &[Value]) -> Result<Value> {
    arg_count(args, 1, 1)?;
    let text = string_arg(call, args[0])?;
    Ok(call.string_value(text.to_ascii_lowercase()))
}

fn char_count(text: &str) -> i64 {
    i64::try_from(text.chars().count()).unwrap_or(i64::MAX)
}

fn clamp_position(pos: i64, len: i64) -> i64 {
    let pos = if pos < 0 { pos.saturating_add(len) } else { pos };
    pos.clamp(0, len)
}

fn position(pos: i64) -> usize {
    usize::try_from(pos).unwrap_or(0)
}
