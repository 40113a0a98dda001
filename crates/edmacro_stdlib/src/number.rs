//! Number routines.

use edmacro_foundation::{Result, Value};
use edmacro_language::{NativeCall, Vm};

use crate::args::{at_least, int_arg};

/// Registers `min` and `max`.
pub fn register(vm: &mut Vm) {
    vm.define_native("min", min);
    vm.define_native("max", max);
}

/// `min(a, b, ...)`: the smallest of two or more integers.
///
/// # Errors
///
/// Fails with fewer than two arguments or a non-integer argument.
pub fn min(call: &mut NativeCall<'_>, args: &[Value]) -> Result<Value> {
    fold(call, args, i64::min)
}

/// `max(a, b, ...)`: the largest of two or more integers.
///
/// # Errors
///
/// Fails with fewer than two arguments or a non-integer argument.
pub fn max(call: &mut NativeCall<'_>, args: &[Value]) -> Result<Value> {
    fold(call, args, i64::max)
}

fn fold(call: &NativeCall<'_>, args: &[Value], pick: fn(i64, i64) -> i64) -> Result<Value> {
    at_least(args, 2)?;
    let mut best = int_arg(call, args[0])?;
    for &value in &args[1..] {
        best = pick(best, int_arg(call, value)?);
    }
    Ok(Value::Int(best))
}
