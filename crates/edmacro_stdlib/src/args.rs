//! Argument checks shared by the built-in routines.
//!
//! Messages contain `%s`, which the VM replaces with the name the routine
//! was called by.

use edmacro_foundation::{Error, Result, Value};
use edmacro_language::NativeCall;

/// Reads an integer argument. Numeric strings are accepted.
///
/// # Errors
///
/// Returns "`name` called with non-integer argument" for anything else.
pub fn int_arg(call: &NativeCall<'_>, value: Value) -> Result<i64> {
    call.int(value)
        .map_err(|_| Error::native("%s called with non-integer argument"))
}

/// Reads a string argument. Integers are formatted in decimal.
///
/// # Errors
///
/// Returns "`name` called with unknown object" for arrays and unset values.
pub fn string_arg(call: &NativeCall<'_>, value: Value) -> Result<String> {
    if value.is_unset() || value.is_array() {
        return Err(Error::native("%s called with unknown object"));
    }
    call.string(value)
        .map_err(|_| Error::native("%s called with unknown object"))
}

/// Fails unless `args.len()` is in `min..=max`.
///
/// # Errors
///
/// Returns "Wrong number of arguments to function `name`".
pub fn arg_count(args: &[Value], min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else {
        Err(Error::native("Wrong number of arguments to function %s"))
    }
}

/// Fails when fewer than `min` arguments were passed.
///
/// # Errors
///
/// Returns "Too few arguments to function `name`".
pub fn at_least(args: &[Value], min: usize) -> Result<()> {
    if args.len() < min {
        Err(Error::native("Too few arguments to function %s"))
    } else {
        Ok(())
    }
}
