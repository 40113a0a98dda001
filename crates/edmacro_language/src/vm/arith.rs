//! Integer arithmetic of the macro language.
//!
//! Integers are 64-bit and wrap on overflow, except exponentiation which
//! reports an out-of-range result.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

use edmacro_foundation::{Error, ErrorKind, Result};

use crate::opcode::Opcode;

/// Applies a two-operand integer opcode.
pub(crate) fn binary(op: Opcode, left: i64, right: i64) -> Result<i64> {
    Ok(match op {
        Opcode::Add => left.wrapping_add(right),
        Opcode::Subtract => left.wrapping_sub(right),
        Opcode::Multiply => left.wrapping_mul(right),
        Opcode::Divide => {
            if right == 0 {
                return Err(Error::new(ErrorKind::DivisionByZero));
            }
            left.wrapping_div(right)
        }
        Opcode::Modulo => {
            if right == 0 {
                return Err(Error::new(ErrorKind::ModuloByZero));
            }
            left.wrapping_rem(right)
        }
        Opcode::Gt => i64::from(left > right),
        Opcode::Lt => i64::from(left < right),
        Opcode::Ge => i64::from(left >= right),
        Opcode::Le => i64::from(left <= right),
        Opcode::BitAnd => left & right,
        Opcode::BitOr => left | right,
        Opcode::And => i64::from(left != 0 && right != 0),
        Opcode::Or => i64::from(left != 0 || right != 0),
        Opcode::Power => power(left, right)?,
        other => return Err(Error::internal(format!("{} is not binary", other.name()))),
    })
}

/// Applies a one-operand integer opcode.
pub(crate) fn unary(op: Opcode, n: i64) -> Result<i64> {
    Ok(match op {
        Opcode::Negate => n.wrapping_neg(),
        Opcode::Increment => n.wrapping_add(1),
        Opcode::Decrement => n.wrapping_sub(1),
        Opcode::Not => i64::from(n == 0),
        other => return Err(Error::internal(format!("{} is not unary", other.name()))),
    })
}

/// Integer exponentiation through floating point, rounded to nearest.
///
/// A negative exponent gives 0 unless the base is 1 or -1; a zero base with
/// a negative exponent is out of range.
pub(crate) fn power(base: i64, exponent: i64) -> Result<i64> {
    const OUT_OF_RANGE: ErrorKind = ErrorKind::Range("exponentiation");
    // 2^63, the first magnitude outside i64
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if exponent < 0 && base != 1 && base != -1 {
        return if base == 0 {
            Err(Error::new(OUT_OF_RANGE))
        } else {
            Ok(0)
        };
    }

    let raw = (base as f64).powf(exponent as f64);
    let rounded = if base < 0 && exponent & 1 == 1 {
        raw - 0.5
    } else {
        raw + 0.5
    };
    if !rounded.is_finite() || rounded >= LIMIT || rounded < -LIMIT {
        return Err(Error::new(OUT_OF_RANGE));
    }
    Ok(rounded as i64)
}
