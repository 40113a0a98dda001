//! Integration tests for Value and string coercion

use edmacro_foundation::{Value, string_to_number};
use proptest::prelude::*;

#[test]
fn default_is_unset() {
    assert!(Value::default().is_unset());
    assert!(!Value::Int(0).is_unset());
}

#[test]
fn conversions() {
    assert_eq!(Value::from(true), Value::Int(1));
    assert_eq!(Value::from(false), Value::Int(0));
    assert_eq!(Value::from(-7i64), Value::Int(-7));
    assert_eq!(Value::Int(3).as_int(), Some(3));
    assert_eq!(Value::NoValue.as_int(), None);
    assert_eq!(Value::Int(3).as_array(), None);
}

// =============================================================================
// String to number
// =============================================================================

#[test]
fn accepts_padded_signed_numbers() {
    assert_eq!(string_to_number("42"), Some(42));
    assert_eq!(string_to_number("  -17\t"), Some(-17));
    assert_eq!(string_to_number("+5"), Some(5));
}

#[test]
fn empty_and_sign_only_are_zero() {
    assert_eq!(string_to_number(""), Some(0));
    assert_eq!(string_to_number("   "), Some(0));
    assert_eq!(string_to_number("-"), Some(0));
}

#[test]
fn rejects_junk() {
    assert_eq!(string_to_number("12abc"), None);
    assert_eq!(string_to_number("1 2"), None);
    assert_eq!(string_to_number("0x10"), None);
}

proptest! {
    #[test]
    fn decimal_rendering_parses_back(n in any::<i64>()) {
        prop_assert_eq!(string_to_number(&n.to_string()), Some(n));
    }
}
