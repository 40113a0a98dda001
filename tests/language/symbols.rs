//! Integration tests for the symbol table

use edmacro_foundation::Value;
use edmacro_language::{Promotion, SymbolKind, Vm};

#[test]
fn argument_symbols_are_preinstalled() {
    let vm = Vm::new();
    for name in ["$1", "$5", "$9", "$n_args"] {
        assert!(vm.lookup_symbol(name).is_some(), "{name}");
    }
    assert!(vm.lookup_symbol("$10").is_none());
}

#[test]
fn locals_hide_globals_while_building() {
    let mut vm = Vm::new();
    let global = vm.install_symbol("x", SymbolKind::Global, Value::Int(1));

    vm.begin_program();
    let local = vm.symbols_mut().install_local("x");
    assert_eq!(vm.lookup_symbol("x"), Some(local));

    vm.finish_program();
    assert_eq!(vm.lookup_symbol("x"), Some(global));
}

#[test]
fn forward_reference_is_promoted() {
    let mut vm = Vm::new();
    vm.begin_program();
    let callee = vm.symbols_mut().install_local("helper");
    assert_eq!(vm.promote_local_to_global(callee).unwrap(), Promotion::Promoted);
    assert_eq!(vm.promote_local_to_global(callee).unwrap(), Promotion::NotLocal);
    vm.finish_program();

    assert_eq!(vm.lookup_symbol("helper"), Some(callee));
}

#[test]
fn promotion_reports_shadowing() {
    let mut vm = Vm::new();
    vm.install_symbol("twice", SymbolKind::Global, Value::Int(0));
    vm.begin_program();
    let local = vm.symbols_mut().install_local("twice");
    assert_eq!(vm.promote_local_to_global(local).unwrap(), Promotion::Shadowed);
    assert_eq!(vm.lookup_symbol("twice"), Some(local));
}

#[test]
fn constants_are_shared() {
    let mut vm = Vm::new();
    let a = vm.install_string_constant("hello");
    let b = vm.install_string_constant("hello");
    let c = vm.install_string_constant("world");
    assert_eq!(a, b);
    assert_ne!(a, c);

    assert_eq!(vm.install_int_constant(7), vm.install_int_constant(7));
    assert_ne!(vm.install_int_constant(7), vm.install_int_constant(8));
}

#[test]
fn iterator_symbols_are_distinct() {
    let mut vm = Vm::new();
    vm.begin_program();
    let first = vm.install_iterator_symbol();
    let second = vm.install_iterator_symbol();
    assert_ne!(first, second);
    assert!(vm.symbols().get(first).unwrap().name().starts_with("aryiter #"));
}
