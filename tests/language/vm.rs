//! Integration tests for the VM
//!
//! Programs are assembled by hand the way a compiler front end would emit
//! them, then run through the public execution API.

use edmacro_foundation::{ProgramId, Result, SymbolId, Value, WindowId};
use edmacro_language::{ExecStatus, Opcode, Vm, VmConfig};

fn op(vm: &mut Vm, op: Opcode) -> usize {
    vm.builder_mut().add_op(op).unwrap()
}

fn push(vm: &mut Vm, symbol: SymbolId) {
    op(vm, Opcode::PushSymbol);
    vm.builder_mut().add_symbol(symbol).unwrap();
}

fn push_int(vm: &mut Vm, n: i64) {
    let constant = vm.install_int_constant(n);
    push(vm, constant);
}

fn assign(vm: &mut Vm, symbol: SymbolId) {
    op(vm, Opcode::Assign);
    vm.builder_mut().add_symbol(symbol).unwrap();
}

fn forward_branch(vm: &mut Vm, branch: Opcode) -> usize {
    op(vm, branch);
    vm.builder_mut().add_branch_offset(0).unwrap()
}

fn here(vm: &Vm) -> usize {
    vm.builder().current_address()
}

fn run(vm: &mut Vm, program: ProgramId) -> Result<(Option<Value>, usize)> {
    let mut slices = 1;
    let mut status = vm.execute_macro(program, WindowId(1), &[])?;
    loop {
        match status {
            ExecStatus::Done(value) => return Ok((value, slices)),
            ExecStatus::Preempt(cont) | ExecStatus::TimeLimit(cont) => {
                slices += 1;
                status = vm.continue_macro(cont)?;
            }
        }
    }
}

/// ```text
/// i = 0
/// while (i < limit) {
///     i = i + 1
///     if (i == stop) break
/// }
/// return i
/// ```
fn counting_loop(vm: &mut Vm, limit: i64, stop: i64) -> ProgramId {
    vm.begin_program();
    let i = vm.symbols_mut().install_local("i");
    push_int(vm, 0);
    assign(vm, i);

    vm.builder_mut().start_loop_address_list().unwrap();
    let top = here(vm);
    push(vm, i);
    push_int(vm, limit);
    op(vm, Opcode::Lt);
    let exit = forward_branch(vm, Opcode::BranchFalse);

    push(vm, i);
    push_int(vm, 1);
    op(vm, Opcode::Add);
    assign(vm, i);

    push(vm, i);
    push_int(vm, stop);
    op(vm, Opcode::Eq);
    let skip = forward_branch(vm, Opcode::BranchFalse);
    let brk = forward_branch(vm, Opcode::Branch);
    vm.builder_mut().register_break_address(brk).unwrap();
    let after_if = here(vm);
    vm.builder_mut().patch_branch(skip, after_if).unwrap();

    op(vm, Opcode::Branch);
    vm.builder_mut().add_branch_offset(top).unwrap();
    let end = here(vm);
    vm.builder_mut().patch_branch(exit, end).unwrap();
    vm.builder_mut().fill_loop_addresses(end, top).unwrap();

    push(vm, i);
    op(vm, Opcode::Return);
    vm.finish_program()
}

// =============================================================================
// Control flow
// =============================================================================

#[test]
fn loop_runs_to_limit() {
    let mut vm = Vm::new();
    let program = counting_loop(&mut vm, 7, -1);
    assert_eq!(run(&mut vm, program).unwrap().0, Some(Value::Int(7)));
}

#[test]
fn break_leaves_loop() {
    let mut vm = Vm::new();
    let program = counting_loop(&mut vm, 100, 3);
    assert_eq!(run(&mut vm, program).unwrap().0, Some(Value::Int(3)));
}

#[test]
fn long_loop_is_time_sliced() {
    let mut sliced = Vm::with_config(VmConfig::default().with_instruction_limit(50));
    let program = counting_loop(&mut sliced, 200, -1);
    let (value, slices) = run(&mut sliced, program).unwrap();
    assert_eq!(value, Some(Value::Int(200)));
    assert!(slices > 1);

    let mut unbounded = Vm::with_config(VmConfig::unbounded());
    let program = counting_loop(&mut unbounded, 200, -1);
    assert_eq!(run(&mut unbounded, program).unwrap(), (Some(Value::Int(200)), 1));
}

// =============================================================================
// Macros calling macros
// =============================================================================

#[test]
fn macro_calls_macro_with_arguments() {
    let mut vm = Vm::new();

    // double: return $1 * 2
    vm.begin_program();
    let first = vm.lookup_symbol("$1").unwrap();
    push(&mut vm, first);
    push_int(&mut vm, 2);
    op(&mut vm, Opcode::Multiply);
    op(&mut vm, Opcode::Return);
    let double = vm.finish_program();
    let double_sym = vm.define_macro("double", double);

    // main: return double(21) + 0
    vm.begin_program();
    push_int(&mut vm, 21);
    op(&mut vm, Opcode::CallSubroutine);
    vm.builder_mut().add_symbol(double_sym).unwrap();
    vm.builder_mut().add_immediate(1).unwrap();
    op(&mut vm, Opcode::FetchReturnValue);
    push_int(&mut vm, 0);
    op(&mut vm, Opcode::Add);
    op(&mut vm, Opcode::Return);
    let main = vm.finish_program();

    assert_eq!(run(&mut vm, main).unwrap().0, Some(Value::Int(42)));
}

#[test]
fn listing_shows_instructions() {
    let mut vm = Vm::new();
    let program = counting_loop(&mut vm, 2, -1);
    let listing = vm.listing(program).unwrap();

    assert!(listing.contains("PUSH_SYM i"));
    assert!(listing.contains("ASSIGN i"));
    assert!(listing.trim_end().ends_with("RETURN"));
}
