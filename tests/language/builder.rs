//! Integration tests for the program builder

use edmacro_foundation::ErrorKind;
use edmacro_language::{Inst, Opcode, Vm, VmConfig};

#[test]
fn branch_offsets_are_relative_to_next_cell() {
    let mut vm = Vm::new();
    vm.begin_program();
    let builder = vm.builder_mut();
    builder.add_op(Opcode::Branch).unwrap();
    let at = builder.add_branch_offset(0).unwrap();
    assert_eq!(builder.code()[at], Inst::Branch(-2));

    builder.patch_branch(at, 6).unwrap();
    assert_eq!(builder.code()[at], Inst::Branch(4));
}

#[test]
fn program_size_is_bounded() {
    let mut vm = Vm::with_config(VmConfig::default().with_program_size(3));
    vm.begin_program();
    for _ in 0..3 {
        vm.builder_mut().add_op(Opcode::Dup).unwrap();
    }
    let err = vm.builder_mut().add_op(Opcode::Dup).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProgramTooLarge);
    assert_eq!(err.to_string(), "macro too large");
}

#[test]
fn swap_code_blocks_exchanges_adjacent_runs() {
    let mut vm = Vm::new();
    vm.begin_program();
    let builder = vm.builder_mut();
    for n in 0..5 {
        builder.add_immediate(n).unwrap();
    }
    builder.swap_code_blocks(0, 2, 5).unwrap();
    let cells: Vec<Inst> = builder.code().to_vec();
    assert_eq!(
        cells,
        vec![
            Inst::Imm(2),
            Inst::Imm(3),
            Inst::Imm(4),
            Inst::Imm(0),
            Inst::Imm(1)
        ]
    );
    assert!(builder.swap_code_blocks(3, 2, 5).is_err());
}

// =============================================================================
// Loop fixups
// =============================================================================

#[test]
fn breaks_and_continues_are_patched() {
    let mut vm = Vm::new();
    vm.begin_program();
    let builder = vm.builder_mut();

    builder.start_loop_address_list().unwrap();
    builder.add_op(Opcode::Branch).unwrap();
    let brk = builder.add_branch_offset(0).unwrap();
    builder.register_break_address(brk).unwrap();

    builder.start_loop_address_list().unwrap();
    builder.add_op(Opcode::Branch).unwrap();
    let inner = builder.add_branch_offset(0).unwrap();
    builder.register_continue_address(inner).unwrap();
    assert_eq!(builder.open_loops(), 2);

    builder.fill_loop_addresses(20, 4).unwrap();
    assert_eq!(builder.code()[inner], Inst::Branch(4 - (inner as isize + 1)));
    assert_eq!(builder.code()[brk], Inst::Branch(-2));

    builder.fill_loop_addresses(30, 0).unwrap();
    assert_eq!(builder.code()[brk], Inst::Branch(30 - (brk as isize + 1)));
    assert_eq!(builder.open_loops(), 0);
}

#[test]
fn break_outside_loop() {
    let mut vm = Vm::new();
    vm.begin_program();
    let err = vm.builder_mut().register_break_address(0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutsideLoop);
}

#[test]
fn loop_stack_is_bounded() {
    let mut vm = Vm::with_config(VmConfig::default().with_loop_stack_size(3));
    vm.begin_program();
    let builder = vm.builder_mut();
    builder.start_loop_address_list().unwrap();
    builder.register_break_address(0).unwrap();
    builder.register_continue_address(0).unwrap();
    let err = builder.register_break_address(0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::LoopStackOverflow);
}
