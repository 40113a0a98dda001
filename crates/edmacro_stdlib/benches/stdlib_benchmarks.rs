//! Benchmarks for edmacro_stdlib.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use edmacro_foundation::{ProgramId, WindowId};
use edmacro_language::{Opcode, Vm};
use edmacro_stdlib::register_all;

/// Assembles `return name("<text>", 3, -3)`.
fn substring_program(vm: &mut Vm, text: &str) -> ProgramId {
    vm.begin_program();
    let text = vm.install_string_constant(text);
    let from = vm.install_int_constant(3);
    let to = vm.install_int_constant(-3);
    for constant in [text, from, to] {
        vm.builder_mut().add_op(Opcode::PushSymbol).unwrap();
        vm.builder_mut().add_symbol(constant).unwrap();
    }
    let routine = vm.lookup_symbol("substring").unwrap();
    vm.builder_mut().add_op(Opcode::CallSubroutine).unwrap();
    vm.builder_mut().add_symbol(routine).unwrap();
    vm.builder_mut().add_immediate(3).unwrap();
    vm.builder_mut().add_op(Opcode::FetchReturnValue).unwrap();
    vm.builder_mut().add_op(Opcode::Return).unwrap();
    vm.finish_program()
}

fn bench_substring(c: &mut Criterion) {
    let mut group = c.benchmark_group("substring");

    for (label, len) in [("short", 16usize), ("long", 4096)] {
        let mut vm = Vm::new();
        register_all(&mut vm);
        let text = "x".repeat(len);
        let program = substring_program(&mut vm, &text);
        group.bench_function(label, |b| {
            b.iter(|| {
                let status = vm
                    .execute_macro(black_box(program), WindowId(1), &[])
                    .unwrap();
                black_box(status.result())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_substring);
criterion_main!(benches);
