//! Disassembly of programs and dumps of suspended stacks.

use std::fmt::Write;

use edmacro_foundation::{ProgramId, Result, SymbolId, Value};
use edmacro_storage::Heap;

use crate::opcode::{Inst, Opcode};
use crate::vm::{Continuation, Vm};

/// Longest string prefix shown by [`describe_value`].
const PREVIEW_LEN: usize = 20;

/// Renders a value for listings: `i=3`, `s="abc"[3]`, `<array>`, ...
#[must_use]
pub fn describe_value(heap: &Heap, value: Value) -> String {
    match value {
        Value::NoValue => "<no value>".to_string(),
        Value::Int(n) => format!("i={n}"),
        Value::Str(id) => match heap.string(id) {
            Ok(text) => {
                let preview: String = text
                    .chars()
                    .take(PREVIEW_LEN)
                    .map(|c| if c.is_control() { '?' } else { c })
                    .collect();
                let more = if text.chars().count() > PREVIEW_LEN { "..." } else { "" };
                format!("s=\"{preview}\"{more}[{}]", text.len())
            }
            Err(_) => "s=<freed>".to_string(),
        },
        Value::Array(_) => "<array>".to_string(),
        Value::Cursor(_) => "<iterator>".to_string(),
        Value::Code(Some(at)) => format!("<return to {at}>"),
        Value::Code(None) => "<return to host>".to_string(),
        Value::Frame(Some(frame)) => format!("<frame {frame}>"),
        Value::Frame(None) => "<no frame>".to_string(),
    }
}

impl Vm {
    /// Disassembles a program, one instruction per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the program has been freed.
    pub fn listing(&self, program: ProgramId) -> Result<String> {
        let code = self.program(program)?.code();
        let mut out = String::new();
        let mut at = 0;
        while at < code.len() {
            let Inst::Op(op) = code[at] else {
                let _ = writeln!(out, "{at:5}  {:?}", code[at]);
                at += 1;
                continue;
            };
            let operands = code.get(at + 1..at + op.width()).unwrap_or(&[]);
            let _ = writeln!(out, "{at:5}  {:>22} {}", op.name(), self.render_operands(op, operands));
            at += op.width();
        }
        Ok(out)
    }

    fn symbol_name(&self, id: SymbolId) -> String {
        self.symbols()
            .get(id)
            .map_or_else(|_| "<freed>".to_string(), |symbol| symbol.name().to_string())
    }

    fn render_operands(&self, op: Opcode, operands: &[Inst]) -> String {
        let sym = |i: usize| match operands.get(i) {
            Some(Inst::Sym(id)) => self.symbol_name(*id),
            _ => "?".to_string(),
        };
        let imm = |i: usize| match operands.get(i) {
            Some(Inst::Imm(n)) => *n,
            _ => 0,
        };
        let branch = |i: usize| match operands.get(i) {
            Some(Inst::Branch(offset)) => *offset,
            _ => 0,
        };

        match op {
            Opcode::PushSymbol | Opcode::Assign => {
                let name = sym(0);
                match operands.first() {
                    Some(Inst::Sym(id)) if name.starts_with("string #") => {
                        let value = self.symbols().get(*id).map(|s| s.value).unwrap_or_default();
                        format!("{name} {}", describe_value(self.heap(), value))
                    }
                    _ => name,
                }
            }
            Opcode::Branch | Opcode::BranchTrue | Opcode::BranchFalse | Opcode::BranchNever => {
                format!("to=({})", branch(0))
            }
            Opcode::CallSubroutine => format!("{} ({} arg)", sym(0), imm(1)),
            Opcode::BeginArrayIteration => format!("{} in", sym(0)),
            Opcode::ArrayIterationStep => {
                format!("{} = {}++ end-loop=({})", sym(0), sym(1), branch(2))
            }
            Opcode::ArrayRef | Opcode::ArrayDelete | Opcode::ArrayAssign => {
                format!("nDim={}", imm(0))
            }
            Opcode::ArrayRefAssignSetup => {
                format!("binOp={} nDim={}", imm(0) != 0, imm(1))
            }
            Opcode::PushArraySymbol => {
                let mode = if imm(1) != 0 { "createAndRef" } else { "refOnly" };
                format!("{} {mode}", sym(0))
            }
            _ => String::new(),
        }
    }

    /// Dumps a suspended stack from the top down, labelling the cells of the
    /// innermost frame.
    #[must_use]
    pub fn stack_dump(&self, cont: &Continuation) -> String {
        let stack = cont.stack();
        let frame = cont.frame() as isize;
        let arg_count = match frame
            .checked_sub(2)
            .and_then(|i| stack.get(usize::try_from(i).ok()?))
        {
            Some(Value::Int(n)) => *n as isize,
            _ => 0,
        };

        let mut out = String::from("Stack ----->\n");
        for (index, value) in stack.iter().enumerate().rev() {
            let offset = index as isize - frame;
            let label = match offset {
                0 => "FrameP".to_string(),
                -1 => "args".to_string(),
                -2 => "NArgs".to_string(),
                -3 => "OldFP".to_string(),
                -4 => "RetPC".to_string(),
                o if o < -4 && o >= -4 - arg_count => format!("Arg{}", o + 5 + arg_count),
                _ => String::new(),
            };
            let _ = writeln!(
                out,
                "{index:6} {label:>7} {offset:+4} {}",
                describe_value(self.heap(), *value)
            );
        }
        out.push_str("--------------Stack base--------------\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edmacro_foundation::WindowId;

    #[test]
    fn lists_operands() {
        let mut vm = Vm::new();
        let greeting = vm.install_string_constant("hi");
        let one = vm.install_int_constant(1);
        let print = vm.define_native("print", |_, _| Ok(Value::NoValue));
        vm.begin_program();
        let b = vm.builder_mut();
        b.add_op(Opcode::PushSymbol).unwrap();
        b.add_symbol(greeting).unwrap();
        b.add_op(Opcode::PushSymbol).unwrap();
        b.add_symbol(one).unwrap();
        b.add_op(Opcode::CallSubroutine).unwrap();
        b.add_symbol(print).unwrap();
        b.add_immediate(2).unwrap();
        b.add_op(Opcode::Branch).unwrap();
        b.add_branch_offset(0).unwrap();
        b.add_op(Opcode::ReturnNoValue).unwrap();
        let program = vm.finish_program();

        let listing = vm.listing(program).unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("PUSH_SYM string #0 s=\"hi\"[2]"));
        assert!(lines[1].contains("PUSH_SYM const 1"));
        assert!(lines[2].contains("SUBR_CALL print (2 arg)"));
        assert!(lines[3].contains("BRANCH to=(-9)"));
        assert!(lines[4].trim_end().ends_with("RETURN_NO_VAL"));
    }

    #[test]
    fn describes_values() {
        let mut vm = Vm::new();
        let long = vm.heap_mut().string_value("x".repeat(30));
        assert_eq!(describe_value(vm.heap(), Value::Int(-4)), "i=-4");
        assert_eq!(describe_value(vm.heap(), Value::NoValue), "<no value>");
        assert_eq!(
            describe_value(vm.heap(), long),
            format!("s=\"{}\"...[30]", "x".repeat(20))
        );
    }

    #[test]
    fn stack_dump_labels_frame() {
        let mut vm = Vm::new();
        let suspend = vm.define_native("suspend", |call, _| {
            call.request_preemption();
            Ok(Value::NoValue)
        });
        vm.begin_program();
        let b = vm.builder_mut();
        b.add_op(Opcode::CallSubroutine).unwrap();
        b.add_symbol(suspend).unwrap();
        b.add_immediate(0).unwrap();
        b.add_op(Opcode::ReturnNoValue).unwrap();
        let program = vm.finish_program();

        let status = vm
            .execute_macro(program, WindowId(1), &[Value::Int(7)])
            .unwrap();
        let cont = status.into_continuation().unwrap();
        let dump = vm.stack_dump(&cont);
        assert!(dump.starts_with("Stack ----->"));
        assert!(dump.contains("NArgs"));
        assert!(dump.contains("RetPC"));
        assert!(dump.contains("Arg1"));
        assert!(dump.contains("i=7"));
        assert!(dump.ends_with("--------------Stack base--------------\n"));
    }
}
