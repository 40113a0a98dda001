//! Host session integration tests
//!
//! A host drives macros through a session: built-ins, host routines that
//! wait for the user, time slicing, and collection while runs are pending.

use edmacro_foundation::{ProgramId, SymbolId, Value, WindowId};
use edmacro_language::{Opcode, VmConfig};
use edmacro_runtime::{MacroSession, RunState, RunStatus, SessionConfig};

fn op(session: &mut MacroSession, op: Opcode) {
    session.vm_mut().builder_mut().add_op(op).unwrap();
}

fn push(session: &mut MacroSession, symbol: SymbolId) {
    op(session, Opcode::PushSymbol);
    session.vm_mut().builder_mut().add_symbol(symbol).unwrap();
}

fn push_str(session: &mut MacroSession, text: &str) {
    let constant = session.vm_mut().install_string_constant(text);
    push(session, constant);
}

fn push_int(session: &mut MacroSession, n: i64) {
    let constant = session.vm_mut().install_int_constant(n);
    push(session, constant);
}

fn call(session: &mut MacroSession, name: &str, args: i64) {
    let routine = session.vm().lookup_symbol(name).unwrap();
    op(session, Opcode::CallSubroutine);
    session.vm_mut().builder_mut().add_symbol(routine).unwrap();
    session.vm_mut().builder_mut().add_immediate(args).unwrap();
    op(session, Opcode::FetchReturnValue);
}

fn text(session: &MacroSession, value: Value) -> String {
    session.vm().heap().value_to_string(value).unwrap()
}

/// `return toupper(ask()) substring "..."`: asks the host for a word.
fn ask_program(session: &mut MacroSession) -> ProgramId {
    session.vm_mut().define_native("ask", |call, _args| {
        call.request_preemption();
        Ok(call.string_value(String::new()))
    });
    session.vm_mut().begin_program();
    call(session, "ask", 0);
    call(session, "toupper", 1);
    push_str(session, "!");
    op(session, Opcode::Concat);
    op(session, Opcode::Return);
    session.vm_mut().finish_program()
}

#[test]
fn builtins_through_session() {
    let mut session = MacroSession::default();
    session.vm_mut().begin_program();
    push_str(&mut session, "hello world");
    push_int(&mut session, -5);
    call(&mut session, "substring", 2);
    op(&mut session, Opcode::Return);
    let program = session.vm_mut().finish_program();

    let (_, status) = session.start(program, WindowId(1), &[]).unwrap();
    let RunStatus::Done(Some(value)) = status else {
        panic!("unexpected status {status:?}");
    };
    assert_eq!(text(&session, value), "world");
}

#[test]
fn host_answers_waiting_macro() {
    let mut session = MacroSession::default();
    let program = ask_program(&mut session);

    let (run, status) = session.start(program, WindowId(3), &[]).unwrap();
    assert_eq!(status, RunStatus::Waiting);
    assert_eq!(session.state(run), Some(RunState::Waiting));

    let answer = session.vm_mut().heap_mut().string_value("yes".to_string());
    let RunStatus::Done(Some(value)) = session.resume(run, Some(answer)).unwrap() else {
        panic!("macro did not finish");
    };
    assert_eq!(text(&session, value), "YES!");
}

#[test]
fn pending_strings_survive_collection() {
    let mut session = MacroSession::default();
    let program = ask_program(&mut session);
    let (run, _) = session.start(program, WindowId(1), &[]).unwrap();

    let answer = session.vm_mut().heap_mut().string_value("kept".to_string());
    assert_eq!(session.safe_gc().unwrap(), None);

    let mut status = session.resume(run, Some(answer)).unwrap();
    while status == RunStatus::TimeSliced {
        status = session.resume(run, None).unwrap();
    }
    let RunStatus::Done(Some(value)) = status else {
        panic!("macro did not finish");
    };
    assert_eq!(text(&session, value), "KEPT!");
    assert!(!session.gc_deferred());
}

#[test]
fn many_runs_share_the_scheduler() {
    let config = SessionConfig::new().with_vm(VmConfig::default().with_instruction_limit(4));
    let mut session = MacroSession::new(config);

    session.vm_mut().begin_program();
    push_int(&mut session, 0);
    for _ in 0..10 {
        push_int(&mut session, 2);
        op(&mut session, Opcode::Add);
    }
    op(&mut session, Opcode::Return);
    let program = session.vm_mut().finish_program();

    let runs: Vec<_> = (0..3)
        .map(|_| session.start(program, WindowId(1), &[]).unwrap().0)
        .collect();
    assert_eq!(session.pending_runs(), runs);

    let reports = session.pump_until_idle();
    let finished: Vec<_> = reports
        .iter()
        .filter(|(_, status)| matches!(status, Ok(RunStatus::Done(_))))
        .collect();
    assert_eq!(finished.len(), 3);
    for (_, status) in finished {
        assert_eq!(*status.as_ref().unwrap(), RunStatus::Done(Some(Value::Int(20))));
    }
    assert_eq!(session.pending_count(), 0);
}

#[test]
fn failing_builtin_names_itself() {
    let mut session = MacroSession::default();
    session.vm_mut().begin_program();
    push_int(&mut session, 1);
    call(&mut session, "max", 1);
    op(&mut session, Opcode::Return);
    let program = session.vm_mut().finish_program();

    let err = session.start(program, WindowId(1), &[]).unwrap_err();
    assert_eq!(err.to_string(), "Too few arguments to function max");
    assert_eq!(session.pending_count(), 0);
}
