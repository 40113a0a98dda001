//! Tracing integration tests
//!
//! The session reports every run's life cycle to its tracer.

use edmacro_debug::{JsonFormatter, TraceFormatter, TracerConfig};
use edmacro_foundation::{Value, WindowId};
use edmacro_language::{Opcode, VmConfig};
use edmacro_runtime::{MacroSession, SessionConfig};

fn traced_session(limit: usize) -> MacroSession {
    MacroSession::new(
        SessionConfig::new()
            .with_vm(VmConfig::default().with_instruction_limit(limit))
            .with_tracer(TracerConfig::new().enabled()),
    )
}

fn pause_program(session: &mut MacroSession) -> edmacro_foundation::ProgramId {
    let pause = session.vm_mut().define_native("pause", |call, _args| {
        call.request_preemption();
        Ok(Value::NoValue)
    });
    session.vm_mut().begin_program();
    session.vm_mut().builder_mut().add_op(Opcode::CallSubroutine).unwrap();
    session.vm_mut().builder_mut().add_symbol(pause).unwrap();
    session.vm_mut().builder_mut().add_immediate(0).unwrap();
    session.vm_mut().builder_mut().add_op(Opcode::ReturnNoValue).unwrap();
    let program = session.vm_mut().finish_program();
    session.vm_mut().define_macro("pauser", program);
    program
}

#[test]
fn abandoned_run_life_cycle() {
    let mut session = traced_session(100);
    let program = pause_program(&mut session);

    let (run, _) = session.start(program, WindowId(9), &[]).unwrap();
    session.abandon(run).unwrap();

    let records = session.tracer().buffer().records_for_run(run.raw());
    let types: Vec<_> = records.iter().map(|r| r.event_type()).collect();
    assert_eq!(types, vec!["macro-started", "preempted", "continuation-abandoned"]);
    assert!(records.last().unwrap().event.is_terminal());

    let human = session.tracer().format_records(&records);
    assert!(human.contains("START pauser (window 9)"));
    assert!(human.contains("CANCELLED"));
}

#[test]
fn deferred_collection_is_traced() {
    let mut session = traced_session(100);
    let program = pause_program(&mut session);

    let (run, _) = session.start(program, WindowId(1), &[]).unwrap();
    session.safe_gc().unwrap();
    session.resume(run, None).unwrap();

    let kinds: Vec<_> = session
        .tracer()
        .buffer()
        .iter()
        .map(|r| r.event_type())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "macro-started",
            "preempted",
            "gc-deferred",
            "resumed",
            "macro-completed",
            "garbage-collected"
        ]
    );
}

#[test]
fn json_output() {
    let mut session = traced_session(100);
    let program = pause_program(&mut session);
    let (run, _) = session.start(program, WindowId(1), &[]).unwrap();
    session.resume(run, None).unwrap();

    let records = session.tracer().buffer().records_for_run(run.raw());
    let json = JsonFormatter::new().format_many(&records);
    assert!(json.starts_with("[{\"id\":0,\"run\":1"));
    assert!(json.contains("\"type\":\"macro-completed\",\"has_result\":false"));
}
