//! Integration tests for the generational arena

use edmacro_foundation::{Arena, StrId};

#[test]
fn handles_survive_other_removals() {
    let mut arena = Arena::new();
    let a = arena.alloc("a");
    let b = arena.alloc("b");
    assert_eq!(arena.remove(a), Some("a"));
    assert_eq!(arena.get(b), Some(&"b"));
    assert_eq!(arena.len(), 1);
}

#[test]
fn reused_slot_does_not_resurrect_handle() {
    let mut arena = Arena::new();
    let old = arena.alloc(1);
    arena.remove(old);
    let new = arena.alloc(2);

    assert!(!arena.contains(old));
    assert_eq!(arena.get(old), None);
    assert_eq!(arena.get(new), Some(&2));
    assert_ne!(StrId(old), StrId(new));
}

#[test]
fn mark_and_sweep() {
    let mut arena = Arena::new();
    let keep = arena.alloc("keep");
    let drop = arena.alloc("drop");

    arena.clear_marks();
    assert!(arena.mark(keep));
    assert!(!arena.mark(keep));
    assert_eq!(arena.sweep(), 1);

    assert!(arena.contains(keep));
    assert!(!arena.contains(drop));
}
