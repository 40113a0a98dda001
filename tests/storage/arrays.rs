//! Integration tests for sparse arrays

use edmacro_foundation::{ArrayId, Value};
use edmacro_storage::{ARRAY_DIM_SEP, Heap};
use proptest::prelude::*;

fn array_of(heap: &mut Heap, entries: &[(&str, i64)]) -> ArrayId {
    let array = heap.array_new();
    for &(key, value) in entries {
        heap.array_insert(array, key, Value::Int(value)).unwrap();
    }
    array
}

fn keys(heap: &Heap, array: ArrayId) -> Vec<String> {
    let mut keys = Vec::new();
    let mut cursor = heap.array_iterate_first(array).unwrap();
    while cursor.node.is_some() {
        if let Some((key, _)) = heap.cursor_entry(cursor) {
            keys.push(heap.string(key).unwrap().to_string());
        }
        cursor = heap.array_iterate_next(cursor);
    }
    keys
}

// =============================================================================
// Basic operations
// =============================================================================

#[test]
fn iteration_is_in_key_order() {
    let mut heap = Heap::new();
    let array = array_of(&mut heap, &[("b", 2), ("10", 10), ("a", 1), ("2", 2)]);
    assert_eq!(keys(&heap, array), vec!["10", "2", "a", "b"]);
}

#[test]
fn insert_replaces_existing_key() {
    let mut heap = Heap::new();
    let array = array_of(&mut heap, &[("k", 1), ("k", 2)]);
    assert_eq!(heap.array_size(array).unwrap(), 1);
    assert_eq!(heap.array_get(array, "k").unwrap(), Some(Value::Int(2)));
}

#[test]
fn delete_and_reinsert() {
    let mut heap = Heap::new();
    let array = array_of(&mut heap, &[("x", 1), ("y", 2)]);

    assert!(heap.array_delete(array, "x").unwrap());
    assert!(!heap.array_delete(array, "x").unwrap());
    assert_eq!(heap.array_size(array).unwrap(), 1);
    assert_eq!(heap.array_get(array, "x").unwrap(), None);

    heap.array_insert(array, "x", Value::Int(3)).unwrap();
    assert_eq!(keys(&heap, array), vec!["x", "y"]);
}

#[test]
fn delete_all_empties_array() {
    let mut heap = Heap::new();
    let array = array_of(&mut heap, &[("a", 1), ("b", 2), ("c", 3)]);
    heap.array_delete_all(array).unwrap();
    assert_eq!(heap.array_size(array).unwrap(), 0);
    assert!(keys(&heap, array).is_empty());
}

#[test]
fn copy_is_independent() {
    let mut heap = Heap::new();
    let original = array_of(&mut heap, &[("a", 1)]);
    let copy = heap.array_copy(original).unwrap();

    heap.array_insert(copy, "b", Value::Int(2)).unwrap();
    assert_eq!(heap.array_size(original).unwrap(), 1);
    assert_eq!(heap.array_size(copy).unwrap(), 2);
}

#[test]
fn multi_dimensional_key() {
    let heap = Heap::new();
    let key = heap.make_key(&[Value::Int(3), Value::Int(-4)]).unwrap();
    assert_eq!(key, format!("3{ARRAY_DIM_SEP}-4"));
}

#[test]
fn cursor_on_deleted_entry_is_exhausted() {
    let mut heap = Heap::new();
    let array = array_of(&mut heap, &[("a", 1), ("b", 2), ("c", 3)]);
    let cursor = heap.array_iterate_first(array).unwrap();
    let cursor = heap.array_iterate_next(cursor);

    heap.array_delete(array, "b").unwrap();
    assert_eq!(heap.cursor_entry(cursor), None);
    assert_eq!(heap.array_iterate_next(cursor).node, None);
}

#[test]
fn deleting_visited_entry_keeps_iteration_going() {
    let mut heap = Heap::new();
    let array = array_of(&mut heap, &[("a", 1), ("b", 2), ("c", 3)]);
    let first = heap.array_iterate_first(array).unwrap();
    let second = heap.array_iterate_next(first);

    heap.array_delete(array, "a").unwrap();
    let (key, value) = heap.cursor_entry(second).unwrap();
    assert_eq!(heap.string(key).unwrap(), "b");
    assert_eq!(value, Value::Int(2));
    let third = heap.array_iterate_next(second);
    assert_eq!(heap.string(heap.cursor_entry(third).unwrap().0).unwrap(), "c");
}

// =============================================================================
// Set combination
// =============================================================================

#[test]
fn set_operations() {
    let mut heap = Heap::new();
    let left = array_of(&mut heap, &[("a", 1), ("b", 2)]);
    let right = array_of(&mut heap, &[("b", 20), ("c", 30)]);

    let union = heap.array_union(left, right).unwrap();
    assert_eq!(keys(&heap, union), vec!["a", "b", "c"]);

    let difference = heap.array_difference(left, right).unwrap();
    assert_eq!(keys(&heap, difference), vec!["a"]);

    let intersection = heap.array_intersection(left, right).unwrap();
    assert_eq!(keys(&heap, intersection), vec!["b"]);

    let exclusive = heap.array_exclusive_union(left, right).unwrap();
    assert_eq!(keys(&heap, exclusive), vec!["a", "c"]);

    assert!(heap.array_keys_subset(difference, left).unwrap());
    assert!(!heap.array_keys_subset(left, right).unwrap());
}

proptest! {
    #[test]
    fn union_size_law(
        left in prop::collection::btree_set("[a-e]{1,2}", 0..8),
        right in prop::collection::btree_set("[a-e]{1,2}", 0..8),
    ) {
        let mut heap = Heap::new();
        let l = heap.array_new();
        for key in &left {
            heap.array_insert(l, key, Value::Int(1)).unwrap();
        }
        let r = heap.array_new();
        for key in &right {
            heap.array_insert(r, key, Value::Int(2)).unwrap();
        }

        let union = heap.array_union(l, r).unwrap();
        let intersection = heap.array_intersection(l, r).unwrap();
        let exclusive = heap.array_exclusive_union(l, r).unwrap();

        let union_size = heap.array_size(union).unwrap();
        let both = heap.array_size(intersection).unwrap();
        prop_assert_eq!(union_size, left.len() + right.len() - both);
        prop_assert_eq!(heap.array_size(exclusive).unwrap(), union_size - both);
    }
}
