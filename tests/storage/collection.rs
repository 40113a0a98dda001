//! Integration tests for mark-and-sweep collection

use edmacro_foundation::Value;
use edmacro_storage::Heap;

#[test]
fn unreachable_objects_are_freed() {
    let mut heap = Heap::new();
    heap.allocate_string_copy("lost");
    let kept = heap.allocate_string_copy("kept");

    let stats = heap.collect([Value::Str(kept)]);
    assert_eq!(stats.strings, 1);
    assert_eq!(heap.string(kept).unwrap(), "kept");
}

#[test]
fn array_contents_are_traced() {
    let mut heap = Heap::new();
    let outer = heap.array_new();
    let inner = heap.array_new();
    let text = heap.string_value("value".to_string());
    heap.array_insert(inner, "s", text).unwrap();
    heap.array_insert(outer, "nested", Value::Array(inner)).unwrap();

    let stats = heap.collect([Value::Array(outer)]);
    // only the copy stored in `outer` is reachable; `inner` was its source
    assert_eq!(stats.arrays, 1);
    assert_eq!(stats.strings, 0);
    assert!(heap.array_size(inner).is_err());
    assert_eq!(heap.value_to_string(text).unwrap(), "value");
    let copy = heap.array_get(outer, "nested").unwrap().unwrap().as_array().unwrap();
    assert_eq!(heap.array_get(copy, "s").unwrap(), Some(text));

    let stats = heap.collect(std::iter::empty());
    assert_eq!(stats.arrays, 2);
    assert!(stats.strings >= 3);
    assert!(heap.array_size(outer).is_err());
}

#[test]
fn deleted_entries_are_reclaimed() {
    let mut heap = Heap::new();
    let array = heap.array_new();
    heap.array_insert(array, "a", Value::Int(1)).unwrap();
    heap.array_insert(array, "b", Value::Int(2)).unwrap();
    heap.array_delete(array, "a").unwrap();

    let stats = heap.collect([Value::Array(array)]);
    assert_eq!(stats.nodes, 1);
    assert_eq!(heap.array_size(array).unwrap(), 1);
}
