//! Mark-and-sweep collection of macro strings and arrays.
//!
//! Roots are values supplied by the caller (global symbol values, and
//! optionally values held on suspended stacks). Everything reachable from a
//! root is marked: strings directly, arrays by marking the base, every linked
//! node, every key string, and every value recursively. Orphaned nodes are
//! not linked into any tree, so they are never marked and are always freed.
//!
//! Cursors are not traced. A cursor whose node is freed reads as exhausted.
//!
//! Collection must not run while a macro's stack is checked out of its
//! continuation; the VM enforces this.

use edmacro_foundation::{ArrayId, Value};

use crate::heap::Heap;

/// What a collection freed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Strings freed.
    pub strings: usize,
    /// Array bases freed.
    pub arrays: usize,
    /// Array nodes freed (deleted entries and entries of dead arrays).
    pub nodes: usize,
}

impl GcStats {
    /// Total number of objects freed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.strings + self.arrays + self.nodes
    }
}

impl Heap {
    /// Frees every string and array not reachable from `roots`.
    pub fn collect<I>(&mut self, roots: I) -> GcStats
    where
        I: IntoIterator<Item = Value>,
    {
        self.strings.clear_marks();
        self.arrays.clear_marks();

        let mut pending: Vec<ArrayId> = Vec::new();
        for root in roots {
            self.mark_value(root, &mut pending);
        }
        while let Some(array) = pending.pop() {
            self.mark_array_contents(array, &mut pending);
        }

        let strings = self.strings.sweep();
        let (arrays, nodes) = self.arrays.sweep();
        GcStats {
            strings,
            arrays,
            nodes,
        }
    }

    fn mark_value(&mut self, value: Value, pending: &mut Vec<ArrayId>) {
        match value {
            Value::Str(id) => self.strings.mark(id),
            Value::Array(id) => {
                if self.arrays.mark_array(id) {
                    pending.push(id);
                }
            }
            _ => {}
        }
    }

    fn mark_array_contents(&mut self, array: ArrayId, pending: &mut Vec<ArrayId>) {
        let Ok(mut cursor) = self.arrays.first(array) else {
            return;
        };
        while let Some(node) = cursor {
            if let Some(entry) = self.arrays.node(node) {
                let (key, value) = (entry.key(), entry.value());
                self.arrays.mark_node(node);
                self.strings.mark(key);
                self.mark_value(value, pending);
            }
            cursor = self.arrays.next(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrooted_objects_are_freed() {
        let mut heap = Heap::new();
        let s = heap.allocate_string_copy("garbage");
        let a = heap.array_new();
        heap.array_insert(a, "k", Value::Int(1)).unwrap();

        let stats = heap.collect([]);

        assert_eq!(stats, GcStats { strings: 2, arrays: 1, nodes: 1 });
        assert!(heap.string(s).is_err());
        assert!(heap.array_size(a).is_err());
    }

    #[test]
    fn rooted_string_survives() {
        let mut heap = Heap::new();
        let s = heap.allocate_string_copy("keep");
        let stats = heap.collect([Value::Str(s)]);
        assert_eq!(stats.total(), 0);
        assert_eq!(heap.string(s).unwrap(), "keep");
    }

    #[test]
    fn nested_arrays_survive_unchanged() {
        let mut heap = Heap::new();
        let inner = heap.array_new();
        let text = heap.allocate_string_copy("deep");
        heap.array_insert(inner, "s", Value::Str(text)).unwrap();
        let outer = heap.array_new();
        heap.array_insert(outer, "in", Value::Array(inner)).unwrap();
        heap.array_insert(outer, "n", Value::Int(4)).unwrap();

        heap.collect([Value::Array(outer)]);

        let copy = heap.array_get(outer, "in").unwrap().unwrap().as_array().unwrap();
        let s = heap.array_get(copy, "s").unwrap().unwrap().as_str_id().unwrap();
        assert_eq!(heap.string(s).unwrap(), "deep");
        assert_eq!(heap.array_get(outer, "n").unwrap(), Some(Value::Int(4)));
        // the inner array was only a source for the deep copy
        assert!(heap.array_size(inner).is_err());
    }

    #[test]
    fn orphans_are_reclaimed_and_cursor_exhausts() {
        let mut heap = Heap::new();
        let a = heap.array_new();
        heap.array_insert(a, "a", Value::Int(1)).unwrap();
        heap.array_insert(a, "b", Value::Int(2)).unwrap();
        let cursor = heap.array_iterate_first(a).unwrap();
        heap.array_delete(a, "a").unwrap();

        let stats = heap.collect([Value::Array(a)]);

        // node plus its key string
        assert_eq!(stats.nodes, 1);
        assert_eq!(stats.strings, 1);
        assert_eq!(heap.cursor_entry(cursor), None);
        assert_eq!(heap.array_size(a).unwrap(), 1);
    }

    #[test]
    fn repeated_collection_is_stable() {
        let mut heap = Heap::new();
        let a = heap.array_new();
        heap.array_insert(a, "x", Value::Int(1)).unwrap();
        heap.collect([Value::Array(a)]);
        let second = heap.collect([Value::Array(a)]);
        assert_eq!(second.total(), 0);
        assert_eq!(heap.array_get(a, "x").unwrap(), Some(Value::Int(1)));
    }
}
