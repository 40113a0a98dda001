//! The macro heap: strings and sparse arrays, plus the value operations
//! that need to look inside them.

use std::cmp::Ordering;

use edmacro_foundation::{ArrayId, Cursor, Error, ErrorKind, Result, StrId, Value, string_to_number};

use crate::array::ArrayStore;
use crate::strings::StringArena;

/// Separator placed between the subscripts of a multi-dimensional key.
pub const ARRAY_DIM_SEP: &str = "\x1c";

/// Owner of all macro strings and arrays.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    pub(crate) strings: StringArena,
    pub(crate) arrays: ArrayStore,
}

impl Heap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The string arena.
    #[must_use]
    pub fn strings(&self) -> &StringArena {
        &self.strings
    }

    /// The array store.
    #[must_use]
    pub fn arrays(&self) -> &ArrayStore {
        &self.arrays
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// Allocates an empty string with room for `length` bytes.
    pub fn allocate_string(&mut self, length: usize) -> StrId {
        self.strings.allocate(length)
    }

    /// Allocates a copy of `source`.
    pub fn allocate_string_copy(&mut self, source: &str) -> StrId {
        self.strings.allocate_copy(source)
    }

    /// Moves `source` into the heap and returns it as a string value.
    pub fn string_value(&mut self, source: String) -> Value {
        Value::Str(self.strings.adopt(source))
    }

    /// Returns the contents of a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string has been collected.
    pub fn string(&self, id: StrId) -> Result<&str> {
        self.strings.get(id)
    }

    /// Returns a string for in-place filling.
    ///
    /// # Errors
    ///
    /// Returns an error if the string has been collected.
    pub fn string_mut(&mut self, id: StrId) -> Result<&mut String> {
        self.strings.get_mut(id)
    }

    // =========================================================================
    // Coercion
    // =========================================================================

    /// Coerces a value to an integer, parsing strings.
    ///
    /// # Errors
    ///
    /// Fails for non-numeric strings, arrays, and unset values.
    pub fn value_to_int(&self, value: Value) -> Result<i64> {
        match value {
            Value::Int(n) => Ok(n),
            Value::Str(id) => string_to_number(self.string(id)?)
                .ok_or_else(|| Error::new(ErrorKind::StringToNumber)),
            Value::Array(_) => Err(Error::new(ErrorKind::ArrayToInteger)),
            Value::NoValue => Err(Error::new(ErrorKind::UnsetValue)),
            other => Err(Error::internal(format!("{} used as integer", other.type_name()))),
        }
    }

    /// Coerces a value to a string, rendering integers in decimal.
    ///
    /// # Errors
    ///
    /// Fails for arrays and unset values.
    pub fn value_to_string(&self, value: Value) -> Result<String> {
        match value {
            Value::Int(n) => Ok(n.to_string()),
            Value::Str(id) => Ok(self.string(id)?.to_owned()),
            Value::Array(_) => Err(Error::new(ErrorKind::ArrayToString)),
            Value::NoValue => Err(Error::new(ErrorKind::UnsetValue)),
            other => Err(Error::internal(format!("{} used as string", other.type_name()))),
        }
    }

    /// Builds a composite key from subscripts, joined by [`ARRAY_DIM_SEP`].
    ///
    /// # Errors
    ///
    /// Fails if a subscript is neither a string nor an integer.
    pub fn make_key(&self, subscripts: &[Value]) -> Result<String> {
        let mut key = String::new();
        for (i, sub) in subscripts.iter().enumerate() {
            if i > 0 {
                key.push_str(ARRAY_DIM_SEP);
            }
            match *sub {
                Value::Int(n) => key.push_str(&n.to_string()),
                Value::Str(id) => key.push_str(self.string(id)?),
                _ => return Err(Error::new(ErrorKind::BadSubscript)),
            }
        }
        Ok(key)
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    /// Creates a new empty array.
    pub fn array_new(&mut self) -> ArrayId {
        self.arrays.create()
    }

    /// Stores `value` under `key`. Array values are deep-copied first.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle involved is stale.
    pub fn array_insert(&mut self, array: ArrayId, key: &str, value: Value) -> Result<()> {
        let key = self.strings.allocate_copy(key);
        self.array_insert_key(array, key, value)
    }

    /// Like [`Heap::array_insert`] but reuses an existing key string.
    fn array_insert_key(&mut self, array: ArrayId, key: StrId, value: Value) -> Result<()> {
        let value = match value {
            Value::Array(src) => Value::Array(self.array_copy(src)?),
            other => other,
        };
        self.arrays
            .insert(&self.strings, array, key, value)
            .map_err(|_| Error::new(ErrorKind::ArrayInsertion))
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle involved is stale.
    pub fn array_get(&self, array: ArrayId, key: &str) -> Result<Option<Value>> {
        self.arrays.get(&self.strings, array, key)
    }

    /// Removes the entry for `key`. Returns true if one was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle involved is stale.
    pub fn array_delete(&mut self, array: ArrayId, key: &str) -> Result<bool> {
        self.arrays.delete(&self.strings, array, key)
    }

    /// Removes every entry of `array`.
    ///
    /// # Errors
    ///
    /// Returns an error if the array has been collected.
    pub fn array_delete_all(&mut self, array: ArrayId) -> Result<()> {
        self.arrays.delete_all(array)
    }

    /// Number of entries in `array`.
    ///
    /// # Errors
    ///
    /// Returns an error if the array has been collected.
    pub fn array_size(&self, array: ArrayId) -> Result<usize> {
        self.arrays.size(array)
    }

    /// Builds an independent deep copy of `src`.
    ///
    /// Nested arrays are copied recursively. Key strings are shared since
    /// they are never modified.
    ///
    /// # Errors
    ///
    /// Returns an error if `src` or a nested array has been collected.
    pub fn array_copy(&mut self, src: ArrayId) -> Result<ArrayId> {
        let entries = self
            .arrays
            .entries(src)
            .map_err(|_| Error::new(ErrorKind::ArrayCopy))?;
        let dst = self.arrays.create();
        for (key, value) in entries {
            self.array_insert_key(dst, key, value)
                .map_err(|_| Error::new(ErrorKind::ArrayCopy))?;
        }
        Ok(dst)
    }

    /// Cursor on the first entry of `array`.
    ///
    /// # Errors
    ///
    /// Returns an error if the array has been collected.
    pub fn array_iterate_first(&self, array: ArrayId) -> Result<Cursor> {
        Ok(Cursor {
            array,
            node: self.arrays.first(array)?,
        })
    }

    /// Cursor on the entry after the one `cursor` points at.
    #[must_use]
    pub fn array_iterate_next(&self, cursor: Cursor) -> Cursor {
        Cursor {
            array: cursor.array,
            node: cursor.node.and_then(|node| self.arrays.next(node)),
        }
    }

    /// Key and value at `cursor`.
    ///
    /// `None` when the cursor is exhausted or its entry has been deleted.
    #[must_use]
    pub fn cursor_entry(&self, cursor: Cursor) -> Option<(StrId, Value)> {
        let node = self.arrays.live_node(cursor.node?)?;
        Some((node.key(), node.value()))
    }

    /// Returns true if every key of `left` is also a key of `right`.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle involved is stale.
    pub fn array_keys_subset(&self, left: ArrayId, right: ArrayId) -> Result<bool> {
        for (key, _) in self.arrays.entries(left)? {
            if self.arrays.find(&self.strings, right, self.string(key)?)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // =========================================================================
    // Set combination
    // =========================================================================

    /// Keys of either array. On collision the right value wins.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle involved is stale.
    pub fn array_union(&mut self, left: ArrayId, right: ArrayId) -> Result<ArrayId> {
        self.merge(left, right, Merge::Union)
    }

    /// Keys of `left` that are not in `right`.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle involved is stale.
    pub fn array_difference(&mut self, left: ArrayId, right: ArrayId) -> Result<ArrayId> {
        self.merge(left, right, Merge::Difference)
    }

    /// Keys present in both arrays, with the right value.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle involved is stale.
    pub fn array_intersection(&mut self, left: ArrayId, right: ArrayId) -> Result<ArrayId> {
        self.merge(left, right, Merge::Intersection)
    }

    /// Keys present in exactly one of the arrays. Colliding keys are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle involved is stale.
    pub fn array_exclusive_union(&mut self, left: ArrayId, right: ArrayId) -> Result<ArrayId> {
        self.merge(left, right, Merge::Exclusive)
    }

    /// Walks both arrays in key order and inserts what `mode` keeps.
    fn merge(&mut self, left: ArrayId, right: ArrayId, mode: Merge) -> Result<ArrayId> {
        let lhs = self.arrays.entries(left)?;
        let rhs = self.arrays.entries(right)?;
        let result = self.arrays.create();

        let (mut i, mut j) = (0, 0);
        while i < lhs.len() || j < rhs.len() {
            let order = match (lhs.get(i), rhs.get(j)) {
                (Some(l), Some(r)) => self.string(l.0)?.cmp(self.string(r.0)?),
                (Some(_), None) => Ordering::Less,
                _ => Ordering::Greater,
            };
            let keep = match order {
                Ordering::Less => {
                    i += 1;
                    mode.keeps_left_only().then_some(lhs[i - 1])
                }
                Ordering::Greater => {
                    j += 1;
                    mode.keeps_right_only().then_some(rhs[j - 1])
                }
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                    mode.keeps_both().then_some(rhs[j - 1])
                }
            };
            if let Some((key, value)) = keep {
                self.array_insert_key(result, key, value)?;
            }
        }
        Ok(result)
    }
}

#[derive(Copy, Clone, Debug)]
enum Merge {
    Union,
    Difference,
    Intersection,
    Exclusive,
}

impl Merge {
    fn keeps_left_only(self) -> bool {
        matches!(self, Self::Union | Self::Difference | Self::Exclusive)
    }

    fn keeps_right_only(self) -> bool {
        matches!(self, Self::Union | Self::Exclusive)
    }

    fn keeps_both(self) -> bool {
        matches!(self, Self::Union | Self::Intersection)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn entries() -> impl Strategy<Value = BTreeMap<String, i64>> {
        prop::collection::btree_map("[a-e]{1,2}", 0i64..100, 0..12)
    }

    fn build(heap: &mut Heap, map: &BTreeMap<String, i64>) -> ArrayId {
        let a = heap.array_new();
        for (k, v) in map {
            heap.array_insert(a, k, Value::Int(*v)).unwrap();
        }
        a
    }

    proptest! {
        #[test]
        fn union_laws(l in entries(), r in entries()) {
            let mut heap = Heap::new();
            let a = build(&mut heap, &l);
            let b = build(&mut heap, &r);
            let u = heap.array_union(a, b).unwrap();

            prop_assert!(heap.array_size(u).unwrap() <= l.len() + r.len());
            for (k, v) in &r {
                prop_assert_eq!(heap.array_get(u, k).unwrap(), Some(Value::Int(*v)));
            }
        }

        #[test]
        fn difference_laws(l in entries(), r in entries()) {
            let mut heap = Heap::new();
            let a = build(&mut heap, &l);
            let b = build(&mut heap, &r);
            let d = heap.array_difference(a, b).unwrap();

            for (key, _) in heap.arrays().entries(d).unwrap() {
                let key = heap.string(key).unwrap();
                prop_assert!(l.contains_key(key));
                prop_assert!(!r.contains_key(key));
            }
        }

        #[test]
        fn intersection_laws(l in entries(), r in entries()) {
            let mut heap = Heap::new();
            let a = build(&mut heap, &l);
            let b = build(&mut heap, &r);
            let i = heap.array_intersection(a, b).unwrap();

            let expected = l.keys().filter(|k| r.contains_key(*k)).count();
            prop_assert_eq!(heap.array_size(i).unwrap(), expected);
            for (key, _) in heap.arrays().entries(i).unwrap() {
                let key = heap.string(key).unwrap();
                prop_assert!(l.contains_key(key) && r.contains_key(key));
            }
        }

        #[test]
        fn copy_independence(src in entries(), extra in "[a-e]{1,2}", drop in "[a-e]{1,2}") {
            let mut heap = Heap::new();
            let a = build(&mut heap, &src);
            let copy = heap.array_copy(a).unwrap();

            heap.array_insert(copy, &extra, Value::Int(-1)).unwrap();
            heap.array_delete(copy, &drop).unwrap();

            prop_assert_eq!(heap.array_size(a).unwrap(), src.len());
            for (k, v) in &src {
                prop_assert_eq!(heap.array_get(a, k).unwrap(), Some(Value::Int(*v)));
            }
        }
    }
}
