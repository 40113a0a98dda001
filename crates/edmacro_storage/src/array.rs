//! Sparse associative arrays: red-black trees keyed by string.
//!
//! Every array has a base record (root and element count) in one arena and
//! its entries as nodes in a second arena. Nodes are linked by handle, not by
//! pointer, so the collector can free them independently.
//!
//! A deleted node is unlinked from its tree and flagged `orphaned`. Its slot
//! stays allocated until the next collection so that an iteration cursor that
//! still refers to it can see the flag and stop, rather than wander into a
//! reused slot. Deletion relinks nodes and never moves a key or value between
//! nodes, so a cursor on any other node keeps pointing at the same entry.

use std::cmp::Ordering;

use edmacro_foundation::{Arena, ArrayId, Error, NodeId, Result, StrId, Value};

use crate::strings::StringArena;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

/// One entry of a sparse array.
#[derive(Clone, Debug)]
pub struct ArrayNode {
    key: StrId,
    value: Value,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    color: Color,
    orphaned: bool,
}

impl ArrayNode {
    /// Key string of this entry.
    #[must_use]
    pub fn key(&self) -> StrId {
        self.key
    }

    /// Value of this entry.
    #[must_use]
    pub fn value(&self) -> Value {
        self.value
    }

    /// Returns true once the entry has been deleted from its array.
    #[must_use]
    pub fn is_orphaned(&self) -> bool {
        self.orphaned
    }
}

#[derive(Clone, Debug, Default)]
struct ArrayBase {
    root: Option<NodeId>,
    size: usize,
}

/// Storage for every sparse array and every array entry.
#[derive(Clone, Debug, Default)]
pub struct ArrayStore {
    bases: Arena<ArrayBase>,
    nodes: Arena<ArrayNode>,
}

impl ArrayStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty array.
    pub fn create(&mut self) -> ArrayId {
        ArrayId(self.bases.alloc(ArrayBase::default()))
    }

    fn base(&self, array: ArrayId) -> Result<&ArrayBase> {
        self.bases
            .get(array.raw())
            .ok_or_else(|| Error::stale("array"))
    }

    fn base_mut(&mut self, array: ArrayId) -> Result<&mut ArrayBase> {
        self.bases
            .get_mut(array.raw())
            .ok_or_else(|| Error::stale("array"))
    }

    /// Returns true if the array is still allocated.
    #[must_use]
    pub fn contains(&self, array: ArrayId) -> bool {
        self.bases.contains(array.raw())
    }

    /// Number of live entries in `array`.
    ///
    /// # Errors
    ///
    /// Returns an error if the array has been collected.
    pub fn size(&self, array: ArrayId) -> Result<usize> {
        Ok(self.base(array)?.size)
    }

    /// Returns a live or orphaned node, or `None` once it has been collected.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&ArrayNode> {
        self.nodes.get(node.raw())
    }

    /// Returns the node if it is still linked into an array.
    #[must_use]
    pub fn live_node(&self, node: NodeId) -> Option<&ArrayNode> {
        self.node(node).filter(|n| !n.orphaned)
    }

    /// Number of allocated arrays.
    #[must_use]
    pub fn array_count(&self) -> usize {
        self.bases.len()
    }

    /// Number of allocated nodes, including orphans not yet collected.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // =========================================================================
    // Lookup and traversal
    // =========================================================================

    /// Finds the node holding `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the array or one of its key strings is stale.
    pub fn find(&self, strings: &StringArena, array: ArrayId, key: &str) -> Result<Option<NodeId>> {
        let mut cursor = self.base(array)?.root;
        while let Some(id) = cursor {
            let Some(node) = self.node(id) else { break };
            match key.cmp(strings.get(node.key)?) {
                Ordering::Less => cursor = node.left,
                Ordering::Greater => cursor = node.right,
                Ordering::Equal => return Ok(Some(id)),
            }
        }
        Ok(None)
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the array or one of its key strings is stale.
    pub fn get(&self, strings: &StringArena, array: ArrayId, key: &str) -> Result<Option<Value>> {
        Ok(self
            .find(strings, array, key)?
            .and_then(|id| self.node(id))
            .map(ArrayNode::value))
    }

    /// First node in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the array has been collected.
    pub fn first(&self, array: ArrayId) -> Result<Option<NodeId>> {
        Ok(self.base(array)?.root.map(|root| self.minimum(root)))
    }

    /// Node following `node` in key order.
    ///
    /// An orphaned or collected node has no successor.
    #[must_use]
    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        self.live_node(node)?;
        if let Some(right) = self.right(Some(node)) {
            return Some(self.minimum(right));
        }
        let mut child = node;
        let mut parent = self.parent(Some(node));
        while let Some(p) = parent {
            if self.right(Some(p)) != Some(child) {
                break;
            }
            child = p;
            parent = self.parent(Some(p));
        }
        parent
    }

    /// Live entries of `array` in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the array has been collected.
    pub fn entries(&self, array: ArrayId) -> Result<Vec<(StrId, Value)>> {
        let mut out = Vec::with_capacity(self.size(array)?);
        let mut cursor = self.first(array)?;
        while let Some(id) = cursor {
            if let Some(node) = self.node(id) {
                out.push((node.key, node.value));
            }
            cursor = self.next(id);
        }
        Ok(out)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Stores `value` under `key`, overwriting an existing entry.
    ///
    /// Values are stored as given; deep copying of nested arrays is the
    /// caller's business.
    ///
    /// # Errors
    ///
    /// Returns an error if the array or one of its key strings is stale.
    pub fn insert(&mut self, strings: &StringArena, array: ArrayId, key: StrId, value: Value) -> Result<()> {
        let key_text = strings.get(key)?;

        let mut parent = None;
        let mut go_left = false;
        let mut cursor = self.base(array)?.root;
        while let Some(id) = cursor {
            let Some(node) = self.node(id) else { break };
            match key_text.cmp(strings.get(node.key)?) {
                Ordering::Less => {
                    parent = Some(id);
                    go_left = true;
                    cursor = node.left;
                }
                Ordering::Greater => {
                    parent = Some(id);
                    go_left = false;
                    cursor = node.right;
                }
                Ordering::Equal => {
                    if let Some(node) = self.nodes.get_mut(id.raw()) {
                        node.value = value;
                    }
                    return Ok(());
                }
            }
        }

        let id = NodeId(self.nodes.alloc(ArrayNode {
            key,
            value,
            parent,
            left: None,
            right: None,
            color: Color::Red,
            orphaned: false,
        }));
        match parent {
            None => self.base_mut(array)?.root = Some(id),
            Some(p) if go_left => self.set_left(p, Some(id)),
            Some(p) => self.set_right(p, Some(id)),
        }
        self.base_mut(array)?.size += 1;
        self.insert_fixup(array, id);
        Ok(())
    }

    /// Removes the entry for `key`. Returns true if one was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the array or one of its key strings is stale.
    pub fn delete(&mut self, strings: &StringArena, array: ArrayId, key: &str) -> Result<bool> {
        match self.find(strings, array, key)? {
            Some(id) => {
                self.unlink(array, id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the array has been collected.
    pub fn delete_all(&mut self, array: ArrayId) -> Result<()> {
        let mut cursor = self.first(array)?;
        while let Some(id) = cursor {
            cursor = self.next(id);
            self.unlink(array, id)?;
        }
        Ok(())
    }

    // =========================================================================
    // Collection support
    // =========================================================================

    pub(crate) fn clear_marks(&mut self) {
        self.bases.clear_marks();
        self.nodes.clear_marks();
    }

    /// Marks an array base. Returns true the first time in a cycle.
    pub(crate) fn mark_array(&mut self, array: ArrayId) -> bool {
        self.bases.mark(array.raw())
    }

    pub(crate) fn mark_node(&mut self, node: NodeId) {
        self.nodes.mark(node.raw());
    }

    /// Returns `(arrays, nodes)` freed.
    pub(crate) fn sweep(&mut self) -> (usize, usize) {
        (self.bases.sweep(), self.nodes.sweep())
    }

    // =========================================================================
    // Red-black maintenance
    // =========================================================================
    //
    // Missing children are black leaves. Accessors treat a collected node like
    // a leaf; nodes linked into a live array are never collected.

    fn left(&self, node: Option<NodeId>) -> Option<NodeId> {
        node.and_then(|id| self.node(id)).and_then(|n| n.left)
    }

    fn right(&self, node: Option<NodeId>) -> Option<NodeId> {
        node.and_then(|id| self.node(id)).and_then(|n| n.right)
    }

    fn parent(&self, node: Option<NodeId>) -> Option<NodeId> {
        node.and_then(|id| self.node(id)).and_then(|n| n.parent)
    }

    fn color(&self, node: Option<NodeId>) -> Color {
        node.and_then(|id| self.node(id))
            .map_or(Color::Black, |n| n.color)
    }

    fn set_color(&mut self, node: Option<NodeId>, color: Color) {
        if let Some(n) = node.and_then(|id| self.nodes.get_mut(id.raw())) {
            n.color = color;
        }
    }

    fn set_left(&mut self, node: NodeId, child: Option<NodeId>) {
        if let Some(n) = self.nodes.get_mut(node.raw()) {
            n.left = child;
        }
    }

    fn set_right(&mut self, node: NodeId, child: Option<NodeId>) {
        if let Some(n) = self.nodes.get_mut(node.raw()) {
            n.right = child;
        }
    }

    fn set_parent(&mut self, node: Option<NodeId>, parent: Option<NodeId>) {
        if let Some(n) = node.and_then(|id| self.nodes.get_mut(id.raw())) {
            n.parent = parent;
        }
    }

    fn root(&self, array: ArrayId) -> Option<NodeId> {
        self.bases.get(array.raw()).and_then(|b| b.root)
    }

    fn set_root(&mut self, array: ArrayId, root: Option<NodeId>) {
        if let Some(base) = self.bases.get_mut(array.raw()) {
            base.root = root;
        }
    }

    fn minimum(&self, mut node: NodeId) -> NodeId {
        while let Some(left) = self.left(Some(node)) {
            node = left;
        }
        node
    }

    /// Replaces the subtree at `old` with the one at `new` in `old`'s parent.
    fn replace_child(&mut self, array: ArrayId, old: NodeId, new: Option<NodeId>) {
        let parent = self.parent(Some(old));
        match parent {
            None => self.set_root(array, new),
            Some(p) if self.left(Some(p)) == Some(old) => self.set_left(p, new),
            Some(p) => self.set_right(p, new),
        }
        self.set_parent(new, parent);
    }

    fn rotate_left(&mut self, array: ArrayId, x: NodeId) {
        let Some(y) = self.right(Some(x)) else { return };
        let inner = self.left(Some(y));
        self.set_right(x, inner);
        self.set_parent(inner, Some(x));
        self.replace_child(array, x, Some(y));
        self.set_left(y, Some(x));
        self.set_parent(Some(x), Some(y));
    }

    fn rotate_right(&mut self, array: ArrayId, x: NodeId) {
        let Some(y) = self.left(Some(x)) else { return };
        let inner = self.right(Some(y));
        self.set_left(x, inner);
        self.set_parent(inner, Some(x));
        self.replace_child(array, x, Some(y));
        self.set_right(y, Some(x));
        self.set_parent(Some(x), Some(y));
    }

    fn insert_fixup(&mut self, array: ArrayId, mut z: NodeId) {
        loop {
            let Some(p) = self.parent(Some(z)) else { break };
            if self.color(Some(p)) != Color::Red {
                break;
            }
            // a red node is never the root
            let Some(g) = self.parent(Some(p)) else { break };

            if self.left(Some(g)) == Some(p) {
                let uncle = self.right(Some(g));
                if self.color(uncle) == Color::Red {
                    self.set_color(Some(p), Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(Some(g), Color::Red);
                    z = g;
                    continue;
                }
                if self.right(Some(p)) == Some(z) {
                    z = p;
                    self.rotate_left(array, z);
                }
                let p = self.parent(Some(z));
                self.set_color(p, Color::Black);
                self.set_color(Some(g), Color::Red);
                self.rotate_right(array, g);
            } else {
                let uncle = self.left(Some(g));
                if self.color(uncle) == Color::Red {
                    self.set_color(Some(p), Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(Some(g), Color::Red);
                    z = g;
                    continue;
                }
                if self.left(Some(p)) == Some(z) {
                    z = p;
                    self.rotate_right(array, z);
                }
                let p = self.parent(Some(z));
                self.set_color(p, Color::Black);
                self.set_color(Some(g), Color::Red);
                self.rotate_left(array, g);
            }
        }
        let root = self.root(array);
        self.set_color(root, Color::Black);
    }

    /// Unlinks `z` from the tree, rebalances, and orphans it.
    fn unlink(&mut self, array: ArrayId, z: NodeId) -> Result<()> {
        if self.live_node(z).is_none() {
            return Ok(());
        }
        let z_left = self.left(Some(z));
        let z_right = self.right(Some(z));
        let mut removed_color = self.color(Some(z));
        let x;
        let x_parent;

        match (z_left, z_right) {
            (None, _) => {
                x = z_right;
                x_parent = self.parent(Some(z));
                self.replace_child(array, z, z_right);
            }
            (_, None) => {
                x = z_left;
                x_parent = self.parent(Some(z));
                self.replace_child(array, z, z_left);
            }
            (Some(_), Some(zr)) => {
                let y = self.minimum(zr);
                removed_color = self.color(Some(y));
                x = self.right(Some(y));
                if self.parent(Some(y)) == Some(z) {
                    x_parent = Some(y);
                    self.set_parent(x, Some(y));
                } else {
                    x_parent = self.parent(Some(y));
                    self.replace_child(array, y, x);
                    self.set_right(y, Some(zr));
                    self.set_parent(Some(zr), Some(y));
                }
                self.replace_child(array, z, Some(y));
                self.set_left(y, z_left);
                self.set_parent(z_left, Some(y));
                let z_color = self.color(Some(z));
                self.set_color(Some(y), z_color);
            }
        }

        if removed_color == Color::Black {
            self.delete_fixup(array, x, x_parent);
        }

        if let Some(node) = self.nodes.get_mut(z.raw()) {
            node.parent = None;
            node.left = None;
            node.right = None;
            node.orphaned = true;
        }
        let base = self.base_mut(array)?;
        base.size = base.size.saturating_sub(1);
        Ok(())
    }

    fn delete_fixup(&mut self, array: ArrayId, mut x: Option<NodeId>, mut x_parent: Option<NodeId>) {
        while x != self.root(array) && self.color(x) == Color::Black {
            let Some(p) = x_parent else { break };

            if self.left(Some(p)) == x {
                let mut w = self.right(Some(p));
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(Some(p), Color::Red);
                    self.rotate_left(array, p);
                    w = self.right(Some(p));
                }
                if self.color(self.left(w)) == Color::Black && self.color(self.right(w)) == Color::Black {
                    self.set_color(w, Color::Red);
                    x = Some(p);
                    x_parent = self.parent(Some(p));
                } else {
                    if self.color(self.right(w)) == Color::Black {
                        self.set_color(self.left(w), Color::Black);
                        self.set_color(w, Color::Red);
                        if let Some(w) = w {
                            self.rotate_right(array, w);
                        }
                        w = self.right(Some(p));
                    }
                    self.set_color(w, self.color(Some(p)));
                    self.set_color(Some(p), Color::Black);
                    self.set_color(self.right(w), Color::Black);
                    self.rotate_left(array, p);
                    x = self.root(array);
                    x_parent = None;
                }
            } else {
                let mut w = self.left(Some(p));
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(Some(p), Color::Red);
                    self.rotate_right(array, p);
                    w = self.left(Some(p));
                }
                if self.color(self.right(w)) == Color::Black && self.color(self.left(w)) == Color::Black {
                    self.set_color(w, Color::Red);
                    x = Some(p);
                    x_parent = self.parent(Some(p));
                } else {
                    if self.color(self.left(w)) == Color::Black {
                        self.set_color(self.right(w), Color::Black);
                        self.set_color(w, Color::Red);
                        if let Some(w) = w {
                            self.rotate_left(array, w);
                        }
                        w = self.left(Some(p));
                    }
                    self.set_color(w, self.color(Some(p)));
                    self.set_color(Some(p), Color::Black);
                    self.set_color(self.left(w), Color::Black);
                    self.rotate_right(array, p);
                    x = self.root(array);
                    x_parent = None;
                }
            }
        }
        self.set_color(x, Color::Black);
    }

    /// Checks the red-black properties and returns the black height.
    #[cfg(test)]
    fn check(&self, array: ArrayId, strings: &StringArena) -> usize {
        fn walk(store: &ArrayStore, strings: &StringArena, node: Option<NodeId>, parent: Option<NodeId>) -> (usize, usize) {
            let Some(id) = node else { return (1, 0) };
            let n = store.node(id).expect("linked node is live");
            assert!(!n.orphaned);
            assert_eq!(n.parent, parent, "parent link");
            if n.color == Color::Red {
                assert_eq!(store.color(n.left), Color::Black, "red-red");
                assert_eq!(store.color(n.right), Color::Black, "red-red");
            }
            let key = strings.get(n.key).unwrap();
            if let Some(l) = n.left.and_then(|l| store.node(l)) {
                assert!(strings.get(l.key).unwrap() < key);
            }
            if let Some(r) = n.right.and_then(|r| store.node(r)) {
                assert!(strings.get(r.key).unwrap() > key);
            }
            let (lh, lc) = walk(store, strings, n.left, Some(id));
            let (rh, rc) = walk(store, strings, n.right, Some(id));
            assert_eq!(lh, rh, "black height");
            (lh + usize::from(n.color == Color::Black), lc + rc + 1)
        }
        let root = self.root(array);
        assert_eq!(self.color(root), Color::Black);
        let (height, count) = walk(self, strings, root, None);
        assert_eq!(count, self.size(array).unwrap());
        height
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone)]
    enum Op {
        Insert(String, i64),
        Delete(String),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            ("[a-f]{0,3}", any::<i64>()).prop_map(|(k, v)| Op::Insert(k, v)),
            "[a-f]{0,3}".prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn behaves_like_btreemap(ops in prop::collection::vec(op(), 0..200)) {
            let mut strings = StringArena::new();
            let mut store = ArrayStore::new();
            let array = store.create();
            let mut model = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(k, v) => {
                        let key = strings.allocate_copy(&k);
                        store.insert(&strings, array, key, Value::Int(v)).unwrap();
                        model.insert(k, v);
                    }
                    Op::Delete(k) => {
                        let removed = store.delete(&strings, array, &k).unwrap();
                        prop_assert_eq!(removed, model.remove(&k).is_some());
                    }
                }
            }

            store.check(array, &strings);
            let actual: Vec<(String, Value)> = store
                .entries(array)
                .unwrap()
                .into_iter()
                .map(|(k, v)| (strings.get(k).unwrap().to_string(), v))
                .collect();
            let expected: Vec<(String, Value)> =
                model.into_iter().map(|(k, v)| (k, Value::Int(v))).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
