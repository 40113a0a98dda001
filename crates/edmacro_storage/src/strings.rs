//! Arena of macro strings.
//!
//! Strings are allocated by the VM (concatenation results, subscript keys,
//! native routine results) and by the symbol table (string constants). They
//! are never freed individually; the collector reclaims the unreachable ones.

use edmacro_foundation::{Arena, Error, Result, StrId};

/// Owner of every string a macro can reference.
#[derive(Debug, Clone, Default)]
pub struct StringArena {
    arena: Arena<String>,
}

impl StringArena {
    /// Creates an empty string arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an empty string with room for `length` bytes.
    ///
    /// The caller fills it through [`StringArena::get_mut`].
    pub fn allocate(&mut self, length: usize) -> StrId {
        StrId(self.arena.alloc(String::with_capacity(length)))
    }

    /// Allocates a copy of `source`.
    pub fn allocate_copy(&mut self, source: &str) -> StrId {
        StrId(self.arena.alloc(source.to_owned()))
    }

    /// Takes ownership of `source` without copying.
    pub fn adopt(&mut self, source: String) -> StrId {
        StrId(self.arena.alloc(source))
    }

    /// Returns the contents of a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string has been collected.
    pub fn get(&self, id: StrId) -> Result<&str> {
        self.arena
            .get(id.raw())
            .map(String::as_str)
            .ok_or_else(|| Error::stale("string"))
    }

    /// Returns a string for in-place filling.
    ///
    /// # Errors
    ///
    /// Returns an error if the string has been collected.
    pub fn get_mut(&mut self, id: StrId) -> Result<&mut String> {
        self.arena
            .get_mut(id.raw())
            .ok_or_else(|| Error::stale("string"))
    }

    /// Returns true if the string is still allocated.
    #[must_use]
    pub fn contains(&self, id: StrId) -> bool {
        self.arena.contains(id.raw())
    }

    /// Number of allocated strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Returns true if no strings are allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub(crate) fn clear_marks(&mut self) {
        self.arena.clear_marks();
    }

    pub(crate) fn mark(&mut self, id: StrId) {
        self.arena.mark(id.raw());
    }

    pub(crate) fn sweep(&mut self) -> usize {
        self.arena.sweep()
    }
}
