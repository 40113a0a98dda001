//! Generational arenas with a per-slot mark bit.
//!
//! Every heap object of the macro VM (strings, array bases, array nodes,
//! programs, symbols) lives in an [`Arena`]. Entries are addressed by
//! [`RawHandle`]s carrying a generation counter, so a handle to an entry that
//! has since been freed (and possibly reused) is detected as stale instead of
//! dangling.
//!
//! The mark bit is a plain struct field owned by the slot. A collector clears
//! all marks, marks what is reachable, then calls [`Arena::sweep`].

// Arena indices are u32 by construction
#![allow(clippy::cast_possible_truncation)]

use std::fmt;

/// Untyped generational handle into an [`Arena`].
///
/// Even generations are free, odd generations are alive.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct RawHandle {
    /// Slot index in the arena.
    pub index: u32,
    /// Generation of the slot when this handle was issued.
    pub generation: u32,
}

impl RawHandle {
    /// Creates a handle from its raw parts.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Declares a typed handle wrapping a [`RawHandle`].
macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash)]
        pub struct $name(pub RawHandle);

        impl $name {
            /// Returns the untyped handle.
            #[must_use]
            pub const fn raw(self) -> RawHandle {
                self.0
            }
        }

        impl From<RawHandle> for $name {
            fn from(raw: RawHandle) -> Self {
                Self(raw)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }
    };
}

typed_handle!(
    /// Handle to a string in the string arena.
    StrId
);
typed_handle!(
    /// Handle to a sparse array (the tree base, not an entry).
    ArrayId
);
typed_handle!(
    /// Handle to one entry node of a sparse array.
    NodeId
);
typed_handle!(
    /// Handle to a finished program.
    ProgramId
);
typed_handle!(
    /// Handle to a symbol table entry.
    SymbolId
);

#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    marked: bool,
    entry: Option<T>,
}

/// A generational arena owning all of its entries.
///
/// Freed indices go on a free list and are reused with a bumped generation.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live_count: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live_count: 0,
        }
    }

    /// Stores `entry` and returns its handle.
    pub fn alloc(&mut self, entry: T) -> RawHandle {
        self.live_count += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            // was even/free, now odd/alive
            slot.generation += 1;
            slot.marked = false;
            slot.entry = Some(entry);
            RawHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 1,
                marked: false,
                entry: Some(entry),
            });
            RawHandle::new(index, 1)
        }
    }

    fn slot(&self, handle: RawHandle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.entry.is_some())
    }

    fn slot_mut(&mut self, handle: RawHandle) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.entry.is_some())
    }

    /// Returns the entry for `handle`, or `None` if the handle is stale.
    #[must_use]
    pub fn get(&self, handle: RawHandle) -> Option<&T> {
        self.slot(handle).and_then(|slot| slot.entry.as_ref())
    }

    /// Returns the entry for `handle` mutably, or `None` if the handle is stale.
    pub fn get_mut(&mut self, handle: RawHandle) -> Option<&mut T> {
        self.slot_mut(handle).and_then(|slot| slot.entry.as_mut())
    }

    /// Returns true if `handle` refers to a live entry.
    #[must_use]
    pub fn contains(&self, handle: RawHandle) -> bool {
        self.slot(handle).is_some()
    }

    /// Frees the entry for `handle` and returns it.
    pub fn remove(&mut self, handle: RawHandle) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        let entry = slot.entry.take();
        // was odd/alive, now even/free
        slot.generation += 1;
        slot.marked = false;
        self.free_list.push(handle.index);
        self.live_count -= 1;
        entry
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if there are no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Iterates over live entries and their handles.
    pub fn iter(&self) -> impl Iterator<Item = (RawHandle, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry
                .as_ref()
                .map(|entry| (RawHandle::new(index as u32, slot.generation), entry))
        })
    }

    // -------------------------------------------------------------------------
    // Mark and sweep
    // -------------------------------------------------------------------------

    /// Clears the mark bit on every slot.
    pub fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    /// Marks `handle` as in use.
    ///
    /// Returns true only when the entry was live and not yet marked, so a
    /// tracer can use the result to avoid revisiting an entry.
    pub fn mark(&mut self, handle: RawHandle) -> bool {
        match self.slot_mut(handle) {
            Some(slot) if !slot.marked => {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }

    /// Returns true if `handle` is live and marked.
    #[must_use]
    pub fn is_marked(&self, handle: RawHandle) -> bool {
        self.slot(handle).is_some_and(|slot| slot.marked)
    }

    /// Frees every live entry that is not marked. Returns the number freed.
    ///
    /// Marks on retained entries are left set; the next cycle clears them.
    pub fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.is_some() && !slot.marked {
                slot.entry = None;
                slot.generation += 1;
                self.free_list.push(index as u32);
                freed += 1;
            }
        }
        self.live_count -= freed;
        freed
    }
}
