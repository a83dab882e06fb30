//! Opaque handles and the table which resolves them.
//!
//! A handle is a slot index paired with the generation the slot had when the
//! handle was issued. Removing a value bumps the generation of its slot, so a
//! stale handle never resolves to a value stored in the same slot later.

use core::fmt;

use crate::error::{Error, Result};

/// The kind of resource a handle refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum HandleKind {
    /// A database connection.
    Connection,
    /// A prepared statement.
    Statement,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Connection => write!(f, "connection"),
            HandleKind::Statement => write!(f, "statement"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Handle {
    slot: u32,
    generation: u32,
}

impl Handle {
    #[inline]
    const fn into_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.slot as u64
    }

    #[inline]
    const fn from_raw(raw: u64) -> Self {
        Self {
            slot: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $kind:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $name(Handle);

        impl $name {
            pub(crate) const KIND: HandleKind = HandleKind::$kind;

            /// Reconstruct a handle from its raw value.
            ///
            /// Any value is accepted. Values which were never issued, or which
            /// refer to released resources, are rejected when used.
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(Handle::from_raw(raw))
            }

            /// The raw value of the handle, suitable for passing across a
            /// boundary which only understands integers.
            #[inline]
            pub const fn into_raw(self) -> u64 {
                self.0.into_raw()
            }

            #[inline]
            pub(crate) fn invalid(self) -> Error {
                Error::InvalidHandle {
                    kind: Self::KIND,
                    handle: self.into_raw(),
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.into_raw())
            }
        }
    };
}

define_handle! {
    /// An opaque handle to a database connection.
    ConnectionHandle, Connection
}

define_handle! {
    /// An opaque handle to a prepared statement.
    StatementHandle, Statement
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A table of values addressed by generation checked handles.
pub(crate) struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> HandleTable<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live values.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Store a value and return the handle which refers to it.
    ///
    /// Generations start at one, so the raw handle `0` is never issued.
    pub(crate) fn insert(&mut self, value: T) -> Result<Handle> {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                let Ok(slot) = u32::try_from(self.slots.len()) else {
                    return Err(Error::Misuse("handle table is full"));
                };

                self.slots.push(Slot {
                    generation: 1,
                    value: None,
                });

                slot
            }
        };

        let entry = &mut self.slots[slot as usize];
        entry.value = Some(value);
        self.len += 1;

        Ok(Handle {
            slot,
            generation: entry.generation,
        })
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        let slot = self.slots.get(handle.slot as usize)?;
        (slot.generation == handle.generation).then_some(slot)
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<&T> {
        self.slot(handle)?.value.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.slot as usize)?;

        if slot.generation != handle.generation {
            return None;
        }

        slot.value.as_mut()
    }

    /// Remove the value a handle refers to, invalidating the handle.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.slot as usize)?;

        if slot.generation != handle.generation {
            return None;
        }

        let value = slot.value.take()?;

        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            generation => generation,
        };

        self.free.push(handle.slot);
        self.len -= 1;
        Some(value)
    }

    /// Iterate over live values.
    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }

    /// Remove every value, in slot order.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.free.clear();
        self.len = 0;
        self.slots.drain(..).filter_map(|slot| slot.value)
    }
}

impl ConnectionHandle {
    #[inline]
    pub(crate) fn handle(self) -> Handle {
        self.0
    }

    #[inline]
    pub(crate) fn new(handle: Handle) -> Self {
        Self(handle)
    }
}

impl StatementHandle {
    #[inline]
    pub(crate) fn handle(self) -> Handle {
        self.0
    }

    #[inline]
    pub(crate) fn new(handle: Handle) -> Self {
        Self(handle)
    }
}
