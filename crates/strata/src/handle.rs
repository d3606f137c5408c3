//! Index handles for pool and slab slots.
//!
//! Handles are plain slot indices, never addresses. They stay valid across
//! reallocation and reload and serialize as the integer itself.

use std::fmt;

/// A slot in a [`Pool`](crate::Pool).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct PoolRef {
    pub(crate) index: u32,
}

impl PoolRef {
    /// Handle for slot `index`.
    pub const fn new(index: u32) -> Self {
        Self { index }
    }

    /// The slot index.
    pub const fn index(self) -> u32 {
        self.index
    }

    pub(crate) const fn word(self) -> usize {
        self.index as usize / 64
    }

    pub(crate) const fn mask(self) -> u64 {
        1 << (self.index % 64)
    }
}

impl fmt::Display for PoolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolRef({})", self.index)
    }
}

/// A slot in a [`Slab`](crate::Slab): `cache * capacity + local`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct SlabRef {
    pub(crate) index: u64,
}

impl SlabRef {
    /// Handle for slab slot `index`.
    pub const fn new(index: u64) -> Self {
        Self { index }
    }

    /// The slab-wide slot index.
    pub const fn index(self) -> u64 {
        self.index
    }

    /// Split into `(cache, local)` for a per-cache capacity.
    pub(crate) fn split(self, capacity: usize) -> (usize, PoolRef) {
        let capacity = capacity as u64;
        let cache = (self.index / capacity) as usize;
        let local = PoolRef::new((self.index % capacity) as u32);
        (cache, local)
    }

    pub(crate) fn join(cache: usize, capacity: usize, local: PoolRef) -> Self {
        Self::new(cache as u64 * capacity as u64 + u64::from(local.index))
    }
}

impl fmt::Display for SlabRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlabRef({})", self.index)
    }
}
