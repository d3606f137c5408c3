//! Growable sequence of pools sharing one object size.
//!
//! A [`Slab`] grows by adding [`Pool`] caches of equal capacity. A
//! [`SlabRef`] is `cache * capacity + local`, so a handle keeps its meaning
//! as long as its cache slot does: caches that empty out in the middle of the
//! sequence are released in place and leave their slot behind, while empty
//! caches at the tail are popped.
//!
//! # Format
//!
//! ```text
//! ["slab"] [version u32] [size u64] [capacity u64] [caches u64]
//! [populated: ceil(caches/32) × u32] [pool]*
//! ```
//!
//! One pool record follows per populated slot, in slot order.

use std::fmt;

use smallvec::SmallVec;
use tracing::debug;

use crate::allocator::Allocator;
use crate::codec::{self, malformed};
use crate::error::PersistError;
use crate::handle::{PoolRef, SlabRef};
use crate::pool::{Pool, BITS};
use crate::stream::Stream;

/// Magic bytes at the start of a serialized slab.
pub const SLAB_MAGIC: [u8; 4] = *b"slab";

/// Cache slots per word of the populated-slot bitset.
const SLOT_BITS: usize = 32;

type Caches<'a> = SmallVec<[Option<Pool<'a>>; 4]>;

/// Unbounded slot allocator built from equally sized pools.
pub struct Slab<'a> {
    allocator: &'a dyn Allocator,
    size: usize,
    capacity: usize,
    caches: Caches<'a>,
}

/// Per-cache capacity actually used for a requested one.
fn cache_capacity(capacity: usize) -> Option<usize> {
    let capacity = capacity.max(1).checked_next_multiple_of(BITS)?;
    (capacity as u64 <= 1 << 32).then_some(capacity)
}

impl<'a> Slab<'a> {
    /// Create an empty slab of `size`-byte slots, with caches of at least
    /// `capacity` slots.
    ///
    /// The per-cache capacity is rounded up to a multiple of 64 (at least
    /// 64). Returns `None` if that exceeds what one pool can index. No
    /// memory is acquired until the first allocation.
    pub fn new(allocator: &'a dyn Allocator, size: usize, capacity: usize) -> Option<Self> {
        Some(Self {
            allocator,
            size,
            capacity: cache_capacity(capacity)?,
            caches: SmallVec::new(),
        })
    }

    /// Bytes per slot.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots per cache.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cache slots, populated or not.
    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    /// Number of cache slots holding a pool.
    pub fn populated_caches(&self) -> usize {
        self.caches.iter().filter(|c| c.is_some()).count()
    }

    /// Live slots across all caches.
    pub fn length(&self) -> usize {
        self.caches.iter().flatten().map(Pool::length).sum()
    }

    /// Whether no slot is live.
    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    fn pool(&self, r: SlabRef) -> Option<(&Pool<'a>, PoolRef)> {
        let (cache, local) = r.split(self.capacity);
        let pool = self.caches.get(cache)?.as_ref()?;
        Some((pool, local))
    }

    /// Whether `r` names a live slot.
    pub fn is_live(&self, r: SlabRef) -> bool {
        self.pool(r).is_some_and(|(pool, local)| pool.is_live(local))
    }

    /// The bytes of slot `r`, or `None` if its cache is not populated.
    pub fn get(&self, r: SlabRef) -> Option<&[u8]> {
        self.pool(r).map(|(pool, local)| pool.get(local))
    }

    /// The bytes of slot `r` mutably, or `None` if its cache is not
    /// populated.
    pub fn get_mut(&mut self, r: SlabRef) -> Option<&mut [u8]> {
        let (cache, local) = r.split(self.capacity);
        let pool = self.caches.get_mut(cache)?.as_mut()?;
        Some(pool.get_mut(local))
    }

    /// Claim a free slot, adding a cache if every existing one is full.
    ///
    /// Caches are searched newest first. A new cache fills the first empty
    /// slot, or is appended. Returns `None` only when the allocator cannot
    /// provide a new cache.
    pub fn allocate(&mut self) -> Option<SlabRef> {
        let capacity = self.capacity;
        for (index, cache) in self.caches.iter_mut().enumerate().rev() {
            if let Some(local) = cache.as_mut().and_then(Pool::allocate) {
                return Some(SlabRef::join(index, capacity, local));
            }
        }

        let Some(mut pool) = Pool::create(self.allocator, self.size, capacity) else {
            debug!(size = self.size, capacity, "slab could not create a cache");
            return None;
        };
        let local = pool.allocate()?;
        let index = match self.caches.iter().position(Option::is_none) {
            Some(index) => {
                self.caches[index] = Some(pool);
                index
            }
            None => {
                self.caches.push(Some(pool));
                self.caches.len() - 1
            }
        };
        debug!(cache = index, caches = self.caches.len(), "slab created cache");
        Some(SlabRef::join(index, capacity, local))
    }

    /// Release a live slot.
    ///
    /// If its cache becomes empty the cache is released: popped, along with
    /// any empty caches before it, when it is the last one, otherwise freed
    /// in place.
    pub fn deallocate(&mut self, r: SlabRef) {
        let (cache, local) = r.split(self.capacity);
        let Some(Some(pool)) = self.caches.get_mut(cache) else {
            debug_assert!(false, "deallocating {r} from an unpopulated cache");
            return;
        };
        pool.deallocate(local);
        if !pool.is_empty() {
            return;
        }

        if cache + 1 == self.caches.len() {
            while self
                .caches
                .last()
                .is_some_and(|c| c.as_ref().is_none_or(Pool::is_empty))
            {
                self.caches.pop();
                debug!(caches = self.caches.len(), "slab popped trailing cache");
            }
        } else {
            self.caches[cache] = None;
            debug!(cache, "slab released cache in place");
        }
    }

    /// Write the slab to `stream`. Does not modify the slab.
    pub fn save(&self, stream: &mut dyn Stream) -> Result<(), PersistError> {
        codec::write_header(stream, SLAB_MAGIC)?;
        codec::write_u64_le(stream, self.size as u64)?;
        codec::write_u64_le(stream, self.capacity as u64)?;
        codec::write_u64_le(stream, self.caches.len() as u64)?;

        let mut populated = vec![0u32; self.caches.len().div_ceil(SLOT_BITS)];
        for (index, cache) in self.caches.iter().enumerate() {
            if cache.is_some() {
                populated[index / SLOT_BITS] |= 1 << (index % SLOT_BITS);
            }
        }
        codec::write_u32_words(stream, &populated)?;

        for pool in self.caches.iter().flatten() {
            pool.save(stream)?;
        }
        Ok(())
    }

    /// Read a slab written by [`save`](Self::save), allocating every cache
    /// from `allocator`.
    ///
    /// On any error every cache loaded so far is released again.
    pub fn load(allocator: &'a dyn Allocator, stream: &mut dyn Stream) -> Result<Self, PersistError> {
        codec::read_header(stream, SLAB_MAGIC)?;
        let size = codec::read_len(stream, "size")?;
        let capacity = codec::read_len(stream, "capacity")?;
        let count = codec::read_len(stream, "cache count")?;

        if cache_capacity(capacity) != Some(capacity) {
            return Err(malformed(format!("invalid slab capacity {capacity}")));
        }

        let mut populated = Vec::new();
        for _ in 0..count.div_ceil(SLOT_BITS) {
            populated.push(codec::read_u32_le(stream)?);
        }
        let is_populated = |index: usize| populated[index / SLOT_BITS] & (1 << (index % SLOT_BITS)) != 0;
        if count > 0 && !is_populated(count - 1) {
            return Err(malformed(format!(
                "trailing cache slot {} is empty",
                count - 1
            )));
        }

        let mut caches = Caches::new();
        for index in 0..count {
            if !is_populated(index) {
                caches.push(None);
                continue;
            }
            let pool = Pool::load(allocator, stream)?;
            if pool.size() != size || pool.capacity() != capacity {
                return Err(malformed(format!(
                    "cache {index} has {} slots of {} bytes, expected {capacity} of {size}",
                    pool.capacity(),
                    pool.size()
                )));
            }
            caches.push(Some(pool));
        }

        Ok(Self {
            allocator,
            size,
            capacity,
            caches,
        })
    }
}

impl fmt::Debug for Slab<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .field("caches", &self.caches)
            .finish_non_exhaustive()
    }
}
