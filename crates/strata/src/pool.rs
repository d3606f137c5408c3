//! Fixed-capacity slot allocator backed by an occupancy bitset.
//!
//! A [`Pool`] holds `capacity` slots of `size` bytes each. Capacity is always
//! a multiple of 64 so that occupancy is a whole number of `u64` words, one
//! bit per slot, `1` meaning live.
//!
//! Allocation first retries the word used last time, then scans words from
//! the highest down, taking the lowest free bit of the first word with room.
//!
//! # Format
//!
//! ```text
//! ["pool"] [version u32] [length u64] [size u64] [capacity u64]
//! [occupancy: capacity/64 × u64] [data: size × capacity bytes]
//! ```

use std::fmt;

use crate::allocator::Allocator;
use crate::codec::{self, malformed};
use crate::error::PersistError;
use crate::handle::PoolRef;
use crate::raw::RawBuffer;
use crate::stream::Stream;

/// Magic bytes at the start of a serialized pool.
pub const POOL_MAGIC: [u8; 4] = *b"pool";

/// Slots per occupancy word.
pub const BITS: usize = 64;

/// Largest capacity whose slot indices all fit a `u32`.
const MAX_CAPACITY: u64 = 1 << 32;

/// Fixed-capacity, fixed-size slot allocator.
///
/// Slots are addressed by [`PoolRef`] indices, never by pointer. Slot bytes
/// are zeroed at creation and are not touched by `allocate` or `deallocate`.
pub struct Pool<'a> {
    size: usize,
    capacity: usize,
    length: usize,
    /// Word index that satisfied the most recent allocation.
    last: usize,
    occupancy: RawBuffer<'a, u64>,
    data: RawBuffer<'a, u8>,
}

impl<'a> Pool<'a> {
    /// Create an empty pool of at least `capacity` slots of `size` bytes.
    ///
    /// Capacity is rounded up to a multiple of 64. Returns `None` if the
    /// rounded capacity exceeds `u32` indexing, the byte size overflows, or
    /// `allocator` is out of memory.
    pub fn create(allocator: &'a dyn Allocator, size: usize, capacity: usize) -> Option<Self> {
        let capacity = capacity.checked_next_multiple_of(BITS)?;
        if capacity as u64 > MAX_CAPACITY {
            return None;
        }
        let bytes = size.checked_mul(capacity)?;
        let occupancy = RawBuffer::zeroed(allocator, capacity / BITS)?;
        let data = RawBuffer::zeroed(allocator, bytes)?;
        Some(Self {
            size,
            capacity,
            length: 0,
            last: 0,
            occupancy,
            data,
        })
    }

    /// Bytes per slot.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Total slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live slots.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Whether no slot is live.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether every slot is live.
    pub fn is_full(&self) -> bool {
        self.length == self.capacity
    }

    /// The occupancy bitset, one bit per slot.
    pub fn occupancy(&self) -> &[u64] {
        self.occupancy.as_slice()
    }

    /// Whether `r` names a live slot. Out-of-range handles are not live.
    pub fn is_live(&self, r: PoolRef) -> bool {
        self.occupancy()
            .get(r.word())
            .is_some_and(|&word| word & r.mask() != 0)
    }

    /// Claim a free slot, or `None` when the pool is full.
    pub fn allocate(&mut self) -> Option<PoolRef> {
        let words = self.occupancy.as_mut_slice();
        let mut word = self.last;
        if words.get(word).is_none_or(|&w| w == u64::MAX) {
            word = (0..words.len()).rev().find(|&i| words[i] != u64::MAX)?;
        }
        let bit = (!words[word]).trailing_zeros() as usize;
        words[word] |= 1 << bit;
        self.length += 1;
        self.last = word;
        Some(PoolRef::new((word * BITS + bit) as u32))
    }

    /// Release a live slot.
    ///
    /// Releasing a slot that is not live is a caller bug: it asserts in
    /// debug builds and is ignored otherwise.
    pub fn deallocate(&mut self, r: PoolRef) {
        if !self.is_live(r) {
            debug_assert!(false, "deallocating {r} which is not live");
            return;
        }
        self.occupancy.as_mut_slice()[r.word()] &= !r.mask();
        self.length -= 1;
    }

    /// Byte range of slot `r`.
    fn range(&self, r: PoolRef) -> std::ops::Range<usize> {
        let index = r.index as usize;
        assert!(
            index < self.capacity,
            "{r} out of range for capacity {}",
            self.capacity
        );
        let start = index * self.size;
        start..start + self.size
    }

    /// The bytes of slot `r`.
    ///
    /// # Panics
    ///
    /// If `r.index() >= capacity`.
    pub fn get(&self, r: PoolRef) -> &[u8] {
        let range = self.range(r);
        &self.data.as_slice()[range]
    }

    /// The bytes of slot `r`, mutably.
    ///
    /// # Panics
    ///
    /// If `r.index() >= capacity`.
    pub fn get_mut(&mut self, r: PoolRef) -> &mut [u8] {
        let range = self.range(r);
        &mut self.data.as_mut_slice()[range]
    }

    /// Write the pool to `stream`. Does not modify the pool.
    pub fn save(&self, stream: &mut dyn Stream) -> Result<(), PersistError> {
        codec::write_header(stream, POOL_MAGIC)?;
        codec::write_u64_le(stream, self.length as u64)?;
        codec::write_u64_le(stream, self.size as u64)?;
        codec::write_u64_le(stream, self.capacity as u64)?;
        codec::write_u64_words(stream, self.occupancy())?;
        stream.write(self.data.as_slice())?;
        Ok(())
    }

    /// Read a pool written by [`save`](Self::save), allocating its buffers
    /// from `allocator`.
    ///
    /// On any error every buffer acquired so far is released again.
    pub fn load(allocator: &'a dyn Allocator, stream: &mut dyn Stream) -> Result<Self, PersistError> {
        codec::read_header(stream, POOL_MAGIC)?;
        let length = codec::read_len(stream, "length")?;
        let size = codec::read_len(stream, "size")?;
        let capacity = codec::read_len(stream, "capacity")?;

        if capacity % BITS != 0 || capacity as u64 > MAX_CAPACITY {
            return Err(malformed(format!("invalid pool capacity {capacity}")));
        }
        if length > capacity {
            return Err(malformed(format!(
                "length {length} exceeds capacity {capacity}"
            )));
        }
        let bytes = size
            .checked_mul(capacity)
            .ok_or_else(|| malformed(format!("pool of {capacity} slots of {size} bytes overflows")))?;

        let words = capacity / BITS;
        let mut occupancy = RawBuffer::<u64>::zeroed(allocator, words)
            .ok_or(PersistError::OutOfMemory { requested: words * 8 })?;
        codec::read_u64_words(stream, occupancy.as_mut_slice())?;

        let live: usize = occupancy
            .as_slice()
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum();
        if live != length {
            return Err(malformed(format!(
                "length {length} disagrees with {live} occupied slots"
            )));
        }

        let mut data = RawBuffer::<u8>::zeroed(allocator, bytes)
            .ok_or(PersistError::OutOfMemory { requested: bytes })?;
        stream.read(data.as_mut_slice())?;

        Ok(Self {
            size,
            capacity,
            length,
            last: 0,
            occupancy,
            data,
        })
    }
}

impl fmt::Debug for Pool<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .field("length", &self.length)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaAllocator;
    use crate::stream::MemoryStream;
    use crate::system::SystemAllocator;
    use std::collections::HashSet;

    #[test]
    fn capacity_rounds_up_to_words() {
        let system = SystemAllocator;
        let pool = Pool::create(&system, 4, 65).unwrap();
        assert_eq!(pool.capacity(), 128);
        assert_eq!(pool.occupancy().len(), 2);
    }

    #[test]
    fn saturation_yields_distinct_indices() {
        let system = SystemAllocator;
        let mut pool = Pool::create(&system, 8, 64).unwrap();
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let r = pool.allocate().unwrap();
            assert!(r.index() < 64);
            assert!(seen.insert(r));
        }
        assert!(pool.allocate().is_none());
        assert_eq!(pool.length(), 64);
        assert!(pool.is_full());
    }

    #[test]
    fn scan_starts_from_the_highest_word() {
        let system = SystemAllocator;
        let mut pool = Pool::create(&system, 1, 192).unwrap();
        // The cached word 0 has room, so the first 64 land there.
        for i in 0..64 {
            assert_eq!(pool.allocate().unwrap().index(), i);
        }
        // Word 0 is full; the downward scan picks word 2 before word 1.
        assert_eq!(pool.allocate().unwrap().index(), 128);
        assert_eq!(pool.allocate().unwrap().index(), 129);
    }

    #[test]
    fn freed_slot_in_cached_word_is_reused() {
        let system = SystemAllocator;
        let mut pool = Pool::create(&system, 1, 64).unwrap();
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        pool.deallocate(a);
        assert!(!pool.is_live(a));
        assert_eq!(pool.allocate().unwrap(), a);
    }

    #[test]
    fn zero_capacity_pool_is_always_full() {
        let system = SystemAllocator;
        let mut pool = Pool::create(&system, 16, 0).unwrap();
        assert_eq!(pool.capacity(), 0);
        assert!(pool.allocate().is_none());
    }

    #[test]
    fn oversized_capacity_is_rejected() {
        let system = SystemAllocator;
        assert!(Pool::create(&system, 1, (MAX_CAPACITY + 1) as usize).is_none());
        assert!(Pool::create(&system, usize::MAX, 64).is_none());
    }

    #[test]
    fn slot_bytes_are_addressable() {
        let system = SystemAllocator;
        let mut pool = Pool::create(&system, 4, 64).unwrap();
        let r = pool.allocate().unwrap();
        pool.get_mut(r).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(pool.get(r), &[1, 2, 3, 4]);
        assert_eq!(pool.get(PoolRef::new(1)), &[0; 4]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn get_out_of_range_panics() {
        let system = SystemAllocator;
        let pool = Pool::create(&system, 4, 64).unwrap();
        let _ = pool.get(PoolRef::new(64));
    }

    #[test]
    fn arena_reset_after_pool_drop_hands_out_fresh_slots() {
        let mut backing = vec![0u8; 4096];
        let mut arena = ArenaAllocator::new(&mut backing);
        {
            let mut first = Pool::create(&arena, 8, 4).unwrap();
            let r = first.allocate().unwrap();
            first.get_mut(r).fill(0xEE);
        }
        arena.reset();
        assert_eq!(arena.used(), 0);

        let mut a = Pool::create(&arena, 8, 4).unwrap();
        let mut b = Pool::create(&arena, 8, 4).unwrap();
        let ra = a.allocate().unwrap();
        let rb = b.allocate().unwrap();
        b.get_mut(rb).fill(0xEE);
        assert_eq!(a.get(ra), &[0; 8]);
    }

    #[test]
    fn save_writes_documented_layout() {
        let system = SystemAllocator;
        let mut pool = Pool::create(&system, 2, 64).unwrap();
        let r = pool.allocate().unwrap();
        pool.get_mut(r).copy_from_slice(&[0xAB, 0xCD]);

        let mut stream = MemoryStream::new();
        pool.save(&mut stream).unwrap();
        let bytes = stream.as_bytes();
        assert_eq!(bytes.len(), 32 + 8 + 128);
        assert_eq!(&bytes[0..4], b"pool");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &1u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &2u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &64u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &1u64.to_le_bytes());
        assert_eq!(&bytes[40..42], &[0xAB, 0xCD]);
    }

    #[test]
    fn load_round_trips() {
        let system = SystemAllocator;
        let mut pool = Pool::create(&system, 3, 128).unwrap();
        for i in 0..70u8 {
            let r = pool.allocate().unwrap();
            pool.get_mut(r).fill(i);
        }
        pool.deallocate(PoolRef::new(5));

        let mut stream = MemoryStream::new();
        pool.save(&mut stream).unwrap();
        let loaded = Pool::load(&system, &mut stream).unwrap();
        assert_eq!(loaded.size(), pool.size());
        assert_eq!(loaded.capacity(), pool.capacity());
        assert_eq!(loaded.length(), pool.length());
        assert_eq!(loaded.occupancy(), pool.occupancy());
        for i in 0..128 {
            let r = PoolRef::new(i);
            assert_eq!(loaded.get(r), pool.get(r));
        }
    }

    #[test]
    fn load_rejects_length_mismatch() {
        let system = SystemAllocator;
        let mut pool = Pool::create(&system, 1, 64).unwrap();
        let _r = pool.allocate().unwrap();
        let mut stream = MemoryStream::new();
        pool.save(&mut stream).unwrap();
        let mut bytes = stream.into_bytes();
        bytes[8] = 2;
        let err = Pool::load(&system, &mut MemoryStream::from_bytes(bytes)).unwrap_err();
        assert!(matches!(err, PersistError::Malformed { .. }));
    }

    #[test]
    fn load_rejects_unaligned_capacity() {
        let mut stream = MemoryStream::new();
        codec::write_header(&mut stream, POOL_MAGIC).unwrap();
        codec::write_u64_le(&mut stream, 0).unwrap();
        codec::write_u64_le(&mut stream, 1).unwrap();
        codec::write_u64_le(&mut stream, 10).unwrap();
        let err = Pool::load(&SystemAllocator, &mut stream).unwrap_err();
        assert!(matches!(err, PersistError::Malformed { .. }));
    }

    #[test]
    fn load_rejects_truncated_payload() {
        let system = SystemAllocator;
        let pool = Pool::create(&system, 8, 64).unwrap();
        let mut stream = MemoryStream::new();
        pool.save(&mut stream).unwrap();
        let mut bytes = stream.into_bytes();
        bytes.truncate(bytes.len() - 1);
        let err = Pool::load(&system, &mut MemoryStream::from_bytes(bytes)).unwrap_err();
        assert!(matches!(err, PersistError::Io(_)));
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn length_matches_popcount(
                ops in proptest::collection::vec(any::<bool>(), 1..300),
            ) {
                let system = SystemAllocator;
                let mut pool = Pool::create(&system, 1, 128).unwrap();
                let mut live = Vec::new();
                for allocate in ops {
                    if allocate || live.is_empty() {
                        if let Some(r) = pool.allocate() {
                            prop_assert!(!live.contains(&r));
                            live.push(r);
                        }
                    } else {
                        let r = live.swap_remove(0);
                        pool.deallocate(r);
                    }
                    let popcount: u32 = pool.occupancy().iter().map(|w| w.count_ones()).sum();
                    prop_assert_eq!(pool.length(), popcount as usize);
                    prop_assert_eq!(pool.length(), live.len());
                }
            }

            #[test]
            fn save_load_preserves_any_pool(
                ops in proptest::collection::vec((any::<bool>(), any::<u8>()), 1..400),
            ) {
                let system = SystemAllocator;
                let mut pool = Pool::create(&system, 3, 192).unwrap();
                let mut live = Vec::new();
                for (allocate, fill) in ops {
                    if allocate || live.is_empty() {
                        if let Some(r) = pool.allocate() {
                            pool.get_mut(r).fill(fill);
                            live.push(r);
                        }
                    } else {
                        let r = live.swap_remove(fill as usize % live.len());
                        pool.deallocate(r);
                    }
                }

                let mut stream = MemoryStream::new();
                pool.save(&mut stream).unwrap();
                let loaded = Pool::load(&system, &mut stream).unwrap();
                prop_assert_eq!(stream.remaining(), 0);
                prop_assert_eq!(loaded.length(), pool.length());
                prop_assert_eq!(loaded.occupancy(), pool.occupancy());
                for i in 0..pool.capacity() as u32 {
                    let r = PoolRef::new(i);
                    prop_assert_eq!(loaded.get(r), pool.get(r));
                }
            }
        }
    }
}
