//! Bump-pointer arenas over one contiguous region.
//!
//! [`ArenaAllocator`] bumps a cursor through a caller-provided byte slice.
//! [`InlineAllocator`] does the same over a fixed buffer stored inline.
//! Both share the same cursor logic, which works in offsets from the start
//! of the region so the inline variant never stores a pointer to itself.
//!
//! Every request is rounded up to [`GRANULE`] bytes. Because of that the
//! most recent allocation can be recognised by exact cursor equality, which
//! is what makes LIFO `free`, in-place `shrink` and in-place `grow` work.

use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;

use crate::address::{checked_round, round, Address, MemoryRegion, GRANULE};
use crate::allocator::Allocator;
use crate::raw;

/// Cursor bookkeeping for a region of `len` bytes.
///
/// All methods take the region's current base address. Invariant:
/// `cursor <= len` and `cursor` is a multiple of [`GRANULE`].
#[derive(Debug)]
pub(crate) struct Bump {
    len: usize,
    cursor: Cell<usize>,
}

impl Bump {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            len,
            cursor: Cell::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn used(&self) -> usize {
        self.cursor.get()
    }

    pub(crate) fn reset(&self) {
        self.cursor.set(0);
    }

    pub(crate) fn owns(&self, base: usize, addr: Address, len: usize) -> bool {
        MemoryRegion::new(base, self.len).contains(addr, len)
    }

    /// Whether `[addr, addr + round(len))` ends exactly at the cursor.
    fn is_last(&self, base: usize, addr: Address, rounded_len: usize) -> bool {
        addr.get() - base + rounded_len == self.cursor.get()
    }

    pub(crate) fn alloc(&self, base: usize, req_len: usize, zero: bool) -> Option<Address> {
        let len = checked_round(req_len)?;
        let cursor = self.cursor.get();
        if len > self.len - cursor {
            return None;
        }
        let addr = Address::new(base + cursor)?;
        self.cursor.set(cursor + len);
        if zero {
            // SAFETY: `[addr, addr + req_len)` lies inside the region.
            unsafe { raw::zero(addr, req_len) };
        }
        Some(addr)
    }

    pub(crate) fn free(&self, base: usize, addr: Address, req_old_len: usize) {
        debug_assert!(
            self.owns(base, addr, req_old_len),
            "freeing {addr} which this arena does not own"
        );
        let old_len = round(req_old_len);
        if self.is_last(base, addr, old_len) {
            self.cursor.set(self.cursor.get() - old_len);
        }
    }

    pub(crate) fn shrink(&self, base: usize, addr: Address, req_old_len: usize, req_new_len: usize) {
        debug_assert!(
            req_new_len <= req_old_len,
            "shrink from {req_old_len} to larger {req_new_len}"
        );
        debug_assert!(
            self.owns(base, addr, req_old_len),
            "shrinking {addr} which this arena does not own"
        );
        let old_len = round(req_old_len);
        let new_len = round(req_new_len);
        if self.is_last(base, addr, old_len) {
            self.cursor.set(self.cursor.get() - old_len + new_len);
        }
    }

    pub(crate) fn grow(
        &self,
        base: usize,
        addr: Address,
        req_old_len: usize,
        req_new_len: usize,
        zero: bool,
    ) -> Option<Address> {
        debug_assert!(
            req_new_len >= req_old_len,
            "grow from {req_old_len} to smaller {req_new_len}"
        );
        debug_assert!(
            self.owns(base, addr, req_old_len),
            "growing {addr} which this arena does not own"
        );
        let old_len = round(req_old_len);
        let new_len = checked_round(req_new_len)?;
        if self.is_last(base, addr, old_len) {
            let delta = new_len - old_len;
            let cursor = self.cursor.get();
            if delta > self.len - cursor {
                return None;
            }
            if zero {
                // SAFETY: the extension lies inside the region.
                unsafe { raw::zero(addr.offset(req_old_len), req_new_len - req_old_len) };
            }
            self.cursor.set(cursor + delta);
            return Some(addr);
        }
        let new_addr = self.alloc(base, req_new_len, false)?;
        // SAFETY: both blocks lie inside the region and do not overlap.
        unsafe {
            raw::copy(new_addr, addr, req_old_len);
            if zero {
                raw::zero(new_addr.offset(req_old_len), req_new_len - req_old_len);
            }
        }
        self.free(base, addr, req_old_len);
        Some(new_addr)
    }
}

/// Bump allocator over one borrowed region.
///
/// The region is the caller's slice with its start aligned up to
/// [`GRANULE`]. Freed memory is only reclaimed when it is the most recent
/// allocation; everything else is reclaimed at once by [`ArenaAllocator::reset`].
pub struct ArenaAllocator<'a> {
    base: usize,
    bump: Bump,
    _region: PhantomData<&'a mut [u8]>,
}

impl<'a> ArenaAllocator<'a> {
    /// Create an arena over `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        let begin = buf.as_mut_ptr() as usize;
        let skip = begin.next_multiple_of(GRANULE) - begin;
        let len = buf.len().saturating_sub(skip);
        Self {
            base: begin + skip,
            bump: Bump::new(len),
            _region: PhantomData,
        }
    }

    /// Create an arena over `len` bytes at `base`.
    ///
    /// # Safety
    ///
    /// `[base, base + len)` must be valid for reads and writes, must not be
    /// accessed other than through this arena for `'a`, and `base` must be
    /// aligned to [`GRANULE`].
    pub(crate) unsafe fn from_raw_parts(base: Address, len: usize) -> Self {
        debug_assert!(base.is_aligned_to(GRANULE));
        Self {
            base: base.get(),
            bump: Bump::new(len),
            _region: PhantomData,
        }
    }

    /// Whether `[addr, addr + len)` lies inside this arena's region.
    pub fn owns(&self, addr: Address, len: usize) -> bool {
        self.bump.owns(self.base, addr, len)
    }

    /// Rewind the cursor to the start, invalidating every allocation.
    ///
    /// Takes `&mut self` so nothing holding the arena can still be using a
    /// block handed out before the reset:
    ///
    /// ```compile_fail
    /// use strata::{ArenaAllocator, Pool};
    ///
    /// let mut backing = [0u8; 4096];
    /// let mut arena = ArenaAllocator::new(&mut backing);
    /// let pool = Pool::create(&arena, 8, 4).unwrap();
    /// arena.reset(); // `pool` still borrows `arena`
    /// drop(pool);
    /// ```
    pub fn reset(&mut self) {
        self.bump.reset();
    }

    /// The managed region.
    pub fn region(&self) -> MemoryRegion {
        MemoryRegion::new(self.base, self.bump.len())
    }

    /// Region length in bytes.
    pub fn len(&self) -> usize {
        self.bump.len()
    }

    /// Whether the region has no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bump.len() == 0
    }

    /// Bytes consumed by live allocations (rounded).
    pub fn used(&self) -> usize {
        self.bump.used()
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.bump.len() - self.bump.used()
    }
}

// SAFETY: `Bump` hands out disjoint granule-aligned ranges of the borrowed
// region, which is exclusively ours for `'a`.
unsafe impl Allocator for ArenaAllocator<'_> {
    fn alloc(&self, len: usize, zero: bool) -> Option<Address> {
        self.bump.alloc(self.base, len, zero)
    }

    unsafe fn free(&self, addr: Address, old_len: usize) {
        self.bump.free(self.base, addr, old_len);
    }

    unsafe fn shrink(&self, addr: Address, old_len: usize, new_len: usize) {
        self.bump.shrink(self.base, addr, old_len, new_len);
    }

    unsafe fn grow(
        &self,
        addr: Address,
        old_len: usize,
        new_len: usize,
        zero: bool,
    ) -> Option<Address> {
        self.bump.grow(self.base, addr, old_len, new_len, zero)
    }
}

#[repr(C, align(16))]
struct InlineBuffer<const N: usize>([u8; N]);

/// Arena over an `N`-byte buffer stored inside the allocator itself.
///
/// Addresses handed out point into `self`, so they are only valid while the
/// allocator stays where it was when they were allocated. Moving it is
/// harmless once every allocation has been released or the arena reset.
pub struct InlineAllocator<const N: usize> {
    data: UnsafeCell<InlineBuffer<N>>,
    bump: Bump,
}

impl<const N: usize> InlineAllocator<N> {
    /// Create an empty inline arena.
    pub fn new() -> Self {
        Self {
            data: UnsafeCell::new(InlineBuffer([0; N])),
            bump: Bump::new(N),
        }
    }

    fn base(&self) -> usize {
        self.data.get() as usize
    }

    /// Whether `[addr, addr + len)` lies inside the inline buffer.
    pub fn owns(&self, addr: Address, len: usize) -> bool {
        self.bump.owns(self.base(), addr, len)
    }

    /// Rewind the cursor to the start, invalidating every allocation.
    ///
    /// Takes `&mut self` so nothing holding the arena can still be using a
    /// block handed out before the reset.
    pub fn reset(&mut self) {
        self.bump.reset();
    }

    /// Inline capacity in bytes.
    pub const fn len(&self) -> usize {
        N
    }

    /// Whether the inline capacity is zero.
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Bytes consumed by live allocations (rounded).
    pub fn used(&self) -> usize {
        self.bump.used()
    }
}

impl<const N: usize> Default for InlineAllocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: as for `ArenaAllocator`; the buffer is 16-aligned and lives in `self`.
unsafe impl<const N: usize> Allocator for InlineAllocator<N> {
    fn alloc(&self, len: usize, zero: bool) -> Option<Address> {
        self.bump.alloc(self.base(), len, zero)
    }

    unsafe fn free(&self, addr: Address, old_len: usize) {
        self.bump.free(self.base(), addr, old_len);
    }

    unsafe fn shrink(&self, addr: Address, old_len: usize, new_len: usize) {
        self.bump.shrink(self.base(), addr, old_len, new_len);
    }

    unsafe fn grow(
        &self,
        addr: Address,
        old_len: usize,
        new_len: usize,
        zero: bool,
    ) -> Option<Address> {
        self.bump.grow(self.base(), addr, old_len, new_len, zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes<'s>(addr: Address, len: usize) -> &'s [u8] {
        // SAFETY: test helper, only called on live arena allocations.
        unsafe { raw::slice(addr, len) }
    }

    fn fill(addr: Address, len: usize, value: u8) {
        // SAFETY: test helper, only called on live arena allocations.
        unsafe { raw::slice_mut::<u8>(addr, len).fill(value) }
    }

    #[repr(align(16))]
    struct Backing([u8; 256]);

    #[test]
    fn new_aligns_region_start() {
        let mut backing = Backing([0; 256]);
        let arena = ArenaAllocator::new(&mut backing.0[3..]);
        assert_eq!(arena.region().begin % GRANULE, 0);
        assert_eq!(arena.len(), 256 - 16);
    }

    #[test]
    fn bump_succeeds_until_exhausted() {
        let mut backing = Backing([0; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        for _ in 0..16 {
            assert!(arena.alloc(10, false).is_some());
        }
        assert_eq!(arena.used(), 256);
        assert!(arena.alloc(1, false).is_none());
        assert!(arena.alloc(0, false).is_some());
    }

    #[test]
    fn allocations_are_granule_aligned_and_disjoint() {
        let mut backing = Backing([0; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(1, false).unwrap();
        let b = arena.alloc(17, false).unwrap();
        let c = arena.alloc(3, false).unwrap();
        assert_eq!(b.get() - a.get(), 16);
        assert_eq!(c.get() - b.get(), 32);
        assert!(c.is_aligned_to(GRANULE));
    }

    #[test]
    fn zero_fills_requested_bytes() {
        let mut backing = Backing([0xAA; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(20, true).unwrap();
        assert!(bytes(a, 20).iter().all(|&b| b == 0));
    }

    #[test]
    fn lifo_free_retracts_cursor() {
        let mut backing = Backing([0; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(20, false).unwrap();
        let before_b = arena.used();
        let b = arena.alloc(40, false).unwrap();
        // SAFETY: both blocks came from this arena.
        unsafe {
            arena.free(b, 40);
            assert_eq!(arena.used(), before_b);
            arena.free(a, 20);
        }
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn non_lifo_free_leaks_until_reset() {
        let mut backing = Backing([0; 256]);
        let mut arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(20, false).unwrap();
        let _b = arena.alloc(40, false).unwrap();
        let used = arena.used();
        // SAFETY: `a` came from this arena.
        unsafe { arena.free(a, 20) };
        assert_eq!(arena.used(), used);
        arena.reset();
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn shrink_last_allocation_in_place() {
        let mut backing = Backing([0; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(100, false).unwrap();
        // SAFETY: `a` came from this arena.
        unsafe { arena.shrink(a, 100, 20) };
        assert_eq!(arena.used(), 32);
    }

    #[test]
    fn shrink_older_allocation_is_noop() {
        let mut backing = Backing([0; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(100, false).unwrap();
        let _b = arena.alloc(10, false).unwrap();
        let used = arena.used();
        // SAFETY: `a` came from this arena.
        unsafe { arena.shrink(a, 100, 20) };
        assert_eq!(arena.used(), used);
    }

    #[test]
    fn grow_last_allocation_in_place_zeroes_tail() {
        let mut backing = Backing([0xAA; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(8, false).unwrap();
        fill(a, 8, 7);
        // SAFETY: `a` came from this arena.
        let grown = unsafe { arena.grow(a, 8, 40, true) }.unwrap();
        assert_eq!(grown, a);
        assert_eq!(arena.used(), 48);
        assert!(bytes(grown, 8).iter().all(|&b| b == 7));
        assert!(bytes(grown.offset(8), 32).iter().all(|&b| b == 0));
    }

    #[test]
    fn grow_to_exact_end_succeeds_in_place() {
        let mut backing = Backing([0; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(16, false).unwrap();
        // SAFETY: `a` came from this arena.
        let grown = unsafe { arena.grow(a, 16, 256, false) };
        assert_eq!(grown, Some(a));
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn grow_last_allocation_past_end_fails() {
        let mut backing = Backing([0; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(16, false).unwrap();
        // SAFETY: `a` came from this arena.
        assert!(unsafe { arena.grow(a, 16, 257, false) }.is_none());
        assert_eq!(arena.used(), 16);
    }

    #[test]
    fn grow_older_allocation_relocates_and_copies() {
        let mut backing = Backing([0xAA; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(16, false).unwrap();
        fill(a, 16, 3);
        let _b = arena.alloc(16, false).unwrap();
        // SAFETY: `a` came from this arena.
        let moved = unsafe { arena.grow(a, 16, 24, true) }.unwrap();
        assert_ne!(moved, a);
        assert!(bytes(moved, 16).iter().all(|&b| b == 3));
        assert!(bytes(moved.offset(16), 8).iter().all(|&b| b == 0));
        assert_eq!(arena.used(), 64);
    }

    #[test]
    fn owns_checks_region_bounds() {
        let mut backing = Backing([0; 256]);
        let arena = ArenaAllocator::new(&mut backing.0);
        let a = arena.alloc(16, false).unwrap();
        assert!(arena.owns(a, 16));
        assert!(arena.owns(a, 256));
        assert!(!arena.owns(a, 257));
    }

    #[test]
    fn inline_allocator_owns_its_buffer() {
        let mut inline = InlineAllocator::<64>::new();
        let a = inline.alloc(32, true).unwrap();
        assert!(inline.owns(a, 32));
        assert!(a.is_aligned_to(GRANULE));
        assert!(inline.alloc(48, false).is_none());
        assert!(inline.alloc(32, false).is_some());
        inline.reset();
        assert_eq!(inline.used(), 0);
    }

    #[test]
    fn zero_capacity_inline_allocator() {
        let inline = InlineAllocator::<0>::new();
        assert!(inline.is_empty());
        assert!(inline.alloc(1, false).is_none());
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn bump_fails_exactly_at_capacity(
                lens in proptest::collection::vec(0usize..64, 1..40),
            ) {
                let mut backing = Backing([0; 256]);
                let arena = ArenaAllocator::new(&mut backing.0);
                let mut total = 0usize;
                for len in lens {
                    let fits = total + round(len) <= 256;
                    let result = arena.alloc(len, false);
                    prop_assert_eq!(result.is_some(), fits);
                    if fits {
                        total += round(len);
                    }
                    prop_assert_eq!(arena.used(), total);
                }
            }

            #[test]
            fn lifo_free_restores_every_cursor(
                lens in proptest::collection::vec(1usize..32, 1..8),
            ) {
                let mut backing = Backing([0; 256]);
                let arena = ArenaAllocator::new(&mut backing.0);
                let mut stack = Vec::new();
                for len in lens {
                    let before = arena.used();
                    let addr = arena.alloc(len, false).unwrap();
                    stack.push((addr, len, before));
                }
                while let Some((addr, len, before)) = stack.pop() {
                    // SAFETY: every block came from this arena, freed in LIFO order.
                    unsafe { arena.free(addr, len) };
                    prop_assert_eq!(arena.used(), before);
                }
            }
        }
    }
}
