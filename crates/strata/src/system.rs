//! The process heap as an [`Allocator`].
//!
//! [`heap`] is the raw memory source: 16-byte aligned blocks with a hidden
//! length header. [`SystemAllocator`] passes straight through to it and has
//! no in-place resize path at all.

use crate::address::Address;
use crate::allocator::Allocator;
use crate::raw;

/// Raw heap memory source.
pub mod heap {
    use crate::address::Address;
    use crate::raw;

    /// Acquire `len` bytes, zero-filled when `zero` is set.
    ///
    /// Blocks are aligned to [`GRANULE`](crate::address::GRANULE).
    pub fn allocate(len: usize, zero: bool) -> Option<Address> {
        raw::heap_allocate(len, zero)
    }

    /// Release a block from [`allocate`].
    ///
    /// `len` may be anything up to the length originally requested; the
    /// block remembers its own layout.
    ///
    /// # Safety
    ///
    /// `addr` must come from [`allocate`] and not have been released.
    pub unsafe fn deallocate(addr: Address, len: usize) {
        // SAFETY: forwarded to the caller.
        unsafe {
            debug_assert!(
                len <= raw::heap_block_len(addr),
                "deallocating {len} bytes from a smaller heap block at {addr}"
            );
            raw::heap_deallocate(addr);
        }
    }
}

/// Allocator backed directly by the process heap.
///
/// `shrink` is a no-op and `grow` always relocates.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

// SAFETY: blocks come from the global allocator with 16-byte alignment.
unsafe impl Allocator for SystemAllocator {
    fn alloc(&self, len: usize, zero: bool) -> Option<Address> {
        heap::allocate(len, zero)
    }

    unsafe fn free(&self, addr: Address, old_len: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { heap::deallocate(addr, old_len) }
    }

    unsafe fn shrink(&self, _addr: Address, old_len: usize, new_len: usize) {
        debug_assert!(
            new_len <= old_len,
            "shrink from {old_len} to larger {new_len}"
        );
    }

    unsafe fn grow(
        &self,
        addr: Address,
        old_len: usize,
        new_len: usize,
        zero: bool,
    ) -> Option<Address> {
        debug_assert!(
            new_len >= old_len,
            "grow from {old_len} to smaller {new_len}"
        );
        let new_addr = heap::allocate(new_len, false)?;
        // SAFETY: `addr` holds `old_len` live bytes (caller contract) and the
        // fresh block holds `new_len >= old_len`.
        unsafe {
            raw::copy(new_addr, addr, old_len);
            if zero {
                raw::zero(new_addr.offset(old_len), new_len - old_len);
            }
            heap::deallocate(addr, old_len);
        }
        Some(new_addr)
    }
}
