//! Inline arena with a temporary-chain spill-over.

use tracing::trace;

use crate::address::Address;
use crate::allocator::Allocator;
use crate::arena::InlineAllocator;
use crate::raw;
use crate::temporary::TemporaryAllocator;

/// A fixed `N`-byte inline arena fronting a [`TemporaryAllocator`].
///
/// Small, short-lived allocations with a known soft bound are served from
/// the inline buffer without touching the parent; anything that does not fit
/// spills into the temporary chain. Every other operation is routed by
/// ownership, inline region first.
///
/// Inline addresses point into `self`: do not move a scratch allocator while
/// inline allocations are live.
pub struct ScratchAllocator<'a, const N: usize> {
    inline: InlineAllocator<N>,
    temporary: TemporaryAllocator<'a>,
}

impl<'a, const N: usize> ScratchAllocator<'a, N> {
    /// Create a scratch allocator that spills into blocks from `parent`.
    pub fn new(parent: &'a dyn Allocator) -> Self {
        Self {
            inline: InlineAllocator::new(),
            temporary: TemporaryAllocator::new(parent),
        }
    }

    /// Create a scratch allocator whose spill chain is already configured.
    pub fn with_temporary(temporary: TemporaryAllocator<'a>) -> Self {
        Self {
            inline: InlineAllocator::new(),
            temporary,
        }
    }

    /// Whether `[addr, addr + len)` lies in the inline buffer.
    pub fn owns_inline(&self, addr: Address, len: usize) -> bool {
        self.inline.owns(addr, len)
    }

    /// The spill chain.
    pub fn temporary(&self) -> &TemporaryAllocator<'a> {
        &self.temporary
    }

    /// Rewind the inline arena and every spill block.
    pub fn reset(&mut self) {
        self.inline.reset();
        self.temporary.reset();
    }
}

// SAFETY: every block comes from one of the two tiers, both of which uphold
// the contract.
unsafe impl<const N: usize> Allocator for ScratchAllocator<'_, N> {
    fn alloc(&self, len: usize, zero: bool) -> Option<Address> {
        if let Some(addr) = self.inline.alloc(len, zero) {
            return Some(addr);
        }
        trace!(len, inline = N, "scratch allocation spilled");
        self.temporary.alloc(len, zero)
    }

    unsafe fn free(&self, addr: Address, old_len: usize) {
        // SAFETY: `addr` came from one of the two (caller contract), and the
        // ownership test picks which.
        unsafe {
            if self.inline.owns(addr, old_len) {
                self.inline.free(addr, old_len);
            } else {
                self.temporary.free(addr, old_len);
            }
        }
    }

    unsafe fn shrink(&self, addr: Address, old_len: usize, new_len: usize) {
        // SAFETY: as for `free`.
        unsafe {
            if self.inline.owns(addr, old_len) {
                self.inline.shrink(addr, old_len, new_len);
            } else {
                self.temporary.shrink(addr, old_len, new_len);
            }
        }
    }

    unsafe fn grow(
        &self,
        addr: Address,
        old_len: usize,
        new_len: usize,
        zero: bool,
    ) -> Option<Address> {
        if !self.inline.owns(addr, old_len) {
            // SAFETY: not inline, so it came from the spill chain.
            return unsafe { self.temporary.grow(addr, old_len, new_len, zero) };
        }
        // SAFETY: `addr` is a live inline block.
        if let Some(grown) = unsafe { self.inline.grow(addr, old_len, new_len, zero) } {
            return Some(grown);
        }
        trace!(old_len, new_len, "scratch grow crossed into spill chain");
        let new_addr = self.temporary.alloc(new_len, false)?;
        // SAFETY: the inline block holds `old_len` live bytes and the spill
        // block holds `new_len >= old_len`; they cannot overlap.
        unsafe {
            raw::copy(new_addr, addr, old_len);
            if zero {
                raw::zero(new_addr.offset(old_len), new_len - old_len);
            }
            self.inline.free(addr, old_len);
        }
        Some(new_addr)
    }
}
