//! The allocator capability shared by every allocator in this crate.
//!
//! An [`Allocator`] hands out raw byte ranges identified by [`Address`].
//! Failure is always immediate and always `None`: no allocator blocks,
//! retries or panics on exhaustion. Allocators take `&self` and keep their
//! bookkeeping in `Cell`s, so they are `!Sync` by construction; callers that
//! need concurrency shard instances per thread.

use std::ptr::NonNull;

use crate::address::Address;
use crate::raw;

/// The four-operation allocation contract.
///
/// Lengths passed to `free`, `shrink` and `grow` are the lengths the caller
/// requested, not the rounded lengths an implementation may have reserved.
///
/// # Safety
///
/// Safe code builds slices over the blocks an allocator hands out, so an
/// implementation must guarantee that every address returned by `alloc` or
/// `grow` for a nonzero length:
///
/// - is valid for reads and writes of the requested length,
/// - is aligned to [`GRANULE`](crate::GRANULE),
/// - does not overlap any other live block from the same allocator, and
///   stays that way until it is freed or relocated by `grow`,
/// - is zero-filled when `zero` was set (for `grow`, past `old_len`).
///
/// A plain `impl` does not compile:
///
/// ```compile_fail
/// use strata::{Address, Allocator};
///
/// struct Anywhere;
///
/// impl Allocator for Anywhere {
///     fn alloc(&self, _len: usize, _zero: bool) -> Option<Address> {
///         Address::new(0x10)
///     }
///     unsafe fn free(&self, _addr: Address, _old_len: usize) {}
///     unsafe fn shrink(&self, _addr: Address, _old_len: usize, _new_len: usize) {}
///     unsafe fn grow(&self, _: Address, _: usize, _: usize, _: bool) -> Option<Address> {
///         None
///     }
/// }
/// ```
pub unsafe trait Allocator {
    /// Allocate `len` bytes, zero-filled when `zero` is set.
    ///
    /// Returns `None` when the allocator cannot satisfy the request.
    fn alloc(&self, len: usize, zero: bool) -> Option<Address>;

    /// Release a block of `old_len` bytes at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` must have been returned by this allocator for a block of
    /// `old_len` bytes and not released since.
    unsafe fn free(&self, addr: Address, old_len: usize);

    /// Shrink a block in place. Never relocates and never fails; an
    /// implementation that cannot shrink leaves the block untouched.
    ///
    /// # Safety
    ///
    /// Same as [`Allocator::free`], and `new_len <= old_len`.
    unsafe fn shrink(&self, addr: Address, old_len: usize, new_len: usize);

    /// Grow a block to `new_len` bytes, relocating if necessary.
    ///
    /// On relocation the old contents are copied, the old block is released
    /// and, when `zero` is set, only the bytes past `old_len` are zeroed.
    /// On failure the original block is left untouched.
    ///
    /// # Safety
    ///
    /// Same as [`Allocator::free`], and `new_len >= old_len`. After a
    /// successful call `addr` must no longer be used unless it is the
    /// returned address.
    unsafe fn grow(
        &self,
        addr: Address,
        old_len: usize,
        new_len: usize,
        zero: bool,
    ) -> Option<Address>;
}

/// Zero-fill `len` bytes at `addr`.
///
/// # Safety
///
/// `[addr, addr + len)` must be valid for writes.
pub unsafe fn memzero(addr: Address, len: usize) {
    // SAFETY: forwarded to the caller.
    unsafe { raw::zero(addr, len) }
}

/// Copy `len` bytes from `src` to `dst`.
///
/// # Safety
///
/// `src` must be valid for reads and `dst` valid for writes of `len` bytes.
pub unsafe fn memcopy(dst: Address, src: Address, len: usize) {
    // SAFETY: forwarded to the caller.
    unsafe { raw::copy(dst, src, len) }
}

/// Typed helpers layered over any [`Allocator`].
pub trait AllocatorExt: Allocator {
    /// Allocate room for `count` values of `T`.
    ///
    /// Returns `None` on exhaustion, on byte-length overflow, or when the
    /// allocator cannot provide the alignment of `T`.
    fn allocate<T>(&self, count: usize, zero: bool) -> Option<NonNull<T>> {
        let len = count.checked_mul(std::mem::size_of::<T>())?;
        let addr = self.alloc(len, zero)?;
        if !addr.is_aligned_to(std::mem::align_of::<T>()) {
            // SAFETY: `addr` was just returned by `self.alloc(len)`.
            unsafe { self.free(addr, len) };
            return None;
        }
        NonNull::new(addr.as_ptr::<T>())
    }

    /// Release storage obtained from [`AllocatorExt::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate::<T>(count, _)` on this allocator.
    /// Values stored there are not dropped.
    unsafe fn deallocate<T>(&self, ptr: NonNull<T>, count: usize) {
        if let Some(addr) = Address::from_ptr(ptr.as_ptr()) {
            // SAFETY: forwarded to the caller.
            unsafe { self.free(addr, count * std::mem::size_of::<T>()) }
        }
    }

    /// Allocate a single `T` and move `value` into it.
    ///
    /// On failure `value` is dropped and `None` is returned.
    fn create<T>(&self, value: T) -> Option<NonNull<T>> {
        let ptr = self.allocate::<T>(1, false)?;
        let addr = Address::from_ptr(ptr.as_ptr())?;
        // SAFETY: fresh, aligned allocation large enough for one `T`.
        unsafe { raw::write_value(addr, value) };
        Some(ptr)
    }

    /// Drop the value at `ptr` and release its storage.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`AllocatorExt::create`] on this allocator and
    /// must not be used afterwards.
    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: forwarded to the caller.
        unsafe {
            raw::drop_value(ptr);
            self.deallocate(ptr, 1);
        }
    }
}

impl<A: Allocator + ?Sized> AllocatorExt for A {}
