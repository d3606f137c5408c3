//! Raw memory primitives.
//!
//! Every dereference of an [`Address`] in this crate goes through this
//! module. Callers outside it hold addresses as plain integers and only
//! touch memory through the functions below or through [`RawBuffer`].

use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use bytemuck::Pod;

use crate::address::{Address, GRANULE};
use crate::allocator::Allocator;

/// Bytes reserved in front of every heap block to remember its layout.
pub(crate) const HEAP_HEADER: usize = GRANULE;

/// Zero-fill `len` bytes at `addr`.
///
/// # Safety
///
/// `[addr, addr + len)` must be valid for writes.
pub(crate) unsafe fn zero(addr: Address, len: usize) {
    // SAFETY: caller guarantees the range is writable.
    unsafe { ptr::write_bytes(addr.as_ptr::<u8>(), 0, len) }
}

/// Copy `len` bytes from `src` to `dst`. The ranges may overlap.
///
/// # Safety
///
/// `src` must be valid for reads and `dst` valid for writes of `len` bytes.
pub(crate) unsafe fn copy(dst: Address, src: Address, len: usize) {
    // SAFETY: caller guarantees both ranges are valid.
    unsafe { ptr::copy(src.as_ptr::<u8>(), dst.as_ptr::<u8>(), len) }
}

/// Borrow `count` values of `T` at `addr`.
///
/// # Safety
///
/// The range must be initialised, aligned for `T`, and not mutated for `'a`.
pub(crate) unsafe fn slice<'a, T>(addr: Address, count: usize) -> &'a [T] {
    // SAFETY: forwarded to the caller.
    unsafe { std::slice::from_raw_parts(addr.as_ptr::<T>(), count) }
}

/// Mutably borrow `count` values of `T` at `addr`.
///
/// # Safety
///
/// The range must be initialised, aligned for `T`, and not aliased for `'a`.
pub(crate) unsafe fn slice_mut<'a, T>(addr: Address, count: usize) -> &'a mut [T] {
    // SAFETY: forwarded to the caller.
    unsafe { std::slice::from_raw_parts_mut(addr.as_ptr::<T>(), count) }
}

/// Move `value` into uninitialised memory at `addr`.
///
/// # Safety
///
/// `addr` must be valid for writes of `T` and aligned for `T`.
pub(crate) unsafe fn write_value<T>(addr: Address, value: T) {
    // SAFETY: forwarded to the caller.
    unsafe { ptr::write(addr.as_ptr::<T>(), value) }
}

/// Run the destructor of the `T` stored at `ptr`.
///
/// # Safety
///
/// `ptr` must point to a live, initialised `T` that is not used afterwards.
pub(crate) unsafe fn drop_value<T>(ptr: NonNull<T>) {
    // SAFETY: forwarded to the caller.
    unsafe { ptr::drop_in_place(ptr.as_ptr()) }
}

fn heap_layout(total: usize) -> Option<Layout> {
    Layout::from_size_align(total, GRANULE).ok()
}

/// Acquire `len` bytes from the global heap, 16-byte aligned.
///
/// The block carries a hidden header recording its full layout, so
/// [`heap_deallocate`] does not depend on the caller's length.
pub(crate) fn heap_allocate(len: usize, zero: bool) -> Option<Address> {
    let total = len.checked_add(HEAP_HEADER)?;
    let layout = heap_layout(total)?;
    // SAFETY: `layout` has a non-zero size (at least the header).
    let base = unsafe {
        if zero {
            alloc::alloc_zeroed(layout)
        } else {
            alloc::alloc(layout)
        }
    };
    let base = Address::from_ptr(base)?;
    // SAFETY: the block is at least HEAP_HEADER bytes and 16-aligned.
    unsafe { ptr::write(base.as_ptr::<usize>(), total) };
    Some(base.offset(HEAP_HEADER))
}

/// Usable length of a block returned by [`heap_allocate`].
///
/// # Safety
///
/// `addr` must come from [`heap_allocate`] and not have been released.
pub(crate) unsafe fn heap_block_len(addr: Address) -> usize {
    let base = addr.get() - HEAP_HEADER;
    // SAFETY: the header lives HEAP_HEADER bytes before `addr`.
    unsafe { ptr::read(base as *const usize) - HEAP_HEADER }
}

/// Release a block returned by [`heap_allocate`].
///
/// # Safety
///
/// `addr` must come from [`heap_allocate`] and not have been released.
pub(crate) unsafe fn heap_deallocate(addr: Address) {
    let base = addr.get() - HEAP_HEADER;
    // SAFETY: the header lives HEAP_HEADER bytes before `addr`.
    let total = unsafe { ptr::read(base as *const usize) };
    let Some(layout) = heap_layout(total) else {
        debug_assert!(false, "corrupt heap header at {addr}");
        return;
    };
    // SAFETY: `base` and `layout` are exactly what `heap_allocate` used.
    unsafe { alloc::dealloc(base as *mut u8, layout) }
}

/// A zero-initialised array of `T` owned by an [`Allocator`].
///
/// The buffer is returned to its allocator on drop. Empty buffers never
/// touch the allocator.
pub(crate) struct RawBuffer<'a, T: Pod> {
    allocator: &'a dyn Allocator,
    addr: Option<Address>,
    count: usize,
    _marker: PhantomData<T>,
}

impl<'a, T: Pod> RawBuffer<'a, T> {
    /// Allocate `count` zeroed values, or `None` when the allocator is out
    /// of memory or the byte length overflows.
    pub(crate) fn zeroed(allocator: &'a dyn Allocator, count: usize) -> Option<Self> {
        let bytes = count.checked_mul(std::mem::size_of::<T>())?;
        let addr = if bytes == 0 {
            None
        } else {
            let addr = allocator.alloc(bytes, true)?;
            if !addr.is_aligned_to(std::mem::align_of::<T>()) {
                // SAFETY: `addr` was just returned by `allocator` for `bytes`.
                unsafe { allocator.free(addr, bytes) };
                return None;
            }
            Some(addr)
        };
        Some(Self {
            allocator,
            addr,
            count,
            _marker: PhantomData,
        })
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        match self.addr {
            // SAFETY: owned, zero-initialised, aligned allocation of `count` elements.
            Some(addr) => unsafe { slice(addr, self.count) },
            None => &[],
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        match self.addr {
            // SAFETY: as above, and `&mut self` guarantees exclusivity.
            Some(addr) => unsafe { slice_mut(addr, self.count) },
            None => &mut [],
        }
    }
}

impl<T: Pod> Drop for RawBuffer<'_, T> {
    fn drop(&mut self) {
        if let Some(addr) = self.addr.take() {
            let bytes = self.count * std::mem::size_of::<T>();
            // SAFETY: `addr` was allocated from `allocator` with exactly `bytes`.
            unsafe { self.allocator.free(addr, bytes) };
        }
    }
}
