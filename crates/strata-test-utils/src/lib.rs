//! Test doubles for strata allocator and persistence tests.
//!
//! - [`TrackingAllocator`] counts live allocations and bytes so tests can
//!   assert that every block handed out was handed back.
//! - [`FailingAllocator`] succeeds a fixed number of times, then refuses.
//! - [`FailingStream`] and [`TruncatedStream`] exercise I/O error paths.

#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::cell::Cell;
use std::io;

use strata::{Address, Allocator, MemoryStream, Stream, SystemAllocator};

/// Wraps an allocator and counts what is live.
///
/// `shrink` and `grow` keep the byte count in step with the caller's view.
pub struct TrackingAllocator<A: Allocator = SystemAllocator> {
    inner: A,
    live: Cell<usize>,
    bytes: Cell<usize>,
    total: Cell<usize>,
}

impl TrackingAllocator<SystemAllocator> {
    pub fn new() -> Self {
        Self::wrap(SystemAllocator)
    }
}

impl Default for TrackingAllocator<SystemAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> TrackingAllocator<A> {
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            live: Cell::new(0),
            bytes: Cell::new(0),
            total: Cell::new(0),
        }
    }

    /// Blocks allocated and not yet freed.
    pub fn live(&self) -> usize {
        self.live.get()
    }

    /// Bytes allocated and not yet freed, at their latest requested length.
    pub fn live_bytes(&self) -> usize {
        self.bytes.get()
    }

    /// Successful allocations over the allocator's lifetime.
    pub fn total_allocations(&self) -> usize {
        self.total.get()
    }
}

// SAFETY: every block comes from `inner` unchanged.
unsafe impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn alloc(&self, len: usize, zero: bool) -> Option<Address> {
        let addr = self.inner.alloc(len, zero)?;
        self.live.set(self.live.get() + 1);
        self.bytes.set(self.bytes.get() + len);
        self.total.set(self.total.get() + 1);
        Some(addr)
    }

    unsafe fn free(&self, addr: Address, old_len: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { self.inner.free(addr, old_len) };
        self.live.set(self.live.get() - 1);
        self.bytes.set(self.bytes.get() - old_len);
    }

    unsafe fn shrink(&self, addr: Address, old_len: usize, new_len: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { self.inner.shrink(addr, old_len, new_len) };
        self.bytes.set(self.bytes.get() - (old_len - new_len));
    }

    unsafe fn grow(
        &self,
        addr: Address,
        old_len: usize,
        new_len: usize,
        zero: bool,
    ) -> Option<Address> {
        // SAFETY: forwarded to the caller.
        let new_addr = unsafe { self.inner.grow(addr, old_len, new_len, zero) }?;
        self.bytes.set(self.bytes.get() + (new_len - old_len));
        Some(new_addr)
    }
}

/// Allocator that serves `budget` allocations from the system heap and
/// refuses every one after that. `free`, `shrink` and `grow` always work.
pub struct FailingAllocator {
    inner: TrackingAllocator,
    remaining: Cell<usize>,
}

impl FailingAllocator {
    pub fn new(budget: usize) -> Self {
        Self {
            inner: TrackingAllocator::new(),
            remaining: Cell::new(budget),
        }
    }

    /// Blocks allocated and not yet freed.
    pub fn live(&self) -> usize {
        self.inner.live()
    }

    /// Successful allocations so far.
    pub fn total_allocations(&self) -> usize {
        self.inner.total_allocations()
    }
}

// SAFETY: every block comes from `inner` unchanged.
unsafe impl Allocator for FailingAllocator {
    fn alloc(&self, len: usize, zero: bool) -> Option<Address> {
        let remaining = self.remaining.get();
        if remaining == 0 {
            return None;
        }
        self.remaining.set(remaining - 1);
        self.inner.alloc(len, zero)
    }

    unsafe fn free(&self, addr: Address, old_len: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { self.inner.free(addr, old_len) }
    }

    unsafe fn shrink(&self, addr: Address, old_len: usize, new_len: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { self.inner.shrink(addr, old_len, new_len) }
    }

    unsafe fn grow(
        &self,
        addr: Address,
        old_len: usize,
        new_len: usize,
        zero: bool,
    ) -> Option<Address> {
        // SAFETY: forwarded to the caller.
        unsafe { self.inner.grow(addr, old_len, new_len, zero) }
    }
}

/// Stream whose every operation fails with the given error kind.
pub struct FailingStream {
    kind: io::ErrorKind,
}

impl FailingStream {
    pub fn new(kind: io::ErrorKind) -> Self {
        Self { kind }
    }
}

impl Stream for FailingStream {
    fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Err(self.kind.into())
    }

    fn read(&mut self, _bytes: &mut [u8]) -> io::Result<()> {
        Err(self.kind.into())
    }

    fn tell(&self) -> u64 {
        0
    }
}

/// Readable stream holding only the first `keep` bytes of `data`.
pub struct TruncatedStream {
    inner: MemoryStream,
}

impl TruncatedStream {
    pub fn new(data: &[u8], keep: usize) -> Self {
        let keep = keep.min(data.len());
        Self {
            inner: MemoryStream::from_bytes(data[..keep].to_vec()),
        }
    }
}

impl Stream for TruncatedStream {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write(bytes)
    }

    fn read(&mut self, bytes: &mut [u8]) -> io::Result<()> {
        self.inner.read(bytes)
    }

    fn tell(&self) -> u64 {
        self.inner.tell()
    }
}
