//! Raw addresses, memory regions and size rounding.
//!
//! An [`Address`] is a plain integer address that is never zero. Allocation
//! results are `Option<Address>`: `None` occupies the same representation
//! as address `0`, which is the universal "out of memory" sentinel.

use std::fmt;
use std::num::NonZeroUsize;

/// Allocation granule in bytes. Every arena allocation is rounded up to a
/// multiple of this, and arena regions begin on a granule boundary.
pub const GRANULE: usize = 16;

/// Round `len` up to the next multiple of [`GRANULE`].
///
/// ```
/// use strata::address::round;
///
/// assert_eq!(round(0), 0);
/// assert_eq!(round(1), 16);
/// assert_eq!(round(16), 16);
/// assert_eq!(round(17), 32);
/// ```
pub const fn round(len: usize) -> usize {
    len.div_ceil(GRANULE) * GRANULE
}

/// Like [`round`], but `None` when the rounded length does not fit a `usize`.
pub(crate) const fn checked_round(len: usize) -> Option<usize> {
    len.div_ceil(GRANULE).checked_mul(GRANULE)
}

/// A non-zero byte address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(NonZeroUsize);

impl Address {
    /// Wrap a raw address, or `None` for the zero sentinel.
    pub const fn new(raw: usize) -> Option<Self> {
        match NonZeroUsize::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// The raw integer address.
    pub const fn get(self) -> usize {
        self.0.get()
    }

    /// The address `n` bytes past this one.
    ///
    /// # Panics
    ///
    /// Panics if the result overflows the address space.
    pub fn offset(self, n: usize) -> Self {
        Self(
            self.0
                .checked_add(n)
                .expect("address offset overflows the address space"),
        )
    }

    /// Address of a pointer, or `None` for a null pointer.
    pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
        Self::new(ptr as usize)
    }

    /// Reinterpret as a typed raw pointer.
    pub fn as_ptr<T>(self) -> *mut T {
        self.get() as *mut T
    }

    /// Whether this address is a multiple of `align`.
    pub fn is_aligned_to(self, align: usize) -> bool {
        self.get() % align == 0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.get())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.get())
    }
}

/// Half-open address range `[begin, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    /// First byte of the region.
    pub begin: usize,
    /// One past the last byte of the region.
    pub end: usize,
}

impl MemoryRegion {
    /// Region of `len` bytes starting at `begin`.
    ///
    /// # Panics
    ///
    /// Panics if `begin + len` overflows `usize`.
    pub const fn new(begin: usize, len: usize) -> Self {
        match Self::checked_new(begin, len) {
            Some(region) => region,
            None => panic!("memory region end overflows usize"),
        }
    }

    /// Region of `len` bytes starting at `begin`, or `None` if its end
    /// would overflow `usize`.
    pub const fn checked_new(begin: usize, len: usize) -> Option<Self> {
        match begin.checked_add(len) {
            Some(end) => Some(Self { begin, end }),
            None => None,
        }
    }

    /// Length of the region in bytes.
    pub const fn len(&self) -> usize {
        self.end - self.begin
    }

    /// Whether the region has no bytes.
    pub const fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Whether the block `[addr, addr + len)` lies inside this region.
    pub fn contains(&self, addr: Address, len: usize) -> bool {
        let addr = addr.get();
        addr >= self.begin && addr.checked_add(len).is_some_and(|end| end <= self.end)
    }
}
