//! Growable chain of arena blocks.
//!
//! A [`TemporaryAllocator`] owns an ordered chain of blocks, each an
//! [`ArenaAllocator`] over memory obtained from a parent allocator. When the
//! active block is full a new block is appended, sized by
//! [`TemporaryConfig::block_size_for`]. Blocks are never released during
//! runtime, only rewound by [`TemporaryAllocator::reset`] or returned to the
//! parent on drop.
//!
//! ```text
//! head                                      tail
//! Block[0] (2 MiB) ─ Block[1] (2 MiB) ─ Block[2] (8 MiB)
//!                                         ▲ current
//! ```

use std::cell::{Cell, RefCell};

use tracing::{debug, trace};

use crate::address::{checked_round, Address, GRANULE};
use crate::allocator::Allocator;
use crate::arena::ArenaAllocator;
use crate::config::TemporaryConfig;
use crate::error::ConfigError;
use crate::raw;

/// One link of the chain: an arena over a block borrowed from the parent.
struct Block {
    arena: ArenaAllocator<'static>,
    addr: Address,
}

/// Arena chain that grows by appending blocks obtained from a parent.
///
/// The parent must outlive the temporary allocator and every allocation made
/// through it; the `'a` borrow enforces the first half of that.
///
/// Address-to-block lookup is a linear scan over the chain, which is short
/// because block sizes double.
pub struct TemporaryAllocator<'a> {
    parent: &'a dyn Allocator,
    config: TemporaryConfig,
    /// Index order is head (oldest) to tail (newest).
    blocks: RefCell<Vec<Block>>,
    /// Index of the block currently being filled.
    current: Cell<usize>,
}

impl<'a> TemporaryAllocator<'a> {
    /// Create an empty chain with the default configuration.
    pub fn new(parent: &'a dyn Allocator) -> Self {
        Self {
            parent,
            config: TemporaryConfig::default(),
            blocks: RefCell::new(Vec::new()),
            current: Cell::new(0),
        }
    }

    /// Create an empty chain with a validated configuration.
    pub fn with_config(
        parent: &'a dyn Allocator,
        config: TemporaryConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            parent,
            config,
            blocks: RefCell::new(Vec::new()),
            current: Cell::new(0),
        })
    }

    /// The chain configuration.
    pub fn config(&self) -> &TemporaryConfig {
        &self.config
    }

    /// Number of blocks in the chain.
    pub fn block_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Length of block `index` (0 = head), if it exists.
    pub fn block_len(&self, index: usize) -> Option<usize> {
        self.blocks.borrow().get(index).map(|b| b.arena.len())
    }

    /// Total bytes across all blocks.
    pub fn capacity(&self) -> usize {
        self.blocks.borrow().iter().map(|b| b.arena.len()).sum()
    }

    /// Bytes consumed across all blocks (rounded).
    pub fn used(&self) -> usize {
        self.blocks.borrow().iter().map(|b| b.arena.used()).sum()
    }

    /// Whether some block owns `[addr, addr + len)`.
    pub fn owns(&self, addr: Address, len: usize) -> bool {
        self.blocks.borrow().iter().any(|b| b.arena.owns(addr, len))
    }

    /// Rewind every block without returning any memory to the parent.
    ///
    /// Allocation restarts at the head block. Requires exclusive access, so
    /// a [`Slab`](crate::Slab) or [`Pool`](crate::Pool) built on the chain
    /// must be gone first:
    ///
    /// ```compile_fail
    /// use strata::{Slab, SystemAllocator, TemporaryAllocator};
    ///
    /// let system = SystemAllocator;
    /// let mut temp = TemporaryAllocator::new(&system);
    /// let slab = Slab::new(&temp, 8, 64).unwrap();
    /// temp.reset(); // `slab` still borrows `temp`
    /// drop(slab);
    /// ```
    pub fn reset(&mut self) {
        for block in self.blocks.get_mut() {
            block.arena.reset();
        }
        self.current.set(0);
        trace!(blocks = self.block_count(), "temporary allocator reset");
    }

    /// Append a block large enough for `len` bytes and make it current.
    fn add(&self, len: usize) -> bool {
        let Some(size) = self.config.block_size_for(len) else {
            debug!(len, "temporary block size overflows");
            return false;
        };
        let Some(addr) = self.parent.alloc(size, false) else {
            debug!(size, "parent allocator refused a temporary block");
            return false;
        };
        if !addr.is_aligned_to(GRANULE) {
            // SAFETY: `addr` was just returned by the parent for `size` bytes.
            unsafe { self.parent.free(addr, size) };
            debug!(size, "parent allocator returned a misaligned block");
            return false;
        }
        // SAFETY: the parent handed us `size` exclusive bytes, which stay
        // valid until we free them in `drop`.
        let arena = unsafe { ArenaAllocator::from_raw_parts(addr, size) };
        let mut blocks = self.blocks.borrow_mut();
        blocks.push(Block { arena, addr });
        self.current.set(blocks.len() - 1);
        debug!(size, blocks = blocks.len(), "temporary allocator appended block");
        true
    }

    /// Try the current block, then any later block left over from before a
    /// reset, advancing `current` to whichever succeeds.
    fn alloc_existing(&self, len: usize, zero: bool) -> Option<Address> {
        let blocks = self.blocks.borrow();
        let current = self.current.get();
        for (index, block) in blocks.iter().enumerate().skip(current) {
            if let Some(addr) = block.arena.alloc(len, zero) {
                self.current.set(index);
                return Some(addr);
            }
        }
        None
    }
}

// SAFETY: every block is an aligned, exclusive range from the parent, and
// each one is carved up by an `ArenaAllocator`.
unsafe impl Allocator for TemporaryAllocator<'_> {
    fn alloc(&self, len: usize, zero: bool) -> Option<Address> {
        let len = checked_round(len)?;
        if let Some(addr) = self.alloc_existing(len, zero) {
            return Some(addr);
        }
        if !self.add(len) {
            return None;
        }
        self.alloc_existing(len, zero)
    }

    unsafe fn free(&self, addr: Address, old_len: usize) {
        let blocks = self.blocks.borrow();
        match blocks.iter().rev().find(|b| b.arena.owns(addr, old_len)) {
            // SAFETY: the owning block handed out `addr` (caller contract).
            Some(block) => unsafe { block.arena.free(addr, old_len) },
            None => debug_assert!(false, "freeing {addr} which no block owns"),
        }
    }

    unsafe fn shrink(&self, addr: Address, old_len: usize, new_len: usize) {
        let blocks = self.blocks.borrow();
        match blocks.iter().find(|b| b.arena.owns(addr, old_len)) {
            // SAFETY: the owning block handed out `addr` (caller contract).
            Some(block) => unsafe { block.arena.shrink(addr, old_len, new_len) },
            None => debug_assert!(false, "shrinking {addr} which no block owns"),
        }
    }

    unsafe fn grow(
        &self,
        addr: Address,
        old_len: usize,
        new_len: usize,
        zero: bool,
    ) -> Option<Address> {
        {
            let blocks = self.blocks.borrow();
            for block in blocks.iter().filter(|b| b.arena.owns(addr, old_len)) {
                // SAFETY: the owning block handed out `addr` (caller contract).
                if let Some(new_addr) = unsafe { block.arena.grow(addr, old_len, new_len, zero) } {
                    return Some(new_addr);
                }
            }
        }
        let new_addr = self.alloc(new_len, false)?;
        // SAFETY: `addr` holds `old_len` live bytes and `new_addr` is a fresh
        // block of `new_len >= old_len` bytes in a different location.
        unsafe {
            raw::copy(new_addr, addr, old_len);
            if zero {
                raw::zero(new_addr.offset(old_len), new_len - old_len);
            }
            self.free(addr, old_len);
        }
        Some(new_addr)
    }
}

impl Drop for TemporaryAllocator<'_> {
    fn drop(&mut self) {
        for block in self.blocks.get_mut().drain(..).rev() {
            let len = block.arena.len();
            // SAFETY: `block.addr` was obtained from `parent` for `len` bytes.
            unsafe { self.parent.free(block.addr, len) };
        }
    }
}
