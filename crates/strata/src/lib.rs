//! Layered single-threaded allocators with index handles and binary
//! persistence.
//!
//! Every allocator implements the four-operation [`Allocator`] contract
//! (`alloc`, `free`, `shrink`, `grow`) over raw [`Address`] ranges.
//! Failure is `None`, never a panic. Composite allocators borrow a parent
//! and return every block to it when dropped.
//!
//! # Architecture
//!
//! ```text
//! ScratchAllocator<N>
//! ├── InlineAllocator<N> (fixed inline buffer, bump cursor)
//! └── TemporaryAllocator (spill-over)
//!     └── Block[] → ArenaAllocator (doubling blocks from a parent)
//!
//! SystemAllocator → heap (16-byte aligned, length-prefixed blocks)
//!
//! Slab
//! └── Option<Pool>[] (equal capacity caches, holes kept, tail popped)
//!     └── Pool (occupancy bitset + slot bytes, PoolRef indices)
//! ```
//!
//! [`Pool`] and [`Slab`] hand out [`PoolRef`]/[`SlabRef`] indices rather
//! than pointers, so handles survive growth and a save/load round trip
//! through any [`Stream`].
//!
//! # Concurrency
//!
//! Allocators keep their state in `Cell`s and take `&self`. None of them is
//! `Sync`; share nothing across threads and use one instance per worker.
//!
//! # Unsafe code
//!
//! Raw memory access is confined to the private `raw` module. The
//! `free`/`shrink`/`grow` methods are `unsafe fn` because only the caller
//! can vouch that an address came from the allocator it is handed back to.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod address;
pub mod allocator;
pub mod arena;
mod codec;
pub mod config;
pub mod error;
pub mod file;
pub mod handle;
pub mod pool;
mod raw;
pub mod scratch;
pub mod slab;
pub mod stream;
pub mod system;
pub mod temporary;

// Public re-exports for the primary API surface.
pub use address::{round, Address, MemoryRegion, GRANULE};
pub use allocator::{memcopy, memzero, Allocator, AllocatorExt};
pub use arena::{ArenaAllocator, InlineAllocator};
pub use codec::FORMAT_VERSION;
pub use config::TemporaryConfig;
pub use error::{ConfigError, PersistError};
pub use file::{Access, File, FileStream};
pub use handle::{PoolRef, SlabRef};
pub use pool::Pool;
pub use scratch::ScratchAllocator;
pub use slab::Slab;
pub use stream::{MemoryStream, Stream};
pub use system::{heap, SystemAllocator};
pub use temporary::TemporaryAllocator;
