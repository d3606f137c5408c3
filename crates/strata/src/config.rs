//! Allocator configuration parameters.

use crate::address::GRANULE;
use crate::error::ConfigError;

/// Configuration for the [`TemporaryAllocator`](crate::TemporaryAllocator)
/// block chain.
///
/// Validated by [`TemporaryAllocator::with_config`](crate::TemporaryAllocator::with_config);
/// immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemporaryConfig {
    /// Size of the first block in bytes. Each new block starts at this size
    /// and doubles until it can hold the request that triggered it.
    ///
    /// Default: 2 MiB. Must be a power of two and at least one granule.
    pub initial_block_size: usize,
}

impl TemporaryConfig {
    /// Default initial block size: 2 MiB.
    pub const DEFAULT_INITIAL_BLOCK_SIZE: usize = 2 << 20;

    /// Check the configuration, returning the reason it is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_block_size.is_power_of_two() || self.initial_block_size < GRANULE {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "initial_block_size must be a power of two and >= {GRANULE} (got {})",
                    self.initial_block_size
                ),
            });
        }
        Ok(())
    }

    /// Size of the block appended to satisfy a request of `len` bytes:
    /// the initial size, doubled until it is at least `len`.
    ///
    /// Returns `None` if no such power of two fits a `usize`.
    pub fn block_size_for(&self, len: usize) -> Option<usize> {
        let mut size = self.initial_block_size;
        while size < len {
            size = size.checked_mul(2)?;
        }
        Some(size)
    }
}

impl Default for TemporaryConfig {
    fn default() -> Self {
        Self {
            initial_block_size: Self::DEFAULT_INITIAL_BLOCK_SIZE,
        }
    }
}
