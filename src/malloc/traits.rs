//! Capability traits for arenas and pools
//!
//! An arena routes requests by size and owns pools; a pool hands out
//! chunks of one size. The two roles are separate traits so a chunk can
//! only be freed through a pool.

use super::arena::SlabUtilization;
use super::chunk::{Chunk, PoolHandle, PoolId};
use crate::error::Result;
use std::fmt::Debug;

/// Arena role: size routing over a set of pools
pub trait Mallocer {
    /// Allocate a chunk that can hold `n` bytes.
    ///
    /// The returned chunk names the pool it must be freed through.
    fn alloc(&mut self, n: usize) -> Result<Chunk>;

    /// Release every pool and the memory behind it.
    fn release(&mut self);

    /// Bookkeeping overhead and useful bytes taken from the platform
    fn memory(&self) -> (usize, usize);

    /// Bytes currently handed out
    fn allocated(&self) -> usize;

    /// Bytes that may still be handed out
    fn available(&self) -> usize;

    /// Slab sizes this allocator serves, ascending
    fn chunk_sizes(&self) -> &[usize];

    /// Per slab size, allocated bytes as a percentage of pool capacity
    fn utilization(&self) -> Vec<SlabUtilization>;
}

/// Pool role: fixed-size chunks carved from one region
pub trait Mpooler: Debug + Send {
    fn id(&self) -> PoolId;

    /// Size of every chunk in this pool
    fn chunk_size(&self) -> usize;

    /// Number of chunks the pool was created with
    fn chunk_count(&self) -> usize;

    /// Handle that chunks of this pool carry
    fn handle(&self) -> PoolHandle {
        PoolHandle::new(self.chunk_size(), self.id())
    }

    /// Take a free chunk, `None` if the pool is exhausted.
    ///
    /// # Panics
    ///
    /// Panics if the pool was released.
    fn alloc_chunk(&mut self) -> Option<Chunk>;

    /// Give a chunk back.
    ///
    /// Fails with [`crate::error::Error::InvalidFree`] for chunks of
    /// another pool, misaligned or out of range offsets, and double
    /// frees that the pool can detect.
    fn free(&mut self, chunk: Chunk) -> Result<()>;

    fn chunk_bytes(&self, chunk: &Chunk) -> Result<&[u8]>;

    fn chunk_bytes_mut(&mut self, chunk: &Chunk) -> Result<&mut [u8]>;

    /// Address of the first byte of `chunk`
    fn chunk_addr(&self, chunk: &Chunk) -> Result<usize>;

    /// Address of the pool's region, 0 once released
    fn base_addr(&self) -> usize;

    /// Useful bytes, `chunk_size * chunk_count` until released
    fn capacity(&self) -> usize;

    /// Bookkeeping overhead and useful bytes
    fn memory(&self) -> (usize, usize);

    fn allocated(&self) -> usize;

    fn available(&self) -> usize {
        self.capacity() - self.allocated()
    }

    /// Return the region to the platform allocator.
    fn release(&mut self);
}
