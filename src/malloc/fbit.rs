//! Bitmap pool
//!
//! Free chunks tracked by a [`FreeBitmap`]: one bit per chunk plus a
//! small summary, so bookkeeping stays near 1/8 byte per chunk and
//! allocation always returns the lowest free chunk.

use super::chunk::{Chunk, ChunkInit, PoolId};
use super::freebits::{FreeBitmap, CACHELINE};
use super::pool::PoolCore;
use super::traits::Mpooler;
use crate::error::{Error, Result};
use std::mem;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct FbitPool {
    core: PoolCore,
    fbits: FreeBitmap,
}

impl FbitPool {
    /// Create a pool of `chunk_count` chunks of `chunk_size` bytes
    pub fn new(chunk_size: usize, chunk_count: usize, init: ChunkInit) -> Result<Self> {
        let core = PoolCore::new(chunk_size, chunk_count, init)?;
        let fbits = FreeBitmap::with_cacheline(CACHELINE, chunk_count)?;
        Ok(Self { core, fbits })
    }

    /// Free-chunk bitmap of this pool
    pub fn free_bitmap(&self) -> &FreeBitmap {
        &self.fbits
    }

    /// Allocated bytes recomputed from the bitmap. Scans the leaf level.
    pub fn check_allocated(&self) -> usize {
        self.core.capacity() - self.fbits.free_blocks() * self.core.chunk_size()
    }
}

impl Mpooler for FbitPool {
    fn id(&self) -> PoolId {
        self.core.id()
    }

    fn chunk_size(&self) -> usize {
        self.core.chunk_size()
    }

    fn chunk_count(&self) -> usize {
        self.core.chunk_count()
    }

    fn alloc_chunk(&mut self) -> Option<Chunk> {
        self.core.ensure_live();
        if self.core.allocated() == self.core.capacity() {
            return None;
        }
        let index = self.fbits.allocate()?;
        let chunk = self.core.carve(index);
        trace!(%chunk, "Allocated chunk");
        Some(chunk)
    }

    fn free(&mut self, chunk: Chunk) -> Result<()> {
        let index = self.core.locate(&chunk).map_err(Error::InvalidFree)?;
        self.fbits
            .free(index)
            .map_err(|e| Error::InvalidFree(format!("{}: {}", chunk, e)))?;
        self.core.uncarve();
        trace!(%chunk, "Freed chunk");
        Ok(())
    }

    fn chunk_bytes(&self, chunk: &Chunk) -> Result<&[u8]> {
        self.core.bytes(chunk)
    }

    fn chunk_bytes_mut(&mut self, chunk: &Chunk) -> Result<&mut [u8]> {
        self.core.bytes_mut(chunk)
    }

    fn chunk_addr(&self, chunk: &Chunk) -> Result<usize> {
        self.core.addr(chunk)
    }

    fn base_addr(&self) -> usize {
        self.core.base_addr()
    }

    fn capacity(&self) -> usize {
        self.core.capacity()
    }

    fn memory(&self) -> (usize, usize) {
        let overhead = mem::size_of::<PoolCore>() + self.fbits.size_of();
        (overhead, self.core.capacity())
    }

    fn allocated(&self) -> usize {
        self.core.allocated()
    }

    fn release(&mut self) {
        if self.core.is_released() {
            return;
        }
        debug!(pool = %self.core.id(), slab = self.core.chunk_size(), "Releasing bitmap pool");
        self.core.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::malloc::ALIGNMENT;

    #[test]
    fn test_new_fbit_pool() -> Result<()> {
        let (size, n) = (96, 512 * 64);
        let pool = FbitPool::new(size, n, ChunkInit::default())?;

        assert_eq!(pool.capacity(), size * n);
        assert_eq!(pool.free_bitmap().free_blocks(), n);
        assert_eq!(pool.chunk_size(), size);
        assert!(matches!(
            FbitPool::new(size, 9, ChunkInit::default()),
            Err(Error::Config(_))
        ));

        Ok(())
    }

    #[test]
    fn test_fbit_exhaust_and_refill_56() -> Result<()> {
        let (size, n) = (96, 56);
        let mut pool = FbitPool::new(size, n, ChunkInit::default())?;
        let mut chunks = Vec::new();

        for i in 0..n {
            let chunk = pool.alloc_chunk().expect("pool has room");
            assert_eq!(chunk.offset(), i * size);
            assert_eq!(pool.allocated(), (i + 1) * size);
            assert_eq!(pool.available(), (n - i - 1) * size);
            assert_eq!(pool.chunk_addr(&chunk)? % ALIGNMENT, 0);
            chunks.push(chunk);
        }
        assert!(pool.alloc_chunk().is_none());
        assert_eq!(pool.check_allocated(), pool.allocated());

        for chunk in chunks.into_iter().rev() {
            pool.free(chunk)?;
        }
        assert_eq!(pool.free_bitmap().free_blocks(), n);
        assert_eq!(pool.allocated(), 0);
        assert!(pool.alloc_chunk().is_some());

        Ok(())
    }

    #[test]
    fn test_fbit_scattered_frees() -> Result<()> {
        let (size, n) = (64, 4096);
        let mut pool = FbitPool::new(size, n, ChunkInit::default())?;
        let chunks: Vec<_> = (0..n).map(|_| pool.alloc_chunk().expect("pool has room")).collect();

        for chunk in chunks.iter().step_by(3) {
            pool.free(*chunk)?;
        }
        let freed = n.div_ceil(3);
        assert_eq!(pool.allocated(), (n - freed) * size);
        assert_eq!(pool.check_allocated(), pool.allocated());

        // Lowest free chunk first.
        let chunk = pool.alloc_chunk().expect("pool has room");
        assert_eq!(chunk.offset(), 0);
        let chunk = pool.alloc_chunk().expect("pool has room");
        assert_eq!(chunk.offset(), 3 * size);

        Ok(())
    }

    #[test]
    fn test_fbit_rejects_double_free() -> Result<()> {
        let mut pool = FbitPool::new(64, 64, ChunkInit::default())?;
        let a = pool.alloc_chunk().expect("pool has room");
        let b = pool.alloc_chunk().expect("pool has room");

        pool.free(a)?;
        assert!(matches!(pool.free(a), Err(Error::InvalidFree(_))));
        assert_eq!(pool.allocated(), 64);

        pool.free(b)?;
        assert_eq!(pool.allocated(), 0);

        Ok(())
    }

    #[test]
    fn test_fbit_zero_init_header() -> Result<()> {
        let mut pool = FbitPool::new(128, 8, ChunkInit::Zero { header: 64 })?;
        let chunk = pool.alloc_chunk().expect("pool has room");

        pool.chunk_bytes_mut(&chunk)?.fill(0xab);
        pool.free(chunk)?;

        let again = pool.alloc_chunk().expect("pool has room");
        assert_eq!(again, chunk);
        let bytes = pool.chunk_bytes(&again)?;
        assert!(bytes[..64].iter().all(|&b| b == 0));
        assert!(bytes[64..].iter().all(|&b| b == 0xab));

        Ok(())
    }

    #[test]
    fn test_fbit_memory_overhead() -> Result<()> {
        let (size, n) = (96, 512 * 64);
        let pool = FbitPool::new(size, n, ChunkInit::default())?;

        let (overhead, useful) = pool.memory();
        assert_eq!(useful, size * n);
        assert!(overhead < n / 4, "overhead {}", overhead);

        Ok(())
    }
}
