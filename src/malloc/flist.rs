//! Free-list pool
//!
//! Free chunk indices kept on a stack of `u16`, so allocation and free
//! are a pop and a push. Costs two bytes per chunk and caps a pool at
//! [`MAX_FLIST_CHUNKS`] chunks.

use super::chunk::{Chunk, ChunkInit, PoolId};
use super::pool::PoolCore;
use super::traits::Mpooler;
use crate::error::{Error, Result};
use std::mem;
use tracing::{debug, trace};

/// Most chunks a free-list pool can index.
pub const MAX_FLIST_CHUNKS: usize = u16::MAX as usize + 1;

#[derive(Debug)]
pub struct FlistPool {
    core: PoolCore,
    freelist: Vec<u16>,
}

impl FlistPool {
    /// Create a pool of `chunk_count` chunks of `chunk_size` bytes
    pub fn new(chunk_size: usize, chunk_count: usize, init: ChunkInit) -> Result<Self> {
        if chunk_count > MAX_FLIST_CHUNKS {
            return Err(Error::Config(format!(
                "cannot have more than {} chunks in a free-list pool, got {}",
                MAX_FLIST_CHUNKS, chunk_count
            )));
        }
        let core = PoolCore::new(chunk_size, chunk_count, init)?;
        let freelist = (0..chunk_count).map(|i| i as u16).collect();

        Ok(Self { core, freelist })
    }

    /// Allocated bytes recomputed from the free list.
    #[cfg(test)]
    pub(crate) fn check_allocated(&self) -> usize {
        self.core.capacity() - self.freelist.len() * self.core.chunk_size()
    }
}

impl Mpooler for FlistPool {
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
        let index = self.freelist.pop()?;
        let chunk = self.core.carve(index as usize);
        trace!(%chunk, "Allocated chunk");
        Some(chunk)
    }

    fn free(&mut self, chunk: Chunk) -> Result<()> {
        let index = self.core.locate(&chunk).map_err(Error::InvalidFree)?;
        if self.freelist.len() >= self.core.chunk_count() {
            return Err(Error::InvalidFree(format!(
                "{} freed while {} has nothing allocated",
                chunk,
                self.core.id()
            )));
        }
        self.freelist.push(index as u16);
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
        let overhead = mem::size_of::<Self>() + self.freelist.capacity() * mem::size_of::<u16>();
        (overhead, self.core.capacity())
    }

    fn allocated(&self) -> usize {
        self.core.allocated()
    }

    fn release(&mut self) {
        if self.core.is_released() {
            return;
        }
        debug!(pool = %self.core.id(), slab = self.core.chunk_size(), "Releasing free-list pool");
        self.core.release();
        self.freelist = Vec::new();
    }
}
