//! State shared by both pool strategies

use super::chunk::{Chunk, ChunkInit, PoolHandle, PoolId};
use super::region::Region;
use super::size_class::ALIGNMENT;
use crate::error::{Error, Result};

/// Region, geometry and allocation counter of a pool
///
/// Strategies only decide which chunk index is next; turning indices
/// into chunks and chunks back into indices happens here.
#[derive(Debug)]
pub(crate) struct PoolCore {
    id: PoolId,
    chunk_size: usize,
    chunk_count: usize,
    region: Option<Region>,
    allocated: usize,
    init: ChunkInit,
}

impl PoolCore {
    pub fn new(chunk_size: usize, chunk_count: usize, init: ChunkInit) -> Result<Self> {
        if chunk_count == 0 || chunk_count & 0x7 != 0 {
            return Err(Error::Config(format!(
                "number of chunks in a pool should be a non-zero multiple of 8, got {}",
                chunk_count
            )));
        } else if chunk_size == 0 || chunk_size % ALIGNMENT != 0 {
            return Err(Error::Config(format!(
                "chunk size {} is not a multiple of {}",
                chunk_size, ALIGNMENT
            )));
        }
        let capacity = chunk_size.checked_mul(chunk_count).ok_or_else(|| {
            Error::Config(format!(
                "pool of {} chunks of {} bytes overflows",
                chunk_count, chunk_size
            ))
        })?;

        Ok(Self {
            id: PoolId::next(),
            chunk_size,
            chunk_count,
            region: Some(Region::acquire(capacity)?),
            allocated: 0,
            init,
        })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn handle(&self) -> PoolHandle {
        PoolHandle::new(self.chunk_size, self.id)
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn capacity(&self) -> usize {
        self.region.as_ref().map_or(0, Region::len)
    }

    pub fn base_addr(&self) -> usize {
        self.region.as_ref().map_or(0, Region::base_addr)
    }

    pub fn is_released(&self) -> bool {
        self.region.is_none()
    }

    /// # Panics
    ///
    /// Panics if the pool was released.
    pub fn ensure_live(&self) {
        if self.region.is_none() {
            panic!("{} already released", self.id);
        }
    }

    /// Hand out chunk `index`: initialize it and account for it.
    pub fn carve(&mut self, index: usize) -> Chunk {
        let offset = index * self.chunk_size;
        let (size, init, id) = (self.chunk_size, self.init, self.id);
        let region = match self.region.as_mut() {
            Some(region) => region,
            None => panic!("{} already released", id),
        };

        let addr = region.base_addr() + offset;
        if addr % ALIGNMENT != 0 {
            panic!("allocated chunk {:#x} is not {} byte aligned", addr, ALIGNMENT);
        }
        init.apply(region.slice_mut(offset, size));
        self.allocated += size;

        Chunk::new(self.handle(), offset)
    }

    /// Undo the accounting of one chunk.
    pub fn uncarve(&mut self) {
        self.allocated -= self.chunk_size;
    }

    /// Chunk index of `chunk`, or why it does not belong here.
    pub fn locate(&self, chunk: &Chunk) -> std::result::Result<usize, String> {
        if chunk.pool().id != self.id {
            return Err(format!("{} does not belong to {}", chunk, self.id));
        } else if self.region.is_none() {
            return Err(format!("{} already released", self.id));
        } else if chunk.offset() % self.chunk_size != 0 {
            return Err(format!(
                "unaligned offset {} for chunk size {}",
                chunk.offset(),
                self.chunk_size
            ));
        } else if chunk.offset() >= self.capacity() {
            return Err(format!(
                "offset {} outside pool of {} bytes",
                chunk.offset(),
                self.capacity()
            ));
        }
        Ok(chunk.offset() / self.chunk_size)
    }

    pub fn bytes(&self, chunk: &Chunk) -> Result<&[u8]> {
        self.locate(chunk).map_err(Error::InvalidChunk)?;
        match self.region.as_ref() {
            Some(region) => Ok(region.slice(chunk.offset(), self.chunk_size)),
            None => Err(Error::InvalidChunk(format!("{} already released", self.id))),
        }
    }

    pub fn bytes_mut(&mut self, chunk: &Chunk) -> Result<&mut [u8]> {
        self.locate(chunk).map_err(Error::InvalidChunk)?;
        let size = self.chunk_size;
        match self.region.as_mut() {
            Some(region) => Ok(region.slice_mut(chunk.offset(), size)),
            None => Err(Error::InvalidChunk(format!("{} already released", self.id))),
        }
    }

    pub fn addr(&self, chunk: &Chunk) -> Result<usize> {
        self.locate(chunk).map_err(Error::InvalidChunk)?;
        Ok(self.base_addr() + chunk.offset())
    }

    /// Drop the region. Idempotent.
    pub fn release(&mut self) {
        self.region = None;
        self.allocated = 0;
    }
}
