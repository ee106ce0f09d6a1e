//! Chunk handles and chunk initialization

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Byte written over a whole chunk by [`ChunkInit::Sentinel`].
pub const SENTINEL: u8 = 0xff;

/// Bytes cleared at the start of a chunk by [`ChunkInit::Zero`].
pub const DEFAULT_HEADER: usize = 64;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(u64);

impl PoolId {
    /// Hand out the next unused pool id
    pub fn next() -> Self {
        Self(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// Names the pool a chunk must be freed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolHandle {
    /// Slab size of the pool, which is also its chunk size
    pub slab: usize,
    /// Pool identity
    pub id: PoolId,
}

impl PoolHandle {
    pub fn new(slab: usize, id: PoolId) -> Self {
        Self { slab, id }
    }
}

impl fmt::Display for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(slab={})", self.id, self.slab)
    }
}

/// A chunk handed out by a pool
///
/// The byte range `offset..offset + size()` of the owning pool's region
/// belongs to the holder until the chunk is freed through that pool.
/// Bytes are reached through [`crate::malloc::Mpooler::chunk_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Chunk {
    pool: PoolHandle,
    offset: usize,
}

impl Chunk {
    pub(crate) fn new(pool: PoolHandle, offset: usize) -> Self {
        Self { pool, offset }
    }

    /// Pool this chunk must be freed through
    pub fn pool(&self) -> PoolHandle {
        self.pool
    }

    /// Byte offset of the chunk inside its pool's region
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Usable size of the chunk
    pub fn size(&self) -> usize {
        self.pool.slab
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk({}, offset={})", self.pool, self.offset)
    }
}

/// How a chunk is initialized when it is handed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkInit {
    /// Zero the first `header` bytes and leave the rest as is.
    Zero { header: usize },
    /// Fill the whole chunk with [`SENTINEL`], so reads of bytes the
    /// caller never wrote stand out.
    Sentinel,
}

impl ChunkInit {
    pub fn apply(&self, chunk: &mut [u8]) {
        match *self {
            ChunkInit::Zero { header } => {
                let n = header.min(chunk.len());
                chunk[..n].fill(0);
            }
            ChunkInit::Sentinel => chunk.fill(SENTINEL),
        }
    }
}

impl Default for ChunkInit {
    fn default() -> Self {
        ChunkInit::Zero {
            header: DEFAULT_HEADER,
        }
    }
}
