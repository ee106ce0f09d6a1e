//! Arena shared between threads

use super::arena::{Arena, ArenaStats};
use super::chunk::Chunk;
use super::config::ArenaConfig;
use super::traits::Mallocer;
use crate::error::Result;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Cloneable handle to an arena behind a mutex
///
/// Every operation takes the lock for its duration; use [`lock`] to run
/// several operations under one acquisition.
///
/// [`lock`]: SharedArena::lock
#[derive(Debug, Clone)]
pub struct SharedArena {
    inner: Arc<Mutex<Arena>>,
}

impl SharedArena {
    pub fn new(config: ArenaConfig) -> Result<Self> {
        Ok(Self::from(Arena::new(config)?))
    }

    pub fn alloc(&self, n: usize) -> Result<Chunk> {
        self.inner.lock().alloc(n)
    }

    /// Free `chunk` through the pool that handed it out
    pub fn free(&self, chunk: Chunk) -> Result<()> {
        self.inner.lock().pool_mut(chunk.pool())?.free(chunk)
    }

    /// Run `f` over the bytes of `chunk`
    pub fn with_chunk_mut<R>(&self, chunk: &Chunk, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut arena = self.inner.lock();
        let bytes = arena.pool_mut(chunk.pool())?.chunk_bytes_mut(chunk)?;
        Ok(f(bytes))
    }

    pub fn lock(&self) -> MutexGuard<'_, Arena> {
        self.inner.lock()
    }

    pub fn stats(&self) -> ArenaStats {
        self.inner.lock().stats()
    }

    pub fn release(&self) {
        self.inner.lock().release()
    }
}

impl From<Arena> for SharedArena {
    fn from(arena: Arena) -> Self {
        Self {
            inner: Arc::new(Mutex::new(arena)),
        }
    }
}
