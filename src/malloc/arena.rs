//! Arena: size routing over lazily created pools

use super::chunk::{Chunk, ChunkInit, PoolHandle};
use super::config::ArenaConfig;
use super::size_class::suitable_size;
use super::traits::{Mallocer, Mpooler};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::mem;
use tracing::{debug, info, warn};

/// Allocation figures of one slab size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlabUtilization {
    pub slab: usize,
    pub pools: usize,
    pub allocated: usize,
    pub capacity: usize,
    /// `allocated / capacity` as a percentage, 0 without pools
    pub percent: f64,
}

/// Point-in-time snapshot of an arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaStats {
    pub capacity: usize,
    pub allocated: usize,
    pub available: usize,
    pub overhead: usize,
    pub useful: usize,
    pub pools: usize,
    pub slabs: Vec<SlabUtilization>,
}

/// Fixed-size chunk allocator over a ladder of slab sizes
///
/// Pools are created on demand, one slab size at a time, until the
/// committed bytes would pass the configured capacity. The newest pool
/// of a slab is tried first.
#[derive(Debug)]
pub struct Arena {
    config: ArenaConfig,
    slabs: Vec<usize>,
    pools: BTreeMap<usize, Vec<Box<dyn Mpooler>>>,
    init: ChunkInit,
    released: bool,
}

impl Arena {
    /// Build an arena, validating `config` first
    pub fn new(config: ArenaConfig) -> Result<Self> {
        let slabs = config.validate()?;
        let pools = slabs.iter().map(|&size| (size, Vec::new())).collect();
        let init = config.chunk.strategy();

        info!(
            slabs = slabs.len(),
            capacity = config.capacity,
            allocator = %config.allocator,
            "Initializing arena with {} slab sizes from {} to {}",
            slabs.len(),
            slabs[0],
            slabs[slabs.len() - 1]
        );

        Ok(Self {
            config,
            slabs,
            pools,
            init,
            released: false,
        })
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Largest request the arena serves
    pub fn largest(&self) -> usize {
        self.slabs.last().copied().unwrap_or(0)
    }

    /// Bytes reserved by every pool, allocated or not
    pub fn committed(&self) -> usize {
        self.pools().map(|pool| pool.capacity()).sum()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Chunk count for a new pool of `size` byte chunks
    fn numchunks(&self, size: usize) -> usize {
        let per_slab = self.config.capacity / self.slabs.len() / size;
        let per_pool = self.config.pool.capacity / size;
        per_slab.min(per_pool).min(self.config.maxchunks) & !0x7
    }

    /// Pool that owns chunks carrying `handle`
    pub fn pool(&self, handle: PoolHandle) -> Result<&dyn Mpooler> {
        self.pools
            .get(&handle.slab)
            .and_then(|list| list.iter().find(|pool| pool.id() == handle.id))
            .map(|pool| pool.as_ref())
            .ok_or_else(|| Error::UnknownPool(handle.to_string()))
    }

    /// Mutable access to the pool that owns chunks carrying `handle`,
    /// used to free chunks and write to them.
    pub fn pool_mut(&mut self, handle: PoolHandle) -> Result<&mut dyn Mpooler> {
        match self
            .pools
            .get_mut(&handle.slab)
            .and_then(|list| list.iter_mut().find(|pool| pool.id() == handle.id))
        {
            Some(pool) => Ok(pool.as_mut()),
            None => Err(Error::UnknownPool(handle.to_string())),
        }
    }

    /// Every pool, smallest slab first
    pub fn pools(&self) -> impl Iterator<Item = &dyn Mpooler> + '_ {
        self.pools.values().flatten().map(|pool| pool.as_ref())
    }

    pub fn pool_count(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    pub fn stats(&self) -> ArenaStats {
        let (overhead, useful) = self.memory();
        ArenaStats {
            capacity: self.config.capacity,
            allocated: self.allocated(),
            available: self.available(),
            overhead,
            useful,
            pools: self.pool_count(),
            slabs: self.utilization(),
        }
    }
}

impl Mallocer for Arena {
    fn alloc(&mut self, n: usize) -> Result<Chunk> {
        if self.released {
            panic!("arena released");
        }

        let largest = self.largest();
        if n > largest {
            return Err(Error::AllocSizeExceeded {
                requested: n,
                largest,
            });
        }
        let size = suitable_size(&self.slabs, n);

        if let Some(list) = self.pools.get_mut(&size) {
            for pool in list.iter_mut() {
                if let Some(chunk) = pool.alloc_chunk() {
                    return Ok(chunk);
                }
            }
        }

        let count = self.numchunks(size);
        let requested = size * count;
        let committed = self.committed();
        if committed + requested > self.config.capacity {
            warn!(
                slab = size,
                committed,
                requested,
                capacity = self.config.capacity,
                "Arena out of memory"
            );
            return Err(Error::OutOfMemory {
                requested,
                committed,
                capacity: self.config.capacity,
            });
        }

        let mut pool = self.config.allocator.make_pool(size, count, self.init)?;
        debug!(
            pool = %pool.id(),
            slab = size,
            chunks = count,
            "Created {} pool",
            self.config.allocator
        );
        let chunk = match pool.alloc_chunk() {
            Some(chunk) => chunk,
            None => panic!("new {} has no free chunk", pool.id()),
        };
        self.pools.entry(size).or_default().insert(0, pool);

        Ok(chunk)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        let pools = self.pool_count();
        for pool in self.pools.values_mut().flatten() {
            pool.release();
        }
        self.pools.clear();
        self.slabs.clear();
        self.released = true;
        info!(pools, "Released arena");
    }

    fn memory(&self) -> (usize, usize) {
        let own = mem::size_of::<Self>() + self.slabs.capacity() * mem::size_of::<usize>();
        self.pools().fold((own, 0), |(overhead, useful), pool| {
            let (o, u) = pool.memory();
            (overhead + o, useful + u)
        })
    }

    fn allocated(&self) -> usize {
        self.pools().map(|pool| pool.allocated()).sum()
    }

    fn available(&self) -> usize {
        if self.released {
            return 0;
        }
        self.config.capacity - self.allocated()
    }

    fn chunk_sizes(&self) -> &[usize] {
        &self.slabs
    }

    fn utilization(&self) -> Vec<SlabUtilization> {
        self.pools
            .iter()
            .map(|(&slab, list)| {
                let allocated: usize = list.iter().map(|pool| pool.allocated()).sum();
                let capacity: usize = list.iter().map(|pool| pool.capacity()).sum();
                let percent = if capacity == 0 {
                    0.0
                } else {
                    allocated as f64 / capacity as f64 * 100.0
                };
                SlabUtilization {
                    slab,
                    pools: list.len(),
                    allocated,
                    capacity,
                    percent,
                }
            })
            .collect()
    }
}
