//! Fixed-size chunk allocator
//!
//! Backing store for tree and LSM nodes. Memory is taken from the
//! platform allocator in large regions (pools), each sliced into
//! chunks of one slab size, and handed out with O(1) bookkeeping.
//!
//! # Architecture
//!
//! ```text
//! Arena (capacity budget, slab ladder)
//!   ├─→ Slab(96B)   → [Pool#7, Pool#3]      newest pool first
//!   ├─→ Slab(104B)  → [Pool#5]
//!   ├─→ Slab(112B)  → []
//!   └─→ Slab(1024B) → [Pool#1]
//!
//! Pool (one region, chunk_size × chunk_count bytes)
//!   ├─→ flist: stack of free chunk indices (u16 per chunk)
//!   └─→ fbit:  FreeBitmap, one bit per chunk + cacheline summaries
//! ```
//!
//! Allocation returns a [`Chunk`], an `(pool handle, offset)` pair.
//! Chunks are freed through the pool named by their handle, see
//! [`Arena::pool_mut`]. Nothing here is internally synchronized; wrap
//! the arena in a [`SharedArena`] to share it between threads.

pub mod arena;
pub mod bench;
pub mod chunk;
pub mod config;
pub mod fbit;
pub mod flist;
pub mod freebits;
mod pool;
pub mod region;
pub mod shared;
pub mod size_class;
pub mod traits;

pub use arena::{Arena, ArenaStats, SlabUtilization};
pub use chunk::{Chunk, ChunkInit, PoolHandle, PoolId};
pub use config::{AllocatorKind, ArenaConfig, ChunkConfig, InitMode, PoolConfig};
pub use fbit::FbitPool;
pub use flist::FlistPool;
pub use freebits::FreeBitmap;
pub use region::Region;
pub use shared::SharedArena;
pub use size_class::{compute_ladder, default_ladder, suitable_size, ALIGNMENT, MAX_ARENA_SIZE};
pub use traits::{Mallocer, Mpooler};
