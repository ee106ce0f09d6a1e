//! Timing runs for the pool strategies

#[cfg(test)]
mod bench {
    use crate::malloc::{
        compute_ladder, suitable_size, AllocatorKind, Arena, ArenaConfig, ChunkInit, FbitPool,
        FlistPool, Mallocer, Mpooler, PoolConfig,
    };
    use std::time::Instant;

    const CHUNKS: usize = 64 * 1024;

    fn churn(pool: &mut dyn Mpooler) {
        let mut chunks = Vec::with_capacity(CHUNKS);
        for _ in 0..CHUNKS {
            chunks.push(pool.alloc_chunk().unwrap());
        }
        for chunk in chunks {
            pool.free(chunk).unwrap();
        }
    }

    /// Free list against bitmap on a full fill and drain
    #[test]
    fn bench_flist_vs_fbit() {
        {
            let mut pool = FlistPool::new(96, CHUNKS, ChunkInit::default()).unwrap();
            let start = Instant::now();
            churn(&mut pool);
            let elapsed = start.elapsed();
            println!("flist: {:?} for {} allocs + frees", elapsed, CHUNKS);
            assert_eq!(pool.allocated(), 0);
        }

        {
            let mut pool = FbitPool::new(96, CHUNKS, ChunkInit::default()).unwrap();
            let start = Instant::now();
            churn(&mut pool);
            let elapsed = start.elapsed();
            println!("fbit: {:?} for {} allocs + frees", elapsed, CHUNKS);
            assert_eq!(pool.free_bitmap().free_blocks(), CHUNKS);
        }
    }

    /// Zero-header init against full sentinel fill
    #[test]
    fn bench_chunk_init() {
        for init in [ChunkInit::Zero { header: 64 }, ChunkInit::Sentinel] {
            let mut pool = FlistPool::new(1024, 8192, init).unwrap();
            let start = Instant::now();
            for _ in 0..8192 {
                pool.alloc_chunk().unwrap();
            }
            println!("{:?}: {:?} for 8192 x 1KB allocs", init, start.elapsed());
        }
    }

    /// Arena routing over the full ladder
    #[test]
    fn bench_arena_mixed_sizes() {
        for allocator in [AllocatorKind::Flist, AllocatorKind::Fbit] {
            let mut arena = Arena::new(ArenaConfig {
                minblock: 64,
                maxblock: 4096,
                pool: PoolConfig {
                    capacity: 4 * 1024 * 1024,
                },
                allocator,
                ..Default::default()
            })
            .unwrap();

            let start = Instant::now();
            let chunks: Vec<_> = (0..100_000)
                .map(|i| arena.alloc(1 + (i * 37) % 4096).unwrap())
                .collect();
            let alloc_elapsed = start.elapsed();

            let start = Instant::now();
            for chunk in chunks {
                arena.pool_mut(chunk.pool()).unwrap().free(chunk).unwrap();
            }
            println!(
                "arena {}: {:?} alloc, {:?} free for 100000 chunks in {} pools",
                allocator,
                alloc_elapsed,
                start.elapsed(),
                arena.pool_count()
            );
        }
    }

    #[test]
    fn bench_suitable_size() {
        let slabs = compute_ladder(64, 1024 * 1024).unwrap();

        let start = Instant::now();
        let mut total = 0;
        for size in 1..=1024 * 1024 {
            total += suitable_size(&slabs, size);
        }
        println!(
            "suitable_size: {:?} for 1M lookups over {} slabs",
            start.elapsed(),
            slabs.len()
        );
        assert!(total > 0);
    }
}
