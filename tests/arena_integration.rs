//! Arena integration tests
//!
//! Exercise the public API the way an embedding storage engine does.

use photondb_malloc::error::{Error, Result};
use photondb_malloc::malloc::{
    compute_ladder, default_ladder, AllocatorKind, ArenaConfig, PoolConfig, ALIGNMENT,
};
use photondb_malloc::{Arena, ArenaMetrics, Mallocer, SharedArena};
use std::thread;

const MB: usize = 1024 * 1024;

fn scenario_config(allocator: AllocatorKind) -> ArenaConfig {
    ArenaConfig {
        capacity: 1024 * MB,
        minblock: 96,
        maxblock: 1024,
        pool: PoolConfig { capacity: MB },
        allocator,
        ..Default::default()
    }
}

#[test]
fn test_ladder_properties() -> Result<()> {
    for (min, max) in [(8, 64), (96, 1024), (64, 65536), (100, 1024 * 1024)] {
        let slabs = compute_ladder(min, max)?;
        assert!(slabs.windows(2).all(|w| w[0] < w[1]));
        assert!(slabs.iter().all(|s| s % ALIGNMENT == 0));
        assert_eq!(*slabs.last().unwrap(), max);
        assert_eq!(slabs, compute_ladder(min, max)?);
    }

    let full = default_ladder();
    assert_eq!(full[0], ALIGNMENT);
    assert!(full.windows(2).all(|w| w[0] < w[1]));

    Ok(())
}

#[test]
fn test_fill_one_megabyte_of_1k_chunks() -> Result<()> {
    let mut arena = Arena::new(scenario_config(AllocatorKind::Flist))?;

    for _ in 0..1024 {
        arena.alloc(1024)?;
    }
    assert_eq!(arena.allocated(), MB);
    assert_eq!(arena.available(), 1024 * MB - MB);
    assert!(matches!(
        arena.alloc(1025),
        Err(Error::AllocSizeExceeded { .. })
    ));

    Ok(())
}

#[test]
fn test_alloc_free_any_order() -> Result<()> {
    for allocator in [AllocatorKind::Flist, AllocatorKind::Fbit] {
        let mut arena = Arena::new(scenario_config(allocator))?;
        let initial = arena.available();

        let chunks = (1..=1000)
            .map(|n| arena.alloc(n))
            .collect::<Result<Vec<_>>>()?;

        // Evens first, then odds backwards
        let (evens, odds): (Vec<_>, Vec<_>) =
            chunks.into_iter().enumerate().partition(|(i, _)| i % 2 == 0);
        for (_, chunk) in evens.into_iter().chain(odds.into_iter().rev()) {
            arena.pool_mut(chunk.pool())?.free(chunk)?;
        }

        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.available(), initial);
    }

    Ok(())
}

#[test]
fn test_load_config_file() -> Result<()> {
    let dir = std::env::temp_dir().join("photon_malloc_integration_cfg");
    std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
    let path = dir.join("arena.toml");
    std::fs::write(
        &path,
        r#"
capacity = 268435456
minblock = 96
maxblock = 1024
allocator = "fbit"

[pool]
capacity = 1048576

[chunk]
init = "sentinel"
"#,
    )
    .map_err(|e| Error::Config(e.to_string()))?;

    let config = ArenaConfig::load(&path)?;
    assert_eq!(config.allocator, AllocatorKind::Fbit);

    let mut arena = Arena::new(config)?;
    let chunk = arena.alloc(200)?;
    let bytes = arena.pool(chunk.pool())?.chunk_bytes(&chunk)?;
    assert!(bytes.iter().all(|&b| b == 0xff));

    std::fs::remove_dir_all(dir).ok();
    Ok(())
}

#[test]
fn test_shared_arena_across_threads() -> Result<()> {
    let arena = SharedArena::new(scenario_config(AllocatorKind::Fbit))?;

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let arena = arena.clone();
            thread::spawn(move || -> Result<usize> {
                let mut held = Vec::new();
                for i in 0..1000 {
                    held.push(arena.alloc(96 + (t * 131 + i * 17) % 900)?);
                    if i % 3 == 0 {
                        arena.free(held.swap_remove(0))?;
                    }
                }
                Ok(held.iter().map(|c| c.size()).sum())
            })
        })
        .collect();

    let mut held = 0;
    for worker in workers {
        held += worker.join().expect("worker panicked")?;
    }
    assert_eq!(arena.stats().allocated, held);

    Ok(())
}

#[test]
fn test_metrics_follow_arena() -> Result<()> {
    let metrics = ArenaMetrics::new()?;
    let mut arena = Arena::new(scenario_config(AllocatorKind::Flist))?;

    metrics.observe(&arena);
    assert!(metrics.encode()?.contains("photon_malloc_allocated_bytes 0"));

    arena.alloc(1024)?;
    metrics.observe(&arena);
    assert!(metrics.encode()?.contains("photon_malloc_allocated_bytes 1024"));

    Ok(())
}
