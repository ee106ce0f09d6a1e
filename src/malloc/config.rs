//! Arena configuration
//!
//! Loaded from a TOML file (optionally overridden by `PHOTON_MALLOC_*`
//! environment variables), from the environment alone, or built in
//! code. Dotted option names map to TOML tables:
//!
//! ```toml
//! capacity = 1073741824
//! minblock = 64
//! maxblock = 65536
//! maxpools = 512
//! maxchunks = 20480
//! allocator = "flist"
//!
//! [pool]
//! capacity = 10485760
//!
//! [chunk]
//! init = "zero"
//! header = 64
//! ```

use super::chunk::{ChunkInit, DEFAULT_HEADER};
use super::fbit::FbitPool;
use super::flist::{FlistPool, MAX_FLIST_CHUNKS};
use super::size_class::{compute_ladder, MAX_ARENA_SIZE};
use super::traits::Mpooler;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Prefix of environment variables read by [`ArenaConfig::load`] and
/// [`ArenaConfig::from_env`].
pub const ENV_PREFIX: &str = "PHOTON_MALLOC";

/// Fewest chunks a pool may be created with.
pub const MIN_POOL_CHUNKS: usize = 8;

/// Pool strategy an arena instantiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorKind {
    /// Stack of free chunk indices
    #[default]
    Flist,
    /// Hierarchical free bitmap
    Fbit,
}

impl AllocatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocatorKind::Flist => "flist",
            AllocatorKind::Fbit => "fbit",
        }
    }

    /// Create a pool of this kind
    pub fn make_pool(
        &self,
        chunk_size: usize,
        chunk_count: usize,
        init: ChunkInit,
    ) -> Result<Box<dyn Mpooler>> {
        Ok(match self {
            AllocatorKind::Flist => Box::new(FlistPool::new(chunk_size, chunk_count, init)?),
            AllocatorKind::Fbit => Box::new(FbitPool::new(chunk_size, chunk_count, init)?),
        })
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocatorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flist" => Ok(AllocatorKind::Flist),
            "fbit" => Ok(AllocatorKind::Fbit),
            other => Err(Error::Config(format!(
                "unknown allocator {:?}, expected \"flist\" or \"fbit\"",
                other
            ))),
        }
    }
}

/// Chunk initialization named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitMode {
    #[default]
    Zero,
    Sentinel,
}

impl FromStr for InitMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zero" => Ok(InitMode::Zero),
            "sentinel" => Ok(InitMode::Sentinel),
            other => Err(Error::Config(format!(
                "unknown chunk init {:?}, expected \"zero\" or \"sentinel\"",
                other
            ))),
        }
    }
}

/// `pool.*` options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Most bytes a single pool may occupy
    pub capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// `chunk.*` options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub init: InitMode,
    /// Bytes zeroed per allocation with `init = "zero"`
    pub header: usize,
}

impl ChunkConfig {
    pub fn strategy(&self) -> ChunkInit {
        match self.init {
            InitMode::Zero => ChunkInit::Zero {
                header: self.header,
            },
            InitMode::Sentinel => ChunkInit::Sentinel,
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            init: InitMode::Zero,
            header: DEFAULT_HEADER,
        }
    }
}

/// Static configuration of an arena
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Total bytes the arena may commit across all pools
    pub capacity: usize,
    /// Smallest slab size
    pub minblock: usize,
    /// Largest slab size, and so the largest request
    pub maxblock: usize,
    /// Most slab sizes (pool lists) an arena may have
    pub maxpools: usize,
    /// Most chunks in a single pool
    pub maxchunks: usize,
    /// Pool strategy
    pub allocator: AllocatorKind,
    pub pool: PoolConfig,
    pub chunk: ChunkConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            capacity: 1024 * 1024 * 1024, // 1GB
            minblock: 64,
            maxblock: 65536,
            maxpools: 512,
            maxchunks: 20 * 1024,
            allocator: AllocatorKind::Flist,
            pool: PoolConfig::default(),
            chunk: ChunkConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(format!("{}_{}", ENV_PREFIX, key))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ArenaConfig {
    /// Configuration from `PHOTON_MALLOC_*` environment variables,
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            capacity: env_or("CAPACITY", defaults.capacity),
            minblock: env_or("MINBLOCK", defaults.minblock),
            maxblock: env_or("MAXBLOCK", defaults.maxblock),
            maxpools: env_or("MAXPOOLS", defaults.maxpools),
            maxchunks: env_or("MAXCHUNKS", defaults.maxchunks),
            allocator: env_or("ALLOCATOR", defaults.allocator),
            pool: PoolConfig {
                capacity: env_or("POOL__CAPACITY", defaults.pool.capacity),
            },
            chunk: ChunkConfig {
                init: env_or("CHUNK__INIT", defaults.chunk.init),
                header: env_or("CHUNK__HEADER", defaults.chunk.header),
            },
        }
    }

    /// Load a configuration file, then apply environment overrides
    /// such as `PHOTON_MALLOC_POOL__CAPACITY`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Invalid arena config {}: {}", path.display(), e)))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("Failed to parse arena config: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to render arena config: {}", e)))
    }

    /// Check every construction constraint and return the slab ladder.
    pub fn validate(&self) -> Result<Vec<usize>> {
        if self.capacity as u64 > MAX_ARENA_SIZE {
            return Err(Error::Config(format!(
                "arena cannot exceed {} bytes ({})",
                MAX_ARENA_SIZE, self.capacity
            )));
        }

        let slabs = compute_ladder(self.minblock, self.maxblock)?;
        if slabs.len() > self.maxpools {
            return Err(Error::Config(format!(
                "number of pools in arena {} exceeds {}",
                slabs.len(),
                self.maxpools
            )));
        }

        if self.maxchunks < MIN_POOL_CHUNKS {
            return Err(Error::Config(format!(
                "maxchunks {} is below {}",
                self.maxchunks, MIN_POOL_CHUNKS
            )));
        } else if self.allocator == AllocatorKind::Flist && self.maxchunks > MAX_FLIST_CHUNKS {
            return Err(Error::Config(format!(
                "maxchunks {} exceeds the free-list limit of {}",
                self.maxchunks, MAX_FLIST_CHUNKS
            )));
        } else if self.pool.capacity / self.maxblock < MIN_POOL_CHUNKS {
            return Err(Error::Config(format!(
                "pool capacity {} cannot hold {} chunks of {}",
                self.pool.capacity, MIN_POOL_CHUNKS, self.maxblock
            )));
        } else if self.capacity / slabs.len() / self.maxblock < MIN_POOL_CHUNKS {
            return Err(Error::Config(format!(
                "capacity {} split across {} slabs cannot hold {} chunks of {}",
                self.capacity,
                slabs.len(),
                MIN_POOL_CHUNKS,
                self.maxblock
            )));
        }

        Ok(slabs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() -> Result<()> {
        let slabs = ArenaConfig::default().validate()?;
        assert_eq!(slabs[0], 64);
        assert_eq!(*slabs.last().unwrap(), 65536);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_large_capacity() {
        let config = ArenaConfig {
            capacity: MAX_ARENA_SIZE as usize + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_too_many_slabs() {
        let config = ArenaConfig {
            maxpools: 16,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_small_pools() {
        let config = ArenaConfig {
            pool: PoolConfig { capacity: 65536 },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ArenaConfig {
            capacity: 1024 * 1024,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ArenaConfig {
            maxchunks: 4,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_flist_chunk_limit() -> Result<()> {
        let mut config = ArenaConfig {
            maxchunks: MAX_FLIST_CHUNKS * 2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.allocator = AllocatorKind::Fbit;
        config.validate()?;
        Ok(())
    }

    #[test]
    fn test_toml_roundtrip_keeps_nested_options() -> Result<()> {
        let config = ArenaConfig::from_toml_str(
            r#"
            capacity = 1073741824
            minblock = 96
            maxblock = 1024
            allocator = "fbit"

            [pool]
            capacity = 1048576

            [chunk]
            init = "sentinel"
            "#,
        )?;

        assert_eq!(config.minblock, 96);
        assert_eq!(config.maxblock, 1024);
        assert_eq!(config.allocator, AllocatorKind::Fbit);
        assert_eq!(config.pool.capacity, 1024 * 1024);
        assert_eq!(config.chunk.strategy(), ChunkInit::Sentinel);
        // Unset options keep their defaults.
        assert_eq!(config.maxpools, 512);
        assert_eq!(config.chunk.header, DEFAULT_HEADER);

        let rendered = config.to_toml_string()?;
        assert_eq!(ArenaConfig::from_toml_str(&rendered)?, config);

        Ok(())
    }

    #[test]
    fn test_toml_rejects_unknown_allocator() {
        let err = ArenaConfig::from_toml_str(r#"allocator = "buddy""#);
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("photon_malloc_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
        let path = dir.join("arena.toml");
        std::fs::write(
            &path,
            "capacity = 536870912\nmaxblock = 4096\n\n[pool]\ncapacity = 2097152\n",
        )
        .map_err(|e| Error::Config(e.to_string()))?;

        let config = ArenaConfig::load(&path)?;
        assert_eq!(config.capacity, 512 * 1024 * 1024);
        assert_eq!(config.maxblock, 4096);
        assert_eq!(config.pool.capacity, 2 * 1024 * 1024);
        assert_eq!(config.minblock, 64);

        std::fs::remove_dir_all(dir).ok();
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("photon_malloc_missing/arena.toml");
        assert!(matches!(ArenaConfig::load(path), Err(Error::Config(_))));
    }

    #[test]
    fn test_allocator_kind_parse() {
        assert_eq!("flist".parse::<AllocatorKind>().ok(), Some(AllocatorKind::Flist));
        assert_eq!("fbit".parse::<AllocatorKind>().ok(), Some(AllocatorKind::Fbit));
        assert!("slab".parse::<AllocatorKind>().is_err());
        assert_eq!(AllocatorKind::Fbit.to_string(), "fbit");
    }
}
