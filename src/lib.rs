// PhotonDB memory allocator
// Fixed-size chunk arenas for in-memory tree and LSM nodes

#![warn(rust_2018_idioms)]

pub mod malloc;
pub mod metrics;

// Re-exports for convenience
pub use malloc::{Arena, ArenaConfig, Chunk, Mallocer, Mpooler, SharedArena};
pub use metrics::ArenaMetrics;

/// Allocator error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Config error: {0}")]
        Config(String),

        #[error("Allocation of {requested} bytes exceeds the largest slab of {largest} bytes")]
        AllocSizeExceeded { requested: usize, largest: usize },

        #[error("Out of memory: new pool of {requested} bytes on top of {committed} committed exceeds capacity {capacity}")]
        OutOfMemory {
            requested: usize,
            committed: usize,
            capacity: usize,
        },

        #[error("Invalid free: {0}")]
        InvalidFree(String),

        #[error("Invalid chunk: {0}")]
        InvalidChunk(String),

        #[error("Unknown pool: {0}")]
        UnknownPool(String),

        #[error("Metrics error: {0}")]
        Metrics(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        assert!(VERSION.starts_with("3."));
    }

    #[test]
    fn test_error_messages() {
        let err = error::Error::AllocSizeExceeded {
            requested: 2048,
            largest: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Allocation of 2048 bytes exceeds the largest slab of 1024 bytes"
        );
    }
}
