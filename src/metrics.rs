//! Prometheus metrics exporter for arenas
//!
//! Gauges mirror [`ArenaStats`]; call [`ArenaMetrics::observe`] before
//! scraping to refresh them.
//!
//! [`ArenaStats`]: crate::malloc::ArenaStats

use crate::error::{Error, Result};
use crate::malloc::Arena;
use prometheus::{Encoder, GaugeVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::debug;

fn metrics_err(e: prometheus::Error) -> Error {
    Error::Metrics(e.to_string())
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::new(name, help).map_err(metrics_err)?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(metrics_err)?;
    Ok(gauge)
}

/// Arena gauges on their own registry
pub struct ArenaMetrics {
    registry: Registry,
    capacity: IntGauge,
    allocated: IntGauge,
    available: IntGauge,
    useful: IntGauge,
    overhead: IntGauge,
    pools: IntGauge,
    utilization: GaugeVec,
}

impl ArenaMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let utilization = GaugeVec::new(
            Opts::new(
                "photon_malloc_slab_utilization_percent",
                "Allocated bytes as a percentage of pool capacity, per slab size",
            ),
            &["slab"],
        )
        .map_err(metrics_err)?;
        registry
            .register(Box::new(utilization.clone()))
            .map_err(metrics_err)?;

        Ok(Self {
            capacity: int_gauge(
                &registry,
                "photon_malloc_capacity_bytes",
                "Configured arena capacity in bytes",
            )?,
            allocated: int_gauge(
                &registry,
                "photon_malloc_allocated_bytes",
                "Bytes handed out in chunks",
            )?,
            available: int_gauge(
                &registry,
                "photon_malloc_available_bytes",
                "Bytes that may still be handed out",
            )?,
            useful: int_gauge(
                &registry,
                "photon_malloc_useful_bytes",
                "Bytes reserved by pools",
            )?,
            overhead: int_gauge(
                &registry,
                "photon_malloc_overhead_bytes",
                "Bookkeeping bytes of the arena and its pools",
            )?,
            pools: int_gauge(&registry, "photon_malloc_pools", "Number of live pools")?,
            utilization,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Refresh every gauge from `arena`
    pub fn observe(&self, arena: &Arena) {
        let stats = arena.stats();

        self.capacity.set(stats.capacity as i64);
        self.allocated.set(stats.allocated as i64);
        self.available.set(stats.available as i64);
        self.useful.set(stats.useful as i64);
        self.overhead.set(stats.overhead as i64);
        self.pools.set(stats.pools as i64);

        self.utilization.reset();
        for slab in &stats.slabs {
            self.utilization
                .with_label_values(&[&slab.slab.to_string()])
                .set(slab.percent);
        }
        debug!(
            allocated = stats.allocated,
            pools = stats.pools,
            "Observed arena metrics"
        );
    }

    /// Metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_err)?;
        String::from_utf8(buffer).map_err(|e| Error::Metrics(e.to_string()))
    }
}
