//! Telemetry ingestion.
//!
//! The agent never scrapes nodes itself; it asks a [`MetricsSource`] for
//! the current snapshot set. The synthetic source exists for dry-run and
//! the e2e suite: it renders a fixed cluster shape deterministically, so
//! two runs over the same spec observe identical state.

use async_trait::async_trait;
use serde::Deserialize;

use crate::types::{CapacityKind, NodeSnapshot};

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Current per-node utilization and identity snapshots.
    async fn node_snapshots(&self) -> anyhow::Result<Vec<NodeSnapshot>>;
}

/// Shape of one synthetic pool.
#[derive(Debug, Clone, Deserialize)]
pub struct SyntheticPool {
    pub name: String,
    pub instance_type: String,
    pub zone: String,
    pub nodes: u32,

    /// Fraction of members rendered as spot capacity.
    #[serde(default = "default_spot_fraction")]
    pub spot_fraction: f64,

    #[serde(default = "default_cpu")]
    pub cpu_percent: f64,

    #[serde(default = "default_memory")]
    pub memory_percent: f64,
}

fn default_spot_fraction() -> f64 {
    0.5
}
fn default_cpu() -> f64 {
    40.0
}
fn default_memory() -> f64 {
    50.0
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyntheticClusterSpec {
    #[serde(default)]
    pub pools: Vec<SyntheticPool>,
}

/// Deterministic [`MetricsSource`] over a fixed cluster spec.
pub struct SyntheticMetricsSource {
    spec: SyntheticClusterSpec,
}

impl SyntheticMetricsSource {
    pub fn new(spec: SyntheticClusterSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl MetricsSource for SyntheticMetricsSource {
    async fn node_snapshots(&self) -> anyhow::Result<Vec<NodeSnapshot>> {
        let mut out = Vec::new();
        for pool in &self.spec.pools {
            let spot_count =
                (pool.nodes as f64 * pool.spot_fraction.clamp(0.0, 1.0)).floor() as u32;
            for i in 0..pool.nodes {
                let kind = if i < spot_count {
                    CapacityKind::Spot
                } else {
                    CapacityKind::OnDemand
                };
                out.push(NodeSnapshot {
                    node_id: format!("{}-{:03}", pool.name, i),
                    zone: pool.zone.clone(),
                    instance_type: pool.instance_type.clone(),
                    pool: pool.name.clone(),
                    capacity_kind: kind,
                    cpu_percent: pool.cpu_percent,
                    memory_percent: pool.memory_percent,
                    age_seconds: 3_600,
                    labels: Default::default(),
                });
            }
        }
        Ok(out)
    }
}
