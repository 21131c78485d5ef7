//! Orchestrator-facing capabilities.
//!
//! The container orchestrator and the node provisioner are reached only
//! through these narrow traits. Implementations hide API-server details;
//! tests substitute counting mocks to prove that dry-run issues zero
//! mutations.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::DisruptionBudget;

/// A pod scheduled on some node, as far as draining cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
    /// Managed by a daemon controller; never evicted.
    pub daemon: bool,
    /// Static mirror pod; never evicted.
    pub mirror: bool,
}

impl PodRef {
    pub fn workload(name: &str, namespace: &str) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            daemon: false,
            mirror: false,
        }
    }

    pub fn is_evictable(&self) -> bool {
        !self.daemon && !self.mirror
    }
}

/// Result of a graceful eviction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictOutcome {
    Evicted,
    /// The disruption budget refused the eviction; retry later.
    BudgetViolation,
}

/// Weight fields of a paired spot/on-demand provisioner pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolWeights {
    pub spot: u32,
    pub on_demand: u32,
}

/// Node-level orchestrator operations used by the drainer.
#[async_trait]
pub trait NodeOps: Send + Sync {
    /// Mark the node unschedulable. Idempotent.
    async fn cordon(&self, node_id: &str) -> anyhow::Result<()>;

    async fn uncordon(&self, node_id: &str) -> anyhow::Result<()>;

    async fn list_pods(&self, node_id: &str) -> anyhow::Result<Vec<PodRef>>;

    async fn evict_pod(
        &self,
        node_id: &str,
        pod: &PodRef,
        grace: Duration,
    ) -> anyhow::Result<EvictOutcome>;

    async fn force_delete_pod(&self, node_id: &str, pod: &PodRef) -> anyhow::Result<()>;
}

/// Provisioner custom-resource operations used by the weighted-pool
/// driver.
#[async_trait]
pub trait PoolWeightOps: Send + Sync {
    async fn get_weights(
        &self,
        spot_pool: &str,
        on_demand_pool: &str,
    ) -> anyhow::Result<PoolWeights>;

    async fn patch_weights(
        &self,
        spot_pool: &str,
        on_demand_pool: &str,
        weights: PoolWeights,
    ) -> anyhow::Result<()>;

    /// The disruption budget covering a workload pool, if the
    /// provisioner exposes one.
    async fn disruption_budget(&self, pool: &str) -> anyhow::Result<Option<DisruptionBudget>>;
}

/// Auto-scaling-group operations used by the scaling-group driver.
#[async_trait]
pub trait ScalingGroupOps: Send + Sync {
    async fn desired_capacity(&self, group: &str) -> anyhow::Result<u32>;

    async fn set_desired_capacity(&self, group: &str, desired: u32) -> anyhow::Result<()>;
}
