//! Static agent configuration.
//!
//! Loaded exactly once at startup from a TOML document; every field has
//! a default so a missing `--config` still yields a runnable (dry-run)
//! agent. Tick-to-tick tunables live in the runtime policy file instead,
//! which is re-read by the reconciler each tick.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use cluster::source::SyntheticClusterSpec;
use reconciler::{SelectionMode, WorkloadProfile};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Cloud the model bundle must target.
    pub cloud: String,

    pub tick_interval_secs: u64,

    /// Wall-clock budget per tick; an overrunning tick is cancelled.
    pub tick_budget_secs: u64,

    pub metrics_port: u16,

    pub selection_mode: SelectionMode,

    pub manifest_path: PathBuf,
    pub runtime_policy_path: PathBuf,
    pub distributions_path: Option<PathBuf>,

    /// Vendor price endpoint (cloud price provider).
    pub price_endpoint: String,

    /// Time-series endpoint serving node snapshots.
    pub metrics_endpoint: String,

    /// Orchestrator gateway for node, weight and scaling operations.
    pub orchestrator_endpoint: String,

    pub pools: PoolsConfig,
    pub drain: DrainConfig,

    pub workload: WorkloadProfile,
    pub workload_overrides: HashMap<String, WorkloadProfile>,

    /// Cluster shape rendered by the synthetic metrics source.
    pub synthetic: SyntheticClusterSpec,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cloud: "aws".into(),
            tick_interval_secs: 30,
            tick_budget_secs: 20,
            metrics_port: 9464,
            selection_mode: SelectionMode::Rules,
            manifest_path: "models/manifest.json".into(),
            runtime_policy_path: "runtime-policy.json".into(),
            distributions_path: None,
            price_endpoint: "http://127.0.0.1:7878".into(),
            metrics_endpoint: "http://127.0.0.1:7879".into(),
            orchestrator_endpoint: "http://127.0.0.1:7880".into(),
            pools: PoolsConfig::default(),
            drain: DrainConfig::default(),
            workload: WorkloadProfile::default(),
            workload_overrides: HashMap::new(),
            synthetic: SyntheticClusterSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolsConfig {
    /// Managed-pool allowlist; empty manages every pool.
    pub managed: Vec<String>,

    pub cooldown_secs: u64,

    pub spot_weight: u32,
    pub on_demand_weight: u32,

    /// Pools steered through scaling groups instead of weighted pairs.
    pub scaling_group_pools: Vec<String>,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            managed: Vec::new(),
            cooldown_secs: 60,
            spot_weight: 100,
            on_demand_weight: 10,
            scaling_group_pools: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    pub grace_secs: u64,

    /// Escalate to forced deletion at grace expiry.
    pub force: bool,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            grace_secs: 120,
            force: false,
        }
    }
}

impl AgentConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: AgentConfig = toml::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.cloud, "aws");
        assert_eq!(cfg.pools.cooldown_secs, 60);
        assert_eq!(cfg.pools.spot_weight, 100);
        assert!(!cfg.drain.force);
    }

    #[test]
    fn partial_toml_documents_fill_from_defaults() {
        let cfg: AgentConfig = toml::from_str(
            r#"
                cloud = "gcp"
                [pools]
                managed = ["web", "api"]
                cooldown_secs = 90
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cloud, "gcp");
        assert_eq!(cfg.pools.managed, vec!["web", "api"]);
        assert_eq!(cfg.pools.cooldown_secs, 90);
        assert_eq!(cfg.tick_interval_secs, 30);
    }
}
