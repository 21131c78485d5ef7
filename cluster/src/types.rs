//! Cluster state as seen by one reconcile tick.
//!
//! Snapshots are produced by the metrics source and grouped into
//! [`PoolState`]s at the start of a tick. Nothing here is persisted; the
//! next tick rebuilds everything from live state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityKind {
    Spot,
    OnDemand,
}

/// Per-node telemetry plus identity labels. Immutable within a tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub zone: String,
    pub instance_type: String,
    pub pool: String,
    pub capacity_kind: CapacityKind,

    /// Utilization percentages in `[0, 100]`.
    pub cpu_percent: f64,
    pub memory_percent: f64,

    pub age_seconds: u64,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl NodeSnapshot {
    pub fn is_spot(&self) -> bool {
        self.capacity_kind == CapacityKind::Spot
    }
}

/// Orchestrator-level cap on concurrent unavailability for a workload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DisruptionBudget {
    pub max_unavailable: u32,
}

/// One workload pool, rebuilt from node snapshots each tick.
#[derive(Debug, Clone)]
pub struct PoolState {
    pub name: String,
    pub nodes: Vec<NodeSnapshot>,
    pub dominant_instance_type: String,
    pub dominant_zone: String,
    pub spot_ratio: f64,
    pub last_applied_action: Option<String>,
}

impl PoolState {
    /// Derive pool aggregates from member snapshots.
    ///
    /// The dominant instance type is the one with the most nodes;
    /// ties break to the lexicographically smallest name so grouping is
    /// deterministic. The dominant zone is the most common zone among
    /// nodes of the dominant type, same tie-break.
    pub fn from_nodes(name: impl Into<String>, nodes: Vec<NodeSnapshot>) -> Self {
        let name = name.into();

        let dominant_instance_type = most_common(nodes.iter().map(|n| n.instance_type.as_str()));
        let dominant_zone = most_common(
            nodes
                .iter()
                .filter(|n| n.instance_type == dominant_instance_type)
                .map(|n| n.zone.as_str()),
        );

        let spot = nodes.iter().filter(|n| n.is_spot()).count();
        let spot_ratio = if nodes.is_empty() {
            0.0
        } else {
            spot as f64 / nodes.len() as f64
        };

        Self {
            name,
            nodes,
            dominant_instance_type,
            dominant_zone,
            spot_ratio,
            last_applied_action: None,
        }
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Group a flat snapshot list into per-pool states, ordered by pool
    /// name.
    pub fn group(snapshots: Vec<NodeSnapshot>) -> Vec<PoolState> {
        let mut by_pool: BTreeMap<String, Vec<NodeSnapshot>> = BTreeMap::new();
        for snap in snapshots {
            by_pool.entry(snap.pool.clone()).or_default().push(snap);
        }
        by_pool
            .into_iter()
            .map(|(name, nodes)| PoolState::from_nodes(name, nodes))
            .collect()
    }
}

fn most_common<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for item in items {
        *counts.entry(item).or_default() += 1;
    }
    counts
        .into_iter()
        .min_by_key(|(k, c)| (std::cmp::Reverse(*c), *k))
        .map(|(k, _)| k.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, ty: &str, zone: &str, kind: CapacityKind) -> NodeSnapshot {
        NodeSnapshot {
            node_id: id.into(),
            zone: zone.into(),
            instance_type: ty.into(),
            pool: "web".into(),
            capacity_kind: kind,
            cpu_percent: 40.0,
            memory_percent: 50.0,
            age_seconds: 3_600,
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn dominant_type_is_by_count_with_lexicographic_tie_break() {
        let pool = PoolState::from_nodes(
            "web",
            vec![
                node("a", "m5.large", "us-east-1a", CapacityKind::Spot),
                node("b", "m5.large", "us-east-1a", CapacityKind::Spot),
                node("c", "c5.large", "us-east-1a", CapacityKind::OnDemand),
            ],
        );
        assert_eq!(pool.dominant_instance_type, "m5.large");

        let tied = PoolState::from_nodes(
            "web",
            vec![
                node("a", "m5.large", "us-east-1a", CapacityKind::Spot),
                node("b", "c5.large", "us-east-1a", CapacityKind::Spot),
            ],
        );
        assert_eq!(tied.dominant_instance_type, "c5.large");
    }

    #[test]
    fn spot_ratio_counts_spot_members() {
        let pool = PoolState::from_nodes(
            "web",
            vec![
                node("a", "m5.large", "us-east-1a", CapacityKind::Spot),
                node("b", "m5.large", "us-east-1a", CapacityKind::Spot),
                node("c", "m5.large", "us-east-1a", CapacityKind::OnDemand),
                node("d", "m5.large", "us-east-1a", CapacityKind::OnDemand),
            ],
        );
        assert_eq!(pool.spot_ratio, 0.5);
    }

    #[test]
    fn empty_pool_is_well_defined() {
        let pool = PoolState::from_nodes("web", vec![]);
        assert_eq!(pool.spot_ratio, 0.0);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.dominant_instance_type, "");
    }

    #[test]
    fn grouping_splits_by_pool_label() {
        let mut a = node("a", "m5.large", "us-east-1a", CapacityKind::Spot);
        a.pool = "api".into();
        let b = node("b", "m5.large", "us-east-1a", CapacityKind::Spot);

        let pools = PoolState::group(vec![a, b]);
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].name, "api");
        assert_eq!(pools[1].name, "web");
    }
}
