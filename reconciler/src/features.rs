//! Feature-vector assembly.
//!
//! Both model heads consume the same ten-feature vector. The order is a
//! contract with the exported artifacts and must not change without a
//! new bundle:
//!
//! 0. pool spot ratio
//! 1. mean cpu utilization of the pool, 0..1
//! 2. mean memory utilization of the pool, 0..1
//! 3. current spot price / on-demand price
//! 4. price volatility / on-demand price
//! 5. savings ratio
//! 6. cluster utilization, 0..1
//! 7. pod startup seconds / 600
//! 8. priority score
//! 9. outage penalty hours / 24

use cluster::PoolState;
use market::PriceSample;
use policy::WorkloadFeatures;

pub const FEATURE_WIDTH: usize = 10;

pub fn risk_features(
    pool: &PoolState,
    price: &PriceSample,
    workload: &WorkloadFeatures,
) -> Vec<f64> {
    let n = pool.size().max(1) as f64;
    let mean_cpu = pool.nodes.iter().map(|x| x.cpu_percent).sum::<f64>() / n / 100.0;
    let mean_mem = pool.nodes.iter().map(|x| x.memory_percent).sum::<f64>() / n / 100.0;

    let od = price.on_demand.max(f64::MIN_POSITIVE);

    vec![
        pool.spot_ratio,
        mean_cpu,
        mean_mem,
        price.current / od,
        price.volatility / od,
        price.savings_ratio(),
        workload.cluster_utilization,
        workload.pod_startup_seconds / 600.0,
        workload.priority_score,
        workload.outage_penalty_hours / 24.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster::{CapacityKind, NodeSnapshot};
    use market::types::PriceSample;

    #[test]
    fn vector_width_matches_the_contract() {
        let pool = PoolState::from_nodes(
            "web",
            vec![NodeSnapshot {
                node_id: "web-000".into(),
                zone: "us-east-1a".into(),
                instance_type: "m5.large".into(),
                pool: "web".into(),
                capacity_kind: CapacityKind::Spot,
                cpu_percent: 50.0,
                memory_percent: 25.0,
                age_seconds: 60,
                labels: Default::default(),
            }],
        );
        let price = PriceSample::from_history(0.05, 0.20, &[0.05], None, 0);
        let workload = WorkloadFeatures {
            pod_startup_seconds: 60.0,
            outage_penalty_hours: 4.0,
            priority_score: 0.5,
            cluster_utilization: 0.4,
        };

        let features = risk_features(&pool, &price, &workload);
        assert_eq!(features.len(), FEATURE_WIDTH);
        assert_eq!(features[0], 1.0);
        assert_eq!(features[1], 0.5);
        assert_eq!(features[2], 0.25);
        assert!((features[3] - 0.25).abs() < 1e-12);
        assert!((features[5] - 0.75).abs() < 1e-12);
    }
}
