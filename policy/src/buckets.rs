//! Known workload-feature buckets.
//!
//! The training pipeline exports the bucket values each workload feature
//! was observed at. A live feature outside the span of its bucket set
//! marks the pool as out-of-distribution for this tick.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::select::WorkloadFeatures;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkloadBuckets {
    pub pod_startup_seconds: Vec<f64>,
    pub outage_penalty_hours: Vec<f64>,
    pub priority_score: Vec<f64>,
    pub cluster_utilization: Vec<f64>,
}

impl Default for WorkloadBuckets {
    fn default() -> Self {
        Self {
            pod_startup_seconds: vec![5.0, 30.0, 60.0, 120.0, 300.0, 600.0],
            outage_penalty_hours: vec![0.0, 1.0, 4.0, 8.0, 24.0],
            priority_score: vec![0.0, 0.25, 0.5, 0.75, 1.0],
            cluster_utilization: vec![0.0, 0.25, 0.5, 0.75, 0.95],
        }
    }
}

impl WorkloadBuckets {
    /// Load the distributions file; an absent or malformed file falls
    /// back to the compiled defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<WorkloadBuckets>(&raw) {
                Ok(buckets) => buckets,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed distributions file; using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "distributions file unreadable; using defaults");
                Self::default()
            }
        }
    }

    /// True when any live feature falls outside its known bucket span.
    pub fn is_out_of_distribution(&self, w: &WorkloadFeatures) -> bool {
        !within(&self.pod_startup_seconds, w.pod_startup_seconds)
            || !within(&self.outage_penalty_hours, w.outage_penalty_hours)
            || !within(&self.priority_score, w.priority_score)
            || !within(&self.cluster_utilization, w.cluster_utilization)
    }
}

fn within(buckets: &[f64], value: f64) -> bool {
    if buckets.is_empty() {
        // No observations to compare against; do not flag.
        return true;
    }
    let min = buckets.iter().copied().fold(f64::INFINITY, f64::min);
    let max = buckets.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    value >= min && value <= max
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> WorkloadFeatures {
        WorkloadFeatures {
            pod_startup_seconds: 60.0,
            outage_penalty_hours: 4.0,
            priority_score: 0.5,
            cluster_utilization: 0.5,
        }
    }

    #[test]
    fn in_span_features_are_in_distribution() {
        let buckets = WorkloadBuckets::default();
        assert!(!buckets.is_out_of_distribution(&features()));
    }

    #[test]
    fn a_single_out_of_span_feature_flags_the_pool() {
        let buckets = WorkloadBuckets::default();
        let mut f = features();
        f.pod_startup_seconds = 4_000.0;
        assert!(buckets.is_out_of_distribution(&f));
    }

    #[test]
    fn empty_bucket_lists_never_flag() {
        let buckets = WorkloadBuckets {
            pod_startup_seconds: vec![],
            ..Default::default()
        };
        let mut f = features();
        f.pod_startup_seconds = 10_000.0;
        assert!(!buckets.is_out_of_distribution(&f));
    }
}
