pub mod api;
pub mod http;
pub mod source;
pub mod types;

pub use api::{EvictOutcome, NodeOps, PodRef, PoolWeightOps, PoolWeights, ScalingGroupOps};
pub use source::MetricsSource;
pub use types::{CapacityKind, DisruptionBudget, NodeSnapshot, PoolState};
