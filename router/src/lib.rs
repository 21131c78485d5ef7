pub mod driver;
pub mod ledger;
pub mod router;
pub mod scaling;
pub mod weighted;

pub use driver::{ApplyOutcome, PoolDriver};
pub use ledger::{Clock, PoolWeightChange, SystemClock, WeightLedger};
pub use router::{CapacityRouter, RouterConfig, drain_cap};
pub use scaling::ScalingGroupDriver;
pub use weighted::WeightedPoolDriver;
