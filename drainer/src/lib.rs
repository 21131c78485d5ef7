pub mod drainer;
pub mod task;

pub use drainer::{AdmitOutcome, DrainerConfig, GuardedDrainer, TickOutcomes};
pub use task::{DrainRequest, DrainState, DrainTask};
