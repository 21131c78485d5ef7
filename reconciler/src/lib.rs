pub mod counters;
pub mod engine;
pub mod features;
pub mod gates;
pub mod server;

pub use counters::{Counters, CountersSnapshot};
pub use engine::{Reconciler, ReconcilerConfig, SelectionMode, WorkloadProfile};
