pub mod action;
pub mod buckets;
pub mod decision;
pub mod errors;
pub mod runtime;
pub mod select;

pub use action::{Action, ActionVocabulary};
pub use buckets::WorkloadBuckets;
pub use decision::ActionDecision;
pub use errors::PolicyError;
pub use runtime::{OodPolicy, RiskBands, RuntimePolicy};
pub use select::{PolicyInputs, WorkloadFeatures, decide_deterministic, decide_from_q};
