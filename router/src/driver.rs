//! The provisioner-driver seam.
//!
//! A driver translates one [`ActionDecision`] into a provisioner-side
//! effect. New provisioners implement [`PoolDriver`] and plug in without
//! the reconciler noticing.

use async_trait::async_trait;

use cluster::PoolState;
use policy::ActionDecision;

use crate::ledger::PoolWeightChange;

/// What a driver did with a decision.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// Weight fields were patched (or would have been, in dry-run).
    Patched(PoolWeightChange),

    /// A replacement scaling group was pre-warmed ahead of draining.
    PreWarmed {
        group: String,
        prior: u32,
        desired: u32,
        dry_run: bool,
    },

    /// Nothing to do; the reason feeds the observability counters.
    Skipped { reason: &'static str },
}

#[async_trait]
pub trait PoolDriver: Send + Sync {
    /// Apply a decision to the pool's provisioner objects.
    ///
    /// `at_risk` is the number of nodes elected for draining this tick.
    /// In dry-run the driver must log the intended effect and report
    /// success without mutating anything.
    async fn apply(
        &self,
        pool: &PoolState,
        decision: &ActionDecision,
        at_risk: usize,
        dry_run: bool,
        now_ms: u64,
    ) -> anyhow::Result<ApplyOutcome>;
}
