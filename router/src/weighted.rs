//! Weighted-pool driver.
//!
//! Each managed workload maps to a pair of provisioner custom resources,
//! `<workload>-spot` and `<workload>-od`. Steering is a weight flip:
//! favoring spot patches the pair to `(spot_weight, on_demand_weight)`,
//! favoring on-demand inverts it, and an emergency exit zeroes the spot
//! side entirely. Identical weights are never re-patched.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use cluster::{PoolState, PoolWeightOps, PoolWeights};
use policy::{Action, ActionDecision};

use crate::driver::{ApplyOutcome, PoolDriver};
use crate::ledger::PoolWeightChange;

pub const DEFAULT_SPOT_WEIGHT: u32 = 100;
pub const DEFAULT_ON_DEMAND_WEIGHT: u32 = 10;

pub struct WeightedPoolDriver {
    ops: Arc<dyn PoolWeightOps>,
    spot_weight: u32,
    on_demand_weight: u32,
}

impl WeightedPoolDriver {
    pub fn new(ops: Arc<dyn PoolWeightOps>) -> Self {
        Self::with_weights(ops, DEFAULT_SPOT_WEIGHT, DEFAULT_ON_DEMAND_WEIGHT)
    }

    pub fn with_weights(
        ops: Arc<dyn PoolWeightOps>,
        spot_weight: u32,
        on_demand_weight: u32,
    ) -> Self {
        Self {
            ops,
            spot_weight,
            on_demand_weight,
        }
    }

    fn desired_weights(&self, action: Action) -> Option<PoolWeights> {
        match action {
            Action::Increase10 | Action::Increase30 => Some(PoolWeights {
                spot: self.spot_weight,
                on_demand: self.on_demand_weight,
            }),
            Action::Decrease10 | Action::Decrease30 => Some(PoolWeights {
                spot: self.on_demand_weight,
                on_demand: self.spot_weight,
            }),
            Action::EmergencyExit => Some(PoolWeights {
                spot: 0,
                on_demand: self.spot_weight,
            }),
            Action::Hold => None,
        }
    }
}

#[async_trait]
impl PoolDriver for WeightedPoolDriver {
    async fn apply(
        &self,
        pool: &PoolState,
        decision: &ActionDecision,
        _at_risk: usize,
        dry_run: bool,
        now_ms: u64,
    ) -> anyhow::Result<ApplyOutcome> {
        let Some(desired) = self.desired_weights(decision.action) else {
            return Ok(ApplyOutcome::Skipped { reason: "hold" });
        };

        let spot_pool = format!("{}-spot", pool.name);
        let on_demand_pool = format!("{}-od", pool.name);

        let current = self.ops.get_weights(&spot_pool, &on_demand_pool).await?;
        if current == desired {
            debug!(pool = %pool.name, "weights already converged; skipping patch");
            return Ok(ApplyOutcome::Skipped { reason: "hysteresis" });
        }

        let change = PoolWeightChange {
            pool: pool.name.clone(),
            spot_pool: spot_pool.clone(),
            on_demand_pool: on_demand_pool.clone(),
            prior: current,
            next: desired,
            action: decision.action,
            ts_ms: now_ms,
            dry_run,
        };

        if dry_run {
            info!(
                pool = %pool.name,
                action = %decision.action,
                spot_weight = desired.spot,
                on_demand_weight = desired.on_demand,
                "dry-run: weight patch suppressed"
            );
            return Ok(ApplyOutcome::Patched(change));
        }

        self.ops
            .patch_weights(&spot_pool, &on_demand_pool, desired)
            .await?;

        info!(
            pool = %pool.name,
            action = %decision.action,
            prior_spot = current.spot,
            spot_weight = desired.spot,
            on_demand_weight = desired.on_demand,
            "pool weights patched"
        );

        Ok(ApplyOutcome::Patched(change))
    }
}
