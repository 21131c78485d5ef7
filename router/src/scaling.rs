//! Auto-scaling-group driver.
//!
//! For provisioners without weighted pools. Before any node is drained,
//! the paired on-demand group is pre-warmed by the at-risk node count so
//! replacement capacity exists when evictions start. A failed scale-up
//! aborts the whole action; the drainer never runs against a pool whose
//! replacement capacity is not confirmed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use cluster::{PoolState, ScalingGroupOps};
use policy::{Action, ActionDecision};

use crate::driver::{ApplyOutcome, PoolDriver};

pub struct ScalingGroupDriver {
    ops: Arc<dyn ScalingGroupOps>,
}

impl ScalingGroupDriver {
    pub fn new(ops: Arc<dyn ScalingGroupOps>) -> Self {
        Self { ops }
    }

    fn replacement_group(pool: &PoolState) -> String {
        format!("{}-od", pool.name)
    }
}

#[async_trait]
impl PoolDriver for ScalingGroupDriver {
    async fn apply(
        &self,
        pool: &PoolState,
        decision: &ActionDecision,
        at_risk: usize,
        dry_run: bool,
        _now_ms: u64,
    ) -> anyhow::Result<ApplyOutcome> {
        match decision.action {
            Action::Decrease10 | Action::Decrease30 | Action::EmergencyExit => {}
            Action::Hold => return Ok(ApplyOutcome::Skipped { reason: "hold" }),
            // Spot expansion is the provisioner's own business on plain
            // scaling groups; there is nothing to pre-warm.
            Action::Increase10 | Action::Increase30 => {
                return Ok(ApplyOutcome::Skipped {
                    reason: "no_prewarm_needed",
                });
            }
        }

        if at_risk == 0 {
            return Ok(ApplyOutcome::Skipped {
                reason: "no_at_risk_nodes",
            });
        }

        let group = Self::replacement_group(pool);
        let prior = self.ops.desired_capacity(&group).await?;
        let desired = prior + at_risk as u32;

        if dry_run {
            info!(
                pool = %pool.name,
                group = %group,
                prior,
                desired,
                "dry-run: scaling-group pre-warm suppressed"
            );
            return Ok(ApplyOutcome::PreWarmed {
                group,
                prior,
                desired,
                dry_run: true,
            });
        }

        self.ops.set_desired_capacity(&group, desired).await?;

        info!(
            pool = %pool.name,
            group = %group,
            prior,
            desired,
            "replacement group pre-warmed"
        );

        Ok(ApplyOutcome::PreWarmed {
            group,
            prior,
            desired,
            dry_run: false,
        })
    }
}
