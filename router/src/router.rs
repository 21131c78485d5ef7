//! The capacity router.
//!
//! Translates decisions into provisioner effects, uniformly across
//! drivers, under three write gates: the managed-pool allowlist, the
//! per-pool cooldown (consulting the weight ledger), and whatever
//! hysteresis the driver itself applies. A per-pool mutex keeps at most
//! one capacity change in flight per pool; different pools patch in
//! parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use cluster::{DisruptionBudget, PoolState};
use policy::ActionDecision;

use crate::driver::{ApplyOutcome, PoolDriver};
use crate::ledger::{Clock, PoolWeightChange, WeightLedger};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RouterConfig {
    /// Pools the router may touch. Empty means all pools are managed.
    pub allowlist: Vec<String>,

    /// Minimum interval between two successful capacity actions on the
    /// same pool.
    pub cooldown: Duration,

    pub dry_run: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            cooldown: DEFAULT_COOLDOWN,
            dry_run: true,
        }
    }
}

pub struct CapacityRouter {
    cfg: RouterConfig,
    default_driver: Arc<dyn PoolDriver>,
    driver_overrides: HashMap<String, Arc<dyn PoolDriver>>,
    clock: Arc<dyn Clock>,

    // Short exclusive sections only; never held across driver I/O.
    ledger: StdMutex<WeightLedger>,

    // Serializes capacity changes within a pool.
    pool_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CapacityRouter {
    pub fn new(
        cfg: RouterConfig,
        default_driver: Arc<dyn PoolDriver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cfg,
            default_driver,
            driver_overrides: HashMap::new(),
            clock,
            ledger: StdMutex::new(WeightLedger::new()),
            pool_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Select a non-default driver for one pool.
    pub fn with_driver_override(mut self, pool: &str, driver: Arc<dyn PoolDriver>) -> Self {
        self.driver_overrides.insert(pool.to_string(), driver);
        self
    }

    pub fn is_managed(&self, pool: &str) -> bool {
        self.cfg.allowlist.is_empty() || self.cfg.allowlist.iter().any(|p| p == pool)
    }

    /// Milliseconds until the pool's cooldown expires, zero if clear.
    pub fn cooldown_remaining_ms(&self, pool: &str) -> u64 {
        let ledger = self.ledger.lock().expect("ledger lock poisoned");
        let Some(last) = ledger.last_action_ms(pool) else {
            return 0;
        };
        let elapsed = self.clock.now_ms().saturating_sub(last);
        (self.cfg.cooldown.as_millis() as u64).saturating_sub(elapsed)
    }

    /// The router's notion of now, from its injected clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn last_action_ms(&self, pool: &str) -> Option<u64> {
        self.ledger
            .lock()
            .expect("ledger lock poisoned")
            .last_action_ms(pool)
    }

    pub fn ledger_entries(&self) -> Vec<PoolWeightChange> {
        self.ledger
            .lock()
            .expect("ledger lock poisoned")
            .entries()
            .to_vec()
    }

    async fn pool_lock(&self, pool: &str) -> Arc<Mutex<()>> {
        let mut locks = self.pool_locks.lock().await;
        locks
            .entry(pool.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Route a decision through the pool's driver.
    ///
    /// `HOLD` returns immediately and never touches the ledger. The
    /// ledger is appended only after the driver acknowledges, so an
    /// errored or cancelled patch is retried by the next tick.
    pub async fn route(
        &self,
        pool: &PoolState,
        decision: &ActionDecision,
        at_risk: usize,
    ) -> anyhow::Result<ApplyOutcome> {
        if !decision.action.mutates() {
            return Ok(ApplyOutcome::Skipped { reason: "hold" });
        }

        if !self.is_managed(&pool.name) {
            debug!(pool = %pool.name, "pool not in the managed allowlist");
            return Ok(ApplyOutcome::Skipped {
                reason: "not_managed",
            });
        }

        let lock = self.pool_lock(&pool.name).await;
        let _guard = lock.lock().await;

        let remaining = self.cooldown_remaining_ms(&pool.name);
        if remaining > 0 {
            debug!(pool = %pool.name, remaining_ms = remaining, "cooldown active");
            return Ok(ApplyOutcome::Skipped { reason: "cooldown" });
        }

        let driver = self
            .driver_overrides
            .get(&pool.name)
            .unwrap_or(&self.default_driver)
            .clone();

        let now_ms = self.clock.now_ms();
        let outcome = driver
            .apply(pool, decision, at_risk, self.cfg.dry_run, now_ms)
            .await?;

        match &outcome {
            ApplyOutcome::Patched(change) => {
                let mut ledger = self.ledger.lock().expect("ledger lock poisoned");
                ledger.record(change.clone());
                info!(
                    pool = %pool.name,
                    action = %decision.action,
                    reasons = ?decision.reasons,
                    dry_run = change.dry_run,
                    "capacity action applied"
                );
            }
            ApplyOutcome::PreWarmed { group, desired, .. } => {
                let mut ledger = self.ledger.lock().expect("ledger lock poisoned");
                ledger.mark_action(&pool.name, now_ms);
                info!(
                    pool = %pool.name,
                    group = %group,
                    desired,
                    reasons = ?decision.reasons,
                    "replacement capacity staged"
                );
            }
            ApplyOutcome::Skipped { .. } => {}
        }

        Ok(outcome)
    }
}

/// Effective drain concurrency for a pool: the configured ratio cap,
/// tightened by the disruption budget when the provisioner exposes one.
pub fn drain_cap(
    pool_size: usize,
    max_drain_ratio: f64,
    budget: Option<&DisruptionBudget>,
) -> usize {
    let ratio_cap = (max_drain_ratio.clamp(0.0, 1.0) * pool_size as f64).floor() as usize;
    match budget {
        Some(b) => ratio_cap.min(b.max_unavailable as usize),
        None => ratio_cap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_cap_takes_the_tighter_of_ratio_and_budget() {
        assert_eq!(drain_cap(10, 0.10, None), 1);
        assert_eq!(drain_cap(10, 0.35, None), 3);
        assert_eq!(
            drain_cap(10, 0.35, Some(&DisruptionBudget { max_unavailable: 2 })),
            2
        );
        assert_eq!(
            drain_cap(10, 0.10, Some(&DisruptionBudget { max_unavailable: 5 })),
            1
        );
        assert_eq!(drain_cap(3, 0.10, None), 0);
    }
}
