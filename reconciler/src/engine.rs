//! The reconcile loop.
//!
//! Responsibilities:
//! - Run one tick at a time on a fixed cadence, under a wall-clock
//!   budget. A tick that overruns is dropped mid-await and the next
//!   tick recomputes from fresh state; the loop is level-triggered.
//! - Per managed pool: price snapshot, feature build, inference, action
//!   selection, safety gates, capacity routing, drain election.
//! - Isolate failures: one pool's error or panic never starves the
//!   others or the next tick.
//!
//! Non-responsibilities:
//! - Talking to provisioners directly (capacity router does this).
//! - Evicting pods (guarded drainer does this).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, instrument, warn};

use cluster::{MetricsSource, PoolState, PoolWeightOps};
use drainer::{AdmitOutcome, DrainRequest, GuardedDrainer};
use inference::InferenceEngine;
use market::PriceProvider;
use policy::{
    Action, ActionVocabulary, PolicyInputs, RuntimePolicy, WorkloadBuckets, WorkloadFeatures,
    decide_deterministic, decide_from_q,
};
use router::{ApplyOutcome, CapacityRouter, drain_cap};

use crate::counters::Counters;
use crate::features::risk_features;
use crate::gates::{GateInputs, apply_safety_gates};
use crate::server::serve_metrics;

/// Canonical pair for the startup price-access canary.
pub const CANARY_INSTANCE_TYPE: &str = "m5.large";
pub const CANARY_ZONE: &str = "us-east-1a";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Deterministic rule table.
    Rules,
    /// Policy-head Q-values, falling back to rules when the head is
    /// absent (dry-run bundles may omit it).
    Model,
}

/// Workload-level knobs for one pool.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkloadProfile {
    pub pod_startup_seconds: f64,
    pub outage_penalty_hours: f64,
    pub priority_score: f64,
}

impl Default for WorkloadProfile {
    fn default() -> Self {
        Self {
            pod_startup_seconds: 60.0,
            outage_penalty_hours: 4.0,
            priority_score: 0.5,
        }
    }
}

#[derive(Clone)]
pub struct ReconcilerConfig {
    pub tick_interval: Duration,
    pub tick_budget: Duration,
    pub dry_run: bool,
    pub selection_mode: SelectionMode,

    /// Hot-reloaded every tick.
    pub runtime_policy_path: PathBuf,

    /// Workload-bucket distributions, loaded once.
    pub distributions_path: Option<PathBuf>,

    pub workload_defaults: WorkloadProfile,
    pub workload_overrides: HashMap<String, WorkloadProfile>,

    pub drain_grace: Duration,
    pub drain_force: bool,

    pub metrics_port: u16,
}

pub struct Reconciler {
    cfg: ReconcilerConfig,
    price: Arc<dyn PriceProvider>,
    metrics_source: Arc<dyn MetricsSource>,
    engine: Arc<InferenceEngine>,
    vocabulary: ActionVocabulary,
    router: Arc<CapacityRouter>,
    drainer: Arc<GuardedDrainer>,
    weight_ops: Arc<dyn PoolWeightOps>,
    buckets: WorkloadBuckets,
    counters: Counters,

    // Copy-on-reload: ticks clone the Arc and never observe a mid-tick
    // policy edit.
    policy: StdMutex<Arc<RuntimePolicy>>,
}

impl Reconciler {
    pub fn new(
        cfg: ReconcilerConfig,
        price: Arc<dyn PriceProvider>,
        metrics_source: Arc<dyn MetricsSource>,
        engine: Arc<InferenceEngine>,
        router: Arc<CapacityRouter>,
        drainer: Arc<GuardedDrainer>,
        weight_ops: Arc<dyn PoolWeightOps>,
    ) -> anyhow::Result<Self> {
        let vocabulary = ActionVocabulary::from_names(engine.action_vocabulary())
            .context("manifest action vocabulary")?;
        let buckets = WorkloadBuckets::load_or_default(cfg.distributions_path.as_deref());

        Ok(Self {
            cfg,
            price,
            metrics_source,
            engine,
            vocabulary,
            router,
            drainer,
            weight_ops,
            buckets,
            counters: Counters::new(),
            policy: StdMutex::new(Arc::new(RuntimePolicy::default())),
        })
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }

    /// One startup price query against the canonical pair. Verifies
    /// that credentials and market access work before the first tick;
    /// fatal only when live mutations are requested.
    pub async fn startup_canary(&self) -> anyhow::Result<()> {
        match self
            .price
            .spot_price(CANARY_INSTANCE_TYPE, CANARY_ZONE)
            .await
        {
            Ok(sample) => {
                info!(
                    instance_type = CANARY_INSTANCE_TYPE,
                    zone = CANARY_ZONE,
                    price = sample.current,
                    "price access canary succeeded"
                );
                Ok(())
            }
            Err(e) => {
                Counters::inc(&self.counters.canary_failures);
                warn!(error = %e, "price access canary failed");
                if self.cfg.dry_run {
                    Ok(())
                } else {
                    Err(anyhow::Error::from(e)
                        .context("price access canary failed with live mutations requested"))
                }
            }
        }
    }

    /// Run the loop until shutdown flips.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        tokio::spawn(serve_metrics(self.cfg.metrics_port, self.counters.clone()));

        self.startup_canary().await?;

        let mut ticker = interval(self.cfg.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.cfg.tick_interval.as_millis() as u64,
            budget_ms = self.cfg.tick_budget.as_millis() as u64,
            dry_run = self.cfg.dry_run,
            "reconciler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match timeout(self.cfg.tick_budget, Arc::clone(&self).tick()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            Counters::inc(&self.counters.tick_failures);
                            warn!(error = ?e, "reconcile tick failed");
                        }
                        Err(_) => {
                            Counters::inc(&self.counters.tick_timeouts);
                            warn!("reconcile tick exceeded its budget; partial progress discarded");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("shutdown requested; reconciler stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Reload the runtime policy, keeping the prior value when the file
    /// fails to parse.
    fn reload_policy(&self) -> Arc<RuntimePolicy> {
        match RuntimePolicy::load(&self.cfg.runtime_policy_path) {
            Ok(fresh) => {
                let fresh = Arc::new(fresh);
                *self.policy.lock().expect("policy lock poisoned") = fresh.clone();
                fresh
            }
            Err(policy::PolicyError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("runtime policy file absent; using current policy");
                self.policy.lock().expect("policy lock poisoned").clone()
            }
            Err(e) => {
                Counters::inc(&self.counters.policy_reload_failures);
                warn!(
                    path = %self.cfg.runtime_policy_path.display(),
                    error = %e,
                    "runtime policy reload failed; keeping prior policy"
                );
                self.policy.lock().expect("policy lock poisoned").clone()
            }
        }
    }

    /// Execute one reconcile tick.
    #[instrument(skip(self), target = "reconciler")]
    pub async fn tick(self: Arc<Self>) -> anyhow::Result<()> {
        Counters::inc(&self.counters.ticks_total);

        let outcomes = self.drainer.begin_tick().await;
        Counters::add(&self.counters.drains_succeeded, outcomes.succeeded);
        Counters::add(&self.counters.drains_failed, outcomes.failed);

        let policy = self.reload_policy();

        let snapshots = self
            .metrics_source
            .node_snapshots()
            .await
            .context("snapshot cluster state")?;
        let cluster_utilization = if snapshots.is_empty() {
            0.0
        } else {
            snapshots.iter().map(|n| n.cpu_percent).sum::<f64>()
                / snapshots.len() as f64
                / 100.0
        };

        let pools: Vec<PoolState> = PoolState::group(snapshots)
            .into_iter()
            .filter(|p| self.router.is_managed(&p.name))
            .collect();

        if pools.is_empty() {
            debug!("no managed pools in this snapshot");
            return Ok(());
        }

        let mut handles = Vec::with_capacity(pools.len());
        for pool in pools {
            let this = Arc::clone(&self);
            let policy = policy.clone();
            handles.push(tokio::spawn(async move {
                this.pool_tick(pool, policy, cluster_utilization).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    Counters::inc(&self.counters.pool_failures);
                    warn!(error = ?e, "pool reconcile failed; other pools unaffected");
                }
                Err(join_err) if join_err.is_panic() => {
                    Counters::inc(&self.counters.worker_panics);
                    warn!("pool worker panicked; worker retired for this tick");
                }
                Err(join_err) => {
                    warn!(error = ?join_err, "pool worker cancelled");
                }
            }
        }

        Ok(())
    }

    fn workload_for(&self, pool: &str, cluster_utilization: f64) -> WorkloadFeatures {
        let profile = self
            .cfg
            .workload_overrides
            .get(pool)
            .copied()
            .unwrap_or(self.cfg.workload_defaults);
        WorkloadFeatures {
            pod_startup_seconds: profile.pod_startup_seconds,
            outage_penalty_hours: profile.outage_penalty_hours,
            priority_score: profile.priority_score,
            cluster_utilization,
        }
    }

    /// Reconcile a single pool: decide, gate, route, elect drains.
    async fn pool_tick(
        self: Arc<Self>,
        pool: PoolState,
        policy: Arc<RuntimePolicy>,
        cluster_utilization: f64,
    ) -> anyhow::Result<()> {
        // Unsupported members are counted every tick, one per node.
        let unsupported_nodes = pool
            .nodes
            .iter()
            .filter(|n| !self.engine.is_supported(&n.instance_type))
            .count() as u64;
        if unsupported_nodes > 0 {
            Counters::add(
                &self.counters.unsupported_instance_family_total,
                unsupported_nodes,
            );
        }

        let price = match with_retries(2, Duration::from_millis(200), || {
            self.price
                .spot_price(&pool.dominant_instance_type, &pool.dominant_zone)
        })
        .await
        {
            Ok(price) => price,
            Err(e) => {
                // Transient market outage: hold this pool for the tick.
                warn!(
                    pool = %pool.name,
                    error = %e,
                    "price unavailable after retries; holding"
                );
                self.counters.record_action(Action::Hold);
                return Ok(());
            }
        };

        let family_supported = self.engine.is_supported(&pool.dominant_instance_type);
        let workload = self.workload_for(&pool.name, cluster_utilization);
        let features = risk_features(&pool, &price, &workload);

        let risk = self.engine.score(&features).context("risk head")?;
        let effective_capacity = (risk.capacity * policy.risk_multiplier).clamp(0.0, 1.0);

        let inputs = PolicyInputs {
            pool: &pool.name,
            risk,
            family_supported,
            spot_ratio: pool.spot_ratio,
            price: &price,
            workload,
        };

        let decision = match self.cfg.selection_mode {
            SelectionMode::Model if self.engine.has_policy_head() => {
                let q = self.engine.act(&features).context("policy head")?;
                decide_from_q(&inputs, &q, &self.vocabulary, &policy)?
            }
            _ => decide_deterministic(&inputs, &policy, &self.buckets),
        };

        let now_ms = self.router.now_ms();
        let gate_inputs = GateInputs {
            managed: self.router.is_managed(&pool.name),
            family_supported,
            cooldown_remaining_ms: self.router.cooldown_remaining_ms(&pool.name),
            minutes_since_last_action: self
                .router
                .last_action_ms(&pool.name)
                .map(|last| now_ms.saturating_sub(last) as f64 / 60_000.0),
            effective_capacity,
        };
        let decision = apply_safety_gates(decision, &gate_inputs, &policy, &self.counters);

        self.counters.record_action(decision.action);
        self.counters
            .set_ratio(&pool.name, pool.spot_ratio, policy.target_spot_ratio);
        if decision.reasons.iter().any(|r| *r == "ood") {
            Counters::inc(&self.counters.ood_pools_total);
        }

        info!(
            pool = %pool.name,
            action = %decision.action,
            capacity_score = risk.capacity,
            runtime_score = risk.runtime,
            confidence = decision.confidence,
            spot_ratio = pool.spot_ratio,
            reasons = ?decision.reasons,
            "pool decision"
        );

        // Drain election happens before routing so scaling-group pools
        // can pre-warm by the at-risk count, but admission happens only
        // after the weight change has settled.
        let budget = match self.weight_ops.disruption_budget(&pool.name).await {
            Ok(budget) => budget,
            Err(e) => {
                warn!(pool = %pool.name, error = ?e, "disruption budget unavailable");
                None
            }
        };
        let cap = drain_cap(pool.size(), policy.max_drain_ratio, budget.as_ref());

        let mut candidates: Vec<String> = if effective_capacity >= policy.risk_threshold {
            pool.nodes
                .iter()
                .filter(|n| n.is_spot() && n.instance_type == pool.dominant_instance_type)
                .map(|n| n.node_id.clone())
                .collect()
        } else {
            Vec::new()
        };
        candidates.sort();

        // Elect at most `cap` nodes this tick; the rest wait for a
        // later sweep.
        let at_risk = candidates.len().min(cap);
        Counters::add(
            &self.counters.drains_rejected_cap,
            (candidates.len() - at_risk) as u64,
        );
        candidates.truncate(at_risk);

        let routed = common::logger::warn_if_slow(
            "capacity_route",
            Duration::from_millis(500),
            self.router.route(&pool, &decision, at_risk),
        )
        .await;

        match routed {
            Ok(ApplyOutcome::Patched(change)) => {
                Counters::inc(&self.counters.weight_changes_total);
                debug!(
                    pool = %pool.name,
                    spot_weight = change.next.spot,
                    on_demand_weight = change.next.on_demand,
                    "weights routed"
                );
            }
            Ok(ApplyOutcome::PreWarmed { .. }) => {
                Counters::inc(&self.counters.prewarms_total);
            }
            Ok(ApplyOutcome::Skipped { reason }) => {
                if decision.action.mutates() {
                    Counters::inc(&self.counters.route_skips_total);
                    debug!(pool = %pool.name, reason, "capacity action skipped");
                }
            }
            Err(e) => {
                // A failed capacity change aborts the pool's drains too:
                // without confirmed replacement capacity we do not shrink.
                Counters::inc(&self.counters.pool_failures);
                warn!(pool = %pool.name, error = ?e, "capacity routing failed; drains withheld");
                return Ok(());
            }
        }

        for node_id in candidates {
            let request = DrainRequest {
                node_id,
                pool: pool.name.clone(),
                grace: self.cfg.drain_grace,
                reason: format!(
                    "capacity score {:.2} at or above drain threshold {:.2}",
                    effective_capacity, policy.risk_threshold
                ),
                dry_run: self.cfg.dry_run,
                force: self.cfg.drain_force,
            };
            match self.drainer.admit(request, cap).await {
                AdmitOutcome::Admitted(_) => {
                    Counters::inc(&self.counters.drains_scheduled);
                }
                AdmitOutcome::CapReached => {
                    Counters::inc(&self.counters.drains_rejected_cap);
                }
                AdmitOutcome::AlreadyTracked => {}
            }
        }

        Ok(())
    }
}

/// Bounded retry with doubling backoff for transient I/O.
async fn with_retries<T, E, F, Fut>(attempts: u32, base: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut backoff = base;
    let mut tries = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                tries += 1;
                if tries > attempts {
                    return Err(e);
                }
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}
