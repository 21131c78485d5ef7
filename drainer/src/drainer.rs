//! Guarded node draining.
//!
//! Design principles:
//! - **Fail-closed**: any unexpected orchestrator answer marks the drain
//!   `Failed`; the node stays cordoned, which is always safe.
//! - **Bounded concurrency**: admission is capped per pool, evictions
//!   are capped per node.
//! - **Budget-aware**: a disruption-budget refusal is not an error; the
//!   eviction retries with capped exponential backoff until the grace
//!   deadline.
//! - **Absorbing terminals**: a `Failed` drain is not retried within the
//!   tick; the next reconcile sweep may re-elect the node.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use cluster::api::{EvictOutcome, NodeOps, PodRef};

use crate::task::{DrainRequest, DrainState, DrainTask};

#[derive(Debug, Clone, Copy)]
pub struct DrainerConfig {
    pub cordon_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,

    /// Concurrent evictions per node.
    pub eviction_parallelism: usize,
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            cordon_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(8),
            eviction_parallelism: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted(uuid::Uuid),
    /// The pool is already at its drain-concurrency cap.
    CapReached,
    /// The node already has a task this tick (terminal or not).
    AlreadyTracked,
}

/// Terminal outcomes swept at the start of a tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickOutcomes {
    pub succeeded: u64,
    pub failed: u64,
}

pub struct GuardedDrainer {
    nodes: Arc<dyn NodeOps>,
    cfg: DrainerConfig,
    tasks: Arc<Mutex<HashMap<String, DrainTask>>>,
}

impl GuardedDrainer {
    pub fn new(nodes: Arc<dyn NodeOps>, cfg: DrainerConfig) -> Self {
        Self {
            nodes,
            cfg,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sweep terminal tasks and report their outcomes. Swept nodes
    /// become eligible for re-election.
    pub async fn begin_tick(&self) -> TickOutcomes {
        let mut tasks = self.tasks.lock().await;
        let mut outcomes = TickOutcomes::default();
        tasks.retain(|_, task| match task.state {
            DrainState::Succeeded => {
                outcomes.succeeded += 1;
                false
            }
            DrainState::Failed => {
                outcomes.failed += 1;
                false
            }
            _ => true,
        });
        outcomes
    }

    /// Non-terminal drains currently tracked for a pool.
    pub async fn in_flight(&self, pool: &str) -> usize {
        let tasks = self.tasks.lock().await;
        tasks
            .values()
            .filter(|t| t.request.pool == pool && !t.state.is_terminal())
            .count()
    }

    pub async fn task_state(&self, node_id: &str) -> Option<DrainState> {
        let tasks = self.tasks.lock().await;
        tasks.get(node_id).map(|t| t.state)
    }

    /// Admit a drain candidate under the pool's concurrency cap and
    /// start its worker.
    pub async fn admit(&self, request: DrainRequest, pool_cap: usize) -> AdmitOutcome {
        let task = {
            let mut tasks = self.tasks.lock().await;

            if tasks.contains_key(&request.node_id) {
                return AdmitOutcome::AlreadyTracked;
            }

            let in_flight = tasks
                .values()
                .filter(|t| t.request.pool == request.pool && !t.state.is_terminal())
                .count();
            if in_flight >= pool_cap {
                debug!(
                    pool = %request.pool,
                    node = %request.node_id,
                    in_flight,
                    pool_cap,
                    "drain admission blocked by concurrency cap"
                );
                return AdmitOutcome::CapReached;
            }

            let task = DrainTask::new(request);
            tasks.insert(task.request.node_id.clone(), task.clone());
            task
        };

        let id = task.id;
        let nodes = self.nodes.clone();
        let cfg = self.cfg;
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            run_drain(nodes, cfg, tasks, task).await;
        });

        AdmitOutcome::Admitted(id)
    }
}

async fn set_state(
    tasks: &Mutex<HashMap<String, DrainTask>>,
    node_id: &str,
    state: DrainState,
    error: Option<String>,
) {
    let mut guard = tasks.lock().await;
    if let Some(task) = guard.get_mut(node_id) {
        task.state = state;
        task.error = error;
    }
}

async fn run_drain(
    nodes: Arc<dyn NodeOps>,
    cfg: DrainerConfig,
    tasks: Arc<Mutex<HashMap<String, DrainTask>>>,
    task: DrainTask,
) {
    let req = &task.request;
    let node_id = req.node_id.as_str();

    set_state(&tasks, node_id, DrainState::Cordoning, None).await;

    if req.dry_run {
        info!(node = %node_id, pool = %req.pool, reason = %req.reason, "dry-run: drain suppressed");
        set_state(&tasks, node_id, DrainState::Succeeded, None).await;
        return;
    }

    if let Err(e) = cordon_with_retries(nodes.as_ref(), &cfg, node_id).await {
        warn!(node = %node_id, error = ?e, "cordon failed; marking drain failed");
        set_state(&tasks, node_id, DrainState::Failed, Some(e.to_string())).await;
        return;
    }

    set_state(&tasks, node_id, DrainState::Evicting, None).await;

    let pods = match nodes.list_pods(node_id).await {
        Ok(pods) => pods,
        Err(e) => {
            warn!(node = %node_id, error = ?e, "pod enumeration failed");
            set_state(&tasks, node_id, DrainState::Failed, Some(e.to_string())).await;
            return;
        }
    };

    let targets: Vec<PodRef> = pods.into_iter().filter(PodRef::is_evictable).collect();
    let deadline = Instant::now() + req.grace;

    // Evict in parallel, each pod retrying budget refusals with capped
    // exponential backoff until the shared grace deadline.
    let results: Vec<Result<Option<PodRef>, anyhow::Error>> = stream::iter(targets)
        .map(|pod| {
            let nodes = nodes.clone();
            let node_id = node_id.to_string();
            async move { evict_until_deadline(nodes.as_ref(), &cfg, &node_id, pod, deadline).await }
        })
        .buffer_unordered(cfg.eviction_parallelism.max(1))
        .collect()
        .await;

    let mut leftovers: Vec<PodRef> = Vec::new();
    for result in results {
        match result {
            Ok(None) => {}
            Ok(Some(pod)) => leftovers.push(pod),
            Err(e) => {
                warn!(node = %node_id, error = ?e, "eviction error; node stays cordoned");
                set_state(&tasks, node_id, DrainState::Failed, Some(e.to_string())).await;
                return;
            }
        }
    }

    if leftovers.is_empty() {
        info!(node = %node_id, pool = %task.request.pool, "drain complete");
        set_state(&tasks, node_id, DrainState::Succeeded, None).await;
        return;
    }

    if !req.force {
        warn!(
            node = %node_id,
            blocked = leftovers.len(),
            "grace period expired with pods still blocked by budget"
        );
        set_state(
            &tasks,
            node_id,
            DrainState::Failed,
            Some(format!("grace period expired with {} pods remaining", leftovers.len())),
        )
        .await;
        return;
    }

    for pod in &leftovers {
        if let Err(e) = nodes.force_delete_pod(node_id, pod).await {
            warn!(node = %node_id, pod = %pod.name, error = ?e, "forced delete failed");
            set_state(&tasks, node_id, DrainState::Failed, Some(e.to_string())).await;
            return;
        }
    }

    info!(node = %node_id, forced = leftovers.len(), "drain complete after forced deletes");
    set_state(&tasks, node_id, DrainState::Succeeded, None).await;
}

async fn cordon_with_retries(
    nodes: &dyn NodeOps,
    cfg: &DrainerConfig,
    node_id: &str,
) -> anyhow::Result<()> {
    let mut backoff = cfg.backoff_base;
    let mut last_err = None;
    for attempt in 0..cfg.cordon_retries.max(1) {
        match nodes.cordon(node_id).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!(node = %node_id, attempt, error = ?e, "cordon attempt failed");
                last_err = Some(e);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(cfg.backoff_cap);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("cordon failed")))
}

/// Returns `None` when the pod was evicted, `Some(pod)` when the budget
/// still blocked it at the deadline.
async fn evict_until_deadline(
    nodes: &dyn NodeOps,
    cfg: &DrainerConfig,
    node_id: &str,
    pod: PodRef,
    deadline: Instant,
) -> anyhow::Result<Option<PodRef>> {
    let mut backoff = cfg.backoff_base;
    loop {
        match nodes.evict_pod(node_id, &pod, deadline - Instant::now()).await? {
            EvictOutcome::Evicted => return Ok(None),
            EvictOutcome::BudgetViolation => {
                if Instant::now() + backoff >= deadline {
                    return Ok(Some(pod));
                }
                debug!(node = %node_id, pod = %pod.name, "budget refusal; backing off");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(cfg.backoff_cap);
            }
        }
    }
}
