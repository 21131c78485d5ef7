use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cluster::api::{EvictOutcome, NodeOps, PodRef};
use drainer::{AdmitOutcome, DrainRequest, DrainState, DrainerConfig, GuardedDrainer};

// -----------------------
// Mock node API
// -----------------------

#[derive(Default)]
struct MockNodes {
    pods: Mutex<HashMap<String, Vec<PodRef>>>,

    /// Budget refusals to serve per pod before allowing the eviction.
    refusals: Mutex<HashMap<String, u32>>,

    cordon_failures_remaining: AtomicU64,

    cordons: AtomicU64,
    evictions: AtomicU64,
    forced: AtomicU64,
    mutations: AtomicU64,
}

impl MockNodes {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn set_pods(&self, node: &str, pods: Vec<PodRef>) {
        self.pods.lock().await.insert(node.to_string(), pods);
    }

    async fn refuse_n_times(&self, pod: &str, n: u32) {
        self.refusals.lock().await.insert(pod.to_string(), n);
    }
}

#[async_trait]
impl NodeOps for MockNodes {
    async fn cordon(&self, _node_id: &str) -> anyhow::Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        if self.cordon_failures_remaining.load(Ordering::SeqCst) > 0 {
            self.cordon_failures_remaining.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("api server hiccup");
        }
        self.cordons.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn uncordon(&self, _node_id: &str) -> anyhow::Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_pods(&self, node_id: &str) -> anyhow::Result<Vec<PodRef>> {
        Ok(self.pods.lock().await.get(node_id).cloned().unwrap_or_default())
    }

    async fn evict_pod(
        &self,
        _node_id: &str,
        pod: &PodRef,
        _grace: Duration,
    ) -> anyhow::Result<EvictOutcome> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut refusals = self.refusals.lock().await;
        if let Some(left) = refusals.get_mut(&pod.name) {
            if *left > 0 {
                *left -= 1;
                return Ok(EvictOutcome::BudgetViolation);
            }
        }
        self.evictions.fetch_add(1, Ordering::SeqCst);
        Ok(EvictOutcome::Evicted)
    }

    async fn force_delete_pod(&self, _node_id: &str, _pod: &PodRef) -> anyhow::Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.forced.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// -----------------------
// Helpers
// -----------------------

fn fast_cfg() -> DrainerConfig {
    DrainerConfig {
        cordon_retries: 3,
        backoff_base: Duration::from_millis(2),
        backoff_cap: Duration::from_millis(10),
        eviction_parallelism: 4,
    }
}

fn mk_request(node: &str, grace_ms: u64, force: bool) -> DrainRequest {
    DrainRequest {
        node_id: node.into(),
        pool: "web".into(),
        grace: Duration::from_millis(grace_ms),
        reason: "high interruption risk".into(),
        dry_run: false,
        force,
    }
}

fn daemon_pod(name: &str) -> PodRef {
    PodRef {
        name: name.into(),
        namespace: "kube-system".into(),
        daemon: true,
        mirror: false,
    }
}

async fn wait_terminal(drainer: &GuardedDrainer, node: &str) -> DrainState {
    for _ in 0..500 {
        if let Some(state) = drainer.task_state(node).await {
            if state.is_terminal() {
                return state;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("drain of {node} did not reach a terminal state");
}

// -----------------------
// Tests
// -----------------------

#[tokio::test]
async fn drain_cordons_then_evicts_workload_pods_only() {
    let nodes = MockNodes::new();
    nodes
        .set_pods(
            "web-000",
            vec![
                PodRef::workload("app-1", "default"),
                PodRef::workload("app-2", "default"),
                daemon_pod("log-agent"),
                PodRef {
                    name: "static-web".into(),
                    namespace: "default".into(),
                    daemon: false,
                    mirror: true,
                },
            ],
        )
        .await;

    let drainer = GuardedDrainer::new(nodes.clone(), fast_cfg());
    let out = drainer.admit(mk_request("web-000", 500, false), 1).await;
    assert!(matches!(out, AdmitOutcome::Admitted(_)));

    assert_eq!(wait_terminal(&drainer, "web-000").await, DrainState::Succeeded);
    assert_eq!(nodes.cordons.load(Ordering::SeqCst), 1);
    // Daemon and mirror pods are never evicted.
    assert_eq!(nodes.evictions.load(Ordering::SeqCst), 2);
    assert_eq!(nodes.forced.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn budget_refusals_are_retried_until_they_clear() {
    let nodes = MockNodes::new();
    nodes
        .set_pods("web-000", vec![PodRef::workload("app-1", "default")])
        .await;
    nodes.refuse_n_times("app-1", 2).await;

    let drainer = GuardedDrainer::new(nodes.clone(), fast_cfg());
    drainer.admit(mk_request("web-000", 1_000, false), 1).await;

    assert_eq!(wait_terminal(&drainer, "web-000").await, DrainState::Succeeded);
    assert_eq!(nodes.evictions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn grace_expiry_without_force_fails_and_leaves_the_node_cordoned() {
    let nodes = MockNodes::new();
    nodes
        .set_pods("web-000", vec![PodRef::workload("app-1", "default")])
        .await;
    // More refusals than the grace window can absorb.
    nodes.refuse_n_times("app-1", 10_000).await;

    let drainer = GuardedDrainer::new(nodes.clone(), fast_cfg());
    drainer.admit(mk_request("web-000", 30, false), 1).await;

    assert_eq!(wait_terminal(&drainer, "web-000").await, DrainState::Failed);
    assert_eq!(nodes.cordons.load(Ordering::SeqCst), 1);
    assert_eq!(nodes.forced.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn grace_expiry_with_force_escalates_to_deletion() {
    let nodes = MockNodes::new();
    nodes
        .set_pods("web-000", vec![PodRef::workload("app-1", "default")])
        .await;
    nodes.refuse_n_times("app-1", 10_000).await;

    let drainer = GuardedDrainer::new(nodes.clone(), fast_cfg());
    drainer.admit(mk_request("web-000", 30, true), 1).await;

    assert_eq!(wait_terminal(&drainer, "web-000").await, DrainState::Succeeded);
    assert_eq!(nodes.forced.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cordon_retries_then_gives_up() {
    let nodes = MockNodes::new();
    nodes
        .cordon_failures_remaining
        .store(10, Ordering::SeqCst);
    nodes
        .set_pods("web-000", vec![PodRef::workload("app-1", "default")])
        .await;

    let drainer = GuardedDrainer::new(nodes.clone(), fast_cfg());
    drainer.admit(mk_request("web-000", 500, false), 1).await;

    assert_eq!(wait_terminal(&drainer, "web-000").await, DrainState::Failed);
    assert_eq!(nodes.evictions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn admission_respects_the_pool_cap_and_tracking() {
    let nodes = MockNodes::new();
    // Keep the first drain busy long enough to observe the cap.
    nodes
        .set_pods("web-000", vec![PodRef::workload("app-1", "default")])
        .await;
    nodes.refuse_n_times("app-1", 5).await;

    let drainer = GuardedDrainer::new(nodes.clone(), fast_cfg());

    assert!(matches!(
        drainer.admit(mk_request("web-000", 1_000, false), 1).await,
        AdmitOutcome::Admitted(_)
    ));
    assert_eq!(
        drainer.admit(mk_request("web-001", 1_000, false), 1).await,
        AdmitOutcome::CapReached
    );
    assert_eq!(
        drainer.admit(mk_request("web-000", 1_000, false), 2).await,
        AdmitOutcome::AlreadyTracked
    );
    assert_eq!(drainer.in_flight("web").await, 1);

    wait_terminal(&drainer, "web-000").await;
}

#[tokio::test]
async fn terminal_tasks_are_swept_and_become_re_electable() {
    let nodes = MockNodes::new();
    nodes.set_pods("web-000", vec![]).await;

    let drainer = GuardedDrainer::new(nodes.clone(), fast_cfg());
    drainer.admit(mk_request("web-000", 100, false), 1).await;
    assert_eq!(wait_terminal(&drainer, "web-000").await, DrainState::Succeeded);

    // Terminal states absorb within the tick.
    assert_eq!(
        drainer.admit(mk_request("web-000", 100, false), 1).await,
        AdmitOutcome::AlreadyTracked
    );

    let outcomes = drainer.begin_tick().await;
    assert_eq!(outcomes.succeeded, 1);
    assert_eq!(outcomes.failed, 0);

    assert!(matches!(
        drainer.admit(mk_request("web-000", 100, false), 1).await,
        AdmitOutcome::Admitted(_)
    ));
    wait_terminal(&drainer, "web-000").await;
}

#[tokio::test]
async fn dry_run_drains_issue_no_orchestrator_calls() {
    let nodes = MockNodes::new();
    nodes
        .set_pods("web-000", vec![PodRef::workload("app-1", "default")])
        .await;

    let drainer = GuardedDrainer::new(nodes.clone(), fast_cfg());
    let mut req = mk_request("web-000", 500, false);
    req.dry_run = true;
    drainer.admit(req, 1).await;

    assert_eq!(wait_terminal(&drainer, "web-000").await, DrainState::Succeeded);
    assert_eq!(nodes.mutations.load(Ordering::SeqCst), 0);
}
