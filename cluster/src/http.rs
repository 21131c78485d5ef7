//! HTTP implementations of the telemetry and orchestrator seams.
//!
//! These talk to the in-cluster aggregation endpoints (a time-series
//! proxy for node metrics, the orchestrator gateway for node and pool
//! operations). They carry no business logic; every decision stays in
//! the reconciler and its collaborators.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::api::{EvictOutcome, NodeOps, PodRef, PoolWeightOps, PoolWeights, ScalingGroupOps};
use crate::source::MetricsSource;
use crate::types::{DisruptionBudget, NodeSnapshot};

fn build_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .context("build http client")
}

/// Time-series query client yielding node snapshots.
#[derive(Clone)]
pub struct HttpMetricsSource {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct NodesEnvelope {
    nodes: Vec<NodeSnapshot>,
}

impl HttpMetricsSource {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client()?,
            base_url,
        })
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn node_snapshots(&self) -> anyhow::Result<Vec<NodeSnapshot>> {
        let url = format!("{}/nodes", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("query node metrics")?
            .error_for_status()
            .context("node metrics endpoint")?;
        let envelope: NodesEnvelope = resp.json().await.context("decode node metrics")?;
        debug!(count = envelope.nodes.len(), "node snapshots fetched");
        Ok(envelope.nodes)
    }
}

/// Orchestrator gateway client covering node, pool-weight and
/// scaling-group operations.
#[derive(Clone)]
pub struct HttpClusterClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpClusterClient {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client()?,
            base_url,
        })
    }

    async fn post_empty(&self, path: String) -> anyhow::Result<reqwest::Response> {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await
            .with_context(|| format!("POST {path}"))
    }
}

#[derive(Debug, Deserialize)]
struct PodsEnvelope {
    pods: Vec<PodEntry>,
}

#[derive(Debug, Deserialize)]
struct PodEntry {
    name: String,
    namespace: String,
    #[serde(default)]
    daemon: bool,
    #[serde(default)]
    mirror: bool,
}

#[derive(Debug, Deserialize)]
struct CapacityEnvelope {
    desired: u32,
}

#[async_trait]
impl NodeOps for HttpClusterClient {
    async fn cordon(&self, node_id: &str) -> anyhow::Result<()> {
        self.post_empty(format!("/nodes/{node_id}/cordon"))
            .await?
            .error_for_status()
            .context("cordon")?;
        Ok(())
    }

    async fn uncordon(&self, node_id: &str) -> anyhow::Result<()> {
        self.post_empty(format!("/nodes/{node_id}/uncordon"))
            .await?
            .error_for_status()
            .context("uncordon")?;
        Ok(())
    }

    async fn list_pods(&self, node_id: &str) -> anyhow::Result<Vec<PodRef>> {
        let url = format!("{}/nodes/{node_id}/pods", self.base_url);
        let envelope: PodsEnvelope = self
            .http
            .get(&url)
            .send()
            .await
            .context("list pods")?
            .error_for_status()?
            .json()
            .await
            .context("decode pods")?;
        Ok(envelope
            .pods
            .into_iter()
            .map(|p| PodRef {
                name: p.name,
                namespace: p.namespace,
                daemon: p.daemon,
                mirror: p.mirror,
            })
            .collect())
    }

    async fn evict_pod(
        &self,
        node_id: &str,
        pod: &PodRef,
        grace: Duration,
    ) -> anyhow::Result<EvictOutcome> {
        let url = format!(
            "{}/namespaces/{}/pods/{}/eviction",
            self.base_url, pod.namespace, pod.name
        );
        let grace_seconds = grace.as_secs().to_string();
        let resp = self
            .http
            .post(&url)
            .query(&[("node", node_id), ("grace_seconds", grace_seconds.as_str())])
            .send()
            .await
            .context("evict pod")?;

        // 429 is the budget-violation answer; everything else 2xx means
        // the eviction was accepted.
        if resp.status().as_u16() == 429 {
            return Ok(EvictOutcome::BudgetViolation);
        }
        resp.error_for_status().context("eviction endpoint")?;
        Ok(EvictOutcome::Evicted)
    }

    async fn force_delete_pod(&self, _node_id: &str, pod: &PodRef) -> anyhow::Result<()> {
        let url = format!(
            "{}/namespaces/{}/pods/{}",
            self.base_url, pod.namespace, pod.name
        );
        self.http
            .delete(&url)
            .query(&[("force", "true")])
            .send()
            .await
            .context("force delete pod")?
            .error_for_status()
            .context("force delete endpoint")?;
        Ok(())
    }
}

#[async_trait]
impl PoolWeightOps for HttpClusterClient {
    async fn get_weights(
        &self,
        spot_pool: &str,
        on_demand_pool: &str,
    ) -> anyhow::Result<PoolWeights> {
        let url = format!("{}/pools/weights", self.base_url);
        let weights: PoolWeights = self
            .http
            .get(&url)
            .query(&[("spot", spot_pool), ("on_demand", on_demand_pool)])
            .send()
            .await
            .context("get pool weights")?
            .error_for_status()?
            .json()
            .await
            .context("decode pool weights")?;
        Ok(weights)
    }

    async fn patch_weights(
        &self,
        spot_pool: &str,
        on_demand_pool: &str,
        weights: PoolWeights,
    ) -> anyhow::Result<()> {
        let url = format!("{}/pools/weights", self.base_url);
        self.http
            .patch(&url)
            .query(&[("spot", spot_pool), ("on_demand", on_demand_pool)])
            .json(&weights)
            .send()
            .await
            .context("patch pool weights")?
            .error_for_status()
            .context("weights patch endpoint")?;
        Ok(())
    }

    async fn disruption_budget(&self, pool: &str) -> anyhow::Result<Option<DisruptionBudget>> {
        let url = format!("{}/pools/{}/disruption-budget", self.base_url, pool);
        let resp = self.http.get(&url).send().await.context("query budget")?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        let budget: DisruptionBudget = resp
            .error_for_status()?
            .json()
            .await
            .context("decode budget")?;
        Ok(Some(budget))
    }
}

#[async_trait]
impl ScalingGroupOps for HttpClusterClient {
    async fn desired_capacity(&self, group: &str) -> anyhow::Result<u32> {
        let url = format!("{}/scaling-groups/{}/capacity", self.base_url, group);
        let envelope: CapacityEnvelope = self
            .http
            .get(&url)
            .send()
            .await
            .context("query desired capacity")?
            .error_for_status()?
            .json()
            .await
            .context("decode capacity")?;
        Ok(envelope.desired)
    }

    async fn set_desired_capacity(&self, group: &str, desired: u32) -> anyhow::Result<()> {
        let url = format!("{}/scaling-groups/{}/capacity", self.base_url, group);
        self.http
            .put(&url)
            .json(&serde_json::json!({ "desired": desired }))
            .send()
            .await
            .context("set desired capacity")?
            .error_for_status()
            .context("capacity endpoint")?;
        Ok(())
    }
}
