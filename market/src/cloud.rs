//! Cloud market feed adapter.
//!
//! The vendor SDK boundary is the [`SpotFeed`] trait: newest-first spot
//! price records plus the raw on-demand pricing document. Everything the
//! agent actually consumes (normalized [`PriceSample`]s, caching, the
//! USD parsing rule) lives on this side of the boundary so a scripted or
//! mocked feed exercises identical code.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use common::time::now_ms;

use crate::errors::PriceError;
use crate::provider::PriceProvider;
use crate::types::{HISTORY_LEN, PriceKey, PriceSample};

/// Spot samples are refreshed after this long.
pub const SAMPLE_TTL: Duration = Duration::from_secs(300);

/// One raw vendor record. Vendors return these newest-first.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotPricePoint {
    pub price: f64,
    pub timestamp_ms: u64,
}

/// Vendor SDK boundary for market data.
#[async_trait]
pub trait SpotFeed: Send + Sync {
    /// Up to `max` spot price records for `(instance_type, zone)`,
    /// newest-first.
    async fn spot_price_history(
        &self,
        instance_type: &str,
        zone: &str,
        max: usize,
    ) -> Result<Vec<SpotPricePoint>, PriceError>;

    /// Raw vendor pricing document for an instance type.
    async fn on_demand_document(&self, instance_type: &str) -> Result<Value, PriceError>;
}

/// Extract the on-demand USD price from a vendor pricing document.
///
/// Vendors present `pricePerUnit.USD` as either a string or a number,
/// and a document may carry several price dimensions. The rule here is
/// minimum-positive-USD: scan every dimension and take the smallest
/// strictly positive value found.
pub fn parse_on_demand_usd(doc: &Value) -> Option<f64> {
    let mut found: Vec<f64> = Vec::new();
    collect_usd(doc, &mut found);
    found
        .into_iter()
        .filter(|v| *v > 0.0)
        .min_by(|a, b| a.total_cmp(b))
}

fn collect_usd(v: &Value, out: &mut Vec<f64>) {
    match v {
        Value::Object(map) => {
            if let Some(ppu) = map.get("pricePerUnit") {
                if let Some(usd) = ppu.get("USD") {
                    match usd {
                        Value::String(s) => {
                            if let Ok(n) = s.parse::<f64>() {
                                out.push(n);
                            }
                        }
                        Value::Number(n) => {
                            if let Some(n) = n.as_f64() {
                                out.push(n);
                            }
                        }
                        _ => {}
                    }
                }
            }
            for child in map.values() {
                collect_usd(child, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_usd(child, out);
            }
        }
        _ => {}
    }
}

struct CachedSample {
    sample: PriceSample,
    fetched: Instant,
}

/// [`PriceProvider`] over a vendor [`SpotFeed`].
///
/// Spot samples are cached per `(instance_type, zone)` with a 5-minute
/// TTL; on-demand prices are cached per instance type for the lifetime
/// of the process. Locks are never held across feed I/O.
pub struct CloudPriceProvider<F> {
    feed: F,
    ttl: Duration,
    samples: Mutex<HashMap<PriceKey, CachedSample>>,
    on_demand: Mutex<HashMap<String, f64>>,
}

impl<F: SpotFeed> CloudPriceProvider<F> {
    pub fn new(feed: F) -> Self {
        Self::with_ttl(feed, SAMPLE_TTL)
    }

    pub fn with_ttl(feed: F, ttl: Duration) -> Self {
        Self {
            feed,
            ttl,
            samples: Mutex::new(HashMap::new()),
            on_demand: Mutex::new(HashMap::new()),
        }
    }

    async fn cached_sample(&self, key: &PriceKey) -> Option<PriceSample> {
        let cache = self.samples.lock().await;
        cache
            .get(key)
            .filter(|c| c.fetched.elapsed() < self.ttl)
            .map(|c| c.sample.clone())
    }
}

#[async_trait]
impl<F: SpotFeed> PriceProvider for CloudPriceProvider<F> {
    #[instrument(skip(self), level = "debug")]
    async fn spot_price(
        &self,
        instance_type: &str,
        zone: &str,
    ) -> Result<PriceSample, PriceError> {
        let key = PriceKey::new(instance_type, zone);
        if let Some(sample) = self.cached_sample(&key).await {
            return Ok(sample);
        }

        let records = self
            .feed
            .spot_price_history(instance_type, zone, HISTORY_LEN)
            .await?;
        if records.is_empty() {
            return Err(PriceError::NoData {
                instance_type: instance_type.to_string(),
                zone: zone.to_string(),
            });
        }

        // Vendor order is newest-first; the sample wants oldest-first.
        let mut prices: Vec<f64> = records.iter().map(|r| r.price).collect();
        prices.reverse();
        let current = *prices.last().expect("non-empty history");

        let on_demand = self.on_demand_price(instance_type, zone).await?;
        let sample = PriceSample::from_history(current, on_demand, &prices, None, now_ms());

        debug!(
            instance_type,
            zone,
            current = sample.current,
            volatility = sample.volatility,
            "spot sample refreshed"
        );

        let mut cache = self.samples.lock().await;
        cache.insert(
            key,
            CachedSample {
                sample: sample.clone(),
                fetched: Instant::now(),
            },
        );
        Ok(sample)
    }

    async fn on_demand_price(&self, instance_type: &str, _zone: &str) -> Result<f64, PriceError> {
        {
            let cache = self.on_demand.lock().await;
            if let Some(price) = cache.get(instance_type) {
                return Ok(*price);
            }
        }

        let doc = self.feed.on_demand_document(instance_type).await?;
        let price = parse_on_demand_usd(&doc).ok_or_else(|| {
            PriceError::InvalidPayload(format!(
                "no positive USD price dimension for {instance_type}"
            ))
        })?;

        let mut cache = self.on_demand.lock().await;
        cache.insert(instance_type.to_string(), price);
        Ok(price)
    }
}

/// HTTP [`SpotFeed`] for vendor price endpoints.
#[derive(Clone)]
pub struct HttpSpotFeed {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SpotHistoryEnvelope {
    prices: Vec<SpotPricePoint>,
}

impl HttpSpotFeed {
    pub fn new(base_url: String) -> Result<Self, PriceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, base_url })
    }
}

#[async_trait]
impl SpotFeed for HttpSpotFeed {
    async fn spot_price_history(
        &self,
        instance_type: &str,
        zone: &str,
        max: usize,
    ) -> Result<Vec<SpotPricePoint>, PriceError> {
        let url = format!("{}/spot-prices", self.base_url);
        let max = max.to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("instance_type", instance_type),
                ("zone", zone),
                ("max", max.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let envelope: SpotHistoryEnvelope = resp.json().await?;
        Ok(envelope.prices)
    }

    async fn on_demand_document(&self, instance_type: &str) -> Result<Value, PriceError> {
        let url = format!("{}/pricing/{}", self.base_url, instance_type);
        let resp = self.http.get(&url).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }
}
