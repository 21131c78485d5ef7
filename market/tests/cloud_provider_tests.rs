use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use market::PriceProvider;
use market::cloud::{CloudPriceProvider, SpotFeed, SpotPricePoint};
use market::errors::PriceError;
use market::types::HISTORY_LEN;

/// Counting feed that serves a fixed newest-first record set.
#[derive(Clone)]
struct MockFeed {
    records: Vec<SpotPricePoint>,
    history_calls: Arc<AtomicU64>,
    pricing_calls: Arc<AtomicU64>,
}

impl MockFeed {
    fn new(prices_newest_first: &[f64]) -> Self {
        let records = prices_newest_first
            .iter()
            .enumerate()
            .map(|(i, p)| SpotPricePoint {
                price: *p,
                timestamp_ms: 1_000_000 - i as u64 * 60_000,
            })
            .collect();
        Self {
            records,
            history_calls: Arc::new(AtomicU64::new(0)),
            pricing_calls: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl SpotFeed for MockFeed {
    async fn spot_price_history(
        &self,
        _instance_type: &str,
        _zone: &str,
        max: usize,
    ) -> Result<Vec<SpotPricePoint>, PriceError> {
        self.history_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.iter().take(max).cloned().collect())
    }

    async fn on_demand_document(&self, _instance_type: &str) -> Result<Value, PriceError> {
        self.pricing_calls.fetch_add(1, Ordering::Relaxed);
        Ok(json!({ "pricePerUnit": { "USD": "0.20" } }))
    }
}

#[tokio::test]
async fn newest_first_records_become_an_oldest_first_sample() {
    let feed = MockFeed::new(&[0.09, 0.08, 0.07]);
    let provider = CloudPriceProvider::new(feed);

    let s = provider.spot_price("m5.large", "us-east-1a").await.unwrap();

    assert_eq!(s.current, 0.09);
    assert_eq!(s.on_demand, 0.20);
    assert_eq!(s.history.len(), HISTORY_LEN);
    // Short history is padded at the front with the oldest value.
    assert_eq!(s.history[0], 0.07);
    assert_eq!(*s.history.last().unwrap(), 0.09);
    assert!(s.volatility > 0.0);
}

#[tokio::test]
async fn spot_samples_are_cached_within_the_ttl() {
    let feed = MockFeed::new(&[0.09, 0.08, 0.07]);
    let calls = feed.history_calls.clone();
    let provider = CloudPriceProvider::new(feed);

    provider.spot_price("m5.large", "us-east-1a").await.unwrap();
    provider.spot_price("m5.large", "us-east-1a").await.unwrap();
    provider.spot_price("m5.large", "us-east-1a").await.unwrap();

    assert_eq!(calls.load(Ordering::Relaxed), 1);

    // A different zone is a different cache key.
    provider.spot_price("m5.large", "us-east-1b").await.unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn expired_samples_are_refetched() {
    let feed = MockFeed::new(&[0.09]);
    let calls = feed.history_calls.clone();
    let provider = CloudPriceProvider::with_ttl(feed, Duration::ZERO);

    provider.spot_price("m5.large", "us-east-1a").await.unwrap();
    provider.spot_price("m5.large", "us-east-1a").await.unwrap();

    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn on_demand_prices_are_cached_for_the_process_lifetime() {
    let feed = MockFeed::new(&[0.09]);
    let calls = feed.pricing_calls.clone();
    let provider = CloudPriceProvider::with_ttl(feed, Duration::ZERO);

    for _ in 0..5 {
        let p = provider.on_demand_price("m5.large", "us-east-1a").await.unwrap();
        assert_eq!(p, 0.20);
    }
    // Spot refreshes also consult the on-demand price.
    provider.spot_price("m5.large", "us-east-1a").await.unwrap();

    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn empty_history_is_a_no_data_error() {
    let feed = MockFeed::new(&[]);
    let provider = CloudPriceProvider::new(feed);

    let err = provider.spot_price("m5.large", "us-east-1a").await.unwrap_err();
    assert!(matches!(err, PriceError::NoData { .. }));
}
