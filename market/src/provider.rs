//! The price-oracle capability.
//!
//! Everything downstream of the reconciler sees market prices through this
//! trait, so the real cloud feed and the deterministic scripted oracle are
//! interchangeable.

use async_trait::async_trait;

use crate::errors::PriceError;
use crate::types::PriceSample;

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Current spot market observation for `(instance_type, zone)`.
    async fn spot_price(&self, instance_type: &str, zone: &str)
    -> Result<PriceSample, PriceError>;

    /// On-demand list price for `(instance_type, zone)`.
    async fn on_demand_price(&self, instance_type: &str, zone: &str) -> Result<f64, PriceError>;
}
