//! Deterministic scripted price oracle.
//!
//! Replaces the cloud market feed in the e2e suite. A scenario document
//! scripts per-key price series:
//!
//! ```json
//! {
//!   "default": { "current_price": 0.05, "on_demand_price": 0.20 },
//!   "series": {
//!     "m5.large:us-east-1a": [
//!       { "current_price": 0.05 },
//!       { "current_price": 0.19, "volatility": 0.08 }
//!     ]
//!   },
//!   "repeat_last": true
//! }
//! ```
//!
//! Series keys are `<instance_type>:<zone>` with `*` as a wildcard in
//! either field. Each spot query against a series key advances that key's
//! cursor by one; on-demand queries never advance it. Replaying the same
//! scenario with the same call sequence produces identical outputs.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::PriceError;
use crate::provider::PriceProvider;
use crate::types::PriceSample;

/// One scripted oracle step. Unset fields inherit from the scenario
/// `default` step.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub current_price: Option<f64>,
    pub on_demand_price: Option<f64>,
    pub price_history: Option<Vec<f64>>,
    pub volatility: Option<f64>,
    pub error: Option<String>,
}

impl Step {
    /// Step fields override `default` fields; unset fields inherit.
    fn merged_over(&self, default: Option<&Step>) -> Step {
        let Some(d) = default else {
            return self.clone();
        };
        Step {
            current_price: self.current_price.or(d.current_price),
            on_demand_price: self.on_demand_price.or(d.on_demand_price),
            price_history: self.price_history.clone().or_else(|| d.price_history.clone()),
            volatility: self.volatility.or(d.volatility),
            error: self.error.clone().or_else(|| d.error.clone()),
        }
    }
}

fn default_repeat_last() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub default: Option<Step>,

    #[serde(default)]
    pub series: BTreeMap<String, Vec<Step>>,

    /// When a series runs out of steps: keep serving the final step
    /// (true, the default) or fail subsequent calls as exhausted.
    #[serde(default = "default_repeat_last")]
    pub repeat_last: bool,
}

impl Scenario {
    pub fn from_json(raw: &str) -> Result<Self, PriceError> {
        let scenario: Scenario =
            serde_json::from_str(raw).map_err(|e| PriceError::Scenario(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> Result<Self, PriceError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<(), PriceError> {
        if self.default.is_none() && self.series.is_empty() {
            return Err(PriceError::Scenario(
                "scenario has no default step and no series".into(),
            ));
        }
        for (key, steps) in &self.series {
            if key.is_empty() {
                return Err(PriceError::Scenario("empty series key".into()));
            }
            if !key.contains(':') {
                return Err(PriceError::Scenario(format!(
                    "series key {key:?} is not of the form <instance_type>:<zone>"
                )));
            }
            if steps.is_empty() {
                return Err(PriceError::Scenario(format!(
                    "series {key:?} has an empty step sequence"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the series key serving `(instance_type, zone)`.
    ///
    /// Resolution order: exact match, instance wildcard, zone wildcard,
    /// global wildcard. A miss falls back to the `default` step.
    fn resolve_key(&self, instance_type: &str, zone: &str) -> Option<String> {
        let candidates = [
            format!("{instance_type}:{zone}"),
            format!("*:{zone}"),
            format!("{instance_type}:*"),
            "*:*".to_string(),
        ];
        candidates.into_iter().find(|k| self.series.contains_key(k))
    }
}

/// A [`PriceProvider`] that serves a scripted [`Scenario`].
pub struct ScriptedPriceProvider {
    scenario: Scenario,
    cursors: Mutex<BTreeMap<String, usize>>,
}

impl ScriptedPriceProvider {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            cursors: Mutex::new(BTreeMap::new()),
        }
    }

    /// Pick the step for `key` at `cursor`, honoring `repeat_last`.
    fn step_at(&self, key: &str, cursor: usize) -> Result<Step, PriceError> {
        let steps = &self.scenario.series[key];
        let pos = if cursor < steps.len() {
            cursor
        } else if self.scenario.repeat_last {
            steps.len() - 1
        } else {
            return Err(PriceError::Exhausted(key.to_string()));
        };
        Ok(steps[pos].clone())
    }

    fn sample_from(&self, step: &Step, seq: u64) -> Result<PriceSample, PriceError> {
        let effective = step.merged_over(self.scenario.default.as_ref());

        if let Some(msg) = effective.error {
            return Err(PriceError::Step(msg));
        }

        let current = effective
            .current_price
            .ok_or_else(|| PriceError::Scenario("step is missing current_price".into()))?;
        let on_demand = effective
            .on_demand_price
            .ok_or_else(|| PriceError::Scenario("step is missing on_demand_price".into()))?;

        let history = effective.price_history.unwrap_or_default();
        Ok(PriceSample::from_history(
            current,
            on_demand,
            &history,
            effective.volatility,
            // A logical sequence number keeps replays byte-identical.
            seq,
        ))
    }

    fn on_demand_from(&self, step: &Step) -> Result<f64, PriceError> {
        let effective = step.merged_over(self.scenario.default.as_ref());
        if let Some(msg) = effective.error {
            return Err(PriceError::Step(msg));
        }
        effective
            .on_demand_price
            .ok_or_else(|| PriceError::Scenario("step is missing on_demand_price".into()))
    }
}

#[async_trait]
impl PriceProvider for ScriptedPriceProvider {
    async fn spot_price(
        &self,
        instance_type: &str,
        zone: &str,
    ) -> Result<PriceSample, PriceError> {
        match self.scenario.resolve_key(instance_type, zone) {
            Some(key) => {
                let (step, seq) = {
                    let mut cursors = self.cursors.lock().expect("cursor lock poisoned");
                    let cursor = cursors.entry(key.clone()).or_insert(0);
                    let step = self.step_at(&key, *cursor)?;
                    let seq = *cursor as u64;
                    // Only a successfully resolved step consumes the cursor.
                    *cursor += 1;
                    (step, seq)
                };
                self.sample_from(&step, seq)
            }
            None => {
                let step = self.scenario.default.clone().ok_or_else(|| {
                    PriceError::NoData {
                        instance_type: instance_type.to_string(),
                        zone: zone.to_string(),
                    }
                })?;
                self.sample_from(&step, 0)
            }
        }
    }

    async fn on_demand_price(&self, instance_type: &str, zone: &str) -> Result<f64, PriceError> {
        match self.scenario.resolve_key(instance_type, zone) {
            Some(key) => {
                // Peek at the step the next spot call would see. The cursor
                // never moves, and a run-off-the-end peek clamps to the
                // final step so interleaved on-demand reads cannot fail a
                // series that spot calls have not failed yet.
                let step = {
                    let cursors = self.cursors.lock().expect("cursor lock poisoned");
                    let cursor = cursors.get(&key).copied().unwrap_or(0);
                    let steps = &self.scenario.series[key.as_str()];
                    steps[cursor.min(steps.len() - 1)].clone()
                };
                self.on_demand_from(&step)
            }
            None => {
                let step = self.scenario.default.clone().ok_or_else(|| {
                    PriceError::NoData {
                        instance_type: instance_type.to_string(),
                        zone: zone.to_string(),
                    }
                })?;
                self.on_demand_from(&step)
            }
        }
    }
}
