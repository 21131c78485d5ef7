//! Hot-reloadable runtime policy.
//!
//! The reconciler re-reads this document from disk at the top of every
//! tick and works from a tick-local copy, so a mid-tick edit can never
//! split one tick's decisions. Every numeric knob is clamped into its
//! safe range on load; a file that fails to parse leaves the previous
//! policy in force.

use std::path::Path;

use serde::Deserialize;

use crate::errors::PolicyError;

/// Capacity-score bands driving the deterministic rule table.
///
/// Monotone invariant: `emergency >= high >= medium`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RiskBands {
    pub medium: f64,
    pub high: f64,
    pub emergency: f64,

    /// Runtime-score level that forces an immediate exit.
    pub runtime_emergency: f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            medium: 0.5,
            high: 0.7,
            emergency: 0.9,
            runtime_emergency: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OodPolicy {
    /// Out-of-distribution workloads forfeit capacity increases when
    /// risk is non-trivial.
    Conservative,
    /// Detection only; selection is unchanged.
    Off,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct OodConfig {
    pub policy: OodPolicy,
    pub max_risk_for_increase: f64,
}

impl Default for OodConfig {
    fn default() -> Self {
        Self {
            policy: OodPolicy::Conservative,
            max_risk_for_increase: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimePolicy {
    /// Scales the capacity score before band comparison. `[0.1, 10]`.
    pub risk_multiplier: f64,

    /// Spot-ratio corridor, each in `[0, 1]` with min <= target <= max.
    pub min_spot_ratio: f64,
    pub target_spot_ratio: f64,
    pub max_spot_ratio: f64,

    /// Minimum minutes between two capacity increases. `[1, 120]`.
    pub step_minutes: u64,

    pub bands: RiskBands,

    /// Selection-confidence floor; below it the tick holds.
    pub confidence_threshold: f64,

    /// Increase prerequisites.
    pub min_savings_increase: f64,
    pub max_payback_increase_hours: f64,

    pub ood: OodConfig,

    /// Capacity score at which nodes are elected for draining.
    pub risk_threshold: f64,

    /// Fraction of a pool that may be draining concurrently.
    pub max_drain_ratio: f64,
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self {
            risk_multiplier: 1.0,
            min_spot_ratio: 0.0,
            target_spot_ratio: 0.7,
            max_spot_ratio: 0.9,
            step_minutes: 5,
            bands: RiskBands::default(),
            confidence_threshold: 0.2,
            min_savings_increase: 0.5,
            max_payback_increase_hours: 24.0,
            ood: OodConfig::default(),
            risk_threshold: 0.8,
            max_drain_ratio: 0.10,
        }
    }
}

impl RuntimePolicy {
    /// Parse and sanitize a policy document.
    pub fn from_json(raw: &str) -> Result<Self, PolicyError> {
        let policy: RuntimePolicy = serde_json::from_str(raw)?;
        Ok(policy.clamped())
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Force every knob into its safe range.
    ///
    /// Bands are made monotone by raising the upper levels: a document
    /// with `high > emergency` widens `emergency` up to `high` rather
    /// than being rejected, so decreases keep firing at the configured
    /// `high` level.
    pub fn clamped(mut self) -> Self {
        self.risk_multiplier = self.risk_multiplier.clamp(0.1, 10.0);

        self.min_spot_ratio = self.min_spot_ratio.clamp(0.0, 1.0);
        self.target_spot_ratio = self.target_spot_ratio.clamp(0.0, 1.0).max(self.min_spot_ratio);
        self.max_spot_ratio = self.max_spot_ratio.clamp(0.0, 1.0).max(self.target_spot_ratio);

        self.step_minutes = self.step_minutes.clamp(1, 120);

        self.bands.medium = self.bands.medium.clamp(0.0, 1.0);
        self.bands.high = self.bands.high.clamp(0.0, 1.0).max(self.bands.medium);
        self.bands.emergency = self.bands.emergency.clamp(0.0, 1.0).max(self.bands.high);
        self.bands.runtime_emergency = self.bands.runtime_emergency.clamp(0.0, 1.0);

        self.confidence_threshold = self.confidence_threshold.clamp(0.0, 1.0);
        self.min_savings_increase = self.min_savings_increase.clamp(0.0, 1.0);
        self.max_payback_increase_hours = self.max_payback_increase_hours.max(0.0);
        self.ood.max_risk_for_increase = self.ood.max_risk_for_increase.clamp(0.0, 1.0);
        self.risk_threshold = self.risk_threshold.clamp(0.0, 1.0);
        self.max_drain_ratio = self.max_drain_ratio.clamp(0.0, 1.0);

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_clamping_unchanged() {
        let d = RuntimePolicy::default();
        let c = d.clone().clamped();
        assert_eq!(c.target_spot_ratio, d.target_spot_ratio);
        assert_eq!(c.step_minutes, d.step_minutes);
        assert_eq!(c.bands.high, d.bands.high);
    }

    #[test]
    fn out_of_range_knobs_are_pulled_back() {
        let p = RuntimePolicy {
            risk_multiplier: 50.0,
            min_spot_ratio: -0.2,
            target_spot_ratio: 1.8,
            max_spot_ratio: 0.1,
            step_minutes: 0,
            ..Default::default()
        }
        .clamped();

        assert_eq!(p.risk_multiplier, 10.0);
        assert_eq!(p.min_spot_ratio, 0.0);
        assert_eq!(p.target_spot_ratio, 1.0);
        // Max is raised to keep min <= target <= max.
        assert_eq!(p.max_spot_ratio, 1.0);
        assert_eq!(p.step_minutes, 1);
    }

    #[test]
    fn inverted_bands_are_made_monotone_not_rejected() {
        let p = RuntimePolicy {
            bands: RiskBands {
                medium: 0.5,
                high: 0.9,
                emergency: 0.7,
                runtime_emergency: 0.9,
            },
            ..Default::default()
        }
        .clamped();

        assert_eq!(p.bands.high, 0.9);
        assert_eq!(p.bands.emergency, 0.9);
        assert!(p.bands.emergency >= p.bands.high && p.bands.high >= p.bands.medium);
    }

    #[test]
    fn partial_documents_inherit_defaults() {
        let p = RuntimePolicy::from_json(r#"{ "target_spot_ratio": 0.5 }"#).unwrap();
        assert_eq!(p.target_spot_ratio, 0.5);
        assert_eq!(p.step_minutes, RuntimePolicy::default().step_minutes);
    }

    #[test]
    fn garbage_documents_fail_to_parse() {
        assert!(RuntimePolicy::from_json("not json at all").is_err());
    }
}
