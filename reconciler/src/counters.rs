//! Operational counters.
//!
//! Counters never affect behavior; they exist so every tick outcome,
//! gate rejection and drain result is observable. The snapshot form
//! backs both the HTTP endpoint and the one-shot `metrics` dump.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use policy::Action;

#[derive(Clone, Default)]
pub struct Counters {
    pub ticks_total: Arc<AtomicU64>,
    pub tick_failures: Arc<AtomicU64>,
    pub tick_timeouts: Arc<AtomicU64>,
    pub pool_failures: Arc<AtomicU64>,
    pub worker_panics: Arc<AtomicU64>,
    pub policy_reload_failures: Arc<AtomicU64>,

    // Actions emitted after gating.
    pub actions_hold: Arc<AtomicU64>,
    pub actions_decrease_10: Arc<AtomicU64>,
    pub actions_decrease_30: Arc<AtomicU64>,
    pub actions_increase_10: Arc<AtomicU64>,
    pub actions_increase_30: Arc<AtomicU64>,
    pub actions_emergency_exit: Arc<AtomicU64>,

    // Gate rejections.
    pub gate_low_confidence: Arc<AtomicU64>,
    pub gate_cooldown: Arc<AtomicU64>,
    pub gate_not_managed: Arc<AtomicU64>,
    pub gate_step_interval: Arc<AtomicU64>,
    pub gate_emergency_not_justified: Arc<AtomicU64>,

    pub unsupported_instance_family_total: Arc<AtomicU64>,
    pub ood_pools_total: Arc<AtomicU64>,

    // Router outcomes.
    pub weight_changes_total: Arc<AtomicU64>,
    pub prewarms_total: Arc<AtomicU64>,
    pub route_skips_total: Arc<AtomicU64>,

    // Drain outcomes.
    pub drains_scheduled: Arc<AtomicU64>,
    pub drains_rejected_cap: Arc<AtomicU64>,
    pub drains_succeeded: Arc<AtomicU64>,
    pub drains_failed: Arc<AtomicU64>,

    pub canary_failures: Arc<AtomicU64>,

    /// Current and target spot ratio per pool.
    ratios: Arc<Mutex<BTreeMap<String, (f64, f64)>>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_action(&self, action: Action) {
        let counter = match action {
            Action::Hold => &self.actions_hold,
            Action::Decrease10 => &self.actions_decrease_10,
            Action::Decrease30 => &self.actions_decrease_30,
            Action::Increase10 => &self.actions_increase_10,
            Action::Increase30 => &self.actions_increase_30,
            Action::EmergencyExit => &self.actions_emergency_exit,
        };
        Self::inc(counter);
    }

    pub fn set_ratio(&self, pool: &str, current: f64, target: f64) {
        let mut ratios = self.ratios.lock().expect("ratio lock poisoned");
        ratios.insert(pool.to_string(), (current, target));
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            ticks_total: load(&self.ticks_total),
            tick_failures: load(&self.tick_failures),
            tick_timeouts: load(&self.tick_timeouts),
            pool_failures: load(&self.pool_failures),
            worker_panics: load(&self.worker_panics),
            policy_reload_failures: load(&self.policy_reload_failures),
            actions_hold: load(&self.actions_hold),
            actions_decrease_10: load(&self.actions_decrease_10),
            actions_decrease_30: load(&self.actions_decrease_30),
            actions_increase_10: load(&self.actions_increase_10),
            actions_increase_30: load(&self.actions_increase_30),
            actions_emergency_exit: load(&self.actions_emergency_exit),
            gate_low_confidence: load(&self.gate_low_confidence),
            gate_cooldown: load(&self.gate_cooldown),
            gate_not_managed: load(&self.gate_not_managed),
            gate_step_interval: load(&self.gate_step_interval),
            gate_emergency_not_justified: load(&self.gate_emergency_not_justified),
            unsupported_instance_family_total: load(&self.unsupported_instance_family_total),
            ood_pools_total: load(&self.ood_pools_total),
            weight_changes_total: load(&self.weight_changes_total),
            prewarms_total: load(&self.prewarms_total),
            route_skips_total: load(&self.route_skips_total),
            drains_scheduled: load(&self.drains_scheduled),
            drains_rejected_cap: load(&self.drains_rejected_cap),
            drains_succeeded: load(&self.drains_succeeded),
            drains_failed: load(&self.drains_failed),
            canary_failures: load(&self.canary_failures),
            spot_ratios: self
                .ratios
                .lock()
                .expect("ratio lock poisoned")
                .iter()
                .map(|(pool, (current, target))| {
                    (pool.clone(), RatioGauge { current: *current, target: *target })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RatioGauge {
    pub current: f64,
    pub target: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountersSnapshot {
    pub ticks_total: u64,
    pub tick_failures: u64,
    pub tick_timeouts: u64,
    pub pool_failures: u64,
    pub worker_panics: u64,
    pub policy_reload_failures: u64,

    pub actions_hold: u64,
    pub actions_decrease_10: u64,
    pub actions_decrease_30: u64,
    pub actions_increase_10: u64,
    pub actions_increase_30: u64,
    pub actions_emergency_exit: u64,

    pub gate_low_confidence: u64,
    pub gate_cooldown: u64,
    pub gate_not_managed: u64,
    pub gate_step_interval: u64,
    pub gate_emergency_not_justified: u64,

    pub unsupported_instance_family_total: u64,
    pub ood_pools_total: u64,

    pub weight_changes_total: u64,
    pub prewarms_total: u64,
    pub route_skips_total: u64,

    pub drains_scheduled: u64,
    pub drains_rejected_cap: u64,
    pub drains_succeeded: u64,
    pub drains_failed: u64,

    pub canary_failures: u64,

    pub spot_ratios: BTreeMap<String, RatioGauge>,
}

impl CountersSnapshot {
    /// Counter name/value pairs, in a stable order.
    pub fn entries(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("ticks_total", self.ticks_total),
            ("tick_failures", self.tick_failures),
            ("tick_timeouts", self.tick_timeouts),
            ("pool_failures", self.pool_failures),
            ("worker_panics", self.worker_panics),
            ("policy_reload_failures", self.policy_reload_failures),
            ("actions_hold", self.actions_hold),
            ("actions_decrease_10", self.actions_decrease_10),
            ("actions_decrease_30", self.actions_decrease_30),
            ("actions_increase_10", self.actions_increase_10),
            ("actions_increase_30", self.actions_increase_30),
            ("actions_emergency_exit", self.actions_emergency_exit),
            ("gate_low_confidence", self.gate_low_confidence),
            ("gate_cooldown", self.gate_cooldown),
            ("gate_not_managed", self.gate_not_managed),
            ("gate_step_interval", self.gate_step_interval),
            (
                "gate_emergency_not_justified",
                self.gate_emergency_not_justified,
            ),
            (
                "unsupported_instance_family_total",
                self.unsupported_instance_family_total,
            ),
            ("ood_pools_total", self.ood_pools_total),
            ("weight_changes_total", self.weight_changes_total),
            ("prewarms_total", self.prewarms_total),
            ("route_skips_total", self.route_skips_total),
            ("drains_scheduled", self.drains_scheduled),
            ("drains_rejected_cap", self.drains_rejected_cap),
            ("drains_succeeded", self.drains_succeeded),
            ("drains_failed", self.drains_failed),
            ("canary_failures", self.canary_failures),
        ]
    }

    /// Prometheus text exposition.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.entries() {
            out.push_str(&format!("spotvortex_{name} {value}\n"));
        }
        for (pool, gauge) in &self.spot_ratios {
            out.push_str(&format!(
                "spotvortex_spot_ratio{{pool=\"{pool}\"}} {}\n",
                gauge.current
            ));
            out.push_str(&format!(
                "spotvortex_target_spot_ratio{{pool=\"{pool}\"}} {}\n",
                gauge.target
            ));
        }
        out
    }
}
