//! Action selection.
//!
//! Two selectors produce an [`ActionDecision`] for a pool: the Q-value
//! selector over the policy head's output, and the deterministic rule
//! table used when no policy head is loaded (or by configuration).
//! Both are pure functions: no async, no IO, no clocks.

use market::PriceSample;

use crate::action::{Action, ActionVocabulary};
use crate::buckets::WorkloadBuckets;
use crate::decision::ActionDecision;
use crate::errors::PolicyError;
use crate::runtime::{OodPolicy, RuntimePolicy};
use inference::RiskScores;

const RATIO_EPS: f64 = 1e-9;

/// Workload-level features of a pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkloadFeatures {
    pub pod_startup_seconds: f64,
    pub outage_penalty_hours: f64,
    /// Relative importance of the workload, in `[0, 1]`.
    pub priority_score: f64,
    /// Mean utilization across the cluster, in `[0, 1]`.
    pub cluster_utilization: f64,
}

/// Everything selection needs for one pool, assembled by the reconciler.
pub struct PolicyInputs<'a> {
    pub pool: &'a str,
    pub risk: RiskScores,
    pub family_supported: bool,
    pub spot_ratio: f64,
    pub price: &'a PriceSample,
    pub workload: WorkloadFeatures,
}

/// Deterministic rule table, evaluated top-down, first match wins.
pub fn decide_deterministic(
    inputs: &PolicyInputs<'_>,
    policy: &RuntimePolicy,
    buckets: &WorkloadBuckets,
) -> ActionDecision {
    let capacity = (inputs.risk.capacity * policy.risk_multiplier).clamp(0.0, 1.0);
    let bands = &policy.bands;
    let base = ActionDecision::new(inputs.pool, Action::Hold, inputs.risk);

    let decision = if !inputs.family_supported {
        base.with(1.0, "unsupported_family")
            .map_action(Action::EmergencyExit)
    } else if inputs.risk.runtime >= bands.runtime_emergency {
        base.with(1.0, "runtime_emergency")
            .map_action(Action::EmergencyExit)
    } else if capacity >= bands.emergency {
        base.with(1.0, "capacity_emergency")
            .map_action(Action::EmergencyExit)
    } else if capacity >= bands.high {
        base.with(capacity, "capacity_high")
            .map_action(Action::Decrease30)
    } else if capacity >= bands.medium {
        base.with(capacity, "capacity_medium")
            .map_action(Action::Decrease10)
    } else {
        decide_increase(inputs, policy, capacity, base)
    };

    let decision = apply_ood(decision, inputs, policy, buckets, capacity);
    clamp_to_ratio_bounds(decision, inputs.spot_ratio, policy)
}

/// Increase rules for the low-risk branch.
///
/// `savings_ratio = 1 - current/on_demand` and
/// `payback_hours = pod_startup_seconds * priority_score /
/// (savings_ratio * on_demand)` must both clear their thresholds, and
/// the pool must sit far enough below the target spot ratio.
fn decide_increase(
    inputs: &PolicyInputs<'_>,
    policy: &RuntimePolicy,
    capacity: f64,
    base: ActionDecision,
) -> ActionDecision {
    let price = inputs.price;
    let savings_ratio = if price.on_demand > 0.0 {
        1.0 - price.current / price.on_demand
    } else {
        0.0
    };

    if savings_ratio < policy.min_savings_increase {
        return base.with(1.0 - capacity, "steady");
    }

    let payback_hours = if savings_ratio > 0.0 && price.on_demand > 0.0 {
        inputs.workload.pod_startup_seconds * inputs.workload.priority_score
            / (savings_ratio * price.on_demand)
    } else {
        f64::INFINITY
    };
    if payback_hours > policy.max_payback_increase_hours {
        return base.with(1.0 - capacity, "steady");
    }

    let distance = policy.target_spot_ratio - inputs.spot_ratio;
    if distance >= 0.30 {
        base.with(savings_ratio, "below_target_30")
            .map_action(Action::Increase30)
    } else if distance >= 0.10 {
        base.with(savings_ratio, "below_target_10")
            .map_action(Action::Increase10)
    } else {
        base.with(1.0 - capacity, "steady")
    }
}

/// Q-value selector: argmax with a margin-over-span confidence.
pub fn decide_from_q(
    inputs: &PolicyInputs<'_>,
    q: &[f64],
    vocab: &ActionVocabulary,
    policy: &RuntimePolicy,
) -> Result<ActionDecision, PolicyError> {
    if q.len() != vocab.len() {
        return Err(PolicyError::QWidth {
            expected: vocab.len(),
            got: q.len(),
        });
    }

    // The unsupported-family invariant overrides whatever the model says.
    if !inputs.family_supported {
        let decision = ActionDecision::new(inputs.pool, Action::EmergencyExit, inputs.risk)
            .with(1.0, "unsupported_family");
        return Ok(clamp_to_ratio_bounds(decision, inputs.spot_ratio, policy));
    }

    let mut best = 0usize;
    let mut q_min = q[0];
    let mut q_max = q[0];
    for (i, v) in q.iter().enumerate() {
        if *v > q[best] {
            best = i;
        }
        q_min = q_min.min(*v);
        q_max = q_max.max(*v);
    }
    let second = q
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != best)
        .map(|(_, v)| *v)
        .fold(f64::NEG_INFINITY, f64::max);

    let span = q_max - q_min;
    let confidence = if span > f64::EPSILON {
        ((q[best] - second) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let action = vocab.action_at(best).expect("index within vocabulary");
    let mut decision =
        ActionDecision::new(inputs.pool, action, inputs.risk).with(confidence, "q_argmax");

    if confidence < policy.confidence_threshold {
        decision = decision.hold("low_confidence");
    }

    Ok(clamp_to_ratio_bounds(decision, inputs.spot_ratio, policy))
}

/// Out-of-distribution handling for the increase path.
fn apply_ood(
    mut decision: ActionDecision,
    inputs: &PolicyInputs<'_>,
    policy: &RuntimePolicy,
    buckets: &WorkloadBuckets,
    capacity: f64,
) -> ActionDecision {
    if !buckets.is_out_of_distribution(&inputs.workload) {
        return decision;
    }
    decision.reasons.push("ood");

    if policy.ood.policy == OodPolicy::Conservative
        && decision.action.is_increase()
        && capacity > policy.ood.max_risk_for_increase
    {
        decision = decision.hold("ood_conservative");
    }
    decision
}

/// Suppress actions that would push the pool outside its ratio corridor.
/// `EMERGENCY_EXIT` is never clamped.
fn clamp_to_ratio_bounds(
    decision: ActionDecision,
    spot_ratio: f64,
    policy: &RuntimePolicy,
) -> ActionDecision {
    if decision.action.is_decrease() && spot_ratio <= policy.min_spot_ratio + RATIO_EPS {
        return decision.hold("at_min_ratio");
    }
    if decision.action.is_increase() && spot_ratio >= policy.max_spot_ratio - RATIO_EPS {
        return decision.hold("at_max_ratio");
    }
    decision
}

impl ActionDecision {
    fn map_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }
}
