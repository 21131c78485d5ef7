//! Safety-gate composition.
//!
//! Every decision passes the gate chain before routing; any failing gate
//! downgrades the action to `HOLD` and appends its identifier to the
//! decision's reasons. Gate rejections are expected outcomes, not
//! errors.

use policy::{Action, ActionDecision, RuntimePolicy};

use crate::counters::Counters;

pub struct GateInputs {
    pub managed: bool,
    pub family_supported: bool,
    pub cooldown_remaining_ms: u64,
    pub minutes_since_last_action: Option<f64>,

    /// Capacity score after the risk multiplier.
    pub effective_capacity: f64,
}

/// Apply the gate chain in order: allowlist, cooldown, step interval,
/// confidence, emergency justification.
///
/// An `EMERGENCY_EXIT` skips the confidence and interval gates (uptime
/// beats cost) but must itself be justified: a supported family with
/// sub-emergency risk cannot exit, it holds.
pub fn apply_safety_gates(
    decision: ActionDecision,
    inputs: &GateInputs,
    policy: &RuntimePolicy,
    counters: &Counters,
) -> ActionDecision {
    if decision.action == Action::Hold {
        return decision;
    }

    if !inputs.managed {
        Counters::inc(&counters.gate_not_managed);
        return decision.hold("not_managed");
    }

    let emergency = decision.action == Action::EmergencyExit;

    if !emergency {
        if inputs.cooldown_remaining_ms > 0 {
            Counters::inc(&counters.gate_cooldown);
            return decision.hold("cooldown");
        }

        if decision.action.is_increase() {
            if let Some(minutes) = inputs.minutes_since_last_action {
                if minutes < policy.step_minutes as f64 {
                    Counters::inc(&counters.gate_step_interval);
                    return decision.hold("step_interval");
                }
            }
        }

        if decision.confidence < policy.confidence_threshold {
            Counters::inc(&counters.gate_low_confidence);
            return decision.hold("low_confidence");
        }
    }

    if emergency
        && inputs.family_supported
        && inputs.effective_capacity < policy.bands.emergency
        && decision.risk.runtime < policy.bands.runtime_emergency
    {
        Counters::inc(&counters.gate_emergency_not_justified);
        return decision.hold("emergency_not_justified");
    }

    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference::RiskScores;

    fn decision(action: Action, confidence: f64) -> ActionDecision {
        ActionDecision::new("web", action, RiskScores { capacity: 0.2, runtime: 0.1 })
            .with(confidence, "test")
    }

    fn clear_inputs() -> GateInputs {
        GateInputs {
            managed: true,
            family_supported: true,
            cooldown_remaining_ms: 0,
            minutes_since_last_action: None,
            effective_capacity: 0.2,
        }
    }

    #[test]
    fn clear_gates_pass_the_action_through() {
        let d = apply_safety_gates(
            decision(Action::Increase30, 0.9),
            &clear_inputs(),
            &RuntimePolicy::default(),
            &Counters::new(),
        );
        assert_eq!(d.action, Action::Increase30);
    }

    #[test]
    fn cooldown_gate_downgrades_with_its_reason() {
        let mut inputs = clear_inputs();
        inputs.cooldown_remaining_ms = 30_000;

        let counters = Counters::new();
        let d = apply_safety_gates(
            decision(Action::Increase30, 0.9),
            &inputs,
            &RuntimePolicy::default(),
            &counters,
        );
        assert_eq!(d.action, Action::Hold);
        assert!(d.reasons.contains(&"cooldown"));
        assert_eq!(counters.snapshot().gate_cooldown, 1);
    }

    #[test]
    fn step_interval_gate_limits_increase_cadence() {
        let mut inputs = clear_inputs();
        inputs.minutes_since_last_action = Some(2.0);

        let d = apply_safety_gates(
            decision(Action::Increase10, 0.9),
            &inputs,
            &RuntimePolicy::default(),
            &Counters::new(),
        );
        assert_eq!(d.action, Action::Hold);
        assert!(d.reasons.contains(&"step_interval"));

        // Decreases are not cadence-limited.
        let d = apply_safety_gates(
            decision(Action::Decrease30, 0.9),
            &inputs,
            &RuntimePolicy::default(),
            &Counters::new(),
        );
        assert_eq!(d.action, Action::Decrease30);
    }

    #[test]
    fn low_confidence_downgrades_non_emergencies() {
        let d = apply_safety_gates(
            decision(Action::Decrease10, 0.05),
            &clear_inputs(),
            &RuntimePolicy::default(),
            &Counters::new(),
        );
        assert_eq!(d.action, Action::Hold);
        assert!(d.reasons.contains(&"low_confidence"));
    }

    #[test]
    fn emergency_exit_ignores_cooldown_but_requires_justification() {
        let mut inputs = clear_inputs();
        inputs.cooldown_remaining_ms = 30_000;
        inputs.effective_capacity = 0.95;

        // Justified by emergency-band risk: passes even in cooldown.
        let d = apply_safety_gates(
            decision(Action::EmergencyExit, 1.0),
            &inputs,
            &RuntimePolicy::default(),
            &Counters::new(),
        );
        assert_eq!(d.action, Action::EmergencyExit);

        // Unjustified: supported family, low risk.
        let mut inputs = clear_inputs();
        inputs.effective_capacity = 0.2;
        let d = apply_safety_gates(
            decision(Action::EmergencyExit, 1.0),
            &inputs,
            &RuntimePolicy::default(),
            &Counters::new(),
        );
        assert_eq!(d.action, Action::Hold);
        assert!(d.reasons.contains(&"emergency_not_justified"));

        // Unsupported family always justifies the exit.
        let mut inputs = clear_inputs();
        inputs.family_supported = false;
        inputs.effective_capacity = 0.0;
        let d = apply_safety_gates(
            decision(Action::EmergencyExit, 1.0),
            &inputs,
            &RuntimePolicy::default(),
            &Counters::new(),
        );
        assert_eq!(d.action, Action::EmergencyExit);
    }
}
