use inference::RiskScores;
use serde::Serialize;

use crate::action::Action;

/// The outcome of action selection for one pool.
///
/// `reasons` is an ordered list of the rule and gate identifiers that
/// shaped the decision, so operators can audit every action from the
/// decision log alone.
#[derive(Debug, Clone, Serialize)]
pub struct ActionDecision {
    pub pool: String,
    pub action: Action,

    #[serde(skip)]
    pub risk: RiskScores,

    /// Max-Q margin in policy-model mode, a rule-derived scalar in
    /// deterministic mode. Always in `[0, 1]`.
    pub confidence: f64,

    pub reasons: Vec<&'static str>,
}

impl ActionDecision {
    pub fn new(pool: impl Into<String>, action: Action, risk: RiskScores) -> Self {
        Self {
            pool: pool.into(),
            action,
            risk,
            confidence: 0.0,
            reasons: Vec::new(),
        }
    }

    pub fn with(mut self, confidence: f64, reason: &'static str) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self.reasons.push(reason);
        self
    }

    /// Downgrade to `HOLD`, keeping the audit trail.
    pub fn hold(mut self, reason: &'static str) -> Self {
        self.action = Action::Hold;
        self.reasons.push(reason);
        self
    }
}
