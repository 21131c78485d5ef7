//! The closed capacity-action set.
//!
//! Actions are a tagged variant everywhere inside the agent; the string
//! forms exist only at the manifest and logging boundaries. The
//! vocabulary table pre-parses the manifest ordering once so Q-value
//! lookups never compare strings.

use std::fmt;

use serde::Serialize;

use crate::errors::PolicyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Hold,
    Decrease10,
    Decrease30,
    Increase10,
    Increase30,
    EmergencyExit,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Hold,
        Action::Decrease10,
        Action::Decrease30,
        Action::Increase10,
        Action::Increase30,
        Action::EmergencyExit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Hold => "HOLD",
            Action::Decrease10 => "DECREASE_10",
            Action::Decrease30 => "DECREASE_30",
            Action::Increase10 => "INCREASE_10",
            Action::Increase30 => "INCREASE_30",
            Action::EmergencyExit => "EMERGENCY_EXIT",
        }
    }

    pub fn parse(s: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.as_str() == s)
    }

    pub fn is_increase(&self) -> bool {
        matches!(self, Action::Increase10 | Action::Increase30)
    }

    pub fn is_decrease(&self) -> bool {
        matches!(self, Action::Decrease10 | Action::Decrease30)
    }

    /// Whether routing this action would touch the provisioner.
    pub fn mutates(&self) -> bool {
        !matches!(self, Action::Hold)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manifest-declared action ordering, parsed once at startup.
#[derive(Debug, Clone)]
pub struct ActionVocabulary {
    order: Vec<Action>,
}

impl ActionVocabulary {
    /// Parse manifest names. Every member of the closed set must appear
    /// exactly once.
    pub fn from_names(names: &[String]) -> Result<Self, PolicyError> {
        let mut order = Vec::with_capacity(names.len());
        for name in names {
            let action = Action::parse(name)
                .ok_or_else(|| PolicyError::Vocabulary(format!("unknown action {name:?}")))?;
            if order.contains(&action) {
                return Err(PolicyError::Vocabulary(format!("duplicate action {name:?}")));
            }
            order.push(action);
        }
        if order.len() != Action::ALL.len() {
            return Err(PolicyError::Vocabulary(format!(
                "vocabulary has {} entries, expected {}",
                order.len(),
                Action::ALL.len()
            )));
        }
        Ok(Self { order })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn action_at(&self, index: usize) -> Option<Action> {
        self.order.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn full_vocabulary_parses_in_declared_order() {
        let vocab = ActionVocabulary::from_names(&names(&[
            "EMERGENCY_EXIT",
            "HOLD",
            "DECREASE_10",
            "DECREASE_30",
            "INCREASE_10",
            "INCREASE_30",
        ]))
        .unwrap();
        assert_eq!(vocab.action_at(0), Some(Action::EmergencyExit));
        assert_eq!(vocab.action_at(1), Some(Action::Hold));
    }

    #[test]
    fn incomplete_or_unknown_vocabularies_are_rejected() {
        assert!(ActionVocabulary::from_names(&names(&["HOLD"])).is_err());
        assert!(
            ActionVocabulary::from_names(&names(&[
                "HOLD",
                "DECREASE_10",
                "DECREASE_30",
                "INCREASE_10",
                "INCREASE_30",
                "SELL_EVERYTHING",
            ]))
            .is_err()
        );
        assert!(
            ActionVocabulary::from_names(&names(&[
                "HOLD",
                "HOLD",
                "DECREASE_30",
                "INCREASE_10",
                "INCREASE_30",
                "EMERGENCY_EXIT",
            ]))
            .is_err()
        );
    }
}
