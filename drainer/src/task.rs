//! Drain task state.

use std::time::Duration;

use uuid::Uuid;

/// `Pending -> Cordoning -> Evicting -> (Succeeded | Failed)`.
/// Terminal states are absorbing within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Pending,
    Cordoning,
    Evicting,
    Succeeded,
    Failed,
}

impl DrainState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DrainState::Succeeded | DrainState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct DrainRequest {
    pub node_id: String,
    pub pool: String,
    pub grace: Duration,
    pub reason: String,
    pub dry_run: bool,

    /// Escalate to forced deletion when the grace period expires.
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct DrainTask {
    pub id: Uuid,
    pub request: DrainRequest,
    pub state: DrainState,
    pub error: Option<String>,
}

impl DrainTask {
    pub fn new(request: DrainRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            state: DrainState::Pending,
            error: None,
        }
    }
}
