//! The weight-change ledger.
//!
//! A first-class record of every acknowledged capacity patch, owned by
//! the router. The newest entry per pool gates the cooldown check, so
//! the ledger is only appended once a patch has been acknowledged: a
//! cancelled or failed patch leaves no trace and the next tick retries.

use std::collections::HashMap;

use cluster::PoolWeights;
use policy::Action;

/// Time source for ledger stamps. Tests inject a manual clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        common::time::now_ms()
    }
}

/// One acknowledged weight patch.
#[derive(Debug, Clone)]
pub struct PoolWeightChange {
    pub pool: String,
    pub spot_pool: String,
    pub on_demand_pool: String,
    pub prior: PoolWeights,
    pub next: PoolWeights,
    pub action: Action,
    pub ts_ms: u64,
    pub dry_run: bool,
}

#[derive(Default)]
pub struct WeightLedger {
    entries: Vec<PoolWeightChange>,
    last_action_ms: HashMap<String, u64>,
}

impl WeightLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an acknowledged weight patch.
    pub fn record(&mut self, change: PoolWeightChange) {
        self.last_action_ms
            .insert(change.pool.clone(), change.ts_ms);
        self.entries.push(change);
    }

    /// Stamp a non-weight capacity action (scaling-group pre-warm) so
    /// cooldown covers it too.
    pub fn mark_action(&mut self, pool: &str, ts_ms: u64) {
        self.last_action_ms.insert(pool.to_string(), ts_ms);
    }

    /// Timestamp of the newest capacity action on a pool.
    pub fn last_action_ms(&self, pool: &str) -> Option<u64> {
        self.last_action_ms.get(pool).copied()
    }

    /// Newest weight entry for a pool.
    pub fn last_entry(&self, pool: &str) -> Option<&PoolWeightChange> {
        self.entries.iter().rev().find(|e| e.pool == pool)
    }

    pub fn entries(&self) -> &[PoolWeightChange] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
