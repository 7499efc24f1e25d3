//! Readiness barrier: releases a round only once every eligible team has
//! signaled ready or disconnected.
//!
//! The eligible set is snapshotted once at gate entry and only shrinks
//! on disconnect; teams joining mid-wait do not grow it. Waiting is a
//! bounded poll with an event wake on every mark, so the coordinator is
//! released promptly without a fixed-latency floor.

use std::collections::HashSet;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use gavel_common::TeamId;

#[derive(Default)]
struct BarrierState {
    /// Player the gate was announced for.
    item: Option<String>,
    eligible: HashSet<TeamId>,
    ready: HashSet<TeamId>,
    departed: HashSet<TeamId>,
}

impl BarrierState {
    fn is_satisfied(&self) -> bool {
        self.eligible
            .iter()
            .all(|t| self.ready.contains(t) || self.departed.contains(t))
    }
}

/// Per-round readiness barrier.
#[derive(Default)]
pub struct ReadinessBarrier {
    state: Mutex<BarrierState>,
    notify: Notify,
}

impl ReadinessBarrier {
    /// Create a barrier with an empty eligible set (trivially satisfied).
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new round: clear all flags and snapshot the eligible set.
    pub fn reset_for_round(&self, item: &str, eligible: HashSet<TeamId>) {
        let mut state = self.state.lock();
        debug!(item, eligible = eligible.len(), "Barrier reset");
        *state = BarrierState {
            item: Some(item.to_string()),
            eligible,
            ready: HashSet::new(),
            departed: HashSet::new(),
        };
        // A reset can satisfy a waiter outright (empty eligible set).
        self.notify.notify_waiters();
    }

    /// Player the current gate was announced for.
    pub fn current_item(&self) -> Option<String> {
        self.state.lock().item.clone()
    }

    /// Record a readiness signal. Returns false (no-op) for teams outside
    /// the eligible set.
    pub fn mark_ready(&self, team: &TeamId) -> bool {
        let mut state = self.state.lock();
        if !state.eligible.contains(team) {
            return false;
        }
        state.ready.insert(team.clone());
        drop(state);
        self.notify.notify_waiters();
        true
    }

    /// Remove a disconnected team from pending so the barrier never
    /// waits forever on a team that left.
    pub fn mark_departed(&self, team: &TeamId) {
        let mut state = self.state.lock();
        if state.eligible.contains(team) {
            state.departed.insert(team.clone());
            drop(state);
            self.notify.notify_waiters();
        }
    }

    /// Whether every eligible team has signaled ready or departed.
    pub fn is_satisfied(&self) -> bool {
        self.state.lock().is_satisfied()
    }

    /// Eligible teams that have neither signaled ready nor departed.
    pub fn pending_teams(&self) -> Vec<TeamId> {
        let state = self.state.lock();
        state
            .eligible
            .iter()
            .filter(|t| !state.ready.contains(*t) && !state.departed.contains(*t))
            .cloned()
            .collect()
    }

    /// Block for one wake: returns on the next mark, after
    /// `poll_interval`, or immediately if already satisfied.
    pub async fn wait_tick(&self, poll_interval: std::time::Duration) {
        // Arm the notification before checking to avoid a lost wake
        // between the check and the await.
        let notified = self.notify.notified();
        if self.is_satisfied() {
            return;
        }
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    /// Wait until the barrier is satisfied, polling at `poll_interval`
    /// as a bound and waking early on every mark.
    pub async fn wait_satisfied(&self, poll_interval: std::time::Duration) {
        while !self.is_satisfied() {
            self.wait_tick(poll_interval).await;
        }
    }
}
