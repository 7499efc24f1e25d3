//! Metrics collection for auction monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Coordinator metrics.
#[derive(Default)]
pub struct Metrics {
    /// Rounds resolved as sales.
    pub rounds_sold: AtomicU64,
    /// Rounds resolved with no bidder.
    pub rounds_unsold: AtomicU64,
    /// Rounds skipped at the affordability gate.
    pub rounds_skipped: AtomicU64,
    /// Raise attempts accepted.
    pub bids_accepted: AtomicU64,
    /// Raise attempts rejected (too low, over budget, closed).
    pub bids_rejected: AtomicU64,
    /// Sessions admitted.
    pub sessions_admitted: AtomicU64,
    /// Sessions rejected at admission.
    pub sessions_rejected: AtomicU64,
    /// Messages delivered to session channels.
    pub messages_sent: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn round_sold(&self) {
        self.rounds_sold.fetch_add(1, Ordering::Relaxed);
    }

    pub fn round_unsold(&self) {
        self.rounds_unsold.fetch_add(1, Ordering::Relaxed);
    }

    pub fn round_skipped(&self) {
        self.rounds_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bid_accepted(&self) {
        self.bids_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bid_rejected(&self) {
        self.bids_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_admitted(&self) {
        self.sessions_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rounds_sold: self.rounds_sold.load(Ordering::Relaxed),
            rounds_unsold: self.rounds_unsold.load(Ordering::Relaxed),
            rounds_skipped: self.rounds_skipped.load(Ordering::Relaxed),
            bids_accepted: self.bids_accepted.load(Ordering::Relaxed),
            bids_rejected: self.bids_rejected.load(Ordering::Relaxed),
            sessions_admitted: self.sessions_admitted.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub rounds_sold: u64,
    pub rounds_unsold: u64,
    pub rounds_skipped: u64,
    pub bids_accepted: u64,
    pub bids_rejected: u64,
    pub sessions_admitted: u64,
    pub sessions_rejected: u64,
    pub messages_sent: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
