//! Bid ledger: the single source of truth for the current round's
//! highest bid and bidder.
//!
//! One mutex guards the whole check-and-set, so concurrent raises are
//! totally ordered by which one acquires the lock first. Two equal
//! concurrent raises can never both win: the loser is checked against
//! the winner's now-current value.

use parking_lot::Mutex;
use tracing::{debug, info};

use gavel_common::{AuctionError, Result, RoundId, TeamId};

/// Result of a raise attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaiseOutcome {
    /// The raise is now the highest bid.
    Accepted { amount: u64, player: String },
    /// Did not strictly exceed the current highest bid.
    TooLow { current: u64 },
    /// Exceeds the bidder's available budget.
    OverBudget { available: u64 },
    /// No round is open.
    RoundClosed,
}

/// Snapshot of a closed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    /// Round identity (time-ordered).
    pub round_id: RoundId,
    /// Player that was on the block.
    pub player: String,
    /// Final highest bid. Equals the base price when nobody bid.
    pub final_bid: u64,
    /// Winning team, if any bid was accepted.
    pub winner: Option<TeamId>,
}

#[derive(Debug)]
struct RoundState {
    round_id: RoundId,
    player: String,
    highest_bid: u64,
    highest_bidder: Option<TeamId>,
    open: bool,
}

/// The mutable state of the current round.
///
/// At most one round is live at a time; `open_round` replaces the state
/// and `close_round` flips it closed and returns the snapshot.
#[derive(Default)]
pub struct BidLedger {
    state: Mutex<Option<RoundState>>,
}

impl BidLedger {
    /// Create a ledger with no round open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a round for `player` at `base_price`.
    ///
    /// Errors if a round is already open; the coordinator must close the
    /// previous round first.
    pub fn open_round(&self, player: &str, base_price: u64) -> Result<RoundId> {
        let mut state = self.state.lock();
        if let Some(current) = state.as_ref() {
            if current.open {
                return Err(AuctionError::RoundAlreadyOpen {
                    player: current.player.clone(),
                });
            }
        }

        let round_id = RoundId::new();
        *state = Some(RoundState {
            round_id,
            player: player.to_string(),
            highest_bid: base_price,
            highest_bidder: None,
            open: true,
        });

        info!(round = %round_id, player, base_price, "Round opened");
        Ok(round_id)
    }

    /// Attempt to raise the current highest bid.
    ///
    /// Accepted only while the round is open, when `amount` fits within
    /// `available_budget`, and when it strictly exceeds the current
    /// highest bid. The check and the update happen under one lock hold.
    pub fn try_raise(&self, team: &TeamId, amount: u64, available_budget: u64) -> RaiseOutcome {
        let mut state = self.state.lock();
        let Some(round) = state.as_mut().filter(|r| r.open) else {
            return RaiseOutcome::RoundClosed;
        };

        if amount > available_budget {
            debug!(team = %team, amount, available_budget, "Raise over budget");
            return RaiseOutcome::OverBudget {
                available: available_budget,
            };
        }

        if amount <= round.highest_bid {
            debug!(team = %team, amount, current = round.highest_bid, "Raise too low");
            return RaiseOutcome::TooLow {
                current: round.highest_bid,
            };
        }

        round.highest_bid = amount;
        round.highest_bidder = Some(team.clone());
        info!(round = %round.round_id, team = %team, amount, "Bid accepted");
        RaiseOutcome::Accepted {
            amount,
            player: round.player.clone(),
        }
    }

    /// Close the current round and return its snapshot.
    ///
    /// Every raise processed after this point observes `RoundClosed`,
    /// even if it was submitted before the deadline.
    pub fn close_round(&self) -> Option<RoundSummary> {
        let mut state = self.state.lock();
        let round = state.as_mut()?;
        round.open = false;
        Some(RoundSummary {
            round_id: round.round_id,
            player: round.player.clone(),
            final_bid: round.highest_bid,
            winner: round.highest_bidder.clone(),
        })
    }

    /// Whether a round is currently accepting raises.
    pub fn is_open(&self) -> bool {
        self.state.lock().as_ref().map(|r| r.open).unwrap_or(false)
    }

    /// Player currently on the block, if a round is open.
    pub fn current_player(&self) -> Option<String> {
        self.state
            .lock()
            .as_ref()
            .filter(|r| r.open)
            .map(|r| r.player.clone())
    }
}
