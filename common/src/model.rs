//! Domain model: players on the auction block and the teams bidding
//! for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TeamId;

/// Sale status of a catalog player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    /// Not yet auctioned (or skipped; may appear in a future run).
    Unsold,
    /// Sold to a team at a final price.
    Sold,
    /// Went through a full bidding round with no bidder; never revisited.
    UnsoldFinal,
}

impl SaleStatus {
    /// Whether this player can still appear on the block.
    pub fn is_auctionable(&self) -> bool {
        matches!(self, SaleStatus::Unsold)
    }
}

/// A player in the auction catalog.
///
/// Loaded once at startup filtered to unsold players; mutated exactly
/// once, at round resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Player name (unique within the catalog).
    pub name: String,
    /// Role tag (e.g. batsman, bowler, all-rounder).
    pub role: String,
    /// Base price; every round opens at this value.
    pub base_price: u64,
    /// Current sale status.
    pub status: SaleStatus,
    /// Winning team, set only when sold.
    pub bought_by: Option<TeamId>,
    /// Final sale price, set only when sold.
    pub final_price: Option<u64>,
}

impl Player {
    /// Create a new unsold player.
    pub fn new(name: impl Into<String>, role: impl Into<String>, base_price: u64) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            base_price,
            status: SaleStatus::Unsold,
            bought_by: None,
            final_price: None,
        }
    }
}

/// One acquisition on a team's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Player name.
    pub player: String,
    /// Player role.
    pub role: String,
    /// Price paid at resolution.
    pub price: u64,
    /// When the sale was committed.
    pub acquired_at: DateTime<Utc>,
}

/// A registered team.
///
/// Created once on first registration and persisted immediately; on
/// reconnection the record is loaded by name, never re-created. The
/// budget is monotonically non-increasing across the auction and is
/// debited exclusively by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Team name, the durable identity.
    pub name: TeamId,
    /// Owner's name.
    pub owner: String,
    /// Home city.
    pub city: String,
    /// Remaining budget.
    pub budget: u64,
    /// Players won so far, append-only.
    pub roster: Vec<RosterEntry>,
}

impl Team {
    /// Create a new team with an empty roster.
    pub fn new(
        name: TeamId,
        owner: impl Into<String>,
        city: impl Into<String>,
        budget: u64,
    ) -> Self {
        Self {
            name,
            owner: owner.into(),
            city: city.into(),
            budget,
            roster: Vec::new(),
        }
    }

    /// Whether this team can meet a base price from its current budget.
    pub fn can_afford(&self, price: u64) -> bool {
        self.budget >= price
    }

    /// Total spent across the roster.
    pub fn total_spent(&self) -> u64 {
        self.roster.iter().map(|e| e.price).sum()
    }
}
