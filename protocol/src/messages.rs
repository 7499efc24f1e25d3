//! Protocol message types.
//!
//! These types represent the messages exchanged between team clients and
//! the coordinator. Each message is serialized as a single JSON line; the
//! `type` tag uses SCREAMING_SNAKE_CASE.

use chrono::{DateTime, Utc};
use gavel_common::TeamId;
use serde::{Deserialize, Serialize};

/// Messages sent from a team client to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// First message on a connection: present the team identity.
    Hello { team: TeamId },
    /// First-time registration details, sent after `REGISTRATION_REQUIRED`.
    Register {
        owner: String,
        city: String,
        budget: u64,
    },
    /// Signal readiness for the announced player.
    Ready,
    /// Raise attempt for the open round.
    Bid { amount: u64 },
}

/// Why a registration was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationRejection {
    /// Session limit reached; connection is closed immediately.
    Full { max: usize },
    /// Team name failed validation.
    InvalidName,
    /// Team identity already bound to a live session.
    AlreadyConnected,
}

/// Why a raise attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidRejection {
    /// Must strictly exceed the current highest bid.
    TooLow { current: u64 },
    /// Exceeds the team's persisted remaining budget.
    OverBudget { available: u64 },
    /// No round is open (not started yet, or already closed).
    RoundClosed,
}

/// Messages sent from the coordinator to team clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Registration or resume succeeded.
    Welcome {
        team: TeamId,
        resumed: bool,
        budget: u64,
    },
    /// Unknown team identity; send `REGISTER` with details.
    RegistrationRequired { team: TeamId },
    /// Registration refused; the connection will be closed.
    RegistrationRejected { reason: RegistrationRejection },
    /// Next player on the block; signal `READY` to release the round.
    ItemAnnounced {
        player: String,
        role: String,
        base_price: u64,
    },
    /// Readiness signal acknowledged.
    ReadyAck { player: String },
    /// This team cannot participate in the announced round.
    Ineligible { player: String, reason: String },
    /// Bidding window opened. `closes_at` is the authoritative deadline;
    /// it is never extended by bids.
    RoundOpened {
        player: String,
        base_price: u64,
        closes_at: DateTime<Utc>,
    },
    /// A raise was accepted and is now the highest bid.
    BidAccepted {
        team: TeamId,
        amount: u64,
        player: String,
    },
    /// A raise was rejected (unicast to the bidder).
    BidRejected { reason: BidRejection },
    /// Round resolved as a sale.
    SaleResolved {
        player: String,
        team: TeamId,
        amount: u64,
    },
    /// Per-winner notice, sent in addition to `SALE_RESOLVED`.
    SaleWon {
        player: String,
        amount: u64,
        remaining_budget: u64,
    },
    /// Round resolved with no bidder; the player is finally unsold.
    PlayerUnsold { player: String },
    /// No connected team could afford the base price; no round was opened.
    PlayerSkipped { player: String },
    /// Every catalog player has been resolved or skipped.
    AuctionComplete,
    /// Input error local to this session.
    Error { code: String, message: String },
}

/// Encode a message as a single wire line (no trailing newline).
pub fn encode_line<T: Serialize>(msg: &T) -> serde_json::Result<String> {
    serde_json::to_string(msg)
}

/// Decode a single wire line.
pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> serde_json::Result<T> {
    serde_json::from_str(line.trim())
}
