//! Gavel Auction Coordinator
//!
//! The coordinator drives the sequence of bidding rounds: it gates each
//! round on a readiness barrier, arbitrates concurrent raises through the
//! bid ledger, enforces the bidding window, resolves sales against the
//! directory, and fans state transitions out to every connected session.

pub mod barrier;
pub mod config;
pub mod coordinator;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod session;

pub use config::CoordinatorConfig;
pub use coordinator::AuctionCoordinator;
