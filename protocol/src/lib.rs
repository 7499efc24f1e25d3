//! Gavel Protocol Messages
//!
//! Message types exchanged between team clients and the auction
//! coordinator. Framing is one JSON object per line.

pub mod messages;

pub use messages::*;
