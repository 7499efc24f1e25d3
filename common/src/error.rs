//! Error types for Gavel operations.

use crate::TeamId;
use thiserror::Error;

/// Main error type for Gavel operations.
#[derive(Error, Debug)]
pub enum AuctionError {
    /// Invalid message format or content from a client.
    #[error("Invalid message: {message}")]
    InvalidMessage {
        message: String,
        field: Option<String>,
    },

    /// Unknown team identity.
    #[error("Unknown team: {0}")]
    UnknownTeam(TeamId),

    /// Team record already exists.
    #[error("Duplicate team: {0}")]
    DuplicateTeam(TeamId),

    /// Session limit reached at admission.
    #[error("Session registry full: max {max} concurrent sessions")]
    RegistryFull { max: usize },

    /// Team identity already bound to a live session.
    #[error("Team {0} already has a live session")]
    AlreadyConnected(TeamId),

    /// A round was opened while another is still open.
    #[error("Round already open for {player}")]
    RoundAlreadyOpen { player: String },

    /// Directory (persistence) failure. Fatal during round resolution.
    #[error("Directory error: {0}")]
    Directory(String),

    /// Persisted state contradicts an auction invariant.
    #[error("Ledger inconsistency: {0}")]
    Inconsistency(String),

    /// Network or channel I/O failure on a session.
    #[error("Session I/O error: {0}")]
    SessionIo(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuctionError {
    /// Whether the error must abort the auction run.
    ///
    /// Persistence failures and invariant violations during resolution
    /// cannot be absorbed: continuing would run the auction against a
    /// mismatched ledger.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuctionError::Directory(_)
                | AuctionError::Inconsistency(_)
                | AuctionError::Configuration(_)
        )
    }

    /// Get error code for protocol messages and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuctionError::InvalidMessage { .. } => "INVALID_MESSAGE",
            AuctionError::UnknownTeam(_) => "UNKNOWN_TEAM",
            AuctionError::DuplicateTeam(_) => "DUPLICATE_TEAM",
            AuctionError::RegistryFull { .. } => "REGISTRY_FULL",
            AuctionError::AlreadyConnected(_) => "ALREADY_CONNECTED",
            AuctionError::RoundAlreadyOpen { .. } => "ROUND_ALREADY_OPEN",
            AuctionError::Directory(_) => "DIRECTORY_ERROR",
            AuctionError::Inconsistency(_) => "INCONSISTENCY",
            AuctionError::SessionIo(_) => "SESSION_IO",
            AuctionError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for Gavel operations.
pub type Result<T> = std::result::Result<T, AuctionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AuctionError::Directory("pool closed".into()).is_fatal());
        assert!(AuctionError::Inconsistency("budget underflow".into()).is_fatal());
        assert!(!AuctionError::RegistryFull { max: 5 }.is_fatal());
        assert!(!AuctionError::InvalidMessage {
            message: "bad json".into(),
            field: None,
        }
        .is_fatal());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AuctionError::UnknownTeam(TeamId::new("X")).error_code(),
            "UNKNOWN_TEAM"
        );
        assert_eq!(
            AuctionError::RegistryFull { max: 5 }.error_code(),
            "REGISTRY_FULL"
        );
    }
}
