//! Coordinator configuration.

use std::time::Duration;

/// Round timing configuration.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    /// Fixed bidding window per round. Never extended by bids; the time
    /// budget is per-round so every round terminates in bounded time.
    pub bidding_window: Duration,
    /// Bounded poll interval for the readiness barrier. Correctness
    /// rests on the satisfied predicate, not on this interval.
    pub barrier_poll_interval: Duration,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            bidding_window: Duration::from_secs(30),
            barrier_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Main coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Node ID (generated if not provided).
    pub node_id: Option<String>,
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Database URL for the directory.
    pub database_url: String,
    /// Maximum concurrent team sessions; admission beyond this is
    /// rejected outright, not queued.
    pub max_sessions: usize,
    /// Round timing.
    pub round: RoundConfig,
    /// Log level.
    pub log_level: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 7450,
            database_url: "postgres://localhost/gavel".to_string(),
            max_sessions: 5,
            round: RoundConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("GAVEL_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Ok(port) = std::env::var("GAVEL_LISTEN_PORT") {
            if let Ok(port) = port.parse() {
                config.listen_port = port;
            }
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Ok(max) = std::env::var("GAVEL_MAX_SESSIONS") {
            if let Ok(max) = max.parse() {
                config.max_sessions = max;
            }
        }

        if let Ok(secs) = std::env::var("GAVEL_BIDDING_WINDOW_SECS") {
            if let Ok(secs) = secs.parse() {
                config.round.bidding_window = Duration::from_secs(secs);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.max_sessions == 0 {
            return Err("Max sessions must be at least 1".to_string());
        }

        if self.round.bidding_window.is_zero() {
            return Err("Bidding window cannot be zero".to_string());
        }

        if self.round.barrier_poll_interval.is_zero() {
            return Err("Barrier poll interval cannot be zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_sessions, 5);
        assert_eq!(config.round.bidding_window, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = CoordinatorConfig::default();
        config.max_sessions = 0;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.round.bidding_window = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
