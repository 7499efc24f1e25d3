//! Session registry: tracks connected team sessions, enforces the
//! admission limit, and fans messages out.

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use gavel_common::{AuctionError, Result, SessionId, TeamId};
use gavel_protocol::ServerMessage;

use crate::metrics::SharedMetrics;

/// Outbound channel capacity per session. A session that cannot drain
/// its channel loses messages rather than stalling the coordinator.
const SESSION_CHANNEL_CAPACITY: usize = 100;

/// Handle to a live session's outbound channel.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Session generation; distinguishes this connection from a later
    /// one under the same team identity.
    pub session_id: SessionId,
    tx: mpsc::Sender<ServerMessage>,
}

impl SessionHandle {
    /// Create a handle and the receiving end for the session writer task.
    pub fn new(session_id: SessionId) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        (Self { session_id, tx }, rx)
    }

    /// Whether the session is still draining its channel.
    pub fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, message: ServerMessage) -> bool {
        // Delivery to a dead or backed-up session is a no-op, not an
        // error; the coordinator never blocks on delivery.
        self.tx.try_send(message).is_ok()
    }
}

/// Registry of currently connected team sessions.
pub struct SessionRegistry {
    sessions: DashMap<TeamId, SessionHandle>,
    /// Serializes admission so the capacity check and the insert are one
    /// step.
    admission: Mutex<()>,
    max_sessions: usize,
    metrics: SharedMetrics,
}

impl SessionRegistry {
    /// Create a registry with the given concurrent-session limit.
    pub fn new(max_sessions: usize, metrics: SharedMetrics) -> Self {
        Self {
            sessions: DashMap::new(),
            admission: Mutex::new(()),
            max_sessions,
            metrics,
        }
    }

    /// Bind a team identity to a session handle.
    ///
    /// Rejects when the live-session count has reached the limit, or
    /// when the identity is already bound to a live session. A prior
    /// entry that is no longer live is replaced.
    pub fn register(&self, team: TeamId, handle: SessionHandle) -> Result<()> {
        let _guard = self.admission.lock();

        if let Some(existing) = self.sessions.get(&team) {
            if existing.is_live() {
                return Err(AuctionError::AlreadyConnected(team));
            }
        }

        let live = self.live_count_excluding(&team);
        if live >= self.max_sessions {
            return Err(AuctionError::RegistryFull {
                max: self.max_sessions,
            });
        }

        info!(team = %team, session = %handle.session_id, "Session registered");
        self.sessions.insert(team, handle);
        Ok(())
    }

    /// Remove a binding. Idempotent, and guarded by the session
    /// generation so a stale disconnect cannot evict a replacement.
    pub fn unregister(&self, team: &TeamId, session_id: SessionId) {
        let removed = self
            .sessions
            .remove_if(team, |_, handle| handle.session_id == session_id);
        if removed.is_some() {
            info!(team = %team, session = %session_id, "Session unregistered");
        }
    }

    /// Deliver a message to every currently live session.
    pub fn broadcast(&self, message: ServerMessage) {
        debug!(?message, "Broadcast");
        for entry in self.sessions.iter() {
            if entry.value().send(message.clone()) {
                self.metrics.message_sent();
            }
        }
    }

    /// Deliver a message to one team, if currently live. Silently
    /// dropped otherwise.
    pub fn unicast(&self, team: &TeamId, message: ServerMessage) {
        if let Some(handle) = self.sessions.get(team) {
            if handle.send(message) {
                self.metrics.message_sent();
            }
        }
    }

    /// Snapshot of live team identities. Callers must tolerate it going
    /// stale immediately.
    pub fn live_teams(&self) -> Vec<TeamId> {
        self.sessions
            .iter()
            .filter(|e| e.value().is_live())
            .map(|e| e.key().clone())
            .collect()
    }

    /// Count of live sessions.
    pub fn live_count(&self) -> usize {
        self.sessions.iter().filter(|e| e.value().is_live()).count()
    }

    fn live_count_excluding(&self, team: &TeamId) -> usize {
        self.sessions
            .iter()
            .filter(|e| e.key() != team && e.value().is_live())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use std::sync::Arc;

    fn new_registry(max: usize) -> SessionRegistry {
        SessionRegistry::new(max, Arc::new(Metrics::new()))
    }

    fn register_team(registry: &SessionRegistry, name: &str) -> mpsc::Receiver<ServerMessage> {
        let (handle, rx) = SessionHandle::new(SessionId::new());
        registry.register(TeamId::new(name), handle).unwrap();
        rx
    }

    #[test]
    fn test_capacity_rejection() {
        let registry = new_registry(2);
        let _rx1 = register_team(&registry, "A");
        let _rx2 = register_team(&registry, "B");

        let (handle, _rx3) = SessionHandle::new(SessionId::new());
        let err = registry.register(TeamId::new("C"), handle).unwrap_err();
        assert_eq!(err.error_code(), "REGISTRY_FULL");
    }

    #[test]
    fn test_live_identity_not_replaced() {
        let registry = new_registry(5);
        let _rx = register_team(&registry, "A");

        let (handle, _rx2) = SessionHandle::new(SessionId::new());
        let err = registry.register(TeamId::new("A"), handle).unwrap_err();
        assert_eq!(err.error_code(), "ALREADY_CONNECTED");
    }

    #[test]
    fn test_dead_identity_replaced_on_reconnect() {
        let registry = new_registry(1);
        let rx = register_team(&registry, "A");
        drop(rx); // connection gone, channel closed

        // The dead entry neither blocks capacity nor the identity.
        let (handle, _rx2) = SessionHandle::new(SessionId::new());
        registry.register(TeamId::new("A"), handle).unwrap();
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_unregister_is_generation_guarded() {
        let registry = new_registry(5);
        let stale_id = SessionId::new();
        let (stale, rx) = SessionHandle::new(stale_id);
        registry.register(TeamId::new("A"), stale).unwrap();
        drop(rx);

        let fresh_id = SessionId::new();
        let (fresh, _rx2) = SessionHandle::new(fresh_id);
        registry.register(TeamId::new("A"), fresh).unwrap();

        // A late disconnect from the stale session must not evict the
        // fresh one.
        registry.unregister(&TeamId::new("A"), stale_id);
        assert_eq!(registry.live_count(), 1);

        registry.unregister(&TeamId::new("A"), fresh_id);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_live_sessions_only() {
        let registry = new_registry(5);
        let mut rx_a = register_team(&registry, "A");
        let rx_b = register_team(&registry, "B");
        drop(rx_b);

        registry.broadcast(ServerMessage::AuctionComplete);

        assert_eq!(rx_a.recv().await, Some(ServerMessage::AuctionComplete));
        assert_eq!(registry.live_teams(), vec![TeamId::new("A")]);
    }

    #[tokio::test]
    async fn test_messages_sent_counts_live_deliveries_only() {
        let metrics = Arc::new(Metrics::new());
        let registry = SessionRegistry::new(5, metrics.clone());
        let _rx_a = register_team(&registry, "A");
        let rx_b = register_team(&registry, "B");
        drop(rx_b);

        registry.broadcast(ServerMessage::AuctionComplete);
        registry.unicast(&TeamId::new("A"), ServerMessage::AuctionComplete);
        registry.unicast(&TeamId::new("GHOST"), ServerMessage::AuctionComplete);

        // One broadcast delivery (A only) plus one unicast to A; the
        // dead channel and the absent team count nothing.
        assert_eq!(metrics.snapshot().messages_sent, 2);
    }

    #[tokio::test]
    async fn test_unicast_to_absent_team_is_silent() {
        let registry = new_registry(5);
        // Must not panic or error.
        registry.unicast(&TeamId::new("GHOST"), ServerMessage::AuctionComplete);

        let mut rx = register_team(&registry, "A");
        registry.unicast(
            &TeamId::new("A"),
            ServerMessage::ReadyAck {
                player: "V Sharma".to_string(),
            },
        );
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::ReadyAck { .. })
        ));
    }
}
