//! Core auction coordinator: the sequential driver of bidding rounds.
//!
//! Exactly one coordinator task runs per auction. For each catalog
//! player it announces the item, gates on the readiness barrier,
//! re-checks affordability, holds the bidding window open, closes the
//! ledger, and resolves the round against the directory before moving
//! on. Budgets are mutated here and nowhere else.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use gavel_common::{AuctionError, Player, Result, TeamId};
use gavel_directory::Directory;
use gavel_protocol::ServerMessage;

use crate::barrier::ReadinessBarrier;
use crate::config::CoordinatorConfig;
use crate::ledger::BidLedger;
use crate::metrics::{Metrics, SharedMetrics};
use crate::registry::SessionRegistry;

/// Outcome of a single round, reported for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Sold to a team at a price.
    Sold { team: TeamId, price: u64 },
    /// Ran a full window with no bidder.
    Unsold,
    /// Nobody could afford the base price; no window was opened.
    Skipped,
}

/// The auction coordinator.
pub struct AuctionCoordinator {
    config: CoordinatorConfig,
    directory: Arc<dyn Directory>,
    registry: Arc<SessionRegistry>,
    ledger: Arc<BidLedger>,
    barrier: Arc<ReadinessBarrier>,
    metrics: SharedMetrics,
}

impl AuctionCoordinator {
    /// Create a coordinator with fresh shared state.
    pub fn new(config: CoordinatorConfig, directory: Arc<dyn Directory>) -> Self {
        let metrics: SharedMetrics = Arc::new(Metrics::new());
        let registry = Arc::new(SessionRegistry::new(config.max_sessions, metrics.clone()));
        Self {
            config,
            directory,
            registry,
            ledger: Arc::new(BidLedger::new()),
            barrier: Arc::new(ReadinessBarrier::new()),
            metrics,
        }
    }

    /// Session registry shared with session tasks.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Bid ledger shared with session tasks.
    pub fn ledger(&self) -> Arc<BidLedger> {
        self.ledger.clone()
    }

    /// Readiness barrier shared with session tasks.
    pub fn barrier(&self) -> Arc<ReadinessBarrier> {
        self.barrier.clone()
    }

    /// Directory handle (read-only use outside the coordinator).
    pub fn directory(&self) -> Arc<dyn Directory> {
        self.directory.clone()
    }

    /// Metrics handle.
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    /// Coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Drive the whole auction: one round per catalog player, in load
    /// order, then announce completion.
    ///
    /// A directory failure during resolution aborts the run: an auction
    /// with an inconsistent ledger cannot safely continue.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        let catalog = self.directory.load_unsold_players().await?;
        info!(players = catalog.len(), "Catalog loaded, waiting for the first team");

        // Hold the first round until at least one team is seated, so an
        // empty house cannot burn through the catalog at startup.
        while self.registry.live_count() == 0 {
            tokio::time::sleep(self.config.round.barrier_poll_interval).await;
        }
        info!(players = catalog.len(), "Auction starting");

        for player in &catalog {
            let outcome = self.run_round(player).await.map_err(|e| {
                error!(player = %player.name, error = %e, "Round resolution failed, aborting run");
                e
            })?;
            info!(player = %player.name, ?outcome, "Round finished");
        }

        self.registry.broadcast(ServerMessage::AuctionComplete);
        let snapshot = self.metrics.snapshot();
        info!(
            sold = snapshot.rounds_sold,
            unsold = snapshot.rounds_unsold,
            skipped = snapshot.rounds_skipped,
            bids_accepted = snapshot.bids_accepted,
            "Auction complete"
        );
        Ok(())
    }

    /// Run a single round for `player`.
    #[instrument(skip(self, player), fields(player = %player.name, base_price = player.base_price))]
    pub async fn run_round(&self, player: &Player) -> Result<RoundOutcome> {
        // SELECT_ITEM / READY_GATE: snapshot the eligible set from
        // persisted budgets and arm the barrier before the announcement
        // goes out, so no READY can arrive against stale barrier state.
        let eligible = self.compute_eligible(player).await?;
        self.barrier.reset_for_round(&player.name, eligible);
        self.registry.broadcast(ServerMessage::ItemAnnounced {
            player: player.name.clone(),
            role: player.role.clone(),
            base_price: player.base_price,
        });
        self.wait_ready_gate().await;

        // AFFORDABILITY_GATE: re-confirm someone can still meet the base
        // price; otherwise skip without opening a window. The player is
        // never revisited in this run but stays unsold in the store.
        if !self.any_live_team_affords(player.base_price).await? {
            warn!("No team can afford base price, skipping");
            self.registry.broadcast(ServerMessage::PlayerSkipped {
                player: player.name.clone(),
            });
            self.metrics.round_skipped();
            return Ok(RoundOutcome::Skipped);
        }

        // BIDDING_OPEN: fixed window, never extended by bids.
        self.ledger.open_round(&player.name, player.base_price)?;
        let closes_at = Utc::now()
            + chrono::Duration::from_std(self.config.round.bidding_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));
        self.registry.broadcast(ServerMessage::RoundOpened {
            player: player.name.clone(),
            base_price: player.base_price,
            closes_at,
        });
        tokio::time::sleep(self.config.round.bidding_window).await;

        // BIDDING_CLOSE: late raises observe RoundClosed from here on.
        let summary = self.ledger.close_round().ok_or_else(|| {
            AuctionError::Inconsistency(format!("no round state at close for {}", player.name))
        })?;

        // RESOLVE: all persistence must succeed before the next item.
        match summary.winner {
            Some(team) => {
                let remaining = self
                    .directory
                    .commit_sale(summary.round_id, &team, player, summary.final_bid)
                    .await?;

                self.registry.broadcast(ServerMessage::SaleResolved {
                    player: player.name.clone(),
                    team: team.clone(),
                    amount: summary.final_bid,
                });
                self.registry.unicast(
                    &team,
                    ServerMessage::SaleWon {
                        player: player.name.clone(),
                        amount: summary.final_bid,
                        remaining_budget: remaining,
                    },
                );
                self.metrics.round_sold();
                Ok(RoundOutcome::Sold {
                    team,
                    price: summary.final_bid,
                })
            }
            None => {
                self.directory.mark_player_unsold(&player.name).await?;
                self.registry.broadcast(ServerMessage::PlayerUnsold {
                    player: player.name.clone(),
                });
                self.metrics.round_unsold();
                Ok(RoundOutcome::Unsold)
            }
        }
    }

    /// Snapshot the eligible set: live sessions whose persisted budget
    /// meets the base price. Ineligible-but-connected teams are told why
    /// so their bidding controls can be disabled.
    async fn compute_eligible(&self, player: &Player) -> Result<HashSet<TeamId>> {
        let mut eligible = HashSet::new();
        for team_id in self.registry.live_teams() {
            match self.directory.find_team(&team_id).await? {
                Some(team) if team.can_afford(player.base_price) => {
                    eligible.insert(team_id);
                }
                Some(team) => {
                    self.registry.unicast(
                        &team_id,
                        ServerMessage::Ineligible {
                            player: player.name.clone(),
                            reason: format!(
                                "budget {} below base price {}",
                                team.budget, player.base_price
                            ),
                        },
                    );
                }
                None => {
                    // Registered session without a directory record
                    // should not happen; treat as ineligible.
                    warn!(team = %team_id, "Live session has no directory record");
                }
            }
        }
        Ok(eligible)
    }

    /// Wait for the readiness barrier, pruning pending teams against
    /// registry liveness on every wake.
    ///
    /// A departure signal can land between the eligibility snapshot and
    /// the barrier reset, where the barrier discards it as stale; the
    /// prune re-derives it from the registry so the gate cannot wait
    /// forever on a session that is already gone.
    async fn wait_ready_gate(&self) {
        loop {
            let live: HashSet<TeamId> = self.registry.live_teams().into_iter().collect();
            for team in self.barrier.pending_teams() {
                if !live.contains(&team) {
                    warn!(team = %team, "Pending team is no longer connected, marking departed");
                    self.barrier.mark_departed(&team);
                }
            }
            if self.barrier.is_satisfied() {
                return;
            }
            self.barrier
                .wait_tick(self.config.round.barrier_poll_interval)
                .await;
        }
    }

    async fn any_live_team_affords(&self, base_price: u64) -> Result<bool> {
        for team_id in self.registry.live_teams() {
            if let Some(team) = self.directory.find_team(&team_id).await? {
                if team.can_afford(base_price) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoundConfig;
    use crate::ledger::RaiseOutcome;
    use crate::registry::SessionHandle;
    use gavel_common::{SessionId, Team};
    use gavel_directory::MemoryDirectory;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn fast_config() -> CoordinatorConfig {
        CoordinatorConfig {
            round: RoundConfig {
                bidding_window: Duration::from_millis(100),
                barrier_poll_interval: Duration::from_millis(10),
            },
            ..CoordinatorConfig::default()
        }
    }

    fn seeded_directory(players: Vec<Player>, teams: Vec<Team>) -> Arc<MemoryDirectory> {
        let dir = MemoryDirectory::with_players(players);
        for team in teams {
            dir.seed_team(team);
        }
        Arc::new(dir)
    }

    fn connect(
        coordinator: &AuctionCoordinator,
        name: &str,
    ) -> (TeamId, SessionId, mpsc::Receiver<ServerMessage>) {
        let id = TeamId::new(name);
        let session_id = SessionId::new();
        let (handle, rx) = SessionHandle::new(session_id);
        coordinator.registry().register(id.clone(), handle).unwrap();
        (id, session_id, rx)
    }

    /// Drain a receiver until a matching message arrives or it closes.
    async fn expect_message<F>(rx: &mut mpsc::Receiver<ServerMessage>, mut pred: F) -> ServerMessage
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for message")
                .expect("channel closed before expected message");
            if pred(&msg) {
                return msg;
            }
        }
    }

    #[tokio::test]
    async fn test_affordability_scenario_sold_to_a() {
        // Base 100; A (500) eligible, B (80) excluded; A bids 150 and
        // wins; A's budget becomes 350.
        let directory = seeded_directory(
            vec![Player::new("V Sharma", "Batsman", 100)],
            vec![
                Team::new(TeamId::new("A"), "Owner A", "Pune", 500),
                Team::new(TeamId::new("B"), "Owner B", "Kochi", 80),
            ],
        );
        let coordinator = Arc::new(AuctionCoordinator::new(fast_config(), directory.clone()));

        let (team_a, _sid_a, mut rx_a) = connect(&coordinator, "A");
        let (_team_b, _sid_b, mut rx_b) = connect(&coordinator, "B");

        let driver = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run().await })
        };

        // B is told it cannot participate; only A gates the barrier.
        expect_message(&mut rx_b, |m| {
            matches!(m, ServerMessage::Ineligible { .. })
        })
        .await;

        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::ItemAnnounced { .. })
        })
        .await;
        coordinator.barrier().mark_ready(&team_a);

        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::RoundOpened { base_price: 100, .. })
        })
        .await;

        let outcome = coordinator.ledger().try_raise(&team_a, 150, 500);
        assert!(matches!(outcome, RaiseOutcome::Accepted { amount: 150, .. }));

        let resolved = expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::SaleResolved { .. })
        })
        .await;
        assert_eq!(
            resolved,
            ServerMessage::SaleResolved {
                player: "V Sharma".to_string(),
                team: team_a.clone(),
                amount: 150,
            }
        );
        expect_message(&mut rx_a, |m| matches!(m, ServerMessage::SaleWon { .. })).await;

        driver.await.unwrap().unwrap();

        let team = directory.find_team(&team_a).await.unwrap().unwrap();
        assert_eq!(team.budget, 350);
        assert_eq!(team.roster.len(), 1);
        assert_eq!(team.total_spent(), 150);
    }

    #[tokio::test]
    async fn test_unaffordable_player_skipped_without_window() {
        // Base 200; nobody has budget >= 200: skipped, stays unsold,
        // no bidding window opens.
        let directory = seeded_directory(
            vec![Player::new("A Khan", "Bowler", 200)],
            vec![Team::new(TeamId::new("A"), "Owner A", "Pune", 150)],
        );
        let coordinator = Arc::new(AuctionCoordinator::new(fast_config(), directory.clone()));
        let (_team_a, _sid_a, mut rx_a) = connect(&coordinator, "A");

        let driver = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run().await })
        };

        let mut saw_round_opened = false;
        loop {
            let Ok(Some(msg)) =
                tokio::time::timeout(Duration::from_secs(2), rx_a.recv()).await
            else {
                break;
            };
            match msg {
                ServerMessage::RoundOpened { .. } => saw_round_opened = true,
                ServerMessage::AuctionComplete => break,
                _ => {}
            }
        }
        assert!(!saw_round_opened);

        driver.await.unwrap().unwrap();

        // Not marked unsold-final: an affordability skip leaves the
        // player auctionable for a future run.
        let remaining = directory.load_unsold_players().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(coordinator.metrics().snapshot().rounds_skipped, 1);
    }

    #[tokio::test]
    async fn test_no_bidder_marks_unsold_final() {
        let directory = seeded_directory(
            vec![Player::new("S Iyer", "All-rounder", 100)],
            vec![Team::new(TeamId::new("A"), "Owner A", "Pune", 500)],
        );
        let coordinator = Arc::new(AuctionCoordinator::new(fast_config(), directory.clone()));
        let (team_a, _sid_a, mut rx_a) = connect(&coordinator, "A");

        let driver = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run().await })
        };

        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::ItemAnnounced { .. })
        })
        .await;
        coordinator.barrier().mark_ready(&team_a);

        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::PlayerUnsold { .. })
        })
        .await;
        driver.await.unwrap().unwrap();

        assert!(directory.load_unsold_players().await.unwrap().is_empty());
        assert_eq!(coordinator.metrics().snapshot().rounds_unsold, 1);
    }

    #[tokio::test]
    async fn test_disconnected_winner_still_resolved() {
        // The highest bidder disconnecting mid-window does not void the
        // sale: budgets come from the directory, not the live session.
        let directory = seeded_directory(
            vec![Player::new("V Sharma", "Batsman", 100)],
            vec![
                Team::new(TeamId::new("A"), "Owner A", "Pune", 500),
                Team::new(TeamId::new("B"), "Owner B", "Kochi", 500),
            ],
        );
        let coordinator = Arc::new(AuctionCoordinator::new(fast_config(), directory.clone()));
        let (team_a, session_a, rx_a) = connect(&coordinator, "A");
        let (team_b, _sid_b, mut rx_b) = connect(&coordinator, "B");
        let driver = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run().await })
        };

        expect_message(&mut rx_b, |m| {
            matches!(m, ServerMessage::ItemAnnounced { .. })
        })
        .await;
        coordinator.barrier().mark_ready(&team_a);
        coordinator.barrier().mark_ready(&team_b);

        expect_message(&mut rx_b, |m| {
            matches!(m, ServerMessage::RoundOpened { .. })
        })
        .await;

        let outcome = coordinator.ledger().try_raise(&team_a, 200, 500);
        assert!(matches!(outcome, RaiseOutcome::Accepted { .. }));

        // A disconnects after bidding; its bid stands.
        drop(rx_a);
        coordinator.registry().unregister(&team_a, session_a);
        coordinator.barrier().mark_departed(&team_a);

        expect_message(&mut rx_b, |m| {
            matches!(m, ServerMessage::SaleResolved { .. })
        })
        .await;
        driver.await.unwrap().unwrap();

        let team = directory.find_team(&team_a).await.unwrap().unwrap();
        assert_eq!(team.budget, 300);
        assert_eq!(team.roster.len(), 1);
    }

    #[tokio::test]
    async fn test_non_bidder_disconnect_does_not_alter_outcome() {
        let directory = seeded_directory(
            vec![Player::new("V Sharma", "Batsman", 100)],
            vec![
                Team::new(TeamId::new("A"), "Owner A", "Pune", 500),
                Team::new(TeamId::new("B"), "Owner B", "Kochi", 500),
            ],
        );
        let coordinator = Arc::new(AuctionCoordinator::new(fast_config(), directory.clone()));
        let (team_a, _sid_a, mut rx_a) = connect(&coordinator, "A");
        let (team_b, _sid_b, rx_b) = connect(&coordinator, "B");

        let driver = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run().await })
        };

        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::ItemAnnounced { .. })
        })
        .await;
        coordinator.barrier().mark_ready(&team_a);

        // B never signals ready and leaves; the barrier must release on
        // its departure.
        drop(rx_b);
        coordinator.barrier().mark_departed(&team_b);

        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::RoundOpened { .. })
        })
        .await;
        let outcome = coordinator.ledger().try_raise(&team_a, 120, 500);
        assert!(matches!(outcome, RaiseOutcome::Accepted { .. }));

        let resolved = expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::SaleResolved { .. })
        })
        .await;
        assert!(matches!(
            resolved,
            ServerMessage::SaleResolved { amount: 120, .. }
        ));
        driver.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_catalog_processed_in_load_order() {
        let directory = seeded_directory(
            vec![
                Player::new("First", "Batsman", 100),
                Player::new("Second", "Bowler", 100),
            ],
            vec![Team::new(TeamId::new("A"), "Owner A", "Pune", 1000)],
        );
        let coordinator = Arc::new(AuctionCoordinator::new(fast_config(), directory));
        let (team_a, _sid_a, mut rx_a) = connect(&coordinator, "A");

        let driver = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run().await })
        };

        // Keep signaling ready as items are announced.
        let mut announced = Vec::new();
        loop {
            let Ok(Some(msg)) =
                tokio::time::timeout(Duration::from_secs(2), rx_a.recv()).await
            else {
                break;
            };
            match msg {
                ServerMessage::ItemAnnounced { player, .. } => {
                    announced.push(player);
                    coordinator.barrier().mark_ready(&team_a);
                }
                ServerMessage::AuctionComplete => break,
                _ => {}
            }
        }

        assert_eq!(announced, vec!["First".to_string(), "Second".to_string()]);
        driver.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_gate_releases_when_departure_signal_was_lost() {
        // A departure can land against the previous round's barrier
        // state, where it is discarded as stale; the gate must still
        // release by pruning pending teams against registry liveness.
        let directory = seeded_directory(
            vec![Player::new("V Sharma", "Batsman", 100)],
            vec![
                Team::new(TeamId::new("A"), "Owner A", "Pune", 500),
                Team::new(TeamId::new("B"), "Owner B", "Kochi", 500),
            ],
        );
        let coordinator = Arc::new(AuctionCoordinator::new(fast_config(), directory));
        let (team_a, _sid_a, mut rx_a) = connect(&coordinator, "A");
        let (team_b, session_b, rx_b) = connect(&coordinator, "B");

        // Dropped by the barrier: no round state exists yet.
        coordinator.barrier().mark_departed(&team_b);

        let driver = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run().await })
        };

        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::ItemAnnounced { .. })
        })
        .await;
        coordinator.barrier().mark_ready(&team_a);

        // B is in the round's eligible snapshot but its connection dies
        // without any departure signal reaching the new barrier state.
        drop(rx_b);
        coordinator.registry().unregister(&team_b, session_b);

        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::RoundOpened { .. })
        })
        .await;
        let outcome = coordinator.ledger().try_raise(&team_a, 150, 500);
        assert!(matches!(outcome, RaiseOutcome::Accepted { .. }));

        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::SaleResolved { .. })
        })
        .await;
        driver.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_waits_for_first_session() {
        let directory = seeded_directory(
            vec![Player::new("V Sharma", "Batsman", 100)],
            vec![Team::new(TeamId::new("A"), "Owner A", "Pune", 500)],
        );
        let coordinator = Arc::new(AuctionCoordinator::new(fast_config(), directory.clone()));

        let driver = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run().await })
        };

        // With nobody connected the catalog must not be consumed.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = coordinator.metrics().snapshot();
        assert_eq!(
            snapshot.rounds_sold + snapshot.rounds_unsold + snapshot.rounds_skipped,
            0
        );
        assert_eq!(directory.load_unsold_players().await.unwrap().len(), 1);

        // The first connection releases the auction.
        let (team_a, _sid_a, mut rx_a) = connect(&coordinator, "A");
        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::ItemAnnounced { .. })
        })
        .await;
        coordinator.barrier().mark_ready(&team_a);
        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::RoundOpened { .. })
        })
        .await;
        let outcome = coordinator.ledger().try_raise(&team_a, 150, 500);
        assert!(matches!(outcome, RaiseOutcome::Accepted { .. }));
        expect_message(&mut rx_a, |m| {
            matches!(m, ServerMessage::SaleResolved { .. })
        })
        .await;
        driver.await.unwrap().unwrap();
    }
}
