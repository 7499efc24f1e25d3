//! In-memory directory implementation.
//!
//! Backs tests and local runs. All state lives under one lock, so the
//! sale commit is observed all-or-nothing.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use gavel_common::{AuctionError, Player, Result, RosterEntry, SaleStatus, Team, TeamId};

use crate::{CreateOutcome, Directory};

#[derive(Default)]
struct Store {
    /// Catalog in load order.
    players: Vec<Player>,
    teams: Vec<Team>,
}

impl Store {
    fn team_mut(&mut self, team: &TeamId) -> Result<&mut Team> {
        self.teams
            .iter_mut()
            .find(|t| &t.name == team)
            .ok_or_else(|| AuctionError::UnknownTeam(team.clone()))
    }

    fn player_mut(&mut self, name: &str) -> Result<&mut Player> {
        self.players
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| AuctionError::Directory(format!("player not found: {name}")))
    }
}

/// In-memory `Directory`.
#[derive(Default)]
pub struct MemoryDirectory {
    store: RwLock<Store>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory pre-seeded with a catalog.
    pub fn with_players(players: Vec<Player>) -> Self {
        Self {
            store: RwLock::new(Store {
                players,
                teams: Vec::new(),
            }),
        }
    }

    /// Seed a team record directly (test setup).
    pub fn seed_team(&self, team: Team) {
        self.store.write().teams.push(team);
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn load_unsold_players(&self) -> Result<Vec<Player>> {
        Ok(self
            .store
            .read()
            .players
            .iter()
            .filter(|p| p.status.is_auctionable())
            .cloned()
            .collect())
    }

    async fn find_team(&self, team: &TeamId) -> Result<Option<Team>> {
        Ok(self
            .store
            .read()
            .teams
            .iter()
            .find(|t| &t.name == team)
            .cloned())
    }

    async fn create_team(&self, team: &Team) -> Result<CreateOutcome> {
        let mut store = self.store.write();
        if store.teams.iter().any(|t| t.name == team.name) {
            return Ok(CreateOutcome::Duplicate);
        }
        store.teams.push(team.clone());
        Ok(CreateOutcome::Created)
    }

    async fn set_budget(&self, team: &TeamId, new_budget: u64) -> Result<()> {
        self.store.write().team_mut(team)?.budget = new_budget;
        Ok(())
    }

    async fn append_to_roster(&self, team: &TeamId, player: &Player, price: u64) -> Result<()> {
        self.store.write().team_mut(team)?.roster.push(RosterEntry {
            player: player.name.clone(),
            role: player.role.clone(),
            price,
            acquired_at: Utc::now(),
        });
        Ok(())
    }

    async fn mark_player_sold(&self, player: &str, team: &TeamId, price: u64) -> Result<()> {
        let mut store = self.store.write();
        let p = store.player_mut(player)?;
        p.status = SaleStatus::Sold;
        p.bought_by = Some(team.clone());
        p.final_price = Some(price);
        Ok(())
    }

    async fn mark_player_unsold(&self, player: &str) -> Result<()> {
        let mut store = self.store.write();
        store.player_mut(player)?.status = SaleStatus::UnsoldFinal;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_common::RoundId;

    fn catalog() -> Vec<Player> {
        vec![
            Player::new("V Sharma", "Batsman", 100),
            Player::new("A Khan", "Bowler", 200),
            Player::new("S Iyer", "All-rounder", 150),
        ]
    }

    #[tokio::test]
    async fn test_catalog_preserves_load_order() {
        let dir = MemoryDirectory::with_players(catalog());
        let players = dir.load_unsold_players().await.unwrap();
        let names: Vec<_> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["V Sharma", "A Khan", "S Iyer"]);
    }

    #[tokio::test]
    async fn test_sold_players_excluded_from_catalog() {
        let dir = MemoryDirectory::with_players(catalog());
        dir.mark_player_sold("A Khan", &TeamId::new("ROYALS"), 250)
            .await
            .unwrap();
        let players = dir.load_unsold_players().await.unwrap();
        assert_eq!(players.len(), 2);
        assert!(players.iter().all(|p| p.name != "A Khan"));
    }

    #[tokio::test]
    async fn test_create_team_duplicate() {
        let dir = MemoryDirectory::new();
        let team = Team::new(TeamId::new("ROYALS"), "R. Kapoor", "Jaipur", 500);
        assert_eq!(dir.create_team(&team).await.unwrap(), CreateOutcome::Created);
        assert_eq!(
            dir.create_team(&team).await.unwrap(),
            CreateOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_commit_sale_updates_budget_roster_and_player() {
        let dir = MemoryDirectory::with_players(catalog());
        let id = TeamId::new("ROYALS");
        dir.seed_team(Team::new(id.clone(), "R. Kapoor", "Jaipur", 500));

        let player = Player::new("V Sharma", "Batsman", 100);
        let remaining = dir
            .commit_sale(RoundId::new(), &id, &player, 150)
            .await
            .unwrap();
        assert_eq!(remaining, 350);

        let team = dir.find_team(&id).await.unwrap().unwrap();
        assert_eq!(team.budget, 350);
        assert_eq!(team.roster.len(), 1);
        assert_eq!(team.roster[0].price, 150);

        let players = dir.load_unsold_players().await.unwrap();
        assert!(players.iter().all(|p| p.name != "V Sharma"));
    }

    #[tokio::test]
    async fn test_commit_sale_over_budget_is_inconsistency() {
        let dir = MemoryDirectory::with_players(catalog());
        let id = TeamId::new("ROYALS");
        dir.seed_team(Team::new(id.clone(), "R. Kapoor", "Jaipur", 100));

        let player = Player::new("V Sharma", "Batsman", 100);
        let err = dir
            .commit_sale(RoundId::new(), &id, &player, 150)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_mark_unsold_is_final() {
        let dir = MemoryDirectory::with_players(catalog());
        dir.mark_player_unsold("S Iyer").await.unwrap();
        let players = dir.load_unsold_players().await.unwrap();
        assert!(players.iter().all(|p| p.name != "S Iyer"));
    }
}
