//! Gavel Directory
//!
//! The durable store of team budgets/rosters and player sale status. The
//! coordinator is the only writer of budgets; session tasks may read
//! through this interface but never mutate.

pub mod memory;
pub mod postgres;

pub use memory::MemoryDirectory;
pub use postgres::PgDirectory;

use async_trait::async_trait;

use gavel_common::{Player, Result, RoundId, Team, TeamId};

/// Outcome of a team creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Record created.
    Created,
    /// A record with this name already exists; nothing written.
    Duplicate,
}

/// The Team/Player Directory collaborator.
///
/// Each operation is atomic at single-record granularity. `commit_sale`
/// sequences the debit, roster append, and player mark so that, taken
/// together, they represent one sale; implementations backed by a
/// transactional store should override it to make the sequence durable
/// as a unit.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Load the catalog: unsold players, in stored order. The order is
    /// fixed for the run.
    async fn load_unsold_players(&self) -> Result<Vec<Player>>;

    /// Look up a team by name.
    async fn find_team(&self, team: &TeamId) -> Result<Option<Team>>;

    /// Create a new team record.
    async fn create_team(&self, team: &Team) -> Result<CreateOutcome>;

    /// Overwrite a team's budget.
    async fn set_budget(&self, team: &TeamId, new_budget: u64) -> Result<()>;

    /// Append a won player to a team's roster.
    async fn append_to_roster(&self, team: &TeamId, player: &Player, price: u64) -> Result<()>;

    /// Mark a player sold to a team at a price.
    async fn mark_player_sold(&self, player: &str, team: &TeamId, price: u64) -> Result<()>;

    /// Mark a player as finally unsold.
    async fn mark_player_unsold(&self, player: &str) -> Result<()>;

    /// Commit one sale: debit the winner by exactly `price`, append the
    /// player to its roster, and mark the player sold.
    ///
    /// Returns the winner's remaining budget. Fails without partial
    /// effect where the backing store supports transactions.
    async fn commit_sale(
        &self,
        round: RoundId,
        team: &TeamId,
        player: &Player,
        price: u64,
    ) -> Result<u64> {
        let record = self
            .find_team(team)
            .await?
            .ok_or_else(|| gavel_common::AuctionError::UnknownTeam(team.clone()))?;
        let remaining = record.budget.checked_sub(price).ok_or_else(|| {
            gavel_common::AuctionError::Inconsistency(format!(
                "sale of {} for {} exceeds budget {} of team {} (round {})",
                player.name, price, record.budget, team, round
            ))
        })?;
        self.set_budget(team, remaining).await?;
        self.append_to_roster(team, player, price).await?;
        self.mark_player_sold(&player.name, team, price).await?;
        Ok(remaining)
    }
}
