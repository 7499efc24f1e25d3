//! Postgres-backed directory implementation.
//!
//! Schema (see `migrations/0001_init.sql`):
//! - `players(name, role, base_price, status, bought_by, final_price)`
//! - `teams(name, owner, city, budget)`
//! - `roster(team_name, player_name, role, price, acquired_at)`

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, instrument};

use gavel_common::{
    AuctionError, Player, Result, RosterEntry, RoundId, SaleStatus, Team, TeamId,
};

use crate::{CreateOutcome, Directory};

/// Postgres `Directory` backed by a `sqlx` connection pool.
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the given database URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| AuctionError::Directory(e.to_string()))?;
        Ok(Self::new(pool))
    }

    fn status_from_column(status: &str) -> Result<SaleStatus> {
        match status {
            "UNSOLD" => Ok(SaleStatus::Unsold),
            "SOLD" => Ok(SaleStatus::Sold),
            "UNSOLD_FINAL" => Ok(SaleStatus::UnsoldFinal),
            other => Err(AuctionError::Directory(format!(
                "unknown sale status in store: {other}"
            ))),
        }
    }

    fn price_to_db(price: u64) -> Result<i64> {
        i64::try_from(price)
            .map_err(|_| AuctionError::Directory(format!("price out of range: {price}")))
    }

    fn price_from_db(price: i64) -> Result<u64> {
        u64::try_from(price)
            .map_err(|_| AuctionError::Directory(format!("negative amount in store: {price}")))
    }

    async fn load_roster(&self, team: &TeamId) -> Result<Vec<RosterEntry>> {
        let rows = sqlx::query(
            "SELECT player_name, role, price, acquired_at FROM roster \
             WHERE team_name = $1 ORDER BY acquired_at",
        )
        .bind(team.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuctionError::Directory(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                Ok(RosterEntry {
                    player: row
                        .try_get("player_name")
                        .map_err(|e| AuctionError::Directory(e.to_string()))?,
                    role: row
                        .try_get("role")
                        .map_err(|e| AuctionError::Directory(e.to_string()))?,
                    price: Self::price_from_db(
                        row.try_get("price")
                            .map_err(|e| AuctionError::Directory(e.to_string()))?,
                    )?,
                    acquired_at: row
                        .try_get("acquired_at")
                        .map_err(|e| AuctionError::Directory(e.to_string()))?,
                })
            })
            .collect()
    }
}

async fn set_budget_tx(
    tx: &mut Transaction<'_, Postgres>,
    team: &TeamId,
    new_budget: i64,
) -> Result<()> {
    let result = sqlx::query("UPDATE teams SET budget = $1 WHERE name = $2")
        .bind(new_budget)
        .bind(team.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| AuctionError::Directory(e.to_string()))?;
    if result.rows_affected() == 0 {
        return Err(AuctionError::UnknownTeam(team.clone()));
    }
    Ok(())
}

#[async_trait]
impl Directory for PgDirectory {
    #[instrument(skip(self))]
    async fn load_unsold_players(&self) -> Result<Vec<Player>> {
        let rows = sqlx::query(
            "SELECT name, role, base_price, status FROM players \
             WHERE status = 'UNSOLD' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuctionError::Directory(e.to_string()))?;

        let players = rows
            .into_iter()
            .map(|row| {
                let status: String = row
                    .try_get("status")
                    .map_err(|e| AuctionError::Directory(e.to_string()))?;
                Ok(Player {
                    name: row
                        .try_get("name")
                        .map_err(|e| AuctionError::Directory(e.to_string()))?,
                    role: row
                        .try_get("role")
                        .map_err(|e| AuctionError::Directory(e.to_string()))?,
                    base_price: Self::price_from_db(
                        row.try_get("base_price")
                            .map_err(|e| AuctionError::Directory(e.to_string()))?,
                    )?,
                    status: Self::status_from_column(&status)?,
                    bought_by: None,
                    final_price: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(count = players.len(), "Catalog loaded");
        Ok(players)
    }

    async fn find_team(&self, team: &TeamId) -> Result<Option<Team>> {
        let row = sqlx::query("SELECT name, owner, city, budget FROM teams WHERE name = $1")
            .bind(team.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuctionError::Directory(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let name: String = row
            .try_get("name")
            .map_err(|e| AuctionError::Directory(e.to_string()))?;
        let budget: i64 = row
            .try_get("budget")
            .map_err(|e| AuctionError::Directory(e.to_string()))?;

        Ok(Some(Team {
            name: TeamId::new(name),
            owner: row
                .try_get("owner")
                .map_err(|e| AuctionError::Directory(e.to_string()))?,
            city: row
                .try_get("city")
                .map_err(|e| AuctionError::Directory(e.to_string()))?,
            budget: Self::price_from_db(budget)?,
            roster: self.load_roster(team).await?,
        }))
    }

    async fn create_team(&self, team: &Team) -> Result<CreateOutcome> {
        let result = sqlx::query(
            "INSERT INTO teams (name, owner, city, budget) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(team.name.as_str())
        .bind(&team.owner)
        .bind(&team.city)
        .bind(Self::price_to_db(team.budget)?)
        .execute(&self.pool)
        .await
        .map_err(|e| AuctionError::Directory(e.to_string()))?;

        if result.rows_affected() == 0 {
            Ok(CreateOutcome::Duplicate)
        } else {
            info!(team = %team.name, budget = team.budget, "Team created");
            Ok(CreateOutcome::Created)
        }
    }

    async fn set_budget(&self, team: &TeamId, new_budget: u64) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuctionError::Directory(e.to_string()))?;
        set_budget_tx(&mut tx, team, Self::price_to_db(new_budget)?).await?;
        tx.commit()
            .await
            .map_err(|e| AuctionError::Directory(e.to_string()))
    }

    async fn append_to_roster(&self, team: &TeamId, player: &Player, price: u64) -> Result<()> {
        sqlx::query(
            "INSERT INTO roster (team_name, player_name, role, price, acquired_at) \
             VALUES ($1, $2, $3, $4, NOW())",
        )
        .bind(team.as_str())
        .bind(&player.name)
        .bind(&player.role)
        .bind(Self::price_to_db(price)?)
        .execute(&self.pool)
        .await
        .map_err(|e| AuctionError::Directory(e.to_string()))?;
        Ok(())
    }

    async fn mark_player_sold(&self, player: &str, team: &TeamId, price: u64) -> Result<()> {
        sqlx::query(
            "UPDATE players SET status = 'SOLD', bought_by = $1, final_price = $2 \
             WHERE name = $3",
        )
        .bind(team.as_str())
        .bind(Self::price_to_db(price)?)
        .bind(player)
        .execute(&self.pool)
        .await
        .map_err(|e| AuctionError::Directory(e.to_string()))?;
        Ok(())
    }

    async fn mark_player_unsold(&self, player: &str) -> Result<()> {
        sqlx::query("UPDATE players SET status = 'UNSOLD_FINAL' WHERE name = $1")
            .bind(player)
            .execute(&self.pool)
            .await
            .map_err(|e| AuctionError::Directory(e.to_string()))?;
        Ok(())
    }

    /// Transactional sale commit: debit, roster append, and player mark
    /// become durable together or not at all.
    #[instrument(skip(self, player), fields(round = %round, team = %team, player = %player.name))]
    async fn commit_sale(
        &self,
        round: RoundId,
        team: &TeamId,
        player: &Player,
        price: u64,
    ) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuctionError::Directory(e.to_string()))?;

        let row = sqlx::query("SELECT budget FROM teams WHERE name = $1 FOR UPDATE")
            .bind(team.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AuctionError::Directory(e.to_string()))?
            .ok_or_else(|| AuctionError::UnknownTeam(team.clone()))?;
        let budget = Self::price_from_db(
            row.try_get("budget")
                .map_err(|e| AuctionError::Directory(e.to_string()))?,
        )?;

        let remaining = budget.checked_sub(price).ok_or_else(|| {
            AuctionError::Inconsistency(format!(
                "sale of {} for {} exceeds budget {} of team {} (round {})",
                player.name, price, budget, team, round
            ))
        })?;

        set_budget_tx(&mut tx, team, Self::price_to_db(remaining)?).await?;

        sqlx::query(
            "INSERT INTO roster (team_name, player_name, role, price, acquired_at) \
             VALUES ($1, $2, $3, $4, NOW())",
        )
        .bind(team.as_str())
        .bind(&player.name)
        .bind(&player.role)
        .bind(Self::price_to_db(price)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| AuctionError::Directory(e.to_string()))?;

        sqlx::query(
            "UPDATE players SET status = 'SOLD', bought_by = $1, final_price = $2 \
             WHERE name = $3",
        )
        .bind(team.as_str())
        .bind(Self::price_to_db(price)?)
        .bind(&player.name)
        .execute(&mut *tx)
        .await
        .map_err(|e| AuctionError::Directory(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AuctionError::Directory(e.to_string()))?;

        info!(amount = price, remaining, "Sale committed");
        Ok(remaining)
    }
}
