//! Repository trait for bot records and its PostgreSQL implementation.
//!
//! The orchestrator only talks to storage through [`BotRepository`], so the
//! fleet manager and bot actors can run against PostgreSQL in production and
//! against [`InMemoryBotRepository`](super::memory::InMemoryBotRepository) in
//! tests and dry runs.
//!
//! The PostgreSQL schema is owned outside this crate. The queries expect:
//!
//! ```sql
//! CREATE TABLE bots (
//!     id          BIGSERIAL PRIMARY KEY,
//!     server_id   TEXT NOT NULL,
//!     username    TEXT NOT NULL,
//!     status      TEXT NOT NULL,
//!     pos_x       DOUBLE PRECISION NOT NULL DEFAULT 0,
//!     pos_y       DOUBLE PRECISION NOT NULL DEFAULT 64,
//!     pos_z       DOUBLE PRECISION NOT NULL DEFAULT 0,
//!     health      REAL NOT NULL DEFAULT 100,
//!     food        REAL NOT NULL DEFAULT 100,
//!     behavior    TEXT NOT NULL DEFAULT 'idle',
//!     ai_enabled  BOOLEAN NOT NULL,
//!     duration    TEXT NOT NULL,
//!     expires_at  TIMESTAMPTZ,
//!     created_at  TIMESTAMPTZ NOT NULL
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{
    errors::{StoreError, StoreResult},
    timeouts::{with_default_timeout, with_long_timeout},
};
use crate::bot::{BotId, BotRecord, BotStatus, BotUpdate, DurationToken, NewBotRecord, Position};

/// Trait for bot record persistence
#[async_trait]
pub trait BotRepository: Send + Sync {
    /// Insert a new record with status `connecting`, returning its id
    async fn create_bot(&self, record: &NewBotRecord) -> StoreResult<BotId>;

    /// Apply a partial update
    async fn update_bot(&self, id: BotId, update: &BotUpdate) -> StoreResult<()>;

    /// Find a record by id
    async fn get_bot(&self, id: BotId) -> StoreResult<Option<BotRecord>>;

    /// All records of a server, oldest first
    async fn list_bots(&self, server_id: &str) -> StoreResult<Vec<BotRecord>>;

    /// Remove a record
    async fn delete_bot(&self, id: BotId) -> StoreResult<()>;

    /// Mark every `online`/`connecting` record whose id is not in `live` as
    /// `offline`, returning how many changed
    async fn mark_stale_offline(&self, live: &[BotId]) -> StoreResult<u64>;
}

/// PostgreSQL implementation of `BotRepository`
#[derive(Clone)]
pub struct PgBotRepository {
    pool: PgPool,
}

impl PgBotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, server_id, username, status, pos_x, pos_y, pos_z, \
     health, food, behavior, ai_enabled, duration, expires_at, created_at FROM bots";

fn decode_error(e: crate::bot::ParseValueError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

fn record_from_row(row: &PgRow) -> Result<BotRecord, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let duration: String = row.try_get("duration")?;

    Ok(BotRecord {
        id: row.try_get("id")?,
        server_id: row.try_get("server_id")?,
        username: row.try_get("username")?,
        status: status.parse().map_err(decode_error)?,
        position: Position::new(
            row.try_get("pos_x")?,
            row.try_get("pos_y")?,
            row.try_get("pos_z")?,
        ),
        health: row.try_get("health")?,
        food: row.try_get("food")?,
        behavior: row.try_get("behavior")?,
        ai_enabled: row.try_get("ai_enabled")?,
        duration: duration.parse::<DurationToken>().map_err(decode_error)?,
        expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl BotRepository for PgBotRepository {
    async fn create_bot(&self, record: &NewBotRecord) -> StoreResult<BotId> {
        let row = with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO bots (server_id, username, status, ai_enabled, duration, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                "#,
            )
            .bind(&record.server_id)
            .bind(&record.username)
            .bind(BotStatus::Connecting.to_string())
            .bind(record.ai_enabled)
            .bind(record.duration.as_str())
            .bind(record.expires_at)
            .bind(record.created_at)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(row.try_get("id")?)
    }

    async fn update_bot(&self, id: BotId, update: &BotUpdate) -> StoreResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        let position = update.position;
        let result = with_default_timeout(
            sqlx::query(
                r#"
                UPDATE bots SET
                    status = COALESCE($2, status),
                    pos_x = COALESCE($3, pos_x),
                    pos_y = COALESCE($4, pos_y),
                    pos_z = COALESCE($5, pos_z),
                    health = COALESCE($6, health),
                    food = COALESCE($7, food),
                    behavior = COALESCE($8, behavior)
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(update.status.map(|s| s.to_string()))
            .bind(position.map(|p| p.x))
            .bind(position.map(|p| p.y))
            .bind(position.map(|p| p.z))
            .bind(update.health)
            .bind(update.food)
            .bind(update.behavior.as_deref())
            .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn get_bot(&self, id: BotId) -> StoreResult<Option<BotRecord>> {
        let query = format!("{SELECT_COLUMNS} WHERE id = $1");
        let row = with_default_timeout(sqlx::query(&query).bind(id).fetch_optional(&self.pool))
            .await?;

        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn list_bots(&self, server_id: &str) -> StoreResult<Vec<BotRecord>> {
        let query = format!("{SELECT_COLUMNS} WHERE server_id = $1 ORDER BY id ASC");
        let rows = with_default_timeout(
            sqlx::query(&query)
                .bind(server_id)
                .fetch_all(&self.pool),
        )
        .await?;

        Ok(rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn delete_bot(&self, id: BotId) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query("DELETE FROM bots WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn mark_stale_offline(&self, live: &[BotId]) -> StoreResult<u64> {
        let result = with_long_timeout(
            sqlx::query(
                r#"
                UPDATE bots SET status = 'offline', behavior = 'idle'
                WHERE status IN ('online', 'connecting') AND NOT (id = ANY($1))
                "#,
            )
            .bind(live)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected())
    }
}
