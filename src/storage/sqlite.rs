//! SQLite backend for the ledger.
//!
//! Money is stored as TEXT decimals, percent fields as REAL, timestamps as
//! RFC 3339 TEXT.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use super::LedgerStore;
use crate::tracking::{AggregateRow, SettledBet, TrackedBet};
use crate::types::{EngineError, Fraction};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the tables exist.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context(format!("Failed to open database {path}"))?;

        let store = Self { pool };
        store.init().await?;
        info!(path, "Ledger database ready");
        Ok(store)
    }

    /// In-memory database for tests. One connection, kept alive, since every
    /// SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_bets (
                bet_id TEXT PRIMARY KEY,
                fixture_id TEXT NOT NULL,
                league TEXT NOT NULL,
                market TEXT NOT NULL,
                selection TEXT NOT NULL,
                kickoff TEXT NOT NULL,
                odds TEXT NOT NULL,       -- Decimal stored as text
                rank_position INTEGER NOT NULL,
                units TEXT NOT NULL,
                stake TEXT NOT NULL,
                edge REAL NOT NULL,       -- fraction
                confidence REAL NOT NULL, -- fraction
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settled_bets (
                bet_id TEXT PRIMARY KEY REFERENCES tracked_bets(bet_id),
                fixture_id TEXT NOT NULL,
                league TEXT NOT NULL,
                market TEXT NOT NULL,
                selection TEXT NOT NULL,
                odds TEXT NOT NULL,
                units TEXT NOT NULL,
                stake TEXT NOT NULL,
                outcome TEXT NOT NULL,
                returned TEXT NOT NULL,
                profit_loss TEXT NOT NULL,
                settled_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS performance_aggregates (
                scope_kind TEXT NOT NULL,
                scope_key TEXT NOT NULL,
                time_bucket TEXT NOT NULL,
                bets INTEGER NOT NULL,
                wins INTEGER NOT NULL,
                losses INTEGER NOT NULL,
                voids INTEGER NOT NULL,
                total_stake TEXT NOT NULL,
                total_return TEXT NOT NULL,
                profit_loss TEXT NOT NULL,
                win_rate REAL NOT NULL, -- percent
                roi REAL NOT NULL,      -- percent
                updated_at TEXT NOT NULL,
                PRIMARY KEY (scope_kind, scope_key, time_bucket)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Ledger tables initialized");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn upsert_tracked(&self, bet: &TrackedBet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_bets (
                bet_id, fixture_id, league, market, selection, kickoff, odds,
                rank_position, units, stake, edge, confidence, recorded_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(bet_id) DO NOTHING
            "#,
        )
        .bind(&bet.bet_id)
        .bind(&bet.fixture_id)
        .bind(&bet.league)
        .bind(bet.market.as_str())
        .bind(&bet.selection)
        .bind(bet.kickoff.to_rfc3339())
        .bind(bet.odds.to_string())
        .bind(bet.rank as i64)
        .bind(bet.units.to_string())
        .bind(bet.stake.to_string())
        .bind(bet.edge.value())
        .bind(bet.confidence.value())
        .bind(bet.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context(format!("Failed to store tracked bet {}", bet.bet_id))?;

        Ok(())
    }

    async fn upsert_settlement(&self, bet: &SettledBet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settled_bets (
                bet_id, fixture_id, league, market, selection, odds, units,
                stake, outcome, returned, profit_loss, settled_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(bet_id) DO NOTHING
            "#,
        )
        .bind(&bet.bet_id)
        .bind(&bet.fixture_id)
        .bind(&bet.league)
        .bind(bet.market.as_str())
        .bind(&bet.selection)
        .bind(bet.odds.to_string())
        .bind(bet.units.to_string())
        .bind(bet.stake.to_string())
        .bind(bet.outcome.as_str())
        .bind(bet.returned.to_string())
        .bind(bet.profit_loss.to_string())
        .bind(bet.settled_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context(format!("Failed to store settlement {}", bet.bet_id))?;

        Ok(())
    }

    async fn write_aggregates(&self, rows: &[AggregateRow]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO performance_aggregates (
                    scope_kind, scope_key, time_bucket, bets, wins, losses, voids,
                    total_stake, total_return, profit_loss, win_rate, roi, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT(scope_kind, scope_key, time_bucket) DO UPDATE SET
                    bets = excluded.bets,
                    wins = excluded.wins,
                    losses = excluded.losses,
                    voids = excluded.voids,
                    total_stake = excluded.total_stake,
                    total_return = excluded.total_return,
                    profit_loss = excluded.profit_loss,
                    win_rate = excluded.win_rate,
                    roi = excluded.roi,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&row.scope_kind)
            .bind(&row.scope_key)
            .bind(&row.time_bucket)
            .bind(row.bets as i64)
            .bind(row.wins as i64)
            .bind(row.losses as i64)
            .bind(row.voids as i64)
            .bind(row.total_stake.to_string())
            .bind(row.total_return.to_string())
            .bind(row.profit_loss.to_string())
            .bind(row.win_rate.value())
            .bind(row.roi.value())
            .bind(row.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.context("Failed to commit aggregate rows")?;
        debug!(rows = rows.len(), "Aggregates written");
        Ok(rows.len())
    }

    async fn load_tracked(&self) -> Result<Vec<TrackedBet>> {
        let rows = sqlx::query("SELECT * FROM tracked_bets ORDER BY recorded_at, bet_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(tracked_from_row).collect()
    }

    async fn load_settlements(&self) -> Result<Vec<SettledBet>> {
        let rows = sqlx::query("SELECT * FROM settled_bets ORDER BY settled_at, bet_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(settled_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| EngineError::Storage(format!("bad decimal in {column}: {raw} ({e})")).into())
}

fn timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .map_err(|e| EngineError::Storage(format!("bad timestamp in {column}: {raw} ({e})")))?;
    Ok(parsed.with_timezone(&Utc))
}

fn tracked_from_row(row: &SqliteRow) -> Result<TrackedBet> {
    let market: String = row.try_get("market")?;
    let rank: i64 = row.try_get("rank_position")?;
    Ok(TrackedBet {
        bet_id: row.try_get("bet_id")?,
        fixture_id: row.try_get("fixture_id")?,
        league: row.try_get("league")?,
        market: market.parse()?,
        selection: row.try_get("selection")?,
        kickoff: timestamp(row, "kickoff")?,
        odds: decimal(row, "odds")?,
        rank: usize::try_from(rank).context("Negative rank")?,
        units: decimal(row, "units")?,
        stake: decimal(row, "stake")?,
        edge: Fraction::new(row.try_get("edge")?),
        confidence: Fraction::new(row.try_get("confidence")?),
        recorded_at: timestamp(row, "recorded_at")?,
    })
}

fn settled_from_row(row: &SqliteRow) -> Result<SettledBet> {
    let market: String = row.try_get("market")?;
    let outcome: String = row.try_get("outcome")?;
    Ok(SettledBet {
        bet_id: row.try_get("bet_id")?,
        fixture_id: row.try_get("fixture_id")?,
        league: row.try_get("league")?,
        market: market.parse()?,
        selection: row.try_get("selection")?,
        odds: decimal(row, "odds")?,
        units: decimal(row, "units")?,
        stake: decimal(row, "stake")?,
        outcome: outcome.parse()?,
        returned: decimal(row, "returned")?,
        profit_loss: decimal(row, "profit_loss")?,
        settled_at: timestamp(row, "settled_at")?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Bucketing, Ledger, RoiTracker};
    use crate::types::{MarketKind, Outcome};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn make_tracked(id: &str, league: &str) -> TrackedBet {
        TrackedBet {
            bet_id: id.to_string(),
            fixture_id: id.to_string(),
            league: league.to_string(),
            market: MarketKind::BothTeamsToScore,
            selection: "yes".to_string(),
            kickoff: Utc.with_ymd_and_hms(2026, 10, 24, 15, 0, 0).unwrap(),
            odds: dec!(1.95),
            rank: 2,
            units: dec!(2),
            stake: dec!(20),
            edge: Fraction::new(0.0725),
            confidence: Fraction::new(0.7),
            recorded_at: Utc.with_ymd_and_hms(2026, 10, 23, 9, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_tracked_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let bet = make_tracked("a", "Ligue 1");
        store.upsert_tracked(&bet).await.unwrap();
        store.upsert_tracked(&bet).await.unwrap();

        let loaded = store.load_tracked().await.unwrap();
        assert_eq!(loaded, vec![bet]);
    }

    #[tokio::test]
    async fn test_settlement_is_write_once() {
        let store = SqliteStore::in_memory().await.unwrap();
        let bet = make_tracked("a", "Ligue 1");
        store.upsert_tracked(&bet).await.unwrap();

        let at = Utc.with_ymd_and_hms(2026, 10, 24, 17, 0, 0).unwrap();
        store
            .upsert_settlement(&SettledBet::settle(&bet, Outcome::Win, at))
            .await
            .unwrap();
        store
            .upsert_settlement(&SettledBet::settle(&bet, Outcome::Loss, at))
            .await
            .unwrap();

        let settled = store.load_settlements().await.unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].outcome, Outcome::Win);
        assert_eq!(settled[0].returned, dec!(39));
        assert_eq!(settled[0].settled_at, at);
    }

    #[tokio::test]
    async fn test_aggregates_upserted_by_key() {
        let store = SqliteStore::in_memory().await.unwrap();
        let a = make_tracked("a", "Ligue 1");
        let b = make_tracked("b", "Eredivisie");
        let tracker = RoiTracker::from_ledger(dec!(10), Ledger::from_parts(vec![a, b], vec![]));
        let now = Utc.with_ymd_and_hms(2026, 10, 25, 9, 0, 0).unwrap();

        tracker.settle_by_id("a", Outcome::Win, now).unwrap();
        let first = tracker.aggregate_rows(Bucketing::All, now);
        assert_eq!(store.write_aggregates(&first).await.unwrap(), 3);

        tracker.settle_by_id("b", Outcome::Loss, now).unwrap();
        let second = tracker.aggregate_rows(Bucketing::All, now);
        assert_eq!(store.write_aggregates(&second).await.unwrap(), 4);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM performance_aggregates")
            .fetch_one(store.pool())
            .await
            .unwrap();
        // overall + 1 market + 2 leagues
        assert_eq!(count.0, 4);

        let (bets, roi): (i64, f64) = sqlx::query_as(
            "SELECT bets, roi FROM performance_aggregates WHERE scope_kind = 'overall' AND time_bucket = 'all'",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(bets, 2);
        // stake 40, return 39
        assert_eq!(roi, -2.5);
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("fixora_test_{}.db", uuid::Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();

        let store = SqliteStore::connect(&path).await.unwrap();
        store.upsert_tracked(&make_tracked("a", "EPL")).await.unwrap();
        store.pool().close().await;

        let reopened = SqliteStore::connect(&path).await.unwrap();
        assert_eq!(reopened.load_tracked().await.unwrap().len(), 1);
        reopened.pool().close().await;
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_decimal_is_storage_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_tracked(&make_tracked("a", "EPL")).await.unwrap();
        sqlx::query("UPDATE tracked_bets SET odds = 'abc' WHERE bet_id = 'a'")
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.load_tracked().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Storage(_))
        ));
    }
}
