//! Persistence layer.
//!
//! [`LedgerStore`] is the durable side of ROI tracking: tracked bets,
//! settlements and aggregate rows. Two backends: SQLite ([`sqlite`]) and a
//! single JSON ledger file ([`JsonLedgerStore`]) for running without a
//! database.

pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::tracking::{AggregateRow, Ledger, SettledBet, TrackedBet};

pub use sqlite::SqliteStore;

/// Default ledger file path.
const DEFAULT_LEDGER_FILE: &str = "fixora_ledger.json";

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a tracked bet, keeping the stored row if the id exists.
    async fn upsert_tracked(&self, bet: &TrackedBet) -> Result<()>;

    /// Insert a settlement keyed by bet id. A retry of the same settlement
    /// leaves the stored row untouched.
    async fn upsert_settlement(&self, bet: &SettledBet) -> Result<()>;

    /// Replace aggregate rows keyed by (scope kind, scope key, time bucket).
    /// Returns the number of rows written.
    async fn write_aggregates(&self, rows: &[AggregateRow]) -> Result<usize>;

    async fn load_tracked(&self) -> Result<Vec<TrackedBet>>;

    async fn load_settlements(&self) -> Result<Vec<SettledBet>>;
}

/// Rebuild the in-memory ledger from a store.
pub async fn load_ledger_from<S: LedgerStore + ?Sized>(store: &S) -> Result<Ledger> {
    let tracked = store.load_tracked().await?;
    let settled = store.load_settlements().await?;
    info!(
        tracked = tracked.len(),
        settled = settled.len(),
        "Ledger loaded from store"
    );
    Ok(Ledger::from_parts(tracked, settled))
}

// ---------------------------------------------------------------------------
// JSON ledger file
// ---------------------------------------------------------------------------

/// On-disk layout of the JSON backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerFile {
    #[serde(default)]
    pub ledger: Ledger,
    #[serde(default)]
    pub aggregates: Vec<AggregateRow>,
}

/// Save a ledger file as pretty JSON.
pub fn save_ledger(file: &LedgerFile, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_LEDGER_FILE);
    let json = serde_json::to_string_pretty(file).context("Failed to serialise ledger")?;

    std::fs::write(path, &json).context(format!("Failed to write ledger to {path}"))?;

    debug!(
        path,
        tracked = file.ledger.tracked.len(),
        settled = file.ledger.settled.len(),
        "Ledger saved"
    );
    Ok(())
}

/// Load a ledger file. Returns None if the file doesn't exist (fresh start).
pub fn load_ledger(path: Option<&str>) -> Result<Option<LedgerFile>> {
    let path = path.unwrap_or(DEFAULT_LEDGER_FILE);

    if !Path::new(path).exists() {
        info!(path, "No ledger found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read ledger from {path}"))?;

    let file: LedgerFile =
        serde_json::from_str(&json).context(format!("Failed to parse ledger from {path}"))?;

    info!(
        path,
        tracked = file.ledger.tracked.len(),
        settled = file.ledger.settled.len(),
        "Ledger loaded from disk"
    );

    Ok(Some(file))
}

/// Delete the ledger file (for testing or reset).
pub fn delete_ledger(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_LEDGER_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete ledger file {path}"))?;
    }
    Ok(())
}

/// [`LedgerStore`] backed by one JSON file, rewritten on every change.
pub struct JsonLedgerStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn path_str(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    fn read(&self) -> Result<LedgerFile> {
        Ok(load_ledger(Some(&self.path_str()))?.unwrap_or_default())
    }

    fn write(&self, file: &LedgerFile) -> Result<()> {
        save_ledger(file, Some(&self.path_str()))
    }
}

#[async_trait]
impl LedgerStore for JsonLedgerStore {
    async fn upsert_tracked(&self, bet: &TrackedBet) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.read()?;
        if !file.ledger.tracked.contains_key(&bet.bet_id) {
            file.ledger.tracked.insert(bet.bet_id.clone(), bet.clone());
            self.write(&file)?;
        }
        Ok(())
    }

    async fn upsert_settlement(&self, bet: &SettledBet) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.read()?;
        if !file.ledger.settled.contains_key(&bet.bet_id) {
            file.ledger.settled.insert(bet.bet_id.clone(), bet.clone());
            self.write(&file)?;
        }
        Ok(())
    }

    async fn write_aggregates(&self, rows: &[AggregateRow]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut file = self.read()?;

        let mut keyed: BTreeMap<(String, String, String), AggregateRow> =
            file.aggregates.drain(..).map(|r| (r.key(), r)).collect();
        for row in rows {
            keyed.insert(row.key(), row.clone());
        }
        file.aggregates = keyed.into_values().collect();

        self.write(&file)?;
        Ok(rows.len())
    }

    async fn load_tracked(&self) -> Result<Vec<TrackedBet>> {
        let _guard = self.lock.lock().await;
        Ok(self.read()?.ledger.tracked.into_values().collect())
    }

    async fn load_settlements(&self) -> Result<Vec<SettledBet>> {
        let _guard = self.lock.lock().await;
        Ok(self.read()?.ledger.settled.into_values().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Bucketing, RoiTracker};
    use crate::types::{Fraction, MarketKind, Outcome};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("fixora_test_ledger_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn make_tracked(id: &str) -> TrackedBet {
        TrackedBet {
            bet_id: id.to_string(),
            fixture_id: "1001".to_string(),
            league: "EPL".to_string(),
            market: MarketKind::OverUnderGoals,
            selection: "over_2_5".to_string(),
            kickoff: Utc.with_ymd_and_hms(2026, 10, 24, 15, 0, 0).unwrap(),
            odds: dec!(2.1),
            rank: 1,
            units: dec!(3),
            stake: dec!(30),
            edge: Fraction::new(0.12),
            confidence: Fraction::new(0.8),
            recorded_at: Utc.with_ymd_and_hms(2026, 10, 23, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path();
        let mut file = LedgerFile::default();
        let bet = make_tracked("a");
        file.ledger.tracked.insert(bet.bet_id.clone(), bet.clone());
        save_ledger(&file, Some(&path)).unwrap();

        let loaded = load_ledger(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.ledger.tracked.get("a"), Some(&bet));
        assert!(loaded.aggregates.is_empty());

        delete_ledger(Some(&path)).unwrap();
    }

    #[test]
    fn test_load_nonexistent() {
        let path = temp_path();
        assert!(load_ledger(Some(&path)).unwrap().is_none());
    }

    #[test]
    fn test_delete_ledger() {
        let path = temp_path();
        save_ledger(&LedgerFile::default(), Some(&path)).unwrap();
        assert!(Path::new(&path).exists());

        delete_ledger(Some(&path)).unwrap();
        assert!(!Path::new(&path).exists());
        assert!(delete_ledger(Some(&path)).is_ok());
    }

    #[tokio::test]
    async fn test_json_store_settlement_is_write_once() {
        let path = temp_path();
        let store = JsonLedgerStore::new(&path);
        let tracked = make_tracked("a");
        store.upsert_tracked(&tracked).await.unwrap();

        let at = Utc.with_ymd_and_hms(2026, 10, 24, 18, 0, 0).unwrap();
        let win = SettledBet::settle(&tracked, Outcome::Win, at);
        let loss = SettledBet::settle(&tracked, Outcome::Loss, at);
        store.upsert_settlement(&win).await.unwrap();
        store.upsert_settlement(&loss).await.unwrap();

        let settled = store.load_settlements().await.unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].outcome, Outcome::Win);
        assert_eq!(settled[0].returned, dec!(63));

        delete_ledger(Some(&path)).unwrap();
    }

    #[tokio::test]
    async fn test_json_store_aggregates_replace_by_key() {
        let path = temp_path();
        let store = JsonLedgerStore::new(&path);
        let tracked = make_tracked("a");
        store.upsert_tracked(&tracked).await.unwrap();

        let ledger = load_ledger_from(&store).await.unwrap();
        let tracker = RoiTracker::from_ledger(dec!(10), ledger);
        let now = Utc.with_ymd_and_hms(2026, 10, 25, 9, 0, 0).unwrap();
        tracker.settle_by_id("a", Outcome::Win, now).unwrap();

        let rows = tracker.aggregate_rows(Bucketing::All, now);
        assert_eq!(store.write_aggregates(&rows).await.unwrap(), 3);
        assert_eq!(store.write_aggregates(&rows).await.unwrap(), 3);
        let file = load_ledger(Some(&path)).unwrap().unwrap();
        assert_eq!(file.aggregates.len(), 3);
        // one settled bet: every scope carries the same ROI
        assert!(file.aggregates.iter().all(|r| r.roi == rows[0].roi));

        delete_ledger(Some(&path)).unwrap();
    }

    #[test]
    fn test_load_ledger_from_store_blocking() {
        let path = temp_path();
        let store = JsonLedgerStore::new(&path);
        tokio_test::block_on(store.upsert_tracked(&make_tracked("b"))).unwrap();

        let ledger = tokio_test::block_on(load_ledger_from(&store)).unwrap();
        assert_eq!(ledger.tracked.len(), 1);
        assert!(ledger.settled.is_empty());

        delete_ledger(Some(&path)).unwrap();
    }
}
