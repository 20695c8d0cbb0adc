//! Accountant — records surfaced bets, applies settlements and keeps the
//! persisted aggregate tables current.
//!
//! The in-memory [`RoiTracker`] validates every change first; only accepted
//! changes reach the store, so a rejected settlement never touches the
//! durable aggregates. A settlement is written to the store before the
//! tracker applies it: if the write fails, the tracker is unchanged and the
//! same call can simply be retried.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::CycleReport;
use crate::storage::LedgerStore;
use crate::tracking::{Bucketing, RoiTracker, SettledBet};
use crate::types::{EngineError, Outcome};

/// What happened to the surfaced bets of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackingSummary {
    pub recorded: usize,
    pub already_tracked: usize,
    /// Bet ids already tracked on different terms; left untouched.
    pub conflicts: Vec<String>,
}

pub struct Accountant<S: LedgerStore> {
    tracker: RoiTracker,
    store: S,
    /// Held from validation to apply, so the store and the tracker agree on
    /// which outcome landed first.
    settle_lock: Mutex<()>,
}

impl<S: LedgerStore> Accountant<S> {
    pub fn new(tracker: RoiTracker, store: S) -> Self {
        Self {
            tracker,
            store,
            settle_lock: Mutex::new(()),
        }
    }

    pub fn tracker(&self) -> &RoiTracker {
        &self.tracker
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record every surfaced bet of a cycle.
    pub async fn track_cycle(&self, report: &CycleReport) -> Result<TrackingSummary> {
        let mut summary = TrackingSummary::default();

        for ranked in report.ranked() {
            match self.tracker.record_bet(ranked) {
                Ok(Some(tracked)) => {
                    self.store.upsert_tracked(&tracked).await?;
                    summary.recorded += 1;
                }
                Ok(None) => summary.already_tracked += 1,
                Err(EngineError::DuplicateBet(bet_id)) => summary.conflicts.push(bet_id),
                Err(e) => return Err(e.into()),
            }
        }

        if !summary.conflicts.is_empty() {
            warn!(
                conflicts = summary.conflicts.len(),
                "Some surfaced bets were already tracked on different terms"
            );
        }
        info!(
            recorded = summary.recorded,
            already_tracked = summary.already_tracked,
            "Cycle tracked"
        );
        Ok(summary)
    }

    /// Settle one bet, persist it and refresh the aggregate tables.
    /// `DanglingSettlement` and `ConflictingSettlement` propagate unchanged.
    /// A failed store write leaves the tracker untouched.
    pub async fn settle(
        &self,
        bet_id: &str,
        outcome: Outcome,
        settled_at: DateTime<Utc>,
    ) -> Result<SettledBet> {
        let _guard = self.settle_lock.lock().await;
        let pending = self.tracker.preview_settlement(bet_id, outcome, settled_at)?;
        self.store.upsert_settlement(&pending).await?;
        let settled = self.tracker.settle_by_id(bet_id, outcome, settled_at)?;
        self.refresh_aggregates(Utc::now()).await?;
        Ok(settled)
    }

    /// Recompute every aggregate row from the ledger and upsert it, both for
    /// all time and per ISO week.
    pub async fn refresh_aggregates(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut rows = self.tracker.aggregate_rows(Bucketing::All, now);
        rows.extend(self.tracker.aggregate_rows(Bucketing::IsoWeek, now));
        let written = self.store.write_aggregates(&rows).await?;
        info!(rows = written, "Aggregates refreshed");
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
