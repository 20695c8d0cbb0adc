//! Core engine — the select → window → rank cycle.
//!
//! One cycle takes a batch of candidates, runs selection over the whole
//! batch, then ranks each kickoff-day window. Ranking only starts once every
//! candidate has been through selection.

pub mod accountant;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::config::AppConfig;
use crate::strategy::ranker::{RankedBet, Recommendation, UnitRanker};
use crate::strategy::{RejectionRecord, RejectionSummary, ValueBetSelector};
use crate::types::{Candidate, EngineError};

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Ranked output for one kickoff day.
#[derive(Debug, Clone, Serialize)]
pub struct RankedWindow {
    pub date: NaiveDate,
    /// Value bets in the window before the top-five cut.
    pub accepted: usize,
    pub bets: Vec<RankedBet>,
}

/// Summary of a complete select → rank cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub candidates: usize,
    pub accepted: usize,
    pub surfaced: usize,
    pub windows: Vec<RankedWindow>,
    pub rejections: Vec<RejectionRecord>,
    pub summary: RejectionSummary,
    pub timestamp: DateTime<Utc>,
}

impl CycleReport {
    /// Every surfaced bet, window by window, in rank order.
    pub fn ranked(&self) -> impl Iterator<Item = &RankedBet> {
        self.windows.iter().flat_map(|w| w.bets.iter())
    }

    /// Delivery view of every surfaced bet.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.ranked().map(RankedBet::recommendation).collect()
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} candidates, {} value bets, {} surfaced, {} rejected",
            self.candidates, self.accepted, self.surfaced, self.summary.total
        )?;
        for window in &self.windows {
            writeln!(f, "{} ({} value bets)", window.date, window.accepted)?;
            for bet in &window.bets {
                writeln!(f, "  {bet}")?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ValueEngine {
    selector: ValueBetSelector,
    ranker: UnitRanker,
    offset: FixedOffset,
}

impl ValueEngine {
    pub fn new(selector: ValueBetSelector, offset: FixedOffset) -> Self {
        Self {
            selector,
            ranker: UnitRanker,
            offset,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, EngineError> {
        Ok(Self::new(
            ValueBetSelector::new(&config.engine),
            config.ranking.offset()?,
        ))
    }

    pub fn selector(&self) -> &ValueBetSelector {
        &self.selector
    }

    /// Run one cycle over a batch of candidates.
    pub fn run_cycle(&self, candidates: &[Candidate]) -> CycleReport {
        let selection = self.selector.select_batch(candidates);
        let summary = selection.summary();
        let accepted = selection.accepted.len();

        let windows: Vec<RankedWindow> = UnitRanker::group_windows(selection.accepted, self.offset)
            .into_iter()
            .map(|(date, bets)| RankedWindow {
                date,
                accepted: bets.len(),
                bets: self.ranker.rank(&bets),
            })
            .collect();

        let surfaced = windows.iter().map(|w| w.bets.len()).sum();
        for window in &windows {
            if let Some(top) = window.bets.first() {
                info!(
                    date = %window.date,
                    value_bets = window.accepted,
                    surfaced = window.bets.len(),
                    top = %top,
                    "Window ranked"
                );
            }
        }

        info!(
            candidates = candidates.len(),
            accepted,
            surfaced,
            rejected = summary.total,
            windows = windows.len(),
            "Cycle complete"
        );

        CycleReport {
            candidates: candidates.len(),
            accepted,
            surfaced,
            windows,
            rejections: selection.rejections,
            summary,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
