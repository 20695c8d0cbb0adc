//! Performance aggregation over settled bets.
//!
//! [`PerformanceAggregate::fold`] is the only place win rate and ROI are
//! computed. Both leave here percent-scaled and are never rescaled downstream.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::SettledBet;
use crate::types::{Fraction, MarketKind, Outcome, Percent};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Canonical league key, trimmed and lowercased. Scope matching, grouping
/// and persisted row keys all go through it, so "EPL" and "epl" are one
/// league.
pub fn league_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Which settled bets an aggregate covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum Scope {
    Overall,
    Market(MarketKind),
    League(String),
    /// Settlement time in `[from, to)`.
    Window {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl Scope {
    pub fn matches(&self, bet: &SettledBet) -> bool {
        match self {
            Scope::Overall => true,
            Scope::Market(kind) => bet.market == *kind,
            Scope::League(league) => league_key(&bet.league) == league_key(league),
            Scope::Window { from, to } => bet.settled_at >= *from && bet.settled_at < *to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Scope::Overall => "overall",
            Scope::Market(_) => "market",
            Scope::League(_) => "league",
            Scope::Window { .. } => "window",
        }
    }

    pub fn key(&self) -> String {
        match self {
            Scope::Overall => "all".to_string(),
            Scope::Market(kind) => kind.as_str().to_string(),
            Scope::League(league) => league_key(league),
            Scope::Window { from, to } => format!("{}..{}", from.to_rfc3339(), to.to_rfc3339()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

/// Parse `overall`, `market:<kind>` or `league:<name>`.
impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("overall") || s.eq_ignore_ascii_case("all") {
            return Ok(Scope::Overall);
        }
        match s.split_once(':') {
            Some((kind, key)) if kind.eq_ignore_ascii_case("market") => {
                Ok(Scope::Market(key.parse()?))
            }
            Some((kind, key)) if kind.eq_ignore_ascii_case("league") && !key.trim().is_empty() => {
                Ok(Scope::League(key.trim().to_string()))
            }
            _ => Err(anyhow::anyhow!(
                "Unknown scope: {s} (expected overall, market:<kind> or league:<name>)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAggregate {
    pub scope: Scope,
    /// Every distinct settled bet in scope, voids included.
    pub bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub voids: usize,
    pub total_stake: Decimal,
    pub total_return: Decimal,
    pub profit_loss: Decimal,
    /// `100 * wins / bets`.
    pub win_rate: Percent,
    /// `100 * (total_return - total_stake) / total_stake`.
    pub roi: Percent,
}

impl PerformanceAggregate {
    /// Pure fold over the settled bets matching `scope`. Duplicate bet ids
    /// count once, so folding a list that repeats entries gives the same
    /// result as folding it deduplicated.
    pub fn fold<'a>(scope: Scope, settled: impl IntoIterator<Item = &'a SettledBet>) -> Self {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut bets = 0usize;
        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut voids = 0usize;
        let mut total_stake = Decimal::ZERO;
        let mut total_return = Decimal::ZERO;

        for bet in settled {
            if !scope.matches(bet) || !seen.insert(bet.bet_id.as_str()) {
                continue;
            }
            bets += 1;
            match bet.outcome {
                Outcome::Win => wins += 1,
                Outcome::Loss => losses += 1,
                Outcome::Void => voids += 1,
            }
            total_stake += bet.stake;
            total_return += bet.returned;
        }

        let profit_loss = total_return - total_stake;
        let win_rate = Fraction::from_ratio(wins as f64, bets as f64).to_percent().rounded(2);
        let roi = Fraction::from_ratio(
            profit_loss.to_f64().unwrap_or(0.0),
            total_stake.to_f64().unwrap_or(0.0),
        )
        .to_percent()
        .rounded(2);

        Self {
            scope,
            bets,
            wins,
            losses,
            voids,
            total_stake,
            total_return,
            profit_loss,
            win_rate,
            roi,
        }
    }

    /// Enough bets to be worth reporting.
    pub fn is_significant(&self, min_bets: usize) -> bool {
        self.bets >= min_bets
    }
}

impl fmt::Display for PerformanceAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} bets ({}W/{}L/{}V), staked {}, P/L {}, win rate {}, ROI {}",
            self.scope,
            self.bets,
            self.wins,
            self.losses,
            self.voids,
            self.total_stake,
            self.profit_loss,
            self.win_rate,
            self.roi
        )
    }
}

// ---------------------------------------------------------------------------
// Persistence rows
// ---------------------------------------------------------------------------

/// How settled bets are split into time buckets for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucketing {
    /// One bucket, `all`.
    All,
    /// ISO week of settlement, e.g. `2026-W43`.
    IsoWeek,
}

impl Bucketing {
    pub fn bucket_for(self, at: DateTime<Utc>) -> String {
        match self {
            Bucketing::All => "all".to_string(),
            Bucketing::IsoWeek => iso_week_bucket(at),
        }
    }
}

pub fn iso_week_bucket(at: DateTime<Utc>) -> String {
    let week = at.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Durable aggregate record keyed by (scope kind, scope key, time bucket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub scope_kind: String,
    pub scope_key: String,
    pub time_bucket: String,
    pub bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub voids: usize,
    pub total_stake: Decimal,
    pub total_return: Decimal,
    pub profit_loss: Decimal,
    pub win_rate: Percent,
    pub roi: Percent,
    pub updated_at: DateTime<Utc>,
}

impl AggregateRow {
    pub fn from_aggregate(
        aggregate: &PerformanceAggregate,
        time_bucket: &str,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scope_kind: aggregate.scope.kind().to_string(),
            scope_key: aggregate.scope.key(),
            time_bucket: time_bucket.to_string(),
            bets: aggregate.bets,
            wins: aggregate.wins,
            losses: aggregate.losses,
            voids: aggregate.voids,
            total_stake: aggregate.total_stake,
            total_return: aggregate.total_return,
            profit_loss: aggregate.profit_loss,
            win_rate: aggregate.win_rate,
            roi: aggregate.roi,
            updated_at,
        }
    }

    /// Primary key of the row.
    pub fn key(&self) -> (String, String, String) {
        (
            self.scope_kind.clone(),
            self.scope_key.clone(),
            self.time_bucket.clone(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
