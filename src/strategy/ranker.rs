//! Unit ranking.
//!
//! Orders one window of value bets by a total order and maps rank position
//! to a discrete unit tier. Only the top five of a window are surfaced.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::ValueBet;
use crate::types::{MarketKind, Percent};

/// Number of bets surfaced per window.
pub const MAX_RANKED: usize = 5;

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// Discrete stake tier, a function of rank position only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnitTier {
    #[serde(rename = "3u")]
    Three,
    #[serde(rename = "2u")]
    Two,
    #[serde(rename = "1u")]
    One,
    #[serde(rename = "0.5u")]
    Half,
}

impl UnitTier {
    /// Tier for a 1-based rank; `None` past the surfaced positions.
    pub fn for_rank(rank: usize) -> Option<Self> {
        match rank {
            1 => Some(UnitTier::Three),
            2 => Some(UnitTier::Two),
            3 => Some(UnitTier::One),
            4 | 5 => Some(UnitTier::Half),
            _ => None,
        }
    }

    pub fn units(self) -> Decimal {
        match self {
            UnitTier::Three => dec!(3),
            UnitTier::Two => dec!(2),
            UnitTier::One => dec!(1),
            UnitTier::Half => dec!(0.5),
        }
    }
}

impl fmt::Display for UnitTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}u", self.units())
    }
}

// ---------------------------------------------------------------------------
// Ranked bets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedBet {
    /// 1-based position within the window.
    pub rank: usize,
    pub tier: UnitTier,
    pub bet: ValueBet,
}

impl RankedBet {
    pub fn bet_id(&self) -> &str {
        &self.bet.bet_id
    }

    /// Delivery view. Every rate is percent-scaled here and nowhere else.
    pub fn recommendation(&self) -> Recommendation {
        let candidate = &self.bet.candidate;
        Recommendation {
            bet_id: self.bet.bet_id.clone(),
            fixture_id: candidate.fixture_id.clone(),
            league: candidate.league.clone(),
            kickoff: candidate.kickoff,
            market: candidate.market,
            selection: candidate.selection.clone(),
            odds: self.bet.odds(),
            edge: self.bet.edge.edge.to_percent().rounded(2),
            confidence: self.bet.confidence.to_percent().rounded(1),
            stake: self.bet.stake.stake_fraction.to_percent().rounded(2),
            tier: self.tier,
            units: self.tier.units(),
            rank: self.rank,
        }
    }
}

impl fmt::Display for RankedBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} @ {} edge {} [{}]",
            self.rank,
            self.bet.candidate.fixture_id,
            self.bet.candidate.selection,
            self.bet.edge.odds,
            self.bet.edge.edge.to_percent(),
            self.tier
        )
    }
}

/// What the delivery layer receives for one surfaced bet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub bet_id: String,
    pub fixture_id: String,
    pub league: String,
    pub kickoff: DateTime<Utc>,
    pub market: MarketKind,
    pub selection: String,
    pub odds: f64,
    pub edge: Percent,
    pub confidence: Percent,
    /// Kelly stake as a percent of bankroll.
    pub stake: Percent,
    pub tier: UnitTier,
    pub units: Decimal,
    pub rank: usize,
}

// ---------------------------------------------------------------------------
// Ranker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct UnitRanker;

impl UnitRanker {
    /// Edge desc, confidence desc, odds asc, then the bet identity.
    pub fn compare(a: &ValueBet, b: &ValueBet) -> Ordering {
        b.edge
            .edge
            .total_cmp(&a.edge.edge)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.odds().total_cmp(&b.odds()))
            .then_with(|| a.candidate.fixture_id.cmp(&b.candidate.fixture_id))
            .then_with(|| a.candidate.market.cmp(&b.candidate.market))
            .then_with(|| a.candidate.selection.cmp(&b.candidate.selection))
    }

    /// Rank one window. Input order does not matter; output holds at most
    /// [`MAX_RANKED`] bets.
    pub fn rank(&self, window: &[ValueBet]) -> Vec<RankedBet> {
        let mut ordered: Vec<&ValueBet> = window.iter().collect();
        ordered.sort_by(|a, b| Self::compare(a, b));

        ordered
            .into_iter()
            .enumerate()
            .map_while(|(i, bet)| {
                UnitTier::for_rank(i + 1).map(|tier| RankedBet {
                    rank: i + 1,
                    tier,
                    bet: bet.clone(),
                })
            })
            .collect()
    }

    /// Split value bets into ranking windows: one per kickoff calendar day
    /// at `offset`.
    pub fn group_windows(
        bets: Vec<ValueBet>,
        offset: FixedOffset,
    ) -> BTreeMap<NaiveDate, Vec<ValueBet>> {
        let mut windows: BTreeMap<NaiveDate, Vec<ValueBet>> = BTreeMap::new();
        for bet in bets {
            let day = bet.candidate.kickoff.with_timezone(&offset).date_naive();
            windows.entry(day).or_default().push(bet);
        }
        windows
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
