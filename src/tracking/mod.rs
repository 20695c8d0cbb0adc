//! ROI tracking — surfaced bets, settlements and performance attribution.
//!
//! The tracker keeps an in-memory [`Ledger`] of every surfaced bet and its
//! settlement. Settlements are keyed by bet id, so retries are idempotent and
//! aggregates can be recomputed from the ledger at any time.

pub mod aggregate;
pub mod risk;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::strategy::ranker::RankedBet;
use crate::types::{EngineError, Fraction, MarketKind, Outcome};
pub use aggregate::{league_key, AggregateRow, Bucketing, PerformanceAggregate, Scope};
pub use risk::{RiskAlert, RiskReport, RiskThresholds};

// ---------------------------------------------------------------------------
// Ledger entries
// ---------------------------------------------------------------------------

/// A surfaced bet awaiting its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedBet {
    pub bet_id: String,
    pub fixture_id: String,
    pub league: String,
    pub market: MarketKind,
    pub selection: String,
    pub kickoff: DateTime<Utc>,
    pub odds: Decimal,
    pub rank: usize,
    pub units: Decimal,
    /// `units * unit_stake`.
    pub stake: Decimal,
    pub edge: Fraction,
    pub confidence: Fraction,
    pub recorded_at: DateTime<Utc>,
}

impl TrackedBet {
    pub fn from_ranked(
        ranked: &RankedBet,
        unit_stake: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let bet = &ranked.bet;
        let odds = Decimal::from_f64(bet.odds())
            .ok_or_else(|| EngineError::Numeric(format!("odds {} for {}", bet.odds(), bet.bet_id)))?
            .round_dp(4);
        let units = ranked.tier.units();

        Ok(Self {
            bet_id: bet.bet_id.clone(),
            fixture_id: bet.candidate.fixture_id.clone(),
            league: bet.candidate.league.clone(),
            market: bet.candidate.market,
            selection: bet.candidate.selection.clone(),
            kickoff: bet.candidate.kickoff,
            odds,
            rank: ranked.rank,
            units,
            stake: units * unit_stake,
            edge: bet.edge.edge,
            confidence: bet.confidence,
            recorded_at,
        })
    }

    /// Same wager: identical odds and stake on the same selection.
    fn same_terms(&self, other: &TrackedBet) -> bool {
        self.market == other.market
            && self.selection == other.selection
            && self.odds == other.odds
            && self.stake == other.stake
    }
}

/// A tracked bet whose match has concluded. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledBet {
    pub bet_id: String,
    pub fixture_id: String,
    pub league: String,
    pub market: MarketKind,
    pub selection: String,
    pub odds: Decimal,
    pub units: Decimal,
    pub stake: Decimal,
    pub outcome: Outcome,
    /// Stake times odds on a win, nothing on a loss, the stake on a void.
    pub returned: Decimal,
    pub profit_loss: Decimal,
    pub settled_at: DateTime<Utc>,
}

impl SettledBet {
    pub fn settle(tracked: &TrackedBet, outcome: Outcome, settled_at: DateTime<Utc>) -> Self {
        let returned = match outcome {
            Outcome::Win => (tracked.stake * tracked.odds).round_dp(2),
            Outcome::Loss => Decimal::ZERO,
            Outcome::Void => tracked.stake,
        };
        Self {
            bet_id: tracked.bet_id.clone(),
            fixture_id: tracked.fixture_id.clone(),
            league: tracked.league.clone(),
            market: tracked.market,
            selection: tracked.selection.clone(),
            odds: tracked.odds,
            units: tracked.units,
            stake: tracked.stake,
            outcome,
            returned,
            profit_loss: returned - tracked.stake,
            settled_at,
        }
    }
}

/// Everything the tracker knows, in a serializable form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub tracked: BTreeMap<String, TrackedBet>,
    pub settled: BTreeMap<String, SettledBet>,
}

impl Ledger {
    pub fn from_parts(tracked: Vec<TrackedBet>, settled: Vec<SettledBet>) -> Self {
        Self {
            tracked: tracked.into_iter().map(|b| (b.bet_id.clone(), b)).collect(),
            settled: settled.into_iter().map(|b| (b.bet_id.clone(), b)).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct RoiTracker {
    unit_stake: Decimal,
    ledger: Mutex<Ledger>,
}

impl RoiTracker {
    pub fn new(unit_stake: Decimal) -> Self {
        Self::from_ledger(unit_stake, Ledger::default())
    }

    pub fn from_ledger(unit_stake: Decimal, ledger: Ledger) -> Self {
        Self {
            unit_stake,
            ledger: Mutex::new(ledger),
        }
    }

    pub fn unit_stake(&self) -> Decimal {
        self.unit_stake
    }

    /// A panic while holding the lock cannot leave the ledger half-written:
    /// every mutation is a single map insert.
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> Ledger {
        self.ledger().clone()
    }

    /// Register a surfaced bet. Returns `None` when the same bet is already
    /// tracked on identical terms.
    pub fn record_bet(&self, ranked: &RankedBet) -> Result<Option<TrackedBet>, EngineError> {
        let tracked = TrackedBet::from_ranked(ranked, self.unit_stake, Utc::now())?;
        let mut ledger = self.ledger();

        if let Some(existing) = ledger.tracked.get(&tracked.bet_id) {
            if existing.same_terms(&tracked) {
                debug!(bet_id = %tracked.bet_id, "Bet already tracked");
                return Ok(None);
            }
            warn!(
                bet_id = %tracked.bet_id,
                tracked_odds = %existing.odds,
                incoming_odds = %tracked.odds,
                tracked_stake = %existing.stake,
                incoming_stake = %tracked.stake,
                "Bet already tracked with different terms"
            );
            return Err(EngineError::DuplicateBet(tracked.bet_id));
        }

        debug!(
            bet_id = %tracked.bet_id,
            units = %tracked.units,
            stake = %tracked.stake,
            "Bet tracked"
        );
        ledger.tracked.insert(tracked.bet_id.clone(), tracked.clone());
        Ok(Some(tracked))
    }

    /// Settle a ranked bet. The bet must have been recorded first.
    pub fn record_settlement(
        &self,
        ranked: &RankedBet,
        outcome: Outcome,
    ) -> Result<SettledBet, EngineError> {
        self.settle_by_id(ranked.bet_id(), outcome, Utc::now())
    }

    /// Settle a tracked bet by id. Re-settling with the same outcome returns
    /// the stored settlement unchanged; a different outcome is refused.
    pub fn settle_by_id(
        &self,
        bet_id: &str,
        outcome: Outcome,
        settled_at: DateTime<Utc>,
    ) -> Result<SettledBet, EngineError> {
        let mut ledger = self.ledger();
        let (settled, fresh) = resolve_settlement(&ledger, bet_id, outcome, settled_at)?;
        if !fresh {
            debug!(bet_id, %outcome, "Settlement already recorded");
            return Ok(settled);
        }

        info!(
            bet_id,
            %outcome,
            stake = %settled.stake,
            returned = %settled.returned,
            pnl = %settled.profit_loss,
            "Bet settled"
        );
        ledger.settled.insert(bet_id.to_string(), settled.clone());
        Ok(settled)
    }

    /// The settlement `settle_by_id` would produce, without applying it.
    /// Fails the same way for unknown bets and conflicting outcomes.
    pub fn preview_settlement(
        &self,
        bet_id: &str,
        outcome: Outcome,
        settled_at: DateTime<Utc>,
    ) -> Result<SettledBet, EngineError> {
        let ledger = self.ledger();
        resolve_settlement(&ledger, bet_id, outcome, settled_at).map(|(settled, _)| settled)
    }

    pub fn tracked(&self, bet_id: &str) -> Option<TrackedBet> {
        self.ledger().tracked.get(bet_id).cloned()
    }

    pub fn settled(&self) -> Vec<SettledBet> {
        self.ledger().settled.values().cloned().collect()
    }

    /// Tracked bets with no settlement yet.
    pub fn pending(&self) -> Vec<TrackedBet> {
        let ledger = self.ledger();
        ledger
            .tracked
            .values()
            .filter(|b| !ledger.settled.contains_key(&b.bet_id))
            .cloned()
            .collect()
    }

    pub fn aggregate(&self, scope: &Scope) -> PerformanceAggregate {
        let ledger = self.ledger();
        PerformanceAggregate::fold(scope.clone(), ledger.settled.values())
    }

    /// Bets settled in the seven days up to `now`.
    pub fn weekly(&self, now: DateTime<Utc>) -> PerformanceAggregate {
        self.aggregate(&Scope::Window {
            from: now - Duration::days(7),
            to: now,
        })
    }

    pub fn market_leaderboard(&self) -> Vec<PerformanceAggregate> {
        let markets: BTreeSet<MarketKind> =
            self.ledger().settled.values().map(|b| b.market).collect();
        leaderboard(markets.into_iter().map(Scope::Market).map(|s| self.aggregate(&s)))
    }

    pub fn league_leaderboard(&self) -> Vec<PerformanceAggregate> {
        let leagues: BTreeSet<String> =
            self.ledger().settled.values().map(|b| league_key(&b.league)).collect();
        leaderboard(leagues.into_iter().map(Scope::League).map(|s| self.aggregate(&s)))
    }

    /// Persistence rows for overall, every market and every league, per
    /// time bucket.
    pub fn aggregate_rows(&self, bucketing: Bucketing, now: DateTime<Utc>) -> Vec<AggregateRow> {
        let ledger = self.ledger();

        let mut buckets: BTreeMap<String, Vec<&SettledBet>> = BTreeMap::new();
        for bet in ledger.settled.values() {
            buckets
                .entry(bucketing.bucket_for(bet.settled_at))
                .or_default()
                .push(bet);
        }

        let mut rows = Vec::new();
        for (bucket, bets) in &buckets {
            let markets: BTreeSet<MarketKind> = bets.iter().map(|b| b.market).collect();
            let leagues: BTreeSet<String> = bets.iter().map(|b| league_key(&b.league)).collect();

            let scopes = std::iter::once(Scope::Overall)
                .chain(markets.into_iter().map(Scope::Market))
                .chain(leagues.into_iter().map(Scope::League));

            for scope in scopes {
                let agg = PerformanceAggregate::fold(scope, bets.iter().copied());
                rows.push(AggregateRow::from_aggregate(&agg, bucket, now));
            }
        }
        rows
    }

    /// Streak, bankroll path and alerts over every settlement so far, replayed
    /// in settlement order.
    pub fn risk_report(&self, thresholds: &RiskThresholds) -> RiskReport {
        let ledger = self.ledger();
        let mut ordered: Vec<&SettledBet> = ledger.settled.values().collect();
        ordered.sort_by(|a, b| {
            a.settled_at
                .cmp(&b.settled_at)
                .then_with(|| a.bet_id.cmp(&b.bet_id))
        });
        RiskReport::evaluate(ordered.iter().copied(), thresholds)
    }
}

/// The settlement for `bet_id`, and whether it is new. An existing
/// settlement with the same outcome is returned as not new.
fn resolve_settlement(
    ledger: &Ledger,
    bet_id: &str,
    outcome: Outcome,
    settled_at: DateTime<Utc>,
) -> Result<(SettledBet, bool), EngineError> {
    let Some(tracked) = ledger.tracked.get(bet_id) else {
        warn!(bet_id, %outcome, "Settlement for unknown bet");
        return Err(EngineError::DanglingSettlement {
            bet_id: bet_id.to_string(),
        });
    };

    match ledger.settled.get(bet_id) {
        Some(existing) if existing.outcome == outcome => Ok((existing.clone(), false)),
        Some(existing) => {
            warn!(
                bet_id,
                recorded = %existing.outcome,
                incoming = %outcome,
                "Conflicting settlement refused"
            );
            Err(EngineError::ConflictingSettlement {
                bet_id: bet_id.to_string(),
                recorded: existing.outcome,
                incoming: outcome,
            })
        }
        None => Ok((SettledBet::settle(tracked, outcome, settled_at), true)),
    }
}

/// ROI descending; ties by scope key for a stable order.
fn leaderboard(aggregates: impl Iterator<Item = PerformanceAggregate>) -> Vec<PerformanceAggregate> {
    let mut board: Vec<PerformanceAggregate> = aggregates.collect();
    board.sort_by(|a, b| {
        b.roi
            .total_cmp(&a.roi)
            .then_with(|| a.scope.key().cmp(&b.scope.key()))
    });
    board
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
