//! Risk signals over the settled ledger.
//!
//! Replays settlements in the order they happened and reports the current
//! win/loss streak, the bankroll path from the starting bankroll, and the
//! overall win rate. Thresholds turn those into [`RiskAlert`]s. Voids do not
//! break or extend a streak.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt;
use tracing::warn;

use super::{PerformanceAggregate, Scope, SettledBet};
use crate::types::{Fraction, Outcome, Percent};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RiskThresholds {
    /// Consecutive losses that raise an alert.
    pub alert_streak: usize,
    pub starting_bankroll: Decimal,
    /// Decline from the starting bankroll that raises an alert (0.10 = 10%).
    pub max_bankroll_decline: Fraction,
    /// Win rate below this raises an alert once `min_bets` are settled.
    pub min_win_rate: Fraction,
    pub min_bets: usize,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            alert_streak: 5,
            starting_bankroll: dec!(1000),
            max_bankroll_decline: Fraction::new(0.10),
            min_win_rate: Fraction::new(0.40),
            min_bets: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Streaks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Streak {
    /// Positive for consecutive wins, negative for consecutive losses.
    pub current: i64,
    pub longest_win: usize,
    pub longest_loss: usize,
}

impl Streak {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => {
                self.current = if self.current >= 0 { self.current + 1 } else { 1 };
                self.longest_win = self.longest_win.max(self.current as usize);
            }
            Outcome::Loss => {
                self.current = if self.current <= 0 { self.current - 1 } else { -1 };
                self.longest_loss = self.longest_loss.max(self.current.unsigned_abs() as usize);
            }
            Outcome::Void => {}
        }
    }

    /// Length of the losing run in progress, zero when the last decided bet won.
    pub fn current_losses(&self) -> usize {
        if self.current < 0 {
            self.current.unsigned_abs() as usize
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Bankroll path
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BankrollPath {
    pub starting: Decimal,
    pub current: Decimal,
    pub peak: Decimal,
    /// Largest fall from a running peak, in money.
    pub max_drawdown: Decimal,
}

impl BankrollPath {
    pub fn new(starting: Decimal) -> Self {
        Self {
            starting,
            current: starting,
            peak: starting,
            max_drawdown: Decimal::ZERO,
        }
    }

    pub fn apply(&mut self, profit_loss: Decimal) {
        self.current += profit_loss;
        self.peak = self.peak.max(self.current);
        self.max_drawdown = self.max_drawdown.max(self.peak - self.current);
    }

    /// Share of the starting bankroll lost so far; zero while at or above it.
    pub fn decline(&self) -> Fraction {
        if self.starting <= Decimal::ZERO || self.current >= self.starting {
            return Fraction::ZERO;
        }
        let lost = (self.starting - self.current).to_f64().unwrap_or(0.0);
        Fraction::from_ratio(lost, self.starting.to_f64().unwrap_or(0.0))
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "alert", rename_all = "snake_case")]
pub enum RiskAlert {
    LosingStreak { losses: usize, limit: usize },
    BankrollDecline { decline: Percent, limit: Percent, bankroll: Decimal },
    LowWinRate { win_rate: Percent, limit: Percent, bets: usize },
}

impl fmt::Display for RiskAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskAlert::LosingStreak { losses, limit } => {
                write!(f, "losing streak: {losses} consecutive losses (alert at {limit})")
            }
            RiskAlert::BankrollDecline {
                decline,
                limit,
                bankroll,
            } => write!(f, "bankroll down {decline} to {bankroll} (alert at {limit})"),
            RiskAlert::LowWinRate {
                win_rate,
                limit,
                bets,
            } => write!(f, "low win rate: {win_rate} over {bets} bets (alert below {limit})"),
        }
    }
}

/// Risk view of a ledger at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReport {
    pub bets: usize,
    pub win_rate: Percent,
    pub streak: Streak,
    pub bankroll: BankrollPath,
    pub alerts: Vec<RiskAlert>,
}

impl RiskReport {
    /// Evaluate settled bets, already in settlement order.
    pub fn evaluate<'a>(
        settled: impl IntoIterator<Item = &'a SettledBet> + Clone,
        thresholds: &RiskThresholds,
    ) -> Self {
        let mut streak = Streak::default();
        let mut bankroll = BankrollPath::new(thresholds.starting_bankroll);
        for bet in settled.clone() {
            streak.record(bet.outcome);
            bankroll.apply(bet.profit_loss);
        }
        let overall = PerformanceAggregate::fold(Scope::Overall, settled);

        let mut alerts = Vec::new();
        if streak.current_losses() >= thresholds.alert_streak {
            alerts.push(RiskAlert::LosingStreak {
                losses: streak.current_losses(),
                limit: thresholds.alert_streak,
            });
        }
        let decline = bankroll.decline();
        if decline.value() > thresholds.max_bankroll_decline.value() {
            alerts.push(RiskAlert::BankrollDecline {
                decline: decline.to_percent().rounded(2),
                limit: thresholds.max_bankroll_decline.to_percent(),
                bankroll: bankroll.current,
            });
        }
        if overall.is_significant(thresholds.min_bets)
            && overall.win_rate.value() < thresholds.min_win_rate.to_percent().value()
        {
            alerts.push(RiskAlert::LowWinRate {
                win_rate: overall.win_rate,
                limit: thresholds.min_win_rate.to_percent(),
                bets: overall.bets,
            });
        }

        for alert in &alerts {
            warn!(alert = %alert, "Risk alert");
        }

        Self {
            bets: overall.bets,
            win_rate: overall.win_rate,
            streak,
            bankroll,
            alerts,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
