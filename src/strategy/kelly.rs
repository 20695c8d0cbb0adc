//! Kelly criterion position sizing.
//!
//! Computes the raw Kelly fraction from the full odds/probability pair,
//! scales it by confidence and a fractional multiplier, and caps the result
//! at the configured maximum share of bankroll.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::edge::EdgeResult;
use super::odds::ValidatedOdds;
use super::RejectionReason;
use crate::types::Fraction;

// ---------------------------------------------------------------------------
// Kelly stake
// ---------------------------------------------------------------------------

/// Sized stake recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KellyStake {
    /// `(b*p - q) / b` before any adjustment.
    pub raw_fraction: Fraction,
    pub confidence: Fraction,
    /// Fractional Kelly multiplier applied (0.25 = quarter-Kelly).
    pub multiplier: f64,
    /// Final share of bankroll, within `[0, max_stake_fraction]`.
    pub stake_fraction: Fraction,
    /// Whether the cap cut the stake down.
    pub capped: bool,
}

impl KellyStake {
    /// Stake in money for a given bankroll.
    pub fn amount(&self, bankroll: Decimal) -> Decimal {
        let fraction = Decimal::from_f64(self.stake_fraction.value()).unwrap_or(Decimal::ZERO);
        (bankroll * fraction).round_dp(2)
    }
}

// ---------------------------------------------------------------------------
// Staker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct KellyStaker {
    max_stake_fraction: f64,
}

impl KellyStaker {
    pub fn new(max_stake_fraction: f64) -> Self {
        Self { max_stake_fraction }
    }

    pub fn max_stake_fraction(&self) -> f64 {
        self.max_stake_fraction
    }

    /// Kelly formula: f* = (bp - q) / b
    /// where:
    ///   b = net odds (odds - 1)
    ///   p = model win probability
    ///   q = 1 - p
    pub fn raw_fraction(model_probability: Fraction, odds: ValidatedOdds) -> Fraction {
        let b = odds.net_odds();
        let p = model_probability.value();
        let q = 1.0 - p;
        Fraction::new((b * p - q) / b)
    }

    /// Size a stake for an edge. A non-positive raw Kelly fraction disqualifies
    /// the candidate outright.
    pub fn stake(
        &self,
        edge: &EdgeResult,
        confidence: Fraction,
        fractional_multiplier: f64,
    ) -> Result<KellyStake, RejectionReason> {
        let raw = Self::raw_fraction(edge.model_probability, edge.odds);

        if raw.value() <= 0.0 || !raw.is_finite() {
            debug!(
                odds = %edge.odds,
                raw_kelly = %raw,
                "Non-positive Kelly, no bet"
            );
            return Err(RejectionReason::NoPositiveEdge { raw_kelly: raw });
        }

        let adjusted = raw.value() * confidence.value() * fractional_multiplier;
        let capped = adjusted > self.max_stake_fraction;
        let stake_fraction = adjusted.clamp(0.0, self.max_stake_fraction);

        debug!(
            odds = %edge.odds,
            raw_kelly = %raw.to_percent(),
            stake = %Fraction::new(stake_fraction).to_percent(),
            capped,
            "Stake sized"
        );

        Ok(KellyStake {
            raw_fraction: raw,
            confidence,
            multiplier: fractional_multiplier,
            stake_fraction: Fraction::new(stake_fraction),
            capped,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
