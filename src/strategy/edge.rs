//! Edge calculation.
//!
//! Compares the model probability of a selection with the probability implied
//! by validated bookmaker odds. Edges stay unclamped fractions; thresholds are
//! applied later by the selector.

use serde::Serialize;
use std::collections::HashMap;

use super::odds::ValidatedOdds;
use crate::types::{Fraction, MarketKind};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Minimum edge per market kind. Markets without an entry use `default`.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeThresholds {
    pub default: Fraction,
    pub by_market: HashMap<MarketKind, Fraction>,
}

impl Default for EdgeThresholds {
    fn default() -> Self {
        let by_market = HashMap::from([
            (MarketKind::MatchResult, Fraction::new(0.08)),
            (MarketKind::BothTeamsToScore, Fraction::new(0.06)),
            (MarketKind::OverUnderGoals, Fraction::new(0.07)),
            (MarketKind::Corners, Fraction::new(0.05)),
        ]);
        Self {
            default: Fraction::new(0.05),
            by_market,
        }
    }
}

impl EdgeThresholds {
    /// Get the threshold for a given market kind.
    pub fn threshold_for(&self, market: MarketKind) -> Fraction {
        self.by_market.get(&market).copied().unwrap_or(self.default)
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Model vs bookmaker comparison for one validated selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeResult {
    pub odds: ValidatedOdds,
    pub model_probability: Fraction,
    pub implied_probability: Fraction,
    /// `model_probability - implied_probability`; may be negative.
    pub edge: Fraction,
}

impl EdgeResult {
    pub fn is_positive(&self) -> bool {
        self.edge.value() > 0.0
    }

    /// Expected profit per unit staked: `p * odds - 1`.
    pub fn expected_value(&self) -> f64 {
        self.model_probability.value() * self.odds.value() - 1.0
    }

    /// Confidence derived from the edge when the bookmaker states none:
    /// `0.5 + 2 * edge`, kept within `[0, 0.95]`.
    pub fn derived_confidence(&self) -> Fraction {
        Fraction::new((0.5 + self.edge.value() * 2.0).clamp(0.0, 0.95))
    }
}

pub struct EdgeCalculator;

impl EdgeCalculator {
    /// Compute the edge of `model_probability` against validated odds.
    pub fn compute(model_probability: Fraction, odds: ValidatedOdds) -> EdgeResult {
        let implied_probability = odds.implied_probability();
        EdgeResult {
            odds,
            model_probability,
            implied_probability,
            edge: Fraction::new(model_probability.value() - implied_probability.value()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
