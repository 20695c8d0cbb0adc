//! Odds validation.
//!
//! Sole owner of the admissible odds range. Every stage that needs bookmaker
//! odds goes through [`OddsValidator`], which coerces raw input into a
//! bounds-checked [`ValidatedOdds`] or rejects it without failing.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::types::{Fraction, OddsInput};

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Inclusive decimal-odds bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for OddsBounds {
    fn default() -> Self {
        Self {
            min: 1.8,
            max: 10.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated odds
// ---------------------------------------------------------------------------

/// Decimal odds that passed validation. Only [`OddsValidator`] constructs
/// these, so downstream code never sees raw input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedOdds(f64);

impl ValidatedOdds {
    pub fn value(self) -> f64 {
        self.0
    }

    /// Bookmaker-implied probability, `1 / odds`.
    pub fn implied_probability(self) -> Fraction {
        Fraction::new(1.0 / self.0)
    }

    /// Net odds `b = odds - 1` (profit per unit staked on a win).
    pub fn net_odds(self) -> f64 {
        self.0 - 1.0
    }
}

impl fmt::Display for ValidatedOdds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Why a raw odds value was refused.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum OddsViolation {
    Missing,
    NotNumeric { raw: String },
    NotFinite,
    NonPositive { odds: f64 },
    BelowMinimum { odds: f64, min: f64 },
    AboveMaximum { odds: f64, max: f64 },
}

impl fmt::Display for OddsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OddsViolation::Missing => write!(f, "no odds supplied"),
            OddsViolation::NotNumeric { raw } => write!(f, "not numeric: {raw:?}"),
            OddsViolation::NotFinite => write!(f, "not a finite number"),
            OddsViolation::NonPositive { odds } => write!(f, "non-positive odds {odds}"),
            OddsViolation::BelowMinimum { odds, min } => {
                write!(f, "odds {odds:.2} below minimum {min:.2}")
            }
            OddsViolation::AboveMaximum { odds, max } => {
                write!(f, "odds {odds:.2} above maximum {max:.2}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Batch summary of odds validation, for cycle diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OddsSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub min_valid: Option<f64>,
    pub max_valid: Option<f64>,
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct OddsValidator {
    bounds: OddsBounds,
}

impl OddsValidator {
    pub fn new(bounds: OddsBounds) -> Self {
        Self { bounds }
    }

    /// The canonical `(MIN_ODDS, MAX_ODDS)` pair.
    pub fn bounds(&self) -> (f64, f64) {
        (self.bounds.min, self.bounds.max)
    }

    /// True iff the input coerces to a number within the bounds.
    /// Never panics; rejections are logged at debug level.
    pub fn validate(&self, raw: impl Into<OddsInput>) -> bool {
        self.coerce(&raw.into()).is_some()
    }

    /// Coerce raw input into validated odds, or `None`.
    pub fn coerce(&self, raw: &OddsInput) -> Option<ValidatedOdds> {
        self.check(raw).ok()
    }

    /// Coerce raw input, reporting which rule it broke.
    pub fn check(&self, raw: &OddsInput) -> Result<ValidatedOdds, OddsViolation> {
        let result = self.classify(raw);
        if let Err(violation) = &result {
            debug!(
                raw = %raw,
                min = self.bounds.min,
                max = self.bounds.max,
                violation = %violation,
                "Odds rejected"
            );
        }
        result
    }

    fn classify(&self, raw: &OddsInput) -> Result<ValidatedOdds, OddsViolation> {
        let odds = match raw {
            OddsInput::Missing => return Err(OddsViolation::Missing),
            OddsInput::Other(value) => {
                return Err(OddsViolation::NotNumeric {
                    raw: value.to_string(),
                })
            }
            OddsInput::Number(n) => *n,
            OddsInput::Text(s) => s.trim().parse::<f64>().map_err(|_| OddsViolation::NotNumeric {
                raw: s.clone(),
            })?,
        };

        if !odds.is_finite() {
            return Err(OddsViolation::NotFinite);
        }
        if odds <= 0.0 {
            return Err(OddsViolation::NonPositive { odds });
        }
        if odds < self.bounds.min {
            return Err(OddsViolation::BelowMinimum {
                odds,
                min: self.bounds.min,
            });
        }
        if odds > self.bounds.max {
            return Err(OddsViolation::AboveMaximum {
                odds,
                max: self.bounds.max,
            });
        }

        Ok(ValidatedOdds(odds))
    }

    /// Summarize validation over a batch of raw odds.
    pub fn summarize<'a>(&self, raws: impl IntoIterator<Item = &'a OddsInput>) -> OddsSummary {
        let mut summary = OddsSummary::default();
        for raw in raws {
            summary.total += 1;
            match self.coerce(raw) {
                Some(odds) => {
                    summary.valid += 1;
                    let v = odds.value();
                    summary.min_valid = Some(summary.min_valid.map_or(v, |m| m.min(v)));
                    summary.max_valid = Some(summary.max_valid.map_or(v, |m| m.max(v)));
                }
                None => {
                    summary.invalid += 1;
                    summary.rejected.push(raw.to_string());
                }
            }
        }
        summary
    }
}

impl Default for OddsValidator {
    fn default() -> Self {
        Self::new(OddsBounds::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
