//! Strategy engine — odds validation, edge detection, Kelly sizing,
//! value-bet selection and unit ranking.

pub mod edge;
pub mod kelly;
pub mod odds;
pub mod ranker;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::types::{Candidate, Fraction};
use edge::{EdgeCalculator, EdgeResult, EdgeThresholds};
use kelly::{KellyStake, KellyStaker};
use odds::{OddsValidator, OddsViolation};

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Why a candidate did not become a value bet. These are routine outcomes of
/// filtering, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    InvalidOdds { raw: String, violation: OddsViolation },
    InvalidProbability { probability: f64 },
    EdgeBelowThreshold { edge: Fraction, threshold: Fraction },
    InvalidConfidence { confidence: f64 },
    ConfidenceBelowThreshold { confidence: Fraction, threshold: Fraction },
    NoPositiveEdge { raw_kelly: Fraction },
}

impl RejectionReason {
    pub fn kind(&self) -> RejectionKind {
        match self {
            RejectionReason::InvalidOdds { .. } => RejectionKind::InvalidOdds,
            RejectionReason::InvalidProbability { .. } => RejectionKind::InvalidProbability,
            RejectionReason::EdgeBelowThreshold { .. } => RejectionKind::EdgeBelowThreshold,
            RejectionReason::InvalidConfidence { .. } => RejectionKind::InvalidConfidence,
            RejectionReason::ConfidenceBelowThreshold { .. } => {
                RejectionKind::ConfidenceBelowThreshold
            }
            RejectionReason::NoPositiveEdge { .. } => RejectionKind::NoPositiveEdge,
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::InvalidOdds { violation, .. } => write!(f, "invalid odds: {violation}"),
            RejectionReason::InvalidProbability { probability } => {
                write!(f, "model probability {probability} outside (0, 1)")
            }
            RejectionReason::EdgeBelowThreshold { edge, threshold } => write!(
                f,
                "edge {} not above threshold {}",
                edge.to_percent(),
                threshold.to_percent()
            ),
            RejectionReason::InvalidConfidence { confidence } => {
                write!(f, "stated confidence {confidence} outside (0, 1]")
            }
            RejectionReason::ConfidenceBelowThreshold { confidence, threshold } => write!(
                f,
                "confidence {} below threshold {}",
                confidence.to_percent(),
                threshold.to_percent()
            ),
            RejectionReason::NoPositiveEdge { raw_kelly } => {
                write!(f, "non-positive Kelly fraction {raw_kelly}")
            }
        }
    }
}

/// Rejection category, used as the key of rejection-count summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    InvalidOdds,
    InvalidProbability,
    EdgeBelowThreshold,
    InvalidConfidence,
    ConfidenceBelowThreshold,
    NoPositiveEdge,
}

/// Audit record of one excluded candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionRecord {
    pub bet_id: String,
    pub fixture_id: String,
    pub market: crate::types::MarketKind,
    pub selection: String,
    pub reason: RejectionReason,
}

/// How many candidates were excluded, and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RejectionSummary {
    pub total: usize,
    pub by_kind: BTreeMap<RejectionKind, usize>,
}

impl RejectionSummary {
    pub fn from_records(records: &[RejectionRecord]) -> Self {
        let mut summary = RejectionSummary::default();
        for record in records {
            summary.total += 1;
            *summary.by_kind.entry(record.reason.kind()).or_default() += 1;
        }
        summary
    }

    pub fn count(&self, kind: RejectionKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Value bets
// ---------------------------------------------------------------------------

/// Where the confidence used for staking came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    Stated,
    Derived,
}

/// A candidate that cleared every selection stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueBet {
    pub bet_id: String,
    pub candidate: Candidate,
    pub edge: EdgeResult,
    pub confidence: Fraction,
    pub confidence_source: ConfidenceSource,
    pub stake: KellyStake,
}

impl ValueBet {
    pub fn odds(&self) -> f64 {
        self.edge.odds.value()
    }
}

/// Output of a batch selection pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SelectionReport {
    pub accepted: Vec<ValueBet>,
    pub rejections: Vec<RejectionRecord>,
}

impl SelectionReport {
    pub fn summary(&self) -> RejectionSummary {
        RejectionSummary::from_records(&self.rejections)
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Applies, in order: odds validity → model probability sanity → market edge
/// threshold → confidence threshold → positive Kelly fraction. Each stage
/// short-circuits with its own rejection reason.
#[derive(Debug, Clone)]
pub struct ValueBetSelector {
    validator: OddsValidator,
    thresholds: EdgeThresholds,
    confidence_threshold: Fraction,
    staker: KellyStaker,
    kelly_multiplier: f64,
}

impl ValueBetSelector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            validator: OddsValidator::new(config.odds_bounds),
            thresholds: config.edge_thresholds.clone(),
            confidence_threshold: config.confidence_threshold,
            staker: KellyStaker::new(config.max_stake_fraction),
            kelly_multiplier: config.kelly_multiplier,
        }
    }

    pub fn validator(&self) -> &OddsValidator {
        &self.validator
    }

    pub fn thresholds(&self) -> &EdgeThresholds {
        &self.thresholds
    }

    /// Run one candidate through every stage.
    pub fn select(&self, candidate: &Candidate) -> Result<ValueBet, RejectionReason> {
        // 1. odds
        let odds = self
            .validator
            .check(&candidate.odds)
            .map_err(|violation| RejectionReason::InvalidOdds {
                raw: candidate.odds.to_string(),
                violation,
            })?;

        // 2. model probability
        let p = candidate.model_probability;
        if !(p.is_finite() && p > 0.0 && p < 1.0) {
            return Err(RejectionReason::InvalidProbability { probability: p });
        }

        // 3. market edge threshold
        let edge = EdgeCalculator::compute(Fraction::new(p), odds);
        let threshold = self.thresholds.threshold_for(candidate.market);
        if edge.edge.value() <= threshold.value() {
            return Err(RejectionReason::EdgeBelowThreshold {
                edge: edge.edge,
                threshold,
            });
        }

        // 4. confidence
        let (confidence, confidence_source) = self.resolve_confidence(candidate, &edge)?;
        if confidence.value() < self.confidence_threshold.value() {
            return Err(RejectionReason::ConfidenceBelowThreshold {
                confidence,
                threshold: self.confidence_threshold,
            });
        }

        // 5. Kelly positivity and sizing
        let stake = self.staker.stake(&edge, confidence, self.kelly_multiplier)?;

        Ok(ValueBet {
            bet_id: candidate.bet_id(),
            candidate: candidate.clone(),
            edge,
            confidence,
            confidence_source,
            stake,
        })
    }

    fn resolve_confidence(
        &self,
        candidate: &Candidate,
        edge: &EdgeResult,
    ) -> Result<(Fraction, ConfidenceSource), RejectionReason> {
        match candidate.confidence {
            Some(c) if c.is_finite() && c > 0.0 && c <= 1.0 => {
                Ok((Fraction::new(c), ConfidenceSource::Stated))
            }
            Some(c) => Err(RejectionReason::InvalidConfidence { confidence: c }),
            None => Ok((edge.derived_confidence(), ConfidenceSource::Derived)),
        }
    }

    /// Select over a batch, keeping one audit record per rejected candidate.
    pub fn select_batch(&self, candidates: &[Candidate]) -> SelectionReport {
        let mut report = SelectionReport::default();

        for candidate in candidates {
            match self.select(candidate) {
                Ok(bet) => {
                    debug!(
                        bet_id = %bet.bet_id,
                        odds = %bet.edge.odds,
                        edge = %bet.edge.edge.to_percent(),
                        confidence = %bet.confidence.to_percent(),
                        stake = %bet.stake.stake_fraction.to_percent(),
                        "Value bet accepted"
                    );
                    report.accepted.push(bet);
                }
                Err(reason) => {
                    debug!(
                        bet_id = %candidate.bet_id(),
                        kind = ?reason.kind(),
                        reason = %reason,
                        "Candidate rejected"
                    );
                    report.rejections.push(RejectionRecord {
                        bet_id: candidate.bet_id(),
                        fixture_id: candidate.fixture_id.clone(),
                        market: candidate.market,
                        selection: candidate.selection.clone(),
                        reason,
                    });
                }
            }
        }

        let summary = report.summary();
        info!(
            candidates = candidates.len(),
            accepted = report.accepted.len(),
            rejected = summary.total,
            invalid_odds = summary.count(RejectionKind::InvalidOdds),
            below_edge = summary.count(RejectionKind::EdgeBelowThreshold),
            below_confidence = summary.count(RejectionKind::ConfidenceBelowThreshold),
            no_positive_kelly = summary.count(RejectionKind::NoPositiveEdge),
            "Selection pass complete"
        );

        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
