//! Shared types for the FIXORA value engine.
//!
//! These types form the data model used across all modules. Probabilities,
//! edges and stake fractions travel through the pipeline as [`Fraction`];
//! only the reporting boundary converts them to [`Percent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Numeric representations
// ---------------------------------------------------------------------------

/// A ratio in decimal form (0.15 means fifteen percent).
///
/// Used for every internal quantity: probabilities, edges, Kelly fractions,
/// stake fractions and raw ROI ratios. Edges and ROI ratios may be negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fraction(f64);

impl Fraction {
    pub const ZERO: Fraction = Fraction(0.0);
    pub const ONE: Fraction = Fraction(1.0);

    pub fn new(value: f64) -> Self {
        Fraction(value)
    }

    /// `numerator / denominator`, or zero when the denominator is zero.
    pub fn from_ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            Fraction::ZERO
        } else {
            Fraction(numerator / denominator)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    /// Total ordering over the underlying float (NaN sorts last).
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }

    /// Cross into the reporting representation. This is the only way a
    /// [`Percent`] is produced inside the crate.
    pub fn to_percent(self) -> Percent {
        Percent(self.0 * 100.0)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// A percent-scaled number (15.0 means fifteen percent).
///
/// Only exists at the reporting boundary: recommendation views and
/// performance aggregates.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(f64);

impl Percent {
    pub const ZERO: Percent = Percent(0.0);

    pub fn value(self) -> f64 {
        self.0
    }

    /// Round to `dp` decimal places for presentation.
    pub fn rounded(self, dp: i32) -> Self {
        let factor = 10f64.powi(dp);
        Percent((self.0 * factor).round() / factor)
    }

    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

/// Football betting market kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MarketKind {
    MatchResult,
    BothTeamsToScore,
    OverUnderGoals,
    Corners,
    TeamCorners,
    DoubleChance,
    ExactGoals,
    FirstHalfResult,
    CleanSheet,
    WinToNil,
}

impl MarketKind {
    /// All known market kinds (useful for iteration).
    pub const ALL: &'static [MarketKind] = &[
        MarketKind::MatchResult,
        MarketKind::BothTeamsToScore,
        MarketKind::OverUnderGoals,
        MarketKind::Corners,
        MarketKind::TeamCorners,
        MarketKind::DoubleChance,
        MarketKind::ExactGoals,
        MarketKind::FirstHalfResult,
        MarketKind::CleanSheet,
        MarketKind::WinToNil,
    ];

    /// Canonical snake_case key, used in config tables and aggregate rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::MatchResult => "match_result",
            MarketKind::BothTeamsToScore => "both_teams_to_score",
            MarketKind::OverUnderGoals => "over_under_goals",
            MarketKind::Corners => "corners",
            MarketKind::TeamCorners => "team_corners",
            MarketKind::DoubleChance => "double_chance",
            MarketKind::ExactGoals => "exact_goals",
            MarketKind::FirstHalfResult => "first_half_result",
            MarketKind::CleanSheet => "clean_sheet",
            MarketKind::WinToNil => "win_to_nil",
        }
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a market name (case-insensitive, common aliases accepted).
impl FromStr for MarketKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' ', '/'], "_");
        match normalized.as_str() {
            "match_result" | "h2h" | "1x2" | "full_time_result" => Ok(MarketKind::MatchResult),
            "both_teams_to_score" | "btts" => Ok(MarketKind::BothTeamsToScore),
            "over_under_goals" | "over_under" | "ou" | "totals" | "goals" => {
                Ok(MarketKind::OverUnderGoals)
            }
            "corners" | "total_corners" => Ok(MarketKind::Corners),
            "team_corners" => Ok(MarketKind::TeamCorners),
            "double_chance" | "dc" => Ok(MarketKind::DoubleChance),
            "exact_goals" | "correct_goals" => Ok(MarketKind::ExactGoals),
            "first_half_result" | "ht_result" | "half_time_result" => {
                Ok(MarketKind::FirstHalfResult)
            }
            "clean_sheet" => Ok(MarketKind::CleanSheet),
            "win_to_nil" => Ok(MarketKind::WinToNil),
            _ => Err(anyhow::anyhow!("Unknown market kind: {s}")),
        }
    }
}

impl TryFrom<String> for MarketKind {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MarketKind> for String {
    fn from(kind: MarketKind) -> Self {
        kind.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Raw odds input
// ---------------------------------------------------------------------------

/// Bookmaker odds as they arrive from the data-acquisition layer: a number,
/// a string, or nothing at all. Only the odds validator turns this into a
/// usable value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OddsInput {
    Number(f64),
    Text(String),
    #[default]
    Missing,
    /// Anything else the feed sent (`true`, `{}`, `[]`). Rejected by the
    /// validator like any other non-numeric value.
    Other(serde_json::Value),
}

impl fmt::Display for OddsInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OddsInput::Number(n) => write!(f, "{n}"),
            OddsInput::Text(s) => write!(f, "{s:?}"),
            OddsInput::Missing => write!(f, "none"),
            OddsInput::Other(value) => write!(f, "{value}"),
        }
    }
}

impl From<f64> for OddsInput {
    fn from(value: f64) -> Self {
        OddsInput::Number(value)
    }
}

impl From<i64> for OddsInput {
    fn from(value: i64) -> Self {
        OddsInput::Number(value as f64)
    }
}

impl From<&str> for OddsInput {
    fn from(value: &str) -> Self {
        OddsInput::Text(value.to_string())
    }
}

impl From<String> for OddsInput {
    fn from(value: String) -> Self {
        OddsInput::Text(value)
    }
}

impl<T: Into<OddsInput>> From<Option<T>> for OddsInput {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(OddsInput::Missing)
    }
}

impl From<&OddsInput> for OddsInput {
    fn from(value: &OddsInput) -> Self {
        value.clone()
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

fn unknown_league() -> String {
    "unknown".to_string()
}

/// One proposed bet on one outcome of one market of one fixture.
///
/// Supplied already fetched and deduplicated by fixture + market + selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub fixture_id: String,
    #[serde(default = "unknown_league")]
    pub league: String,
    pub kickoff: DateTime<Utc>,
    pub market: MarketKind,
    pub selection: String,
    /// Model probability of the selection (0–1, exclusive).
    pub model_probability: f64,
    /// Decimal bookmaker odds, unvalidated.
    #[serde(default)]
    pub odds: OddsInput,
    /// Bookmaker-stated confidence (0–1], if any.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Candidate {
    /// Stable identifier: `fixture:market:selection`.
    pub fn bet_id(&self) -> String {
        format!("{}:{}:{}", self.fixture_id, self.market, self.selection)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} @ {} (p={:.1}%)",
            self.fixture_id,
            self.market,
            self.selection,
            self.odds,
            self.model_probability * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Settlement outcome
// ---------------------------------------------------------------------------

/// Result of a settled bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Void,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Void => "void",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win" | "won" => Ok(Outcome::Win),
            "loss" | "lost" | "lose" => Ok(Outcome::Loss),
            "void" | "push" | "refund" => Ok(Outcome::Void),
            _ => Err(anyhow::anyhow!("Unknown outcome: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Integrity and startup errors. Routine candidate rejections are not errors;
/// see [`crate::strategy::RejectionReason`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration conflict for `{key}`: {first_source} = {first_value}, {second_source} = {second_value}")]
    ConfigConflict {
        key: String,
        first_source: String,
        first_value: String,
        second_source: String,
        second_value: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Settlement references a bet that was never recorded: {bet_id}")]
    DanglingSettlement { bet_id: String },

    #[error("Bet {bet_id} already settled as {recorded}, refusing {incoming}")]
    ConflictingSettlement {
        bet_id: String,
        recorded: Outcome,
        incoming: Outcome,
    },

    #[error("Bet {0} is already tracked with different terms")]
    DuplicateBet(String),

    #[error("Numeric conversion failed: {0}")]
    Numeric(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_to_percent() {
        assert_eq!(Fraction::new(0.25).to_percent().value(), 25.0);
        assert_eq!(Fraction::new(-0.5).to_percent().value(), -50.0);
    }

    #[test]
    fn test_fraction_from_ratio_zero_denominator() {
        assert_eq!(Fraction::from_ratio(3.0, 0.0), Fraction::ZERO);
        assert_eq!(Fraction::from_ratio(1.0, 4.0).value(), 0.25);
    }

    #[test]
    fn test_percent_display_and_rounding() {
        let pct = Fraction::new(0.134286).to_percent();
        assert_eq!(format!("{pct}"), "13.4%");
        assert_eq!(pct.rounded(2).value(), 13.43);
    }

    #[test]
    fn test_percent_serializes_as_plain_number() {
        let json = serde_json::to_string(&Fraction::new(0.25).to_percent()).unwrap();
        assert_eq!(json, "25.0");
    }

    #[test]
    fn test_market_kind_from_str_aliases() {
        assert_eq!("BTTS".parse::<MarketKind>().unwrap(), MarketKind::BothTeamsToScore);
        assert_eq!("1x2".parse::<MarketKind>().unwrap(), MarketKind::MatchResult);
        assert_eq!("over-under".parse::<MarketKind>().unwrap(), MarketKind::OverUnderGoals);
        assert_eq!("Total Corners".parse::<MarketKind>().unwrap(), MarketKind::Corners);
        assert!("tennis".parse::<MarketKind>().is_err());
    }

    #[test]
    fn test_market_kind_round_trips_through_as_str() {
        for kind in MarketKind::ALL {
            assert_eq!(kind.as_str().parse::<MarketKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_market_kind_serde_accepts_alias() {
        let kind: MarketKind = serde_json::from_str("\"btts\"").unwrap();
        assert_eq!(kind, MarketKind::BothTeamsToScore);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"both_teams_to_score\"");
    }

    #[test]
    fn test_odds_input_deserializes_number_string_and_null() {
        let n: OddsInput = serde_json::from_str("2.5").unwrap();
        let s: OddsInput = serde_json::from_str("\"3.10\"").unwrap();
        let m: OddsInput = serde_json::from_str("null").unwrap();
        assert_eq!(n, OddsInput::Number(2.5));
        assert_eq!(s, OddsInput::Text("3.10".into()));
        assert_eq!(m, OddsInput::Missing);
    }

    #[test]
    fn test_unexpected_odds_shape_keeps_the_batch() {
        let json = r#"[
            {"fixture_id": "1", "kickoff": "2026-10-24T14:00:00Z", "market": "1x2",
             "selection": "home", "model_probability": 0.42, "odds": true},
            {"fixture_id": "2", "kickoff": "2026-10-24T14:00:00Z", "market": "1x2",
             "selection": "home", "model_probability": 0.42, "odds": {"decimal": 3.5}},
            {"fixture_id": "3", "kickoff": "2026-10-24T14:00:00Z", "market": "1x2",
             "selection": "home", "model_probability": 0.42, "odds": 3.5}
        ]"#;
        let batch: Vec<Candidate> = serde_json::from_str(json).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].odds, OddsInput::Other(serde_json::Value::Bool(true)));
        assert_eq!(batch[0].odds.to_string(), "true");
        assert!(matches!(batch[1].odds, OddsInput::Other(_)));
        assert_eq!(batch[2].odds, OddsInput::Number(3.5));
    }

    #[test]
    fn test_candidate_deserializes_with_defaults() {
        let json = r#"{
            "fixture_id": "1001",
            "kickoff": "2026-10-19T19:45:00Z",
            "market": "match_result",
            "selection": "home_win",
            "model_probability": 0.42
        }"#;
        let c: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.league, "unknown");
        assert_eq!(c.odds, OddsInput::Missing);
        assert!(c.confidence.is_none());
        assert_eq!(c.bet_id(), "1001:match_result:home_win");
    }

    #[test]
    fn test_outcome_from_str() {
        assert_eq!("won".parse::<Outcome>().unwrap(), Outcome::Win);
        assert_eq!("LOSS".parse::<Outcome>().unwrap(), Outcome::Loss);
        assert_eq!("push".parse::<Outcome>().unwrap(), Outcome::Void);
        assert!("draw".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::DanglingSettlement { bet_id: "x".into() };
        assert!(err.to_string().contains("never recorded"));
        let err = EngineError::ConflictingSettlement {
            bet_id: "x".into(),
            recorded: Outcome::Win,
            incoming: Outcome::Loss,
        };
        assert_eq!(err.to_string(), "Bet x already settled as win, refusing loss");
    }
}
