//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` into raw, all-optional structs, overlays `FIXORA_*`
//! environment variables and resolves everything into an immutable
//! [`AppConfig`]. A key given two different values by two sources is a
//! startup error, never a silent override.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::strategy::edge::EdgeThresholds;
use crate::strategy::odds::OddsBounds;
use crate::tracking::RiskThresholds;
use crate::types::{EngineError, Fraction, MarketKind};

/// Source of environment lookups, so resolution stays testable.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

const ENV_PREFIX: &str = "FIXORA_";
const FILE_SOURCE: &str = "config file";

// ---------------------------------------------------------------------------
// File layout
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    engine: RawEngineConfig,
    ranking: RankingConfig,
    tracking: TrackingConfig,
    logging: LoggingConfig,
}

/// `[engine]` as written in the file. Every field is optional; missing
/// fields take the environment value or the default.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RawEngineConfig {
    pub min_odds: Option<f64>,
    pub max_odds: Option<f64>,
    pub max_stake_fraction: Option<f64>,
    pub kelly_multiplier: Option<f64>,
    pub confidence_threshold: Option<f64>,
    pub default_edge_threshold: Option<f64>,
    /// Keyed by market name; aliases accepted.
    pub edge_thresholds: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RankingConfig {
    /// Ranking windows are calendar days at this offset from UTC.
    pub utc_offset_hours: i32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self { utc_offset_hours: 0 }
    }
}

impl RankingConfig {
    pub fn offset(&self) -> Result<FixedOffset, EngineError> {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                EngineError::InvalidConfig(format!(
                    "ranking.utc_offset_hours out of range: {}",
                    self.utc_offset_hours
                ))
            })
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Json,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TrackingConfig {
    /// Money value of one unit.
    pub unit_stake: Decimal,
    /// Minimum settled bets before an aggregate is reported.
    pub min_bets_for_report: usize,
    pub backend: StoreBackend,
    pub database_path: String,
    pub ledger_path: String,
    /// Bankroll the risk report measures decline against.
    pub starting_bankroll: Decimal,
    /// Consecutive losses that raise a risk alert.
    pub alert_streak: usize,
    /// Fractional decline from the starting bankroll that raises an alert.
    pub max_bankroll_decline: f64,
    /// Win rate (fraction) below which an alert is raised.
    pub min_win_rate: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            unit_stake: dec!(10),
            min_bets_for_report: 5,
            backend: StoreBackend::Sqlite,
            database_path: "fixora.db".to_string(),
            ledger_path: "fixora_ledger.json".to_string(),
            starting_bankroll: dec!(1000),
            alert_streak: 5,
            max_bankroll_decline: 0.10,
            min_win_rate: 0.40,
        }
    }
}

impl TrackingConfig {
    pub fn risk_thresholds(&self) -> RiskThresholds {
        RiskThresholds {
            alert_streak: self.alert_streak,
            starting_bankroll: self.starting_bankroll,
            max_bankroll_decline: Fraction::new(self.max_bankroll_decline),
            min_win_rate: Fraction::new(self.min_win_rate),
            min_bets: self.min_bets_for_report,
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.unit_stake <= Decimal::ZERO {
            return Err(invalid(format!(
                "tracking.unit_stake must be positive (got {})",
                self.unit_stake
            )));
        }
        if self.starting_bankroll <= Decimal::ZERO {
            return Err(invalid(format!(
                "tracking.starting_bankroll must be positive (got {})",
                self.starting_bankroll
            )));
        }
        if self.alert_streak == 0 {
            return Err(invalid("tracking.alert_streak must be at least 1".to_string()));
        }
        for (key, value) in [
            ("tracking.max_bankroll_decline", self.max_bankroll_decline),
            ("tracking.min_win_rate", self.min_win_rate),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(format!(
                    "{key} must be a fraction in (0, 1] (got {value}; 10% is written 0.10)"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "fixora=info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Resolved, validated engine parameters. Built once at startup and handed
/// to each component constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub odds_bounds: OddsBounds,
    pub max_stake_fraction: f64,
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly).
    pub kelly_multiplier: f64,
    pub confidence_threshold: Fraction,
    pub edge_thresholds: EdgeThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            odds_bounds: OddsBounds::default(),
            max_stake_fraction: 0.05,
            kelly_multiplier: 0.25,
            confidence_threshold: Fraction::new(0.6),
            edge_thresholds: EdgeThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Merge the file section with the environment and validate.
    pub fn resolve(raw: &RawEngineConfig, env: EnvLookup<'_>) -> Result<Self, EngineError> {
        let defaults = EngineConfig::default();

        let min_odds = resolve_scalar("min_odds", raw.min_odds, env, defaults.odds_bounds.min)?;
        let max_odds = resolve_scalar("max_odds", raw.max_odds, env, defaults.odds_bounds.max)?;
        let max_stake_fraction = resolve_scalar(
            "max_stake_fraction",
            raw.max_stake_fraction,
            env,
            defaults.max_stake_fraction,
        )?;
        let kelly_multiplier =
            resolve_scalar("kelly_multiplier", raw.kelly_multiplier, env, defaults.kelly_multiplier)?;
        let confidence_threshold = resolve_scalar(
            "confidence_threshold",
            raw.confidence_threshold,
            env,
            defaults.confidence_threshold.value(),
        )?;
        let default_edge = resolve_scalar(
            "default_edge_threshold",
            raw.default_edge_threshold,
            env,
            defaults.edge_thresholds.default.value(),
        )?;

        let mut edge_thresholds = EdgeThresholds {
            default: Fraction::new(default_edge),
            by_market: defaults.edge_thresholds.by_market,
        };
        let file_markets = market_table(&raw.edge_thresholds)?;
        for kind in MarketKind::ALL {
            let key = format!("edge_thresholds.{kind}");
            let env_key = format!("{ENV_PREFIX}EDGE_{}", kind.as_str().to_uppercase());
            let file_value = file_markets.get(kind).map(|(_, v)| *v);
            if let Some(value) = merge(&key, file_value, &env_key, env)? {
                edge_thresholds.by_market.insert(*kind, Fraction::new(value));
            }
        }

        let config = EngineConfig {
            odds_bounds: OddsBounds {
                min: min_odds,
                max: max_odds,
            },
            max_stake_fraction,
            kelly_multiplier,
            confidence_threshold: Fraction::new(confidence_threshold),
            edge_thresholds,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let OddsBounds { min, max } = self.odds_bounds;
        if !(min > 1.0 && min < max && max.is_finite()) {
            return Err(invalid(format!(
                "odds bounds must satisfy 1 < min_odds < max_odds (got {min} .. {max})"
            )));
        }
        if !(self.max_stake_fraction > 0.0 && self.max_stake_fraction <= 1.0) {
            return Err(invalid(format!(
                "max_stake_fraction must be in (0, 1] (got {})",
                self.max_stake_fraction
            )));
        }
        if !(self.kelly_multiplier > 0.0 && self.kelly_multiplier <= 1.0) {
            return Err(invalid(format!(
                "kelly_multiplier must be in (0, 1] (got {})",
                self.kelly_multiplier
            )));
        }
        let confidence = self.confidence_threshold.value();
        if !(0.0..=1.0).contains(&confidence) {
            return Err(invalid(format!(
                "confidence_threshold must be in [0, 1] (got {confidence})"
            )));
        }

        let thresholds = std::iter::once(("default_edge_threshold".to_string(), self.edge_thresholds.default))
            .chain(
                self.edge_thresholds
                    .by_market
                    .iter()
                    .map(|(kind, t)| (format!("edge_thresholds.{kind}"), *t)),
            );
        for (key, threshold) in thresholds {
            let value = threshold.value();
            if !(0.0..1.0).contains(&value) {
                return Err(invalid(format!(
                    "{key} must be a fraction in [0, 1) (got {value}; 8% is written 0.08)"
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> EngineError {
    EngineError::InvalidConfig(message)
}

/// Env variable name for a top-level engine key.
fn env_key_for(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_uppercase())
}

fn resolve_scalar(
    key: &str,
    file_value: Option<f64>,
    env: EnvLookup<'_>,
    default: f64,
) -> Result<f64, EngineError> {
    Ok(merge(key, file_value, &env_key_for(key), env)?.unwrap_or(default))
}

/// Combine a file value and an env value for one key. Both set and unequal
/// is a conflict.
fn merge(
    key: &str,
    file_value: Option<f64>,
    env_key: &str,
    env: EnvLookup<'_>,
) -> Result<Option<f64>, EngineError> {
    let env_value = match env(env_key) {
        Some(raw) => Some(raw.trim().parse::<f64>().map_err(|_| {
            invalid(format!("{env_key} is not a number: {raw:?}"))
        })?),
        None => None,
    };

    match (file_value, env_value) {
        (Some(f), Some(e)) if f != e => Err(EngineError::ConfigConflict {
            key: key.to_string(),
            first_source: FILE_SOURCE.to_string(),
            first_value: f.to_string(),
            second_source: format!("env {env_key}"),
            second_value: e.to_string(),
        }),
        (Some(v), _) | (None, Some(v)) => Ok(Some(v)),
        (None, None) => Ok(None),
    }
}

/// Parse the file's threshold table. Two spellings of one market with
/// different values conflict.
fn market_table(
    table: &BTreeMap<String, f64>,
) -> Result<HashMap<MarketKind, (String, f64)>, EngineError> {
    let mut resolved: HashMap<MarketKind, (String, f64)> = HashMap::new();
    for (name, value) in table {
        let kind: MarketKind = name
            .parse()
            .map_err(|_| invalid(format!("unknown market in edge_thresholds: {name}")))?;
        match resolved.get(&kind) {
            Some((first_name, first_value)) if *first_value != *value => {
                return Err(EngineError::ConfigConflict {
                    key: format!("edge_thresholds.{kind}"),
                    first_source: format!("{FILE_SOURCE} edge_thresholds.{first_name}"),
                    first_value: first_value.to_string(),
                    second_source: format!("{FILE_SOURCE} edge_thresholds.{name}"),
                    second_value: value.to_string(),
                });
            }
            Some(_) => {}
            None => {
                resolved.insert(kind, (name.clone(), *value));
            }
        }
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Application configuration
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub ranking: RankingConfig,
    pub tracking: TrackingConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, resolved against the process
    /// environment. A missing file means defaults plus environment.
    pub fn load(path: &str) -> Result<Self> {
        let contents = if Path::new(path).exists() {
            fs::read_to_string(path).with_context(|| format!("Failed to read config file: {path}"))?
        } else {
            warn!(path, "Config file not found, using defaults");
            String::new()
        };
        Self::from_toml_str(&contents, &|key: &str| std::env::var(key).ok())
            .with_context(|| format!("Failed to resolve config: {path}"))
    }

    pub fn from_toml_str(contents: &str, env: EnvLookup<'_>) -> Result<Self> {
        let file: FileConfig = toml::from_str(contents).context("Failed to parse config")?;
        let engine = EngineConfig::resolve(&file.engine, env)?;
        file.ranking.offset()?;
        file.tracking.validate()?;

        Ok(Self {
            engine,
            ranking: file.ranking,
            tracking: file.tracking,
            logging: file.logging,
        })
    }
}
