//! Candidate → value bet → ranked recommendation.

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

use fixora::config::AppConfig;
use fixora::engine::ValueEngine;
use fixora::strategy::odds::OddsViolation;
use fixora::strategy::{RejectionKind, RejectionReason};
use fixora::types::{Candidate, MarketKind, OddsInput};

fn make_config() -> AppConfig {
    AppConfig::from_toml_str("", &|_: &str| -> Option<String> { None }).unwrap()
}

fn make_candidate(
    fixture: &str,
    market: MarketKind,
    p: f64,
    odds: impl Into<OddsInput>,
    confidence: Option<f64>,
) -> Candidate {
    Candidate {
        fixture_id: fixture.to_string(),
        league: "Premier League".to_string(),
        kickoff: Utc.with_ymd_and_hms(2026, 10, 24, 14, 0, 0).unwrap(),
        market,
        selection: "home_win".to_string(),
        model_probability: p,
        odds: odds.into(),
        confidence,
    }
}

#[test]
fn test_short_odds_rejected_before_edge() {
    let engine = ValueEngine::from_config(&make_config()).unwrap();
    let candidate = make_candidate("1001", MarketKind::MatchResult, 0.7, 1.09, None);

    let reason = engine.selector().select(&candidate).unwrap_err();
    assert_eq!(reason.kind(), RejectionKind::InvalidOdds);
    assert!(matches!(
        reason,
        RejectionReason::InvalidOdds {
            violation: OddsViolation::BelowMinimum { .. },
            ..
        }
    ));
}

#[test]
fn test_reference_candidate_surfaces_with_percent_fields() {
    let engine = ValueEngine::from_config(&make_config()).unwrap();
    let candidate = make_candidate("1002", MarketKind::MatchResult, 0.42, 3.5, Some(0.8));

    let bet = engine.selector().select(&candidate).unwrap();
    assert!((bet.edge.implied_probability.value() - 0.2857).abs() < 1e-4);
    assert!((bet.edge.edge.value() - 0.1343).abs() < 1e-4);

    let report = engine.run_cycle(&[candidate]);
    let recs = report.recommendations();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].edge.value(), 13.43);
    assert_eq!(recs[0].confidence.value(), 80.0);
    assert_eq!(recs[0].units, dec!(3));
    assert_eq!(recs[0].rank, 1);
}

#[test]
fn test_mixed_batch_from_json() {
    let json = r#"[
        {"fixture_id": "a", "league": "EPL", "kickoff": "2026-10-24T14:00:00Z",
         "market": "1x2", "selection": "home", "model_probability": 0.42,
         "odds": "3.50", "confidence": 0.8},
        {"fixture_id": "b", "league": "EPL", "kickoff": "2026-10-24T16:30:00Z",
         "market": "btts", "selection": "yes", "model_probability": 0.62,
         "odds": 1.95},
        {"fixture_id": "c", "league": "EPL", "kickoff": "2026-10-24T16:30:00Z",
         "market": "corners", "selection": "over_10_5", "model_probability": 0.4,
         "odds": null},
        {"fixture_id": "d", "league": "EPL", "kickoff": "2026-10-24T19:00:00Z",
         "market": "totals", "selection": "over_2_5", "model_probability": 0.5,
         "odds": 2.1, "confidence": 0.9}
    ]"#;
    let batch: Vec<Candidate> = serde_json::from_str(json).unwrap();
    let engine = ValueEngine::from_config(&make_config()).unwrap();
    let report = engine.run_cycle(&batch);

    // b: edge 0.1072, derived confidence 0.714; d: edge 0.024 < 7%
    assert_eq!(report.accepted, 2);
    assert_eq!(report.summary.count(RejectionKind::InvalidOdds), 1);
    assert_eq!(report.summary.count(RejectionKind::EdgeBelowThreshold), 1);

    let ids: Vec<String> = report.recommendations().into_iter().map(|r| r.fixture_id).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn test_identical_sets_give_identical_output() {
    let engine = ValueEngine::from_config(&make_config()).unwrap();
    let mut batch: Vec<Candidate> = (0..8)
        .map(|i| {
            make_candidate(
                &format!("f{i}"),
                MarketKind::Corners,
                0.58 + 0.01 * (i % 4) as f64,
                2.0,
                Some(0.8),
            )
        })
        .collect();

    let first = serde_json::to_string(&engine.run_cycle(&batch).recommendations()).unwrap();
    batch.reverse();
    let second = serde_json::to_string(&engine.run_cycle(&batch).recommendations()).unwrap();
    assert_eq!(first, second);

    let report = engine.run_cycle(&batch);
    let tiers: Vec<String> = report.ranked().map(|r| r.tier.to_string()).collect();
    assert_eq!(tiers, vec!["3u", "2u", "1u", "0.5u", "0.5u"]);
}

#[test]
fn test_stakes_respect_cap() {
    let engine = ValueEngine::from_config(&make_config()).unwrap();
    let batch = vec![
        make_candidate("big", MarketKind::MatchResult, 0.9, 6.0, Some(0.95)),
        make_candidate("small", MarketKind::MatchResult, 0.6, 2.0, Some(0.7)),
    ];
    let report = engine.run_cycle(&batch);
    for ranked in report.ranked() {
        let stake = ranked.bet.stake.stake_fraction.value();
        assert!(stake > 0.0 && stake <= 0.05);
    }
    assert!(report.ranked().next().unwrap().bet.stake.capped);
}

#[test]
fn test_boolean_odds_rejected_without_losing_batch() {
    let json = r#"[
        {"fixture_id": "a", "league": "EPL", "kickoff": "2026-10-24T14:00:00Z",
         "market": "1x2", "selection": "home", "model_probability": 0.42,
         "odds": 3.5, "confidence": 0.8},
        {"fixture_id": "b", "league": "EPL", "kickoff": "2026-10-24T16:30:00Z",
         "market": "1x2", "selection": "away", "model_probability": 0.42,
         "odds": true, "confidence": 0.8}
    ]"#;
    let batch: Vec<Candidate> = serde_json::from_str(json).unwrap();
    let engine = ValueEngine::from_config(&make_config()).unwrap();
    let report = engine.run_cycle(&batch);

    assert_eq!(report.accepted, 1);
    assert_eq!(report.summary.count(RejectionKind::InvalidOdds), 1);
    assert!(matches!(
        &report.rejections[0].reason,
        RejectionReason::InvalidOdds {
            violation: OddsViolation::NotNumeric { .. },
            ..
        }
    ));
    assert_eq!(report.recommendations()[0].fixture_id, "a");
}
