//! Recommend → track → settle → aggregate, against both ledger backends.

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

use fixora::config::AppConfig;
use fixora::engine::accountant::Accountant;
use fixora::engine::{CycleReport, ValueEngine};
use fixora::storage::{self, JsonLedgerStore, LedgerStore, SqliteStore};
use fixora::tracking::{RoiTracker, Scope};
use fixora::types::{Candidate, EngineError, MarketKind, Outcome};

fn make_report() -> CycleReport {
    let config = AppConfig::from_toml_str("", &|_: &str| -> Option<String> { None }).unwrap();
    let engine = ValueEngine::from_config(&config).unwrap();

    let candidates: Vec<Candidate> = [("a", "EPL", 0.7), ("b", "EPL", 0.65), ("c", "Serie A", 0.6)]
        .iter()
        .map(|(fixture, league, p)| Candidate {
            fixture_id: fixture.to_string(),
            league: league.to_string(),
            kickoff: Utc.with_ymd_and_hms(2026, 10, 24, 15, 0, 0).unwrap(),
            market: MarketKind::MatchResult,
            selection: "home_win".to_string(),
            model_probability: *p,
            odds: 2.0.into(),
            confidence: Some(0.8),
        })
        .collect();
    engine.run_cycle(&candidates)
}

fn make_accountant<S: LedgerStore>(store: S) -> Accountant<S> {
    Accountant::new(RoiTracker::new(dec!(10)), store)
}

fn temp_path() -> String {
    let mut path = std::env::temp_dir();
    path.push(format!("fixora_it_{}.json", uuid::Uuid::new_v4()));
    path.to_string_lossy().to_string()
}

#[tokio::test]
async fn test_full_cycle_on_sqlite() {
    let store = SqliteStore::in_memory().await.unwrap();
    let accountant = make_accountant(store);

    let summary = accountant.track_cycle(&make_report()).await.unwrap();
    assert_eq!(summary.recorded, 3);
    assert_eq!(accountant.tracker().pending().len(), 3);

    let at = Utc.with_ymd_and_hms(2026, 10, 24, 17, 0, 0).unwrap();
    let win = accountant
        .settle("a:match_result:home_win", Outcome::Win, at)
        .await
        .unwrap();
    assert_eq!(win.stake, dec!(30));
    assert_eq!(win.profit_loss, dec!(30));

    let loss = accountant
        .settle("b:match_result:home_win", Outcome::Loss, at)
        .await
        .unwrap();
    assert_eq!(loss.profit_loss, dec!(-20));

    let void = accountant
        .settle("c:match_result:home_win", Outcome::Void, at)
        .await
        .unwrap();
    assert_eq!(void.returned, dec!(10));

    let overall = accountant.tracker().aggregate(&Scope::Overall);
    assert_eq!(overall.bets, 3);
    assert_eq!(overall.total_stake, dec!(60));
    assert_eq!(overall.profit_loss, dec!(10));
    assert!((overall.roi.value() - 16.67).abs() < 1e-9);
    assert!((overall.win_rate.value() - 33.33).abs() < 1e-9);
    assert!(accountant.tracker().pending().is_empty());

    let (bets, roi): (i64, f64) = sqlx::query_as(
        "SELECT bets, roi FROM performance_aggregates WHERE scope_kind = 'overall' AND time_bucket = 'all'",
    )
    .fetch_one(accountant.store().pool())
    .await
    .unwrap();
    assert_eq!(bets, 3);
    assert!((roi - 16.67).abs() < 1e-9);

    let (league_bets,): (i64,) = sqlx::query_as(
        "SELECT bets FROM performance_aggregates WHERE scope_kind = 'league' AND scope_key = 'serie a' AND time_bucket = 'all'",
    )
    .fetch_one(accountant.store().pool())
    .await
    .unwrap();
    assert_eq!(league_bets, 1);
}

#[tokio::test]
async fn test_settlement_errors_surface() {
    let store = SqliteStore::in_memory().await.unwrap();
    let accountant = make_accountant(store);
    accountant.track_cycle(&make_report()).await.unwrap();
    let at = Utc.with_ymd_and_hms(2026, 10, 24, 17, 0, 0).unwrap();

    let err = accountant
        .settle("zz:match_result:home_win", Outcome::Win, at)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::DanglingSettlement { .. })
    ));

    let first = accountant
        .settle("a:match_result:home_win", Outcome::Loss, at)
        .await
        .unwrap();
    // same outcome again is a no-op
    let retry = accountant
        .settle("a:match_result:home_win", Outcome::Loss, at)
        .await
        .unwrap();
    assert_eq!(first, retry);
    assert_eq!(accountant.tracker().settled().len(), 1);

    let err = accountant
        .settle("a:match_result:home_win", Outcome::Win, at)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::ConflictingSettlement { .. })
    ));
    assert_eq!(accountant.tracker().aggregate(&Scope::Overall).losses, 1);
}

#[tokio::test]
async fn test_json_ledger_survives_restart() {
    let path = temp_path();
    let at = Utc.with_ymd_and_hms(2026, 10, 24, 17, 0, 0).unwrap();

    {
        let accountant = make_accountant(JsonLedgerStore::new(&path));
        accountant.track_cycle(&make_report()).await.unwrap();
        accountant
            .settle("b:match_result:home_win", Outcome::Win, at)
            .await
            .unwrap();
    }

    let store = JsonLedgerStore::new(&path);
    let ledger = storage::load_ledger_from(&store).await.unwrap();
    let tracker = RoiTracker::from_ledger(dec!(10), ledger);
    assert_eq!(tracker.pending().len(), 2);

    let epl = tracker.aggregate(&Scope::League("epl".to_string()));
    assert_eq!(epl.bets, 1);
    assert_eq!(epl.wins, 1);
    assert_eq!(epl.total_return, dec!(40));

    // a second run over the same cycle does not duplicate anything
    let accountant = Accountant::new(tracker, store);
    let summary = accountant.track_cycle(&make_report()).await.unwrap();
    assert_eq!(summary.recorded, 0);
    assert_eq!(summary.already_tracked, 3);

    storage::delete_ledger(Some(&path)).unwrap();
}
