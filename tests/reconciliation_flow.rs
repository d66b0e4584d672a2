//! End-to-end reconciliation scenarios over the in-memory store and a
//! scripted upstream client.

use candlesync::application::reconciliation::{AbortReason, Outcome, ReconciliationEngine};
use candlesync::application::rsi::RsiService;
use candlesync::domain::errors::ReconcileError;
use candlesync::domain::market::interval::Interval;
use candlesync::domain::repositories::CandlestickRepository;
use candlesync::infrastructure::mock::{ManualClock, ScriptedMarketClient, synthetic_candle};
use candlesync::infrastructure::repositories::InMemoryCandlestickRepository;
use std::sync::Arc;
use tokio::sync::watch;

const BASE: i64 = 1704067200000; // 2024-01-01 00:00:00 UTC
const MIN: i64 = 60_000;

fn engine(
    client: Arc<ScriptedMarketClient>,
    repo: Arc<InMemoryCandlestickRepository>,
) -> ReconciliationEngine {
    let clock = Arc::new(ManualClock::new(BASE));
    ReconciliationEngine::new(client, repo, clock)
}

#[tokio::test]
async fn test_backfill_from_empty_store_completes() {
    let client = Arc::new(ScriptedMarketClient::serving_range(
        "BTCUSDT",
        Interval::OneMin,
        BASE,
        BASE + 60 * MIN,
    ));
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let engine = engine(client.clone(), repo.clone());

    let result = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE, BASE + 60 * MIN)
        .await
        .unwrap();

    assert!(result.is_complete());
    assert_eq!(result.candles.len(), 60);
    assert_eq!(result.filled, 60);
    assert_eq!(client.calls(), 1);

    let opens: Vec<i64> = result.candles.iter().map(|c| c.open_time).collect();
    let expected: Vec<i64> = (0..60).map(|i| BASE + i * MIN).collect();
    assert_eq!(opens, expected);
}

#[tokio::test]
async fn test_second_reconcile_issues_no_fetches() {
    let client = Arc::new(ScriptedMarketClient::serving_range(
        "BTCUSDT",
        Interval::OneMin,
        BASE,
        BASE + 30 * MIN,
    ));
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let engine = engine(client.clone(), repo.clone());

    let first = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE, BASE + 30 * MIN)
        .await
        .unwrap();
    assert!(first.is_complete());
    let calls_after_first = client.calls();

    let second = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE, BASE + 30 * MIN)
        .await
        .unwrap();

    assert!(second.is_complete());
    assert_eq!(second.filled, 0);
    assert_eq!(second.candles, first.candles);
    assert_eq!(client.calls(), calls_after_first);
}

#[tokio::test]
async fn test_preseeded_store_only_fetches_gaps() {
    let client = Arc::new(ScriptedMarketClient::serving_range(
        "BTCUSDT",
        Interval::OneMin,
        BASE,
        BASE + 10 * MIN,
    ));
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    for i in [0i64, 1, 2, 7, 8, 9] {
        repo.insert(&synthetic_candle("BTCUSDT", Interval::OneMin, BASE + i * MIN))
            .await
            .unwrap();
    }
    let engine = engine(client.clone(), repo.clone());

    let result = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE, BASE + 10 * MIN)
        .await
        .unwrap();

    assert!(result.is_complete());
    assert_eq!(result.candles.len(), 10);
    // only slots 3..=6 were missing
    assert_eq!(result.filled, 4);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_large_range_pages_through_multiple_windows() {
    // 2500 one-minute slots need three 1000-bar windows
    let client = Arc::new(ScriptedMarketClient::serving_range(
        "BTCUSDT",
        Interval::OneMin,
        BASE,
        BASE + 2500 * MIN,
    ));
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let engine = engine(client.clone(), repo.clone());

    let result = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE, BASE + 2500 * MIN)
        .await
        .unwrap();

    assert!(result.is_complete());
    assert_eq!(result.candles.len(), 2500);
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn test_empty_upstream_returns_partial() {
    let client = Arc::new(ScriptedMarketClient::empty());
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let engine = engine(client.clone(), repo.clone());

    let result = engine
        .reconcile("NEWUSDT", Interval::OneMin, BASE, BASE + 10 * MIN)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Partial(AbortReason::UpstreamExhausted));
    assert!(result.candles.is_empty());
    assert_eq!(result.filled, 0);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_out_of_order_batch_fails_without_partial_writes() {
    let client = Arc::new(ScriptedMarketClient::out_of_order(
        "BTCUSDT",
        Interval::OneMin,
        BASE,
    ));
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let engine = engine(client, repo.clone());

    let err = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE, BASE + 10 * MIN)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::OutOfOrderData { .. }));
    assert!(repo.is_empty().await);
}

#[tokio::test]
async fn test_unfillable_middle_slot_terminates_with_no_progress() {
    // slot 5 never gets data upstream
    let client = Arc::new(ScriptedMarketClient::serving_range_with_holes(
        "BTCUSDT",
        Interval::OneMin,
        BASE,
        BASE + 10 * MIN,
        [BASE + 5 * MIN],
    ));
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let engine = engine(client.clone(), repo.clone());

    let result = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE, BASE + 10 * MIN)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Partial(AbortReason::NoProgress));
    assert_eq!(result.candles.len(), 9);
    // bounded: one productive fetch plus one that proves no progress
    assert!(client.calls() <= 2);
}

#[tokio::test]
async fn test_unfillable_first_slot_terminates_on_repeated_window() {
    let client = Arc::new(ScriptedMarketClient::serving_range_with_holes(
        "BTCUSDT",
        Interval::OneMin,
        BASE,
        BASE + 10 * MIN,
        [BASE],
    ));
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let engine = engine(client.clone(), repo.clone());

    let result = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE, BASE + 10 * MIN)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Partial(AbortReason::RepeatedWindow));
    assert_eq!(result.candles.len(), 9);
    assert!(client.calls() <= 2);
}

#[tokio::test]
async fn test_degenerate_range_completes_without_fetching() {
    let client = Arc::new(ScriptedMarketClient::empty());
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let engine = engine(client.clone(), repo);

    let result = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE, BASE)
        .await
        .unwrap();

    assert!(result.is_complete());
    assert!(result.candles.is_empty());
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_inverted_range_is_a_validation_error() {
    let client = Arc::new(ScriptedMarketClient::empty());
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let engine = engine(client, repo);

    let err = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE + MIN, BASE)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));
}

#[tokio::test]
async fn test_shutdown_flag_aborts_before_fetching() {
    let client = Arc::new(ScriptedMarketClient::serving_range(
        "BTCUSDT",
        Interval::OneMin,
        BASE,
        BASE + 10 * MIN,
    ));
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let clock = Arc::new(ManualClock::new(BASE));
    let (tx, rx) = watch::channel(false);
    let engine = ReconciliationEngine::new(client.clone(), repo, clock).with_shutdown(rx);

    tx.send(true).unwrap();
    let result = engine
        .reconcile("BTCUSDT", Interval::OneMin, BASE, BASE + 10 * MIN)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Partial(AbortReason::Cancelled));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_rsi_over_reconciled_series() {
    let client = Arc::new(ScriptedMarketClient::serving_range(
        "BTCUSDT",
        Interval::OneDay,
        BASE,
        BASE + 30 * 86_400_000,
    ));
    let repo = Arc::new(InMemoryCandlestickRepository::new());
    let service = RsiService::new(engine(client, repo));

    let series = service
        .historical_rsi("BTCUSDT", Interval::OneDay, BASE, BASE + 30 * 86_400_000, 14)
        .await
        .unwrap();

    assert_eq!(series.len(), 30 - 14 + 1);
    // first value is labelled with the 14th candle's open date
    assert_eq!(series.dates()[0], "2024-01-14");
    assert!(series.values().iter().all(|v| (0.0..=100.0).contains(v)));
}
