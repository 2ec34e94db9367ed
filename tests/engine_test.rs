mod common;

use std::sync::Arc;

use chrono::Utc;

use common::{candles_from_closes, order_status, test_settings, uptrend_closes, MockGateway};
use trendbot::error::GatewayError;
use trendbot::execution::PositionState;
use trendbot::models::{OrderKind, OrderSide, OrderState};
use trendbot::Engine;

fn uptrend_gateway() -> Arc<MockGateway> {
    let gateway = Arc::new(MockGateway::new());
    let closes = uptrend_closes();
    let last = *closes.last().unwrap();
    gateway.set_candles(candles_from_closes(&closes));
    gateway.set_ticker(last);
    gateway.set_balance(1_000_000.0);
    gateway
}

#[tokio::test]
async fn test_sustained_uptrend_triggers_one_buy() {
    let gateway = uptrend_gateway();
    let mut engine = Engine::new(gateway.clone(), test_settings(3)).unwrap();

    engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(engine.position().state, PositionState::Opening);
    assert!(engine.has_pending_order());
    let placements = gateway.placements();
    assert_eq!(placements.len(), 1);
    assert_eq!(placements[0].side, OrderSide::Buy);
    assert_eq!(placements[0].kind, OrderKind::Limit);

    // Same market next cycle: the working order suppresses a second entry
    gateway.push_status(Ok(order_status(
        "ord-0",
        OrderSide::Buy,
        OrderKind::Limit,
        OrderState::Submitted,
        placements[0].quantity,
        0.0,
        0.0,
        0,
    )));
    engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(gateway.placements().len(), 1);
    assert_eq!(engine.position().state, PositionState::Opening);
}

#[tokio::test]
async fn test_profit_target_round_trip() {
    let gateway = uptrend_gateway();
    let mut engine = Engine::new(gateway.clone(), test_settings(3)).unwrap();

    // Cycle 1: entry order submitted
    engine.run_cycle(Utc::now()).await.unwrap();
    let requested = gateway.placements()[0].quantity;

    // Cycle 2: entry fills at 1000, market sits below the target
    gateway.push_status(Ok(order_status(
        "ord-0",
        OrderSide::Buy,
        OrderKind::Limit,
        OrderState::Filled,
        requested,
        requested,
        1000.0,
        1,
    )));
    gateway.set_candles(candles_from_closes(&[1000.0, 1001.0]));
    engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(engine.position().state, PositionState::Held);
    assert_eq!(engine.position().average_price, 1000.0);
    assert_eq!(gateway.placements().len(), 1);

    // Cycle 3: close reaches entry + profit target (4.0) and the exit fires
    gateway.set_candles(candles_from_closes(&[1001.0, 1004.0]));
    engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(engine.position().state, PositionState::Closing);
    let placements = gateway.placements();
    assert_eq!(placements.len(), 2);
    assert_eq!(placements[1].side, OrderSide::Sell);
    assert_eq!(placements[1].kind, OrderKind::Market);
    assert_eq!(placements[1].quantity, requested);

    // Cycle 4: the sell fills and the round trip lands in the ledger
    gateway.push_status(Ok(order_status(
        "ord-1",
        OrderSide::Sell,
        OrderKind::Market,
        OrderState::Filled,
        requested,
        requested,
        1004.5,
        0,
    )));
    gateway.set_candles(candles_from_closes(&[1004.0, 1004.5]));
    engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(engine.position().state, PositionState::Flat);
    assert!(!engine.has_pending_order());
    let trades = engine.completed_trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].exit_reason, "profit_target");
    assert!(trades[0].realized_pnl > 0.0);

    // Cycle 5: the post-trade cooldown suppresses the still-valid buy signal
    let closes = uptrend_closes();
    gateway.set_candles(candles_from_closes(&closes));
    engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(gateway.placements().len(), 2);
    assert_eq!(engine.position().state, PositionState::Flat);
}

#[tokio::test]
async fn test_unfilled_entry_times_out_and_cancels() {
    let gateway = uptrend_gateway();
    let mut engine = Engine::new(gateway.clone(), test_settings(3)).unwrap();

    engine.run_cycle(Utc::now()).await.unwrap();
    let requested = gateway.placements()[0].quantity;

    // Eleven minutes later the order is still completely unfilled
    gateway.push_status(Ok(order_status(
        "ord-0",
        OrderSide::Buy,
        OrderKind::Limit,
        OrderState::Submitted,
        requested,
        0.0,
        0.0,
        11,
    )));
    // Post-cancel reading confirms nothing filled in the meantime
    gateway.push_status(Ok(order_status(
        "ord-0",
        OrderSide::Buy,
        OrderKind::Limit,
        OrderState::Cancelled,
        requested,
        0.0,
        0.0,
        11,
    )));
    // Quiet market so no fresh entry fires after the reset
    gateway.set_candles(candles_from_closes(&[1000.0, 1000.0, 1000.0]));
    engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(gateway.cancellations(), vec!["ord-0".to_string()]);
    assert_eq!(engine.position().state, PositionState::Flat);
    assert!(!engine.has_pending_order());
    assert_eq!(gateway.placements().len(), 1);
}

#[tokio::test]
async fn test_partial_fill_timeout_keeps_the_filled_portion() {
    let gateway = uptrend_gateway();
    let settings = test_settings(3);
    let event_log_path = settings.engine.event_log_path.clone();
    let mut engine = Engine::new(gateway.clone(), settings).unwrap();

    engine.run_cycle(Utc::now()).await.unwrap();
    let requested = gateway.placements()[0].quantity;
    let half = requested * 0.5;

    gateway.push_status(Ok(order_status(
        "ord-0",
        OrderSide::Buy,
        OrderKind::Limit,
        OrderState::PartiallyFilled,
        requested,
        half,
        1130.0,
        11,
    )));
    gateway.push_status(Ok(order_status(
        "ord-0",
        OrderSide::Buy,
        OrderKind::Limit,
        OrderState::Cancelled,
        requested,
        half,
        1130.0,
        11,
    )));
    gateway.set_candles(candles_from_closes(&[1000.0, 1000.0, 1000.0]));
    engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(gateway.cancellations(), vec!["ord-0".to_string()]);
    assert_eq!(engine.position().state, PositionState::Held);
    assert!((engine.position().quantity - half).abs() < 1e-9);
    assert_eq!(engine.position().average_price, 1130.0);
    assert!(!engine.has_pending_order());

    // The cancellation event carries the order's own filled quantity
    let contents = std::fs::read_to_string(&event_log_path).unwrap();
    let cancel_line = contents
        .lines()
        .find(|line| line.contains("order_cancelled"))
        .unwrap();
    let event: serde_json::Value = serde_json::from_str(cancel_line).unwrap();
    assert!((event["filled_quantity"].as_f64().unwrap() - half).abs() < 1e-9);
}

#[tokio::test]
async fn test_transient_poll_failures_are_bounded_and_harmless() {
    let gateway = uptrend_gateway();
    let mut engine = Engine::new(gateway.clone(), test_settings(3)).unwrap();

    engine.run_cycle(Utc::now()).await.unwrap();
    let requested = gateway.placements()[0].quantity;
    assert_eq!(engine.position().state, PositionState::Opening);

    // Three transient failures exhaust the three configured attempts; the
    // cycle is skipped and the working order survives untouched.
    for _ in 0..3 {
        gateway.push_status(Err(GatewayError::Network("connection reset".to_string())));
    }
    engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(gateway.status_calls(), 3);
    assert_eq!(engine.position().state, PositionState::Opening);
    assert!(engine.has_pending_order());

    // Next cycle the exchange answers and reconciliation resumes
    gateway.push_status(Ok(order_status(
        "ord-0",
        OrderSide::Buy,
        OrderKind::Limit,
        OrderState::Filled,
        requested,
        requested,
        1130.0,
        2,
    )));
    gateway.set_candles(candles_from_closes(&[1000.0, 1000.0]));
    engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(gateway.status_calls(), 4);
    assert_eq!(engine.position().state, PositionState::Held);
}
