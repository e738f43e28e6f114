// Integration tests for the grid state snapshot

mod common;

use std::fs;

use chrono::{TimeZone, Utc};
use common::create_temp_state_path;
use kucoin_grid_bot::core::state::{build_ladder, Entry};
use kucoin_grid_bot::{GridState, StateStore};
use rust_decimal_macros::dec;

fn sample_state() -> GridState {
    let ladder = build_ladder(dec!(100), dec!(0.10), 4, dec!(0.01)).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut state = GridState::new(ladder, dec!(2.5), start);
    for (i, level) in state.levels.iter_mut().enumerate() {
        level.order_id = Some(format!("order-{}", i + 1));
    }
    state.levels[4].entry = Some(Entry { order_id: "order-0".into(), price: dec!(95), fee: dec!(0.2375) });
    state.total_realized_pnl = dec!(0.7238);
    state.total_fees_paid = dec!(0.4762);
    state
}

#[test]
fn test_round_trip_is_stable() {
    let (_dir, path) = create_temp_state_path();
    let store = StateStore::new(&path);
    let state = sample_state();

    store.save(&state).unwrap();
    let first = fs::read_to_string(&path).unwrap();

    let loaded = store.load();
    assert_eq!(loaded, state);

    store.save(&loaded).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), first);
}

#[test]
fn test_snapshot_is_indented_camel_case_json() {
    let (_dir, path) = create_temp_state_path();
    StateStore::new(&path).save(&sample_state()).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\n  \"version\": 1"));
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["referencePrice"], "100");
    assert_eq!(json["totalRealizedPnl"], "0.7238");
    assert_eq!(json["levels"][0]["side"], "buy");
    assert_eq!(json["levels"][0]["orderId"], "order-1");
    assert_eq!(json["levels"][4]["entry"]["price"], "95");
    assert!(json["levels"][0].get("entry").is_none());
    assert!(json["startTime"].is_string());
}

#[test]
fn test_corrupt_snapshot_yields_fresh_state() {
    let (_dir, path) = create_temp_state_path();
    fs::write(&path, "{ \"version\": 1, \"levels\": [ {\"price\": ").unwrap();

    let state = StateStore::new(&path).load();
    assert_eq!(state, GridState::default());
    assert!(!state.is_active());
}

#[test]
fn test_clear_persists_empty_state() {
    let (_dir, path) = create_temp_state_path();
    let store = StateStore::new(&path);
    store.save(&sample_state()).unwrap();

    store.clear().unwrap();
    assert!(path.exists());
    assert_eq!(store.load(), GridState::default());
}
