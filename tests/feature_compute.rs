use coheron::{
    compute_delta, FeatureSchema, TransactionEvent, FIELD_AMOUNT_MEAN, FIELD_AMOUNT_SUM,
    FIELD_NIGHT_TXN_COUNT, FIELD_RATE_1H, FIELD_TXN_COUNT, FIELD_VELOCITY,
    FIELD_WEEKEND_TXN_COUNT,
};

// 2021-06-07 12:00:00 UTC, a Monday around midday.
const MONDAY_NOON_MS: u64 = 1_623_067_200_000;

fn schema() -> FeatureSchema {
    FeatureSchema::v1()
}

#[test]
fn first_event_builds_from_implicit_zero_state() {
    let event = TransactionEvent::new("e-1", "acct-1", MONDAY_NOON_MS, 100.0);
    let delta = compute_delta(&schema(), None, &event);
    assert_eq!(delta.fields[FIELD_TXN_COUNT], 1.0);
    assert_eq!(delta.fields[FIELD_AMOUNT_SUM], 100.0);
    assert_eq!(delta.fields[FIELD_AMOUNT_MEAN], 100.0);
    assert_eq!(delta.fields[FIELD_VELOCITY], 0.0);
    assert_eq!(delta.fields[FIELD_NIGHT_TXN_COUNT], 0.0);
    assert_eq!(delta.fields[FIELD_WEEKEND_TXN_COUNT], 0.0);
    assert_eq!(delta.schema_version, schema().version());
    schema().check_fields(&delta.fields).unwrap();
}

#[test]
fn incremental_event_accumulates_running_aggregates() {
    let first = TransactionEvent::new("e-1", "acct-1", MONDAY_NOON_MS, 100.0);
    let prior = compute_delta(&schema(), None, &first).into_state(
        "acct-1", 1, "e-1", MONDAY_NOON_MS, 3_600_000,
    );
    let second = TransactionEvent::new("e-2", "acct-1", MONDAY_NOON_MS + 10_000, 50.0);
    let delta = compute_delta(&schema(), Some(&prior), &second);
    assert_eq!(delta.fields[FIELD_TXN_COUNT], 2.0);
    assert_eq!(delta.fields[FIELD_AMOUNT_SUM], 150.0);
    assert_eq!(delta.fields[FIELD_AMOUNT_MEAN], 75.0);
    // 50 units over 10 seconds.
    assert!((delta.fields[FIELD_VELOCITY] - 5.0).abs() < 1e-9);
}

#[test]
fn rate_counters_decay_with_elapsed_time() {
    let first = TransactionEvent::new("e-1", "acct-1", MONDAY_NOON_MS, 10.0);
    let prior = compute_delta(&schema(), None, &first).into_state(
        "acct-1", 1, "e-1", MONDAY_NOON_MS, 3_600_000,
    );
    // Exactly one hour later: the 1h counter retains 1/e of its mass.
    let second = TransactionEvent::new("e-2", "acct-1", MONDAY_NOON_MS + 3_600_000, 10.0);
    let delta = compute_delta(&schema(), Some(&prior), &second);
    let expected = 1.0 * (-1.0f64).exp() + 1.0;
    assert!((delta.fields[FIELD_RATE_1H] - expected).abs() < 1e-9);
}

#[test]
fn out_of_order_timestamp_clamps_decay_to_zero() {
    let first = TransactionEvent::new("e-1", "acct-1", MONDAY_NOON_MS, 10.0);
    let prior = compute_delta(&schema(), None, &first).into_state(
        "acct-1", 1, "e-1", MONDAY_NOON_MS, 3_600_000,
    );
    let late = TransactionEvent::new("e-2", "acct-1", MONDAY_NOON_MS - 60_000, 10.0);
    let delta = compute_delta(&schema(), Some(&prior), &late);
    // No decay, no negative elapsed time: the counter just increments.
    assert!((delta.fields[FIELD_RATE_1H] - 2.0).abs() < 1e-9);
    assert_eq!(delta.event_ts_ms, MONDAY_NOON_MS);
}

#[test]
fn temporal_flags_follow_the_event_clock() {
    // 23:45 UTC on a Saturday (2021-06-05).
    let saturday_night_ms = 1_622_936_700_000;
    let event = TransactionEvent::new("e-1", "acct-1", saturday_night_ms, 20.0);
    let delta = compute_delta(&schema(), None, &event);
    assert_eq!(delta.fields[FIELD_NIGHT_TXN_COUNT], 1.0);
    assert_eq!(delta.fields[FIELD_WEEKEND_TXN_COUNT], 1.0);
}

#[test]
fn computation_is_deterministic() {
    let first = TransactionEvent::new("e-1", "acct-1", MONDAY_NOON_MS, 42.0);
    let a = compute_delta(&schema(), None, &first);
    let b = compute_delta(&schema(), None, &first);
    assert_eq!(a, b);
}
