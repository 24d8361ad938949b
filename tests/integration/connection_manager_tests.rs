//! Integration tests for `ConnectionManager::connect`.
//!
//! Covers ordered rotation, the wraparound penalty, start-index
//! normalization, the single-socket rule, and single-server log
//! suppression.

use hostwatch_agent::connection::{DRAIN_DELAY_UNITS, WRAPAROUND_PENALTY};
use hostwatch_agent::models::state::INITIAL_ROTATION_ATTEMPTS;

use super::test_helpers::{capture_logs, harness, state, ServerScript};

#[tokio::test]
async fn first_reachable_server_wins() {
    let mut h = harness(&[
        ("a.example", ServerScript::unreachable()),
        ("b.example", ServerScript::silent()),
    ]);
    let mut state = state(&["a.example", "b.example"]);

    h.manager.connect(&mut state, 0).await.expect("connect");

    assert_eq!(state.active_index, 1);
    assert!(state.is_connected());
    assert_eq!(h.log.attempts(), vec!["a.example", "b.example"]);
    assert!(
        h.pacer.pauses().is_empty(),
        "no backoff before the list is exhausted"
    );
}

#[tokio::test]
async fn single_server_retries_until_reachable() {
    let mut h = harness(&[(
        "10.0.0.1",
        ServerScript::silent().failing_connects(3),
    )]);
    let mut state = state(&["10.0.0.1"]);

    h.manager.connect(&mut state, 0).await.expect("connect");

    assert_eq!(state.active_index, 0);
    assert!(state.is_connected());
    assert_eq!(h.log.attempts().len(), 4);
    assert_eq!(h.pacer.pauses(), vec![12, 22, 32]);
    assert_eq!(state.counters.rotation_attempts, 32);
}

#[tokio::test]
async fn each_wraparound_adds_ten_units() {
    let mut h = harness(&[
        ("a.example", ServerScript::silent().failing_connects(2)),
        ("b.example", ServerScript::unreachable()),
    ]);
    let mut state = state(&["a.example", "b.example"]);

    h.manager.connect(&mut state, 0).await.expect("connect");

    assert_eq!(
        h.log.attempts(),
        vec!["a.example", "b.example", "a.example", "b.example", "a.example"]
    );
    let first = INITIAL_ROTATION_ATTEMPTS + WRAPAROUND_PENALTY;
    assert_eq!(h.pacer.pauses(), vec![first, first + WRAPAROUND_PENALTY]);
    assert_eq!(state.active_index, 0);
}

#[tokio::test]
async fn rotation_counter_resets_on_each_call() {
    let mut h = harness(&[("a.example", ServerScript::silent().failing_connects(1))]);
    let mut state = state(&["a.example"]);

    h.manager.connect(&mut state, 0).await.expect("first connect");
    assert_eq!(state.counters.rotation_attempts, 12);

    h.manager.connect(&mut state, 0).await.expect("second connect");
    assert_eq!(state.counters.rotation_attempts, INITIAL_ROTATION_ATTEMPTS);
}

#[tokio::test]
async fn out_of_range_start_index_begins_at_first_server() {
    let mut h = harness(&[
        ("a.example", ServerScript::silent()),
        ("b.example", ServerScript::silent()),
    ]);
    let mut state = state(&["a.example", "b.example"]);

    h.manager.connect(&mut state, 7).await.expect("connect");

    assert_eq!(h.log.attempts(), vec!["a.example"]);
    assert_eq!(state.active_index, 0);
}

#[tokio::test]
async fn start_index_is_honored_when_in_range() {
    let mut h = harness(&[
        ("a.example", ServerScript::silent()),
        ("b.example", ServerScript::silent()),
    ]);
    let mut state = state(&["a.example", "b.example"]);

    h.manager.connect(&mut state, 1).await.expect("connect");

    assert_eq!(h.log.attempts(), vec!["b.example"]);
    assert_eq!(state.active_index, 1);
}

#[tokio::test]
async fn previous_socket_is_closed_before_a_new_one_is_requested() {
    let mut h = harness(&[
        ("a.example", ServerScript::silent()),
        ("b.example", ServerScript::silent()),
    ]);
    let mut state = state(&["a.example", "b.example"]);

    h.manager.connect(&mut state, 0).await.expect("first connect");
    h.manager.connect(&mut state, 1).await.expect("second connect");
    h.manager.connect(&mut state, 0).await.expect("third connect");

    assert_eq!(h.log.open_sockets(), 1);
    assert_eq!(h.log.max_open_sockets(), 1, "never two sockets at once");
    assert_eq!(
        h.pacer.pauses(),
        vec![DRAIN_DELAY_UNITS, DRAIN_DELAY_UNITS],
        "one drain delay per replaced socket"
    );
}

#[tokio::test]
async fn socket_is_released_even_when_reconnect_fails_first() {
    let mut h = harness(&[
        ("a.example", ServerScript::silent()),
        ("b.example", ServerScript::unreachable()),
    ]);
    let mut state = state(&["a.example", "b.example"]);

    h.manager.connect(&mut state, 0).await.expect("first connect");
    h.manager.connect(&mut state, 1).await.expect("second connect");

    assert_eq!(state.active_index, 0);
    assert_eq!(h.log.max_open_sockets(), 1);
}

#[tokio::test]
async fn multi_server_logs_close_and_exhaustion() {
    let (logs, _guard) = capture_logs();
    let mut h = harness(&[
        ("a.example", ServerScript::silent().failing_connects(1)),
        ("b.example", ServerScript::unreachable()),
    ]);
    let mut state = state(&["a.example", "b.example"]);

    h.manager.connect(&mut state, 0).await.expect("first connect");
    h.manager.connect(&mut state, 0).await.expect("second connect");

    assert_eq!(logs.count("unable to connect to any server"), 1);
    assert_eq!(logs.count("closing connection to server"), 1);
    assert_eq!(logs.count("unable to connect to server"), 2);
}

#[tokio::test]
async fn single_server_suppresses_rotation_logs() {
    let (logs, _guard) = capture_logs();
    let mut h = harness(&[("only.example", ServerScript::silent().failing_connects(1))]);
    let mut state = state(&["only.example"]);

    h.manager.connect(&mut state, 0).await.expect("first connect");
    h.manager.connect(&mut state, 0).await.expect("second connect");

    assert_eq!(logs.count("unable to connect to any server"), 0);
    assert_eq!(logs.count("closing connection to server"), 0);
    assert_eq!(logs.count("unable to connect to server"), 1);
}
