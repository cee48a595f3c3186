//! Broadcast pipeline tests: retry/backoff, rate limiting, tallies,
//! and the staged compose → preview → confirm flow.

mod common;

use common::{build_engine, join, ADMIN};
use rewards_core::command::{DispatchOutcome, InboundEvent};
use rewards_core::gateway::SendError;
use rewards_core::session::AdminSession;

fn user(n: i64) -> i64 {
    30_000_000 + n
}

fn broadcast(
    engine: &mut rewards_core::engine::RewardsEngine,
    text: &str,
) -> rewards_core::broadcast::BroadcastReport {
    match engine
        .dispatch(InboundEvent::Broadcast {
            admin_id: ADMIN,
            text: text.to_string(),
        })
        .expect("broadcast")
    {
        DispatchOutcome::BroadcastFinished(report) => report,
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn transient_failures_recover_on_retry_with_one_rate_pause() {
    let (mut engine, messenger, clock) = build_engine();
    for n in 0..25 {
        join(&mut engine, user(n), None);
    }
    // Recipients 5 and 17 fail once, then succeed on the second attempt.
    messenger.fail_next(user(5), &[SendError::Transient("flaky".into())]);
    messenger.fail_next(user(17), &[SendError::Transient("flaky".into())]);
    messenger.clear();
    clock.clear_sleeps();

    let report = broadcast(&mut engine, "big news");

    assert_eq!(report.succeeded, 25);
    assert_eq!(report.failed, 0);
    assert_eq!(messenger.attempts_to(user(5)), 2);
    assert_eq!(messenger.attempts_to(user(17)), 2);
    // Two 1-unit backoffs plus exactly one rate pause after the 20th
    // cumulative success.
    assert_eq!(clock.sleeps(), vec![1, 1, 1]);
}

#[test]
fn exhausted_retries_count_as_failed_with_backoff_1_then_2() {
    let (mut engine, messenger, clock) = build_engine();
    join(&mut engine, user(0), None);
    messenger.fail_next(
        user(0),
        &[
            SendError::Transient("down".into()),
            SendError::Transient("down".into()),
            SendError::Transient("down".into()),
        ],
    );
    clock.clear_sleeps();

    let report = broadcast(&mut engine, "anyone there?");

    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(messenger.attempts_to(user(0)), 3);
    // No wait after the final attempt.
    assert_eq!(clock.sleeps(), vec![1, 2]);
}

#[test]
fn permanent_failure_is_not_retried() {
    let (mut engine, messenger, clock) = build_engine();
    join(&mut engine, user(0), None);
    join(&mut engine, user(1), None);
    messenger.fail_next(user(0), &[SendError::Permanent("blocked".into())]);
    clock.clear_sleeps();

    let report = broadcast(&mut engine, "hello");

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(messenger.attempts_to(user(0)), 1);
    assert!(clock.sleeps().is_empty());
}

#[test]
fn initiator_is_excluded_and_text_is_rendered() {
    let (mut engine, messenger, _clock) = build_engine();
    common::join_admin(&mut engine);
    join(&mut engine, user(0), None);
    messenger.clear();

    let report = broadcast(&mut engine, "maintenance tonight");

    assert_eq!(report.succeeded, 1);
    assert!(messenger.delivered_to(ADMIN).is_empty());
    let texts = messenger.delivered_to(user(0));
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("ANNOUNCEMENT"));
    assert!(texts[0].contains("maintenance tonight"));
}

#[test]
fn staged_flow_previews_then_sends_on_confirmation() {
    let (mut engine, messenger, _clock) = build_engine();
    for n in 0..3 {
        join(&mut engine, user(n), None);
    }
    messenger.clear();

    engine
        .dispatch(InboundEvent::BeginBroadcast { admin_id: ADMIN })
        .unwrap();
    assert_eq!(engine.session(ADMIN), AdminSession::AwaitingBroadcastText);

    let outcome = engine
        .dispatch(InboundEvent::AdminText {
            admin_id: ADMIN,
            text: "weekly digest".to_string(),
        })
        .unwrap();
    assert!(matches!(
        outcome,
        DispatchOutcome::BroadcastPreviewed { recipients: 3 }
    ));
    // Nothing goes out until the confirmation.
    assert!(messenger.delivered().is_empty());

    let outcome = engine
        .dispatch(InboundEvent::AdminText {
            admin_id: ADMIN,
            text: "yes".to_string(),
        })
        .unwrap();
    match outcome {
        DispatchOutcome::BroadcastFinished(report) => {
            assert_eq!(report.succeeded, 3);
            assert_eq!(report.failed, 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(messenger.delivered_to(user(1))[0].contains("weekly digest"));
    assert_eq!(engine.session(ADMIN), AdminSession::Idle);
}

#[test]
fn staged_flow_cancels_on_anything_but_yes() {
    let (mut engine, messenger, _clock) = build_engine();
    join(&mut engine, user(0), None);
    messenger.clear();

    engine
        .dispatch(InboundEvent::BeginBroadcast { admin_id: ADMIN })
        .unwrap();
    engine
        .dispatch(InboundEvent::AdminText {
            admin_id: ADMIN,
            text: "draft copy".to_string(),
        })
        .unwrap();
    let outcome = engine
        .dispatch(InboundEvent::AdminText {
            admin_id: ADMIN,
            text: "no".to_string(),
        })
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::BroadcastCancelled));
    assert!(messenger.delivered().is_empty());
    assert_eq!(engine.session(ADMIN), AdminSession::Idle);
}

#[test]
fn admin_text_with_no_open_prompt_is_ignored() {
    let (mut engine, messenger, _clock) = build_engine();
    let outcome = engine
        .dispatch(InboundEvent::AdminText {
            admin_id: ADMIN,
            text: "stray message".to_string(),
        })
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Ignored));
    assert!(messenger.delivered().is_empty());
}
