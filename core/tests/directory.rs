//! Account directory tests: balances, admin overrides, sweep guards,
//! leaderboard ordering, membership gate flag.

mod common;

use chrono::Duration;
use common::{build_engine, build_engine_with_gate, grant, join, join_admin, FixedGate, ADMIN};
use rewards_core::command::{DispatchOutcome, InboundEvent};
use rewards_core::directory::PointBalance;
use rewards_core::error::EngineError;

fn user(n: i64) -> i64 {
    40_000_000 + n
}

#[test]
fn bootstrap_is_idempotent_and_refreshes_last_active() {
    let (mut engine, _messenger, clock) = build_engine();
    join(&mut engine, user(1), None);
    let joined_at = engine.account(user(1)).unwrap().joined_at;

    clock.advance(Duration::days(2));
    join(&mut engine, user(1), None);

    let account = engine.account(user(1)).unwrap();
    assert_eq!(account.joined_at, joined_at);
    assert_eq!(account.last_active, joined_at + Duration::days(2));
    assert_eq!(engine.stats().total_accounts, 1);
}

#[test]
fn grant_requires_positive_amount_and_a_known_user() {
    let (mut engine, _messenger, _clock) = build_engine();
    join(&mut engine, user(1), None);

    let err = engine
        .dispatch(InboundEvent::GrantPoints {
            admin_id: ADMIN,
            user_id: user(1),
            amount: 0,
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(0)));

    let err = engine
        .dispatch(InboundEvent::GrantPoints {
            admin_id: ADMIN,
            user_id: user(9),
            amount: 3,
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownUser(_)));

    grant(&mut engine, user(1), 3);
    assert_eq!(engine.account(user(1)).unwrap().balance, PointBalance::Limited(3));
}

#[test]
fn set_balance_rejects_negative_amounts() {
    let (mut engine, _messenger, _clock) = build_engine();
    join(&mut engine, user(1), None);
    grant(&mut engine, user(1), 8);

    let err = engine
        .dispatch(InboundEvent::SetPoints {
            admin_id: ADMIN,
            user_id: user(1),
            amount: -1,
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(-1)));
    assert_eq!(engine.account(user(1)).unwrap().balance, PointBalance::Limited(8));

    engine
        .dispatch(InboundEvent::SetPoints {
            admin_id: ADMIN,
            user_id: user(1),
            amount: 0,
        })
        .unwrap();
    assert_eq!(engine.account(user(1)).unwrap().balance, PointBalance::Limited(0));
}

#[test]
fn privileged_balance_never_moves() {
    let (mut engine, _messenger, _clock) = build_engine();
    join_admin(&mut engine);

    grant(&mut engine, ADMIN, 100);
    engine
        .dispatch(InboundEvent::SetPoints {
            admin_id: ADMIN,
            user_id: ADMIN,
            amount: 7,
        })
        .unwrap();

    assert_eq!(engine.account(ADMIN).unwrap().balance, PointBalance::Unlimited);
}

#[test]
fn non_admin_callers_are_refused() {
    let (mut engine, _messenger, _clock) = build_engine();
    join(&mut engine, user(1), None);
    join(&mut engine, user(2), None);

    let err = engine
        .dispatch(InboundEvent::GrantPoints {
            admin_id: user(1),
            user_id: user(2),
            amount: 5,
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::NotAuthorized(_)));
}

#[test]
fn sweep_removes_only_dormant_empty_accounts() {
    let (mut engine, _messenger, clock) = build_engine();
    join_admin(&mut engine);
    join(&mut engine, user(1), None); // dormant, empty -> swept
    join(&mut engine, user(2), None); // has points -> kept
    join(&mut engine, user(3), None); // has a referral -> kept
    grant(&mut engine, user(2), 1);
    let code = engine.account(user(3)).unwrap().referral_code.clone();
    join(&mut engine, user(4), Some(&code)); // user(3) recruits user(4)

    clock.advance(Duration::days(40));
    join(&mut engine, user(5), None); // recently active -> kept

    let outcome = engine
        .dispatch(InboundEvent::SweepInactive {
            admin_id: ADMIN,
            window_days: Some(30),
        })
        .unwrap();

    // user(4) is also dormant and empty; it goes with user(1).
    assert!(matches!(outcome, DispatchOutcome::Swept { removed: 2 }));
    assert!(engine.account(user(1)).is_none());
    assert!(engine.account(user(4)).is_none());
    assert!(engine.account(user(2)).is_some());
    assert!(engine.account(user(3)).is_some());
    assert!(engine.account(user(5)).is_some());
    assert!(engine.account(ADMIN).is_some());
}

#[test]
fn leaderboard_orders_by_balance_with_stable_ties() {
    let (mut engine, _messenger, _clock) = build_engine();
    join_admin(&mut engine);
    join(&mut engine, user(1), None);
    join(&mut engine, user(2), None);
    join(&mut engine, user(3), None);
    grant(&mut engine, user(1), 2);
    grant(&mut engine, user(2), 5);
    grant(&mut engine, user(3), 2);

    let board = engine.leaderboard();
    let ids: Vec<i64> = board.iter().map(|row| row.user_id).collect();
    // user(1) precedes user(3) on the tie: directory insertion order.
    assert_eq!(ids, vec![user(2), user(1), user(3)]);
    // The privileged account never appears.
    assert!(!ids.contains(&ADMIN));
}

#[test]
fn membership_gate_answer_is_remembered_on_the_account() {
    let (mut engine, _messenger, _clock) = build_engine_with_gate(Box::new(FixedGate(false)));
    join(&mut engine, user(1), None);

    let outcome = engine
        .dispatch(InboundEvent::VerifyMembership { user_id: user(1) })
        .unwrap();
    assert!(matches!(
        outcome,
        DispatchOutcome::MembershipChecked { member: false, .. }
    ));
    assert!(!engine.account(user(1)).unwrap().gate_passed);

    let (mut engine, _messenger, _clock) = build_engine_with_gate(Box::new(FixedGate(true)));
    join(&mut engine, user(1), None);
    engine
        .dispatch(InboundEvent::VerifyMembership { user_id: user(1) })
        .unwrap();
    assert!(engine.account(user(1)).unwrap().gate_passed);
}
