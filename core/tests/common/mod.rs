//! Shared test harness: scripted messenger, manual clock, engine builder.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rewards_core::{
    clock::Clock,
    command::{DispatchOutcome, InboundEvent},
    config::EngineConfig,
    directory::DisplayInfo,
    engine::RewardsEngine,
    gateway::{MembershipGate, Messenger, OpenGate, SendError},
    store::SnapshotStore,
    types::UserId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const ADMIN: UserId = 990_001;

/// Messenger that records every attempt and can be scripted to fail.
#[derive(Clone, Default)]
pub struct ScriptedMessenger {
    delivered: Arc<Mutex<Vec<(UserId, String)>>>,
    attempts: Arc<Mutex<HashMap<UserId, u32>>>,
    failures: Arc<Mutex<HashMap<UserId, VecDeque<SendError>>>>,
}

impl ScriptedMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue errors to return for `recipient` before sends succeed.
    pub fn fail_next(&self, recipient: UserId, errors: &[SendError]) {
        let mut failures = self.failures.lock().unwrap();
        failures
            .entry(recipient)
            .or_default()
            .extend(errors.iter().cloned());
    }

    pub fn delivered(&self) -> Vec<(UserId, String)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_to(&self, recipient: UserId) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == recipient)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn attempts_to(&self, recipient: UserId) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(&recipient)
            .copied()
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        self.delivered.lock().unwrap().clear();
        self.attempts.lock().unwrap().clear();
    }
}

impl Messenger for ScriptedMessenger {
    fn send(&self, recipient: UserId, text: &str) -> Result<(), SendError> {
        *self.attempts.lock().unwrap().entry(recipient).or_insert(0) += 1;
        if let Some(queue) = self.failures.lock().unwrap().get_mut(&recipient) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        self.delivered
            .lock()
            .unwrap()
            .push((recipient, text.to_string()));
        Ok(())
    }
}

/// Clock under test control: sleeps advance virtual time and are logged.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    sleeps: Arc<Mutex<Vec<u64>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        let epoch = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Self {
            now: Arc::new(Mutex::new(epoch)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    pub fn sleeps(&self) -> Vec<u64> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn clear_sleeps(&self) {
        self.sleeps.lock().unwrap().clear();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn sleep_units(&self, units: u64) {
        self.sleeps.lock().unwrap().push(units);
        // Keep virtual time moving so timestamp-derived ids stay unique.
        self.advance(Duration::seconds(units as i64));
    }
}

/// Gate whose answer is fixed per test.
pub struct FixedGate(pub bool);

impl MembershipGate for FixedGate {
    fn is_member(&self, _user_id: UserId) -> bool {
        self.0
    }
}

pub fn build_engine() -> (RewardsEngine, ScriptedMessenger, ManualClock) {
    build_engine_with_gate(Box::new(OpenGate))
}

pub fn build_engine_with_gate(
    gate: Box<dyn MembershipGate>,
) -> (RewardsEngine, ScriptedMessenger, ManualClock) {
    let config = EngineConfig {
        root_admin: ADMIN,
        ..EngineConfig::default()
    };
    let store = SnapshotStore::in_memory().expect("in-memory store");
    let messenger = ScriptedMessenger::new();
    let clock = ManualClock::new();
    let engine = RewardsEngine::open(
        config,
        store,
        Box::new(messenger.clone()),
        gate,
        Box::new(clock.clone()),
    )
    .expect("build engine");
    (engine, messenger, clock)
}

pub fn display(name: &str) -> DisplayInfo {
    DisplayInfo {
        name: name.to_string(),
        handle: name.to_lowercase(),
    }
}

/// Bootstrap a user, optionally via a referral code.
pub fn join(engine: &mut RewardsEngine, user_id: UserId, code: Option<&str>) {
    engine
        .dispatch(InboundEvent::Bootstrap {
            user_id,
            display: display(&format!("User{user_id}")),
            referral_code: code.map(str::to_string),
        })
        .expect("bootstrap");
}

/// Bootstrap the root admin so privileged-account paths have a record.
pub fn join_admin(engine: &mut RewardsEngine) {
    join(engine, ADMIN, None);
}

pub fn grant(engine: &mut RewardsEngine, user_id: UserId, amount: i64) {
    engine
        .dispatch(InboundEvent::GrantPoints {
            admin_id: ADMIN,
            user_id,
            amount,
        })
        .expect("grant points");
}

/// Confirm a redemption and return the new order id.
pub fn buy(engine: &mut RewardsEngine, user_id: UserId, product_id: u32) -> String {
    match engine
        .dispatch(InboundEvent::RedemptionConfirm {
            user_id,
            product_id,
        })
        .expect("confirm redemption")
    {
        DispatchOutcome::OrderPlaced { order_id, .. } => order_id,
        other => panic!("unexpected outcome: {other:?}"),
    }
}

pub fn add_product(engine: &mut RewardsEngine, name: &str, cost: i64) -> u32 {
    match engine
        .dispatch(InboundEvent::AddProduct {
            admin_id: ADMIN,
            name: name.to_string(),
            cost,
            description: String::new(),
        })
        .expect("add product")
    {
        DispatchOutcome::ProductAdded { product_id, .. } => product_id,
        other => panic!("unexpected outcome: {other:?}"),
    }
}
