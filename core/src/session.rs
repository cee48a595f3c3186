//! Per-admin interaction state machine for staged input.
//!
//! Free-text admin input only means something relative to the current
//! session state: a fulfillment note, broadcast copy, or a broadcast
//! confirmation. Text arriving in Idle is simply not a prompt answer —
//! a typed impossibility, not a runtime flag check.

use crate::types::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AdminSession {
    #[default]
    Idle,
    /// An approval was started; the next text from this admin is the
    /// fulfillment note for this order.
    AwaitingOrderNote { order_id: OrderId },
    /// A staged broadcast was opened; the next text is the copy.
    AwaitingBroadcastText,
    /// Copy collected; the next text is the yes/no confirmation.
    AwaitingBroadcastConfirm { text: String },
}

#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    sessions: HashMap<UserId, AdminSession>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, admin_id: UserId) -> AdminSession {
        self.sessions.get(&admin_id).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, admin_id: UserId, session: AdminSession) {
        if session == AdminSession::Idle {
            self.sessions.remove(&admin_id);
        } else {
            self.sessions.insert(admin_id, session);
        }
    }

    pub fn reset(&mut self, admin_id: UserId) {
        self.sessions.remove(&admin_id);
    }

    /// Drop any note prompt that references `order_id`, for any admin.
    /// Called when an order is rejected mid-approval.
    pub fn forget_order(&mut self, order_id: &str) {
        self.sessions.retain(|_, session| {
            !matches!(session, AdminSession::AwaitingOrderNote { order_id: id } if *id == order_id)
        });
    }
}

/// Loose yes-matching for the broadcast confirmation step.
pub fn is_affirmative(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "yes" | "y" | "ok" | "send" | "confirm"
    )
}
