//! Ledger events — the append-only record of every committed mutation.
//!
//! RULE: An event is recorded only after its mutation has committed.
//! Recording failure is logged and never unwinds the mutation.
//! Variants are added as features land — never removed or reordered.

use crate::types::{OrderId, Points, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    // ── Directory ─────────────────────────────────
    AccountCreated {
        user_id: UserId,
        privileged: bool,
        referral_code: String,
    },
    PointsCredited {
        user_id: UserId,
        amount: Points,
        balance_after: Option<Points>,
    },
    PointsDebited {
        user_id: UserId,
        amount: Points,
        balance_after: Option<Points>,
    },
    BalanceSet {
        user_id: UserId,
        amount: Points,
        admin_id: UserId,
    },
    AccountsSwept {
        removed: usize,
        cutoff: DateTime<Utc>,
    },
    MembershipVerified {
        user_id: UserId,
    },

    // ── Referral graph ────────────────────────────
    ReferralAttributed {
        user_id: UserId,
        referrer_id: UserId,
        credited: Points,
    },

    // ── Catalog ───────────────────────────────────
    ProductAdded {
        product_id: ProductId,
        name: String,
        cost: Points,
    },

    // ── Order workflow ────────────────────────────
    OrderCreated {
        order_id: OrderId,
        buyer_id: UserId,
        product_id: ProductId,
        cost: Points,
        auto_completed: bool,
    },
    OrderApprovalStarted {
        order_id: OrderId,
        admin_id: UserId,
    },
    OrderCompleted {
        order_id: OrderId,
        admin_id: UserId,
    },
    OrderRejected {
        order_id: OrderId,
        admin_id: UserId,
        refunded: Points,
    },

    // ── Broadcast pipeline ────────────────────────
    BroadcastFinished {
        broadcast_id: String,
        initiator: UserId,
        succeeded: u64,
        failed: u64,
    },
}

/// Stable string name for the event_type column in the event log.
pub fn event_type_name(event: &LedgerEvent) -> &'static str {
    match event {
        LedgerEvent::AccountCreated { .. }        => "account_created",
        LedgerEvent::PointsCredited { .. }        => "points_credited",
        LedgerEvent::PointsDebited { .. }         => "points_debited",
        LedgerEvent::BalanceSet { .. }            => "balance_set",
        LedgerEvent::AccountsSwept { .. }         => "accounts_swept",
        LedgerEvent::MembershipVerified { .. }    => "membership_verified",
        LedgerEvent::ReferralAttributed { .. }    => "referral_attributed",
        LedgerEvent::ProductAdded { .. }          => "product_added",
        LedgerEvent::OrderCreated { .. }          => "order_created",
        LedgerEvent::OrderApprovalStarted { .. }  => "order_approval_started",
        LedgerEvent::OrderCompleted { .. }        => "order_completed",
        LedgerEvent::OrderRejected { .. }         => "order_rejected",
        LedgerEvent::BroadcastFinished { .. }     => "broadcast_finished",
    }
}
