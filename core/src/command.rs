//! Inbound events and their dispatch outcomes.
//!
//! One variant per external event the core handles. The chat transport
//! (or the headless runner) maps whatever it receives onto these;
//! the engine never sees transport details.

use crate::broadcast::BroadcastReport;
use crate::directory::{DisplayInfo, PointBalance};
use crate::types::{OrderId, Points, ProductId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    /// First contact (or re-entry) of a user, possibly via a deep link
    /// carrying a referral code.
    Bootstrap {
        user_id: UserId,
        #[serde(default)]
        display: DisplayInfo,
        #[serde(default)]
        referral_code: Option<String>,
    },
    /// Query the membership gate and remember the answer.
    VerifyMembership { user_id: UserId },
    /// Affordability check ahead of confirmation. Mutates nothing.
    RedemptionRequest {
        user_id: UserId,
        product_id: ProductId,
    },
    /// The actual purchase: escrow debit plus order creation.
    RedemptionConfirm {
        user_id: UserId,
        product_id: ProductId,
    },
    AdminApprove {
        admin_id: UserId,
        order_id: OrderId,
    },
    AdminReject {
        admin_id: UserId,
        order_id: OrderId,
    },
    /// Free-text admin input, routed through the admin's session state.
    AdminText { admin_id: UserId, text: String },
    GrantPoints {
        admin_id: UserId,
        user_id: UserId,
        amount: i64,
    },
    SetPoints {
        admin_id: UserId,
        user_id: UserId,
        amount: i64,
    },
    AddProduct {
        admin_id: UserId,
        name: String,
        cost: i64,
        #[serde(default)]
        description: String,
    },
    /// Open the staged compose → preview → confirm broadcast flow.
    BeginBroadcast { admin_id: UserId },
    /// Direct one-shot broadcast, same pipeline as the staged flow.
    Broadcast { admin_id: UserId, text: String },
    SweepInactive {
        admin_id: UserId,
        #[serde(default)]
        window_days: Option<i64>,
    },
}

/// What a dispatched event did. Reported to the caller; notifications
/// to third parties are best-effort side effects, not part of this.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Bootstrapped {
        user_id: UserId,
        created: bool,
    },
    MembershipChecked {
        user_id: UserId,
        member: bool,
    },
    Quoted {
        product_id: ProductId,
        cost: Points,
        affordable: bool,
    },
    OrderPlaced {
        order_id: OrderId,
        auto_completed: bool,
        remaining: PointBalance,
    },
    ApprovalStarted {
        order_id: OrderId,
    },
    OrderCompleted {
        order_id: OrderId,
    },
    OrderRejected {
        order_id: OrderId,
        refunded: Points,
    },
    PointsGranted {
        user_id: UserId,
        balance_after: Option<Points>,
    },
    PointsSet {
        user_id: UserId,
        amount: Points,
    },
    ProductAdded {
        product_id: ProductId,
        name: String,
    },
    BroadcastPrompted,
    BroadcastPreviewed {
        recipients: usize,
    },
    BroadcastFinished(BroadcastReport),
    BroadcastCancelled,
    Swept {
        removed: usize,
    },
    /// Text that answered no open prompt. Deliberately not an error.
    Ignored,
}
