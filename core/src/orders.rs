//! Order Workflow — the state machine for a single redemption.
//!
//! Transitions: Pending → {Approving, Rejected}; Approving → {Completed,
//! Rejected}. Completed and Rejected are terminal. Privileged purchases
//! skip review entirely and land in Completed at creation time.
//!
//! RULE: The escrow debit and the order insert commit together inside
//! create(); refunds restore exactly the points debited at creation,
//! never the product's current catalog price.

use crate::catalog::ProductCatalog;
use crate::directory::{AccountDirectory, PointBalance};
use crate::error::{EngineError, EngineResult};
use crate::types::{OrderId, Points, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Note stored on privileged orders, which never see an admin.
pub const AUTO_COMPLETED_NOTE: &str = "privileged order, auto-completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Approving,
    Completed,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Rejected)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approving => "approving",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    /// Buyer display captured at creation; never re-read from the
    /// directory afterwards.
    pub buyer_name: String,
    pub buyer_handle: String,
    pub product_id: ProductId,
    /// Product name and cost copied at creation, immune to later
    /// catalog changes.
    pub product_name: String,
    pub points_paid: Points,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
    pub note: Option<String>,
    pub privileged: bool,
    pub auto_completed: bool,
}

/// What create() hands back for the confirmation notification.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub product_name: String,
    pub cost: Points,
    pub auto_completed: bool,
    pub remaining: PointBalance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    orders: HashMap<OrderId, Order>,
    insertion: Vec<OrderId>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// Orders in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Order> + '_ {
        self.insertion.iter().filter_map(|id| self.orders.get(id))
    }

    /// Orders awaiting admin review, oldest first.
    pub fn pending(&self) -> Vec<&Order> {
        self.iter()
            .filter(|order| order.status == OrderStatus::Pending)
            .collect()
    }

    pub fn count_with_status(&self, status: OrderStatus) -> usize {
        self.iter().filter(|order| order.status == status).count()
    }

    /// Create an order for `buyer_id` buying `product_id`.
    ///
    /// Validation happens before any mutation: unknown product, unknown
    /// buyer, and insufficient balance all fail with nothing changed.
    /// On success the buyer is debited (no-op for privileged buyers) and
    /// the order inserted in the same call, so no reader can observe one
    /// without the other.
    pub fn create(
        &mut self,
        directory: &mut AccountDirectory,
        catalog: &ProductCatalog,
        buyer_id: UserId,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> EngineResult<OrderReceipt> {
        let product = catalog
            .get(product_id)
            .ok_or(EngineError::UnknownProduct(product_id))?;
        let (buyer_name, buyer_handle, privileged) = {
            let buyer = directory
                .get(buyer_id)
                .ok_or(EngineError::UnknownUser(buyer_id))?;
            (buyer.name.clone(), buyer.handle.clone(), buyer.privileged)
        };

        // Escrow: the debit checks the balance and fails without
        // mutation when it cannot cover the cost.
        let remaining = match self.debit_escrow(directory, buyer_id, product.cost)? {
            Some(points) => PointBalance::Limited(points),
            None => PointBalance::Unlimited,
        };

        let id = self.fresh_id(buyer_id, now);
        let (status, note, resolved_at) = if privileged {
            (
                OrderStatus::Completed,
                Some(AUTO_COMPLETED_NOTE.to_string()),
                Some(now),
            )
        } else {
            (OrderStatus::Pending, None, None)
        };

        let order = Order {
            id: id.clone(),
            buyer_id,
            buyer_name,
            buyer_handle,
            product_id,
            product_name: product.name.clone(),
            points_paid: product.cost,
            status,
            created_at: now,
            resolved_at,
            resolved_by: None,
            note,
            privileged,
            auto_completed: privileged,
        };
        let receipt = OrderReceipt {
            order_id: id.clone(),
            product_name: order.product_name.clone(),
            cost: order.points_paid,
            auto_completed: order.auto_completed,
            remaining,
        };
        self.orders.insert(id.clone(), order);
        self.insertion.push(id);
        Ok(receipt)
    }

    /// Pending → Approving. Points are untouched; they were debited at
    /// creation. The caller records which admin owes the fulfillment note.
    pub fn begin_approval(&mut self, order_id: &str) -> EngineResult<&Order> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::UnknownOrder(order_id.to_string()))?;
        if order.status != OrderStatus::Pending {
            return Err(EngineError::NotPending {
                id: order.id.clone(),
                status: order.status,
            });
        }
        order.status = OrderStatus::Approving;
        Ok(order)
    }

    /// Approving → Completed. Stores the fulfillment note and the
    /// resolving admin.
    pub fn complete(
        &mut self,
        order_id: &str,
        note: &str,
        admin_id: UserId,
        now: DateTime<Utc>,
    ) -> EngineResult<&Order> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::UnknownOrder(order_id.to_string()))?;
        if order.status != OrderStatus::Approving {
            return Err(EngineError::NotApproving {
                id: order.id.clone(),
                status: order.status,
            });
        }
        order.status = OrderStatus::Completed;
        order.note = Some(note.to_string());
        order.resolved_at = Some(now);
        order.resolved_by = Some(admin_id);
        Ok(order)
    }

    /// Pending or Approving → Rejected, refunding the escrowed points.
    ///
    /// Approving is accepted because an admin may abort mid-note-entry.
    /// The refund is exactly `points_paid`, regardless of what the
    /// catalog says the product costs today.
    pub fn reject(
        &mut self,
        directory: &mut AccountDirectory,
        order_id: &str,
        admin_id: UserId,
        now: DateTime<Utc>,
    ) -> EngineResult<&Order> {
        let (buyer_id, refund, privileged) = {
            let order = self
                .orders
                .get(order_id)
                .ok_or_else(|| EngineError::UnknownOrder(order_id.to_string()))?;
            if order.status.is_terminal() {
                return Err(EngineError::NotPending {
                    id: order.id.clone(),
                    status: order.status,
                });
            }
            (order.buyer_id, order.points_paid, order.privileged)
        };

        // Privileged orders never reach Pending, so this branch only
        // matters for ordinary buyers. A buyer swept between creation
        // and rejection forfeits the refund; the rejection still lands.
        if !privileged {
            match directory.credit(buyer_id, refund) {
                Ok(_) => {}
                Err(EngineError::UnknownUser(_)) => {
                    log::warn!("refund of {refund} points lost: buyer {buyer_id} no longer exists");
                }
                Err(other) => return Err(other),
            }
        }

        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::UnknownOrder(order_id.to_string()))?;
        order.status = OrderStatus::Rejected;
        order.resolved_at = Some(now);
        order.resolved_by = Some(admin_id);
        Ok(order)
    }

    fn debit_escrow(
        &self,
        directory: &mut AccountDirectory,
        buyer_id: UserId,
        cost: Points,
    ) -> EngineResult<Option<Points>> {
        directory.debit(buyer_id, cost)
    }

    /// Timestamp-derived order id, nudged with a numeric suffix when the
    /// same buyer confirms twice within one second.
    fn fresh_id(&self, buyer_id: UserId, now: DateTime<Utc>) -> OrderId {
        let base = format!("ORD{}_{}", now.format("%Y%m%d%H%M%S"), buyer_id);
        if !self.orders.contains_key(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !self.orders.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}
