//! The rewards engine — single logical writer over all collections.
//!
//! RULES:
//!   - Inbound events are dispatched one at a time; no internal locking,
//!     because every check-then-mutate sequence completes before the
//!     next event touches shared state.
//!   - Two-phase contract: commit the mutation, persist, record the
//!     ledger event, THEN attempt notifications. A failed delivery to a
//!     third party never unwinds a committed mutation.
//!   - Persistence failures are logged and non-fatal; the in-memory
//!     state stays authoritative for the process lifetime.

use crate::{
    broadcast::{BroadcastPipeline, BroadcastReport},
    catalog::{Product, ProductCatalog},
    clock::Clock,
    command::{DispatchOutcome, InboundEvent},
    config::EngineConfig,
    directory::{Account, AccountDirectory, DisplayInfo, LeaderboardEntry, PointBalance},
    error::{EngineError, EngineResult},
    event::{event_type_name, LedgerEvent},
    gateway::{MembershipGate, Messenger},
    orders::{Order, OrderBook, OrderStatus},
    referral::{ReferralGraph, ReferralOutcome},
    session::{is_affirmative, AdminSession, SessionTable},
    store::{SnapshotStore, KIND_ACCOUNTS, KIND_ORDERS, KIND_PRODUCTS},
    types::{Points, ProductId, UserId},
};
use chrono::Duration;
use serde::Serialize;
use uuid::Uuid;

/// Aggregate counts derived from the collections. No analytics beyond
/// this.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_accounts: usize,
    pub active_last_week: usize,
    pub total_orders: usize,
    pub pending_orders: usize,
    pub approving_orders: usize,
    pub completed_orders: usize,
    pub rejected_orders: usize,
    pub outstanding_points: Points,
    pub total_referrals: usize,
    pub product_count: usize,
}

pub struct RewardsEngine {
    config: EngineConfig,
    directory: AccountDirectory,
    catalog: ProductCatalog,
    orders: OrderBook,
    sessions: SessionTable,
    graph: ReferralGraph,
    pipeline: BroadcastPipeline,
    store: SnapshotStore,
    messenger: Box<dyn Messenger>,
    gate: Box<dyn MembershipGate>,
    clock: Box<dyn Clock>,
}

impl RewardsEngine {
    /// Build the engine, migrating the store and restoring any
    /// previously persisted collections.
    pub fn open(
        config: EngineConfig,
        store: SnapshotStore,
        messenger: Box<dyn Messenger>,
        gate: Box<dyn MembershipGate>,
        clock: Box<dyn Clock>,
    ) -> EngineResult<Self> {
        store.migrate()?;

        let directory = match store.load_snapshot(KIND_ACCOUNTS)? {
            Some(body) => serde_json::from_str(&body)?,
            None => AccountDirectory::new(),
        };
        let orders = match store.load_snapshot(KIND_ORDERS)? {
            Some(body) => serde_json::from_str(&body)?,
            None => OrderBook::new(),
        };
        let catalog = match store.load_snapshot(KIND_PRODUCTS)? {
            Some(body) => serde_json::from_str(&body)?,
            None => ProductCatalog::new(),
        };
        log::info!(
            "engine open: {} accounts, {} orders, {} products restored",
            directory.len(),
            orders.len(),
            catalog.len()
        );

        let graph = ReferralGraph::new(config.referral_code_width, config.points_per_referral);
        let pipeline = BroadcastPipeline::new(config.max_send_attempts, config.rate_limit_every);
        Ok(Self {
            config,
            directory,
            catalog,
            orders,
            sessions: SessionTable::new(),
            graph,
            pipeline,
            store,
            messenger,
            gate,
            clock,
        })
    }

    // ── Dispatch ───────────────────────────────────────────────

    /// Apply one inbound event. The single entry point for mutations.
    pub fn dispatch(&mut self, event: InboundEvent) -> EngineResult<DispatchOutcome> {
        match event {
            InboundEvent::Bootstrap {
                user_id,
                display,
                referral_code,
            } => self.bootstrap(user_id, &display, referral_code.as_deref()),
            InboundEvent::VerifyMembership { user_id } => self.verify_membership(user_id),
            InboundEvent::RedemptionRequest {
                user_id,
                product_id,
            } => self.redemption_quote(user_id, product_id),
            InboundEvent::RedemptionConfirm {
                user_id,
                product_id,
            } => self.redemption_confirm(user_id, product_id),
            InboundEvent::AdminApprove { admin_id, order_id } => {
                self.approve_order(admin_id, &order_id)
            }
            InboundEvent::AdminReject { admin_id, order_id } => {
                self.reject_order(admin_id, &order_id)
            }
            InboundEvent::AdminText { admin_id, text } => self.admin_text(admin_id, &text),
            InboundEvent::GrantPoints {
                admin_id,
                user_id,
                amount,
            } => self.grant_points(admin_id, user_id, amount),
            InboundEvent::SetPoints {
                admin_id,
                user_id,
                amount,
            } => self.set_points(admin_id, user_id, amount),
            InboundEvent::AddProduct {
                admin_id,
                name,
                cost,
                description,
            } => self.add_product(admin_id, &name, cost, &description),
            InboundEvent::BeginBroadcast { admin_id } => self.begin_broadcast(admin_id),
            InboundEvent::Broadcast { admin_id, text } => {
                self.require_admin(admin_id)?;
                let report = self.run_broadcast(admin_id, &text);
                Ok(DispatchOutcome::BroadcastFinished(report))
            }
            InboundEvent::SweepInactive {
                admin_id,
                window_days,
            } => self.sweep_inactive(admin_id, window_days),
        }
    }

    // ── Account bootstrap & membership ─────────────────────────

    fn bootstrap(
        &mut self,
        user_id: UserId,
        display: &DisplayInfo,
        referral_code: Option<&str>,
    ) -> EngineResult<DispatchOutcome> {
        let now = self.clock.now();
        let privileged = user_id == self.config.root_admin;
        let created = self.directory.get_or_create(
            user_id,
            display,
            privileged,
            self.config.referral_code_width,
            now,
        );
        self.persist_accounts();
        if created {
            let code = self
                .directory
                .get(user_id)
                .map(|a| a.referral_code.clone())
                .unwrap_or_default();
            log::info!("new account {user_id} (privileged: {privileged})");
            self.record(&LedgerEvent::AccountCreated {
                user_id,
                privileged,
                referral_code: code,
            });
        }

        if let Some(code) = referral_code {
            self.attribute_referral(user_id, code);
        }

        Ok(DispatchOutcome::Bootstrapped { user_id, created })
    }

    /// Commit the attribution and credit first, then send the
    /// best-effort referrer notification. Every non-credited branch is a
    /// silent no-op: replayed deep links must change nothing.
    fn attribute_referral(&mut self, new_user_id: UserId, code: &str) {
        match self.graph.attribute(&mut self.directory, new_user_id, code) {
            ReferralOutcome::Credited {
                referrer_id,
                credited,
            } => {
                self.persist_accounts();
                self.record(&LedgerEvent::ReferralAttributed {
                    user_id: new_user_id,
                    referrer_id,
                    credited,
                });
                let recruit_handle = self
                    .directory
                    .get(new_user_id)
                    .map(|a| a.handle.clone())
                    .unwrap_or_default();
                let balance = self
                    .directory
                    .get(referrer_id)
                    .map(|a| a.balance)
                    .unwrap_or(PointBalance::Limited(0));
                self.notify(
                    referrer_id,
                    &format!(
                        "🎁 New referral! @{recruit_handle} joined with your code. \
                         +{credited} point(s). Balance: {balance}."
                    ),
                );
            }
            ReferralOutcome::Linked { referrer_id } => {
                // Referrer linked but nothing credited (privileged
                // referrer or replayed append). Persist the link only.
                self.persist_accounts();
                self.record(&LedgerEvent::ReferralAttributed {
                    user_id: new_user_id,
                    referrer_id,
                    credited: 0,
                });
            }
            ReferralOutcome::AlreadyReferred
            | ReferralOutcome::SelfReferral
            | ReferralOutcome::UnknownCode => {}
        }
    }

    fn verify_membership(&mut self, user_id: UserId) -> EngineResult<DispatchOutcome> {
        let account = self
            .directory
            .get(user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;
        let member = account.privileged || self.gate.is_member(user_id);
        if member {
            let newly_passed = match self.directory.get_mut(user_id) {
                Some(account) if !account.gate_passed => {
                    account.gate_passed = true;
                    true
                }
                _ => false,
            };
            if newly_passed {
                self.persist_accounts();
                self.record(&LedgerEvent::MembershipVerified { user_id });
            }
        }
        Ok(DispatchOutcome::MembershipChecked { user_id, member })
    }

    // ── Redemption ─────────────────────────────────────────────

    fn redemption_quote(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> EngineResult<DispatchOutcome> {
        let product = self
            .catalog
            .get(product_id)
            .ok_or(EngineError::UnknownProduct(product_id))?;
        let account = self
            .directory
            .get(user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;
        let affordable = match account.balance.available() {
            Some(points) => points >= product.cost,
            None => true,
        };
        Ok(DispatchOutcome::Quoted {
            product_id,
            cost: product.cost,
            affordable,
        })
    }

    fn redemption_confirm(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
    ) -> EngineResult<DispatchOutcome> {
        let now = self.clock.now();
        let receipt =
            self.orders
                .create(&mut self.directory, &self.catalog, user_id, product_id, now)?;
        self.persist_accounts();
        self.persist_orders();
        self.record(&LedgerEvent::OrderCreated {
            order_id: receipt.order_id.clone(),
            buyer_id: user_id,
            product_id,
            cost: receipt.cost,
            auto_completed: receipt.auto_completed,
        });

        if receipt.auto_completed {
            self.notify(
                user_id,
                &format!(
                    "✅ Order {} auto-completed: {}.",
                    receipt.order_id, receipt.product_name
                ),
            );
        } else {
            // Admin gets the approve/reject action pair keyed by the id.
            let handle = self
                .directory
                .get(user_id)
                .map(|a| a.handle.clone())
                .unwrap_or_default();
            let admin_text = format!(
                "🔔 New order {id}: {product} ({cost} points) for @{handle} [{user_id}].\n\
                 Actions: approve_{id} / reject_{id}",
                id = receipt.order_id,
                product = receipt.product_name,
                cost = receipt.cost,
            );
            self.notify(self.config.root_admin, &admin_text);
            self.notify(
                user_id,
                &format!(
                    "✅ Order {} created: {} for {} points. Remaining: {}. \
                     Awaiting admin review.",
                    receipt.order_id, receipt.product_name, receipt.cost, receipt.remaining
                ),
            );
        }

        Ok(DispatchOutcome::OrderPlaced {
            order_id: receipt.order_id,
            auto_completed: receipt.auto_completed,
            remaining: receipt.remaining,
        })
    }

    // ── Admin order resolution ─────────────────────────────────

    fn approve_order(&mut self, admin_id: UserId, order_id: &str) -> EngineResult<DispatchOutcome> {
        self.require_admin(admin_id)?;
        let id = self.orders.begin_approval(order_id)?.id.clone();
        self.sessions.set(
            admin_id,
            AdminSession::AwaitingOrderNote {
                order_id: id.clone(),
            },
        );
        self.persist_orders();
        self.record(&LedgerEvent::OrderApprovalStarted {
            order_id: id.clone(),
            admin_id,
        });
        Ok(DispatchOutcome::ApprovalStarted { order_id: id })
    }

    fn reject_order(&mut self, admin_id: UserId, order_id: &str) -> EngineResult<DispatchOutcome> {
        self.require_admin(admin_id)?;
        let now = self.clock.now();
        let (id, buyer_id, refunded, privileged) = {
            let order = self
                .orders
                .reject(&mut self.directory, order_id, admin_id, now)?;
            (
                order.id.clone(),
                order.buyer_id,
                order.points_paid,
                order.privileged,
            )
        };
        // An admin mid-note on this order loses the stale prompt.
        self.sessions.forget_order(&id);
        self.persist_accounts();
        self.persist_orders();
        self.record(&LedgerEvent::OrderRejected {
            order_id: id.clone(),
            admin_id,
            refunded,
        });
        if !privileged {
            self.notify(
                buyer_id,
                &format!(
                    "❌ Order {id} was rejected. {refunded} point(s) returned to your balance."
                ),
            );
        }
        Ok(DispatchOutcome::OrderRejected {
            order_id: id,
            refunded,
        })
    }

    /// Route free-text admin input through the session state machine.
    fn admin_text(&mut self, admin_id: UserId, text: &str) -> EngineResult<DispatchOutcome> {
        self.require_admin(admin_id)?;
        match self.sessions.get(admin_id) {
            AdminSession::AwaitingOrderNote { order_id } => {
                let now = self.clock.now();
                let (id, buyer_id, product_name) = {
                    let order = self.orders.complete(&order_id, text, admin_id, now)?;
                    (order.id.clone(), order.buyer_id, order.product_name.clone())
                };
                self.sessions.reset(admin_id);
                self.persist_orders();
                self.record(&LedgerEvent::OrderCompleted {
                    order_id: id.clone(),
                    admin_id,
                });
                self.notify(
                    buyer_id,
                    &format!("📦 Your order {id} is ready!\n{product_name}\n{text}"),
                );
                Ok(DispatchOutcome::OrderCompleted { order_id: id })
            }
            AdminSession::AwaitingBroadcastText => {
                self.sessions.set(
                    admin_id,
                    AdminSession::AwaitingBroadcastConfirm {
                        text: text.to_string(),
                    },
                );
                let recipients = self.directory.ids().filter(|&id| id != admin_id).count();
                Ok(DispatchOutcome::BroadcastPreviewed { recipients })
            }
            AdminSession::AwaitingBroadcastConfirm { text: staged } => {
                self.sessions.reset(admin_id);
                if is_affirmative(text) {
                    let report = self.run_broadcast(admin_id, &staged);
                    Ok(DispatchOutcome::BroadcastFinished(report))
                } else {
                    Ok(DispatchOutcome::BroadcastCancelled)
                }
            }
            // Text that answers no open prompt is not an error.
            AdminSession::Idle => Ok(DispatchOutcome::Ignored),
        }
    }

    // ── Admin ledger overrides ─────────────────────────────────

    fn grant_points(
        &mut self,
        admin_id: UserId,
        user_id: UserId,
        amount: i64,
    ) -> EngineResult<DispatchOutcome> {
        self.require_admin(admin_id)?;
        if amount <= 0 {
            return Err(EngineError::InvalidAmount(amount));
        }
        let amount = amount as Points;
        let balance_after = self.directory.credit(user_id, amount)?;
        self.persist_accounts();
        self.record(&LedgerEvent::PointsCredited {
            user_id,
            amount,
            balance_after,
        });
        if let Some(after) = balance_after {
            self.notify(
                user_id,
                &format!("🎁 An admin added {amount} point(s). New balance: {after}."),
            );
        }
        Ok(DispatchOutcome::PointsGranted {
            user_id,
            balance_after,
        })
    }

    fn set_points(
        &mut self,
        admin_id: UserId,
        user_id: UserId,
        amount: i64,
    ) -> EngineResult<DispatchOutcome> {
        self.require_admin(admin_id)?;
        self.directory.set_balance(user_id, amount)?;
        let amount = amount as Points;
        self.persist_accounts();
        self.record(&LedgerEvent::BalanceSet {
            user_id,
            amount,
            admin_id,
        });
        self.notify(
            user_id,
            &format!("⚙️ An admin set your balance to {amount} point(s)."),
        );
        Ok(DispatchOutcome::PointsSet { user_id, amount })
    }

    fn add_product(
        &mut self,
        admin_id: UserId,
        name: &str,
        cost: i64,
        description: &str,
    ) -> EngineResult<DispatchOutcome> {
        self.require_admin(admin_id)?;
        let product = self.catalog.add(name, cost, description)?;
        self.persist_products();
        self.record(&LedgerEvent::ProductAdded {
            product_id: product.id,
            name: product.name.clone(),
            cost: product.cost,
        });
        log::info!("product {} added: {} ({} points)", product.id, product.name, product.cost);
        Ok(DispatchOutcome::ProductAdded {
            product_id: product.id,
            name: product.name,
        })
    }

    fn sweep_inactive(
        &mut self,
        admin_id: UserId,
        window_days: Option<i64>,
    ) -> EngineResult<DispatchOutcome> {
        self.require_admin(admin_id)?;
        let window = window_days.unwrap_or(self.config.sweep_window_days);
        let cutoff = self.clock.now() - Duration::days(window);
        let removed = self.directory.sweep_inactive(cutoff);
        if removed > 0 {
            self.persist_accounts();
            self.record(&LedgerEvent::AccountsSwept { removed, cutoff });
            log::info!("sweep removed {removed} dormant account(s)");
        }
        Ok(DispatchOutcome::Swept { removed })
    }

    // ── Broadcast ──────────────────────────────────────────────

    fn begin_broadcast(&mut self, admin_id: UserId) -> EngineResult<DispatchOutcome> {
        self.require_admin(admin_id)?;
        self.sessions.set(admin_id, AdminSession::AwaitingBroadcastText);
        Ok(DispatchOutcome::BroadcastPrompted)
    }

    /// Run the pipeline over every account except the initiator, in
    /// directory order. Never fails; the tally absorbs everything.
    fn run_broadcast(&mut self, initiator: UserId, text: &str) -> BroadcastReport {
        let recipients: Vec<UserId> =
            self.directory.ids().filter(|&id| id != initiator).collect();
        let broadcast_id = Uuid::new_v4().to_string();
        log::info!(
            "broadcast {broadcast_id}: {} recipient(s) from {initiator}",
            recipients.len()
        );
        let rendered = format!("🔔 ANNOUNCEMENT\n\n{text}");
        let report = self.pipeline.broadcast(
            self.messenger.as_ref(),
            self.clock.as_ref(),
            &recipients,
            &rendered,
        );
        self.record(&LedgerEvent::BroadcastFinished {
            broadcast_id: broadcast_id.clone(),
            initiator,
            succeeded: report.succeeded,
            failed: report.failed,
        });
        log::info!(
            "broadcast {broadcast_id} finished: {} ok, {} failed",
            report.succeeded,
            report.failed
        );
        report
    }

    // ── Read-side accessors ────────────────────────────────────

    pub fn account(&self, user_id: UserId) -> Option<&Account> {
        self.directory.get(user_id)
    }

    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn products(&self) -> &[Product] {
        self.catalog.list()
    }

    pub fn pending_orders(&self) -> Vec<&Order> {
        self.orders.pending()
    }

    pub fn session(&self, admin_id: UserId) -> AdminSession {
        self.sessions.get(admin_id)
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.directory.leaderboard(self.config.leaderboard_limit)
    }

    pub fn stats(&self) -> EngineStats {
        let week_ago = self.clock.now() - Duration::days(7);
        EngineStats {
            total_accounts: self.directory.len(),
            active_last_week: self
                .directory
                .iter()
                .filter(|a| a.last_active > week_ago)
                .count(),
            total_orders: self.orders.len(),
            pending_orders: self.orders.count_with_status(OrderStatus::Pending),
            approving_orders: self.orders.count_with_status(OrderStatus::Approving),
            completed_orders: self.orders.count_with_status(OrderStatus::Completed),
            rejected_orders: self.orders.count_with_status(OrderStatus::Rejected),
            outstanding_points: self
                .directory
                .iter()
                .filter_map(|a| a.balance.available())
                .sum(),
            total_referrals: self.directory.iter().map(|a| a.referrals.len()).sum(),
            product_count: self.catalog.len(),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    // ── Internals ──────────────────────────────────────────────

    fn require_admin(&self, admin_id: UserId) -> EngineResult<()> {
        if admin_id == self.config.root_admin {
            return Ok(());
        }
        match self.directory.get(admin_id) {
            Some(account) if account.privileged => Ok(()),
            _ => Err(EngineError::NotAuthorized(admin_id)),
        }
    }

    /// Best-effort direct notification through the same retry helper
    /// the bulk pipeline uses. Failure is observable only here.
    fn notify(&self, recipient: UserId, text: &str) {
        let delivered = self.pipeline.send_with_retry(
            self.messenger.as_ref(),
            self.clock.as_ref(),
            recipient,
            text,
        );
        if !delivered {
            log::warn!("notification to {recipient} dropped after retries");
        }
    }

    fn record(&self, event: &LedgerEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("event not recorded (serialize failed): {err}");
                return;
            }
        };
        if let Err(err) = self
            .store
            .append_event(event_type_name(event), &payload, self.clock.now())
        {
            log::warn!("event not recorded: {err}");
        }
    }

    fn persist_accounts(&self) {
        self.persist(KIND_ACCOUNTS, &self.directory);
    }

    fn persist_orders(&self) {
        self.persist(KIND_ORDERS, &self.orders);
    }

    fn persist_products(&self) {
        self.persist(KIND_PRODUCTS, &self.catalog);
    }

    fn persist<T: Serialize>(&self, kind: &str, collection: &T) {
        let body = match serde_json::to_string(collection) {
            Ok(body) => body,
            Err(err) => {
                log::warn!("{kind} snapshot not saved (serialize failed): {err}");
                return;
            }
        };
        if let Err(err) = self.store.save_snapshot(kind, &body, self.clock.now()) {
            log::warn!("{kind} snapshot not saved: {err}");
        }
    }
}
