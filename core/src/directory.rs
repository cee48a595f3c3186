//! Account Directory — owns every per-user record.
//!
//! RULE: All balance mutations go through credit/debit/set_balance.
//! No other component writes a point balance directly, so the
//! non-negative invariant for ordinary accounts holds by construction.

use crate::error::{EngineError, EngineResult};
use crate::referral;
use crate::types::{Points, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A point balance. Privileged accounts carry the Unlimited sentinel:
/// debits always succeed and neither credits nor debits change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointBalance {
    Limited(Points),
    Unlimited,
}

impl PointBalance {
    /// Concrete balance, or None for the unlimited sentinel.
    pub fn available(&self) -> Option<Points> {
        match self {
            PointBalance::Limited(points) => Some(*points),
            PointBalance::Unlimited => None,
        }
    }
}

impl fmt::Display for PointBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointBalance::Limited(points) => write!(f, "{points}"),
            PointBalance::Unlimited => write!(f, "UNLIMITED"),
        }
    }
}

/// Display fields captured from the chat transport. Never authoritative;
/// refreshed on every bootstrap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub name: String,
    pub handle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub name: String,
    pub handle: String,
    /// Derived from the user id at creation, immutable afterwards.
    pub referral_code: String,
    pub balance: PointBalance,
    /// Recruited user ids, in recruitment order, duplicate-free.
    pub referrals: Vec<UserId>,
    /// Set at most once, on first successful attribution.
    pub referrer: Option<UserId>,
    /// Lifetime points earned through referrals. Monotonic.
    pub total_earned: Points,
    pub privileged: bool,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub gate_passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub handle: String,
    pub points: Points,
    pub referral_count: usize,
}

/// Keyed store of accounts plus their insertion order. Insertion order
/// drives broadcast recipient order and leaderboard tie-breaking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountDirectory {
    accounts: HashMap<UserId, Account>,
    insertion: Vec<UserId>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, user_id: UserId) -> Option<&Account> {
        self.accounts.get(&user_id)
    }

    pub(crate) fn get_mut(&mut self, user_id: UserId) -> Option<&mut Account> {
        self.accounts.get_mut(&user_id)
    }

    /// Account ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.insertion.iter().copied()
    }

    /// Accounts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Account> + '_ {
        self.insertion.iter().filter_map(|id| self.accounts.get(id))
    }

    /// Create the account on first contact, or refresh `last_active` and
    /// display fields on repeat contact. Returns true if created.
    pub fn get_or_create(
        &mut self,
        user_id: UserId,
        display: &DisplayInfo,
        privileged: bool,
        code_width: usize,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(account) = self.accounts.get_mut(&user_id) {
            account.last_active = now;
            account.name = display.name.clone();
            account.handle = display.handle.clone();
            return false;
        }

        let balance = if privileged {
            PointBalance::Unlimited
        } else {
            PointBalance::Limited(0)
        };
        let account = Account {
            user_id,
            name: display.name.clone(),
            handle: display.handle.clone(),
            referral_code: referral::referral_code(user_id, code_width),
            balance,
            referrals: Vec::new(),
            referrer: None,
            total_earned: 0,
            privileged,
            joined_at: now,
            last_active: now,
            gate_passed: false,
        };
        self.accounts.insert(user_id, account);
        self.insertion.push(user_id);
        true
    }

    /// Add points. A no-op reporting success on privileged accounts.
    /// Returns the balance after the credit (None for unlimited).
    pub fn credit(&mut self, user_id: UserId, amount: Points) -> EngineResult<Option<Points>> {
        let account = self
            .accounts
            .get_mut(&user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;
        match account.balance {
            PointBalance::Limited(current) => {
                let after = current + amount;
                account.balance = PointBalance::Limited(after);
                Ok(Some(after))
            }
            PointBalance::Unlimited => Ok(None),
        }
    }

    /// Remove points. Fails with InsufficientPoints and performs no
    /// mutation when the balance cannot cover the amount. A no-op
    /// reporting success on privileged accounts, so purchase handling
    /// stays uniform.
    pub fn debit(&mut self, user_id: UserId, amount: Points) -> EngineResult<Option<Points>> {
        let account = self
            .accounts
            .get_mut(&user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;
        match account.balance {
            PointBalance::Limited(current) => {
                if current < amount {
                    return Err(EngineError::InsufficientPoints {
                        required: amount,
                        available: current,
                    });
                }
                let after = current - amount;
                account.balance = PointBalance::Limited(after);
                Ok(Some(after))
            }
            PointBalance::Unlimited => Ok(None),
        }
    }

    /// Admin override of a balance. Negative amounts are rejected.
    /// A no-op reporting success on privileged accounts.
    pub fn set_balance(&mut self, user_id: UserId, amount: i64) -> EngineResult<()> {
        if amount < 0 {
            return Err(EngineError::InvalidAmount(amount));
        }
        let account = self
            .accounts
            .get_mut(&user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;
        if let PointBalance::Limited(_) = account.balance {
            account.balance = PointBalance::Limited(amount as Points);
        }
        Ok(())
    }

    /// Remove dormant accounts: non-privileged, zero balance, zero
    /// referrals, last active before the cutoff. Returns count removed.
    pub fn sweep_inactive(&mut self, cutoff: DateTime<Utc>) -> usize {
        let doomed: Vec<UserId> = self
            .iter()
            .filter(|account| {
                !account.privileged
                    && account.balance == PointBalance::Limited(0)
                    && account.referrals.is_empty()
                    && account.last_active < cutoff
            })
            .map(|account| account.user_id)
            .collect();

        for user_id in &doomed {
            self.accounts.remove(user_id);
        }
        self.insertion.retain(|id| self.accounts.contains_key(id));
        doomed.len()
    }

    /// Top non-privileged accounts by balance, descending. The sort is
    /// stable, so equal balances keep directory insertion order.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<&Account> = self.iter().filter(|a| !a.privileged).collect();
        rows.sort_by(|a, b| {
            let a_points = a.balance.available().unwrap_or(0);
            let b_points = b.balance.available().unwrap_or(0);
            b_points.cmp(&a_points)
        });
        rows.into_iter()
            .take(limit)
            .map(|account| LeaderboardEntry {
                user_id: account.user_id,
                handle: account.handle.clone(),
                points: account.balance.available().unwrap_or(0),
                referral_count: account.referrals.len(),
            })
            .collect()
    }

    /// Resolve a referral code to its owner by exact match.
    pub fn resolve_code(&self, code: &str) -> Option<UserId> {
        self.iter()
            .find(|account| account.referral_code == code)
            .map(|account| account.user_id)
    }
}
