//! Referral Graph — attributes a referrer exactly once per user and
//! credits one point per unique successful recruit.
//!
//! RULE: Attribution is idempotent. Replaying the same join event any
//! number of times must leave the exact same end state, and the
//! referrer's credit must happen exactly once.

use crate::directory::AccountDirectory;
use crate::types::{Points, UserId};

/// Fixed-width suffix of the decimal user id. Ids shorter than the
/// width yield the whole id, matching the deep-link token format.
pub fn referral_code(user_id: UserId, width: usize) -> String {
    let digits = user_id.unsigned_abs().to_string();
    let start = digits.len().saturating_sub(width);
    digits[start..].to_string()
}

/// What an attribution attempt did. Only `Credited` changed any state
/// beyond setting the referrer link; everything else is a silent no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralOutcome {
    /// Referrer linked, recruit appended, points credited.
    Credited {
        referrer_id: UserId,
        credited: Points,
    },
    /// Referrer linked but no credit: privileged referrer, or the
    /// recruit was already on the list from an earlier replay.
    Linked { referrer_id: UserId },
    /// The user already has a referrer. Silent no-op, not an error.
    AlreadyReferred,
    /// The code is the user's own. Silent no-op.
    SelfReferral,
    /// No account owns this code. Silent no-op.
    UnknownCode,
}

pub struct ReferralGraph {
    code_width: usize,
    points_per_referral: Points,
}

impl ReferralGraph {
    pub fn new(code_width: usize, points_per_referral: Points) -> Self {
        Self {
            code_width,
            points_per_referral,
        }
    }

    /// Attribute `new_user_id` to the owner of `code`, at most once.
    ///
    /// The referrer link, the recruit-list append and the point credit
    /// commit together here; the caller persists and notifies after.
    pub fn attribute(
        &self,
        directory: &mut AccountDirectory,
        new_user_id: UserId,
        code: &str,
    ) -> ReferralOutcome {
        // Self-referral guard: the code derived from the joining user.
        if referral_code(new_user_id, self.code_width) == code {
            return ReferralOutcome::SelfReferral;
        }

        // At most one referrer per user, ever.
        match directory.get(new_user_id) {
            Some(account) if account.referrer.is_some() => {
                return ReferralOutcome::AlreadyReferred;
            }
            Some(_) => {}
            None => return ReferralOutcome::UnknownCode,
        }

        let referrer_id = match directory.resolve_code(code) {
            Some(id) if id != new_user_id => id,
            _ => return ReferralOutcome::UnknownCode,
        };

        if let Some(account) = directory.get_mut(new_user_id) {
            account.referrer = Some(referrer_id);
        }

        let (appended, privileged) = match directory.get_mut(referrer_id) {
            Some(referrer) => {
                let appended = if referrer.referrals.contains(&new_user_id) {
                    false
                } else {
                    referrer.referrals.push(new_user_id);
                    true
                };
                (appended, referrer.privileged)
            }
            // Code resolved a moment ago; the account cannot be gone in
            // a single-writer engine, but stay silent if it somehow is.
            None => return ReferralOutcome::UnknownCode,
        };

        if appended && !privileged {
            // credit cannot fail: the referrer was just borrowed above
            let _ = directory.credit(referrer_id, self.points_per_referral);
            if let Some(referrer) = directory.get_mut(referrer_id) {
                referrer.total_earned += self.points_per_referral;
            }
            return ReferralOutcome::Credited {
                referrer_id,
                credited: self.points_per_referral,
            };
        }

        ReferralOutcome::Linked { referrer_id }
    }
}
