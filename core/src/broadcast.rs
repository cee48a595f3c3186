//! Broadcast Pipeline — batched delivery with retry, backoff and
//! coarse rate limiting.
//!
//! RULE: Per-recipient failures are absorbed into the tally. broadcast()
//! never returns an error, and a broadcast in flight always runs to
//! completion; there is no cancellation primitive.
//!
//! The waits here are blocking and local to the dispatch of one call.
//! They hold no engine state, so user-triggered events may be handled
//! concurrently as long as account mutations stay serialized.

use crate::clock::Clock;
use crate::gateway::{Messenger, SendError};
use crate::types::UserId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub succeeded: u64,
    pub failed: u64,
}

pub struct BroadcastPipeline {
    /// Attempts per recipient before counting a failure.
    max_attempts: u32,
    /// Pause one unit after every this-many cumulative successes.
    rate_limit_every: u64,
}

impl BroadcastPipeline {
    pub fn new(max_attempts: u32, rate_limit_every: u64) -> Self {
        Self {
            max_attempts,
            rate_limit_every,
        }
    }

    /// Deliver one message with retry. Transient failures back off
    /// 2^attempt units between attempts (1, 2, ... with no wait after
    /// the last); permanent failures give up immediately.
    ///
    /// Shared by direct notifications and the bulk loop below.
    pub fn send_with_retry(
        &self,
        messenger: &dyn Messenger,
        clock: &dyn Clock,
        recipient: UserId,
        text: &str,
    ) -> bool {
        for attempt in 0..self.max_attempts {
            match messenger.send(recipient, text) {
                Ok(()) => return true,
                Err(SendError::Transient(reason)) => {
                    if attempt + 1 < self.max_attempts {
                        let wait = 1u64 << attempt;
                        log::warn!(
                            "transient send failure to {recipient} ({reason}), retrying in {wait} unit(s)"
                        );
                        clock.sleep_units(wait);
                    } else {
                        log::error!("giving up on {recipient} after {} attempts", self.max_attempts);
                    }
                }
                Err(SendError::Permanent(reason)) => {
                    log::error!("permanent send failure to {recipient}: {reason}");
                    return false;
                }
            }
        }
        false
    }

    /// Deliver `text` to every recipient in order. The caller supplies
    /// recipients in directory order with the initiator already excluded.
    pub fn broadcast(
        &self,
        messenger: &dyn Messenger,
        clock: &dyn Clock,
        recipients: &[UserId],
        text: &str,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for &recipient in recipients {
            if self.send_with_retry(messenger, clock, recipient, text) {
                report.succeeded += 1;
                // Coarse outbound rate limiting.
                if report.succeeded % self.rate_limit_every == 0 {
                    clock.sleep_units(1);
                }
            } else {
                report.failed += 1;
            }
        }
        report
    }
}
