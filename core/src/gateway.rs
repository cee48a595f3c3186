//! External capabilities the engine consumes from its environment.
//!
//! RULE: The engine never talks to the chat transport directly.
//! Outbound text goes through Messenger; the membership check goes
//! through MembershipGate. Both are injected at construction time.

use crate::types::UserId;
use thiserror::Error;

/// A single outbound send can fail two ways. Transient failures are
/// retried with backoff; permanent ones (unknown recipient, blocked
/// bot) are not worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("transient delivery failure: {0}")]
    Transient(String),

    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

/// Single outbound notification channel.
pub trait Messenger: Send {
    fn send(&self, recipient: UserId, text: &str) -> Result<(), SendError>;
}

/// Membership gate queried before granting menu access.
/// Treated as a pure boolean oracle; the engine caches the answer on
/// the account only as a convenience flag.
pub trait MembershipGate: Send {
    fn is_member(&self, user_id: UserId) -> bool;
}

/// Messenger for the headless runner: prints every notification.
pub struct ConsoleMessenger;

impl Messenger for ConsoleMessenger {
    fn send(&self, recipient: UserId, text: &str) -> Result<(), SendError> {
        println!("--> [{recipient}] {text}");
        Ok(())
    }
}

/// Gate that admits everyone. Used by the runner and in tests where
/// membership is not under test.
pub struct OpenGate;

impl MembershipGate for OpenGate {
    fn is_member(&self, _user_id: UserId) -> bool {
        true
    }
}
