//! Shared primitive types used across the entire engine.

/// A chat-platform user identifier. Opaque to the engine.
pub type UserId = i64;

/// A catalog product identifier. Monotonically assigned, never reused.
pub type ProductId = u32;

/// A redemption order identifier, derived from creation time + buyer.
pub type OrderId = String;

/// A whole-point amount. No fractional points, no multi-currency.
pub type Points = u64;
