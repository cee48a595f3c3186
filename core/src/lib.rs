//! rewards-core — reward ledger, order-fulfillment state machine, and
//! batched broadcast delivery for a referral rewards bot.
//!
//! The chat transport, membership check, and delivery channel are
//! injected capabilities (see `gateway`); everything in here is the
//! single-writer core that owns the Account/Order/Product collections.

pub mod broadcast;
pub mod catalog;
pub mod clock;
pub mod command;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod event;
pub mod gateway;
pub mod orders;
pub mod referral;
pub mod session;
pub mod store;
pub mod types;
