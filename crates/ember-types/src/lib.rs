//! Domain types for the ember economy engine.
//!
//! Accounts and sign-in records are independent aggregates sharing the same
//! canonical account id: a balance can exist without any sign-in history and
//! vice versa. Everything here is plain data; behavior lives in the reward,
//! ledger and service crates.

#![deny(unsafe_code)]

mod account;
mod record;

pub use account::AccountId;
pub use record::{BonusKind, RewardBreakdown, SignInRecord, StreakPhase};

/// Exact-decimal amount type used for balances, fees and transfers.
pub use rust_decimal::Decimal;
