//! Pure reward computation for daily sign-ins.
//!
//! The engine is a function of `(record, now, rng, config)`: no I/O, no
//! clock reads, no global randomness. Callers persist the updated streak
//! state and credit the ledger with the returned total, so every scenario in
//! the test suite replays exactly from a seeded generator.

#![deny(unsafe_code)]

mod config;
mod engine;

pub use config::{EventPool, RewardConfig, StreakConfig};
pub use engine::{weighted_choice, RewardEngine, RewardOutcome};
