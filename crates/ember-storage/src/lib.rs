//! Storage contract for the ember economy.
//!
//! Two keyed aggregates per account: a point balance and a sign-in record.
//! The traits demand exactly what the economy needs from a backend:
//! - atomic read-modify-write per key (`adjust`, `put_guarded`)
//! - one atomic unit covering both legs of a transfer (`transfer_legs`)
//! - a consistent aggregate scan for the conservation report
//!
//! Design stance:
//! - the in-memory adapter is the deterministic reference used by tests
//! - durable deployments use the Postgres adapter behind the `postgres`
//!   feature; the transactional guarantees live there, not in callers

#![deny(unsafe_code)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{BalanceGuard, BalanceStore, EconomyStore, SignRecordStore, TransferLegs};
