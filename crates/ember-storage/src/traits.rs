use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ember_types::{AccountId, Decimal, SignInRecord};
use serde::{Deserialize, Serialize};

use crate::StorageResult;

/// Sender-balance precondition evaluated inside a transfer's atomic unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceGuard {
    /// Balance must strictly exceed the given floor.
    Exceeds(Decimal),
    /// Balance must cover the given amount.
    AtLeast(Decimal),
}

impl BalanceGuard {
    pub fn admits(&self, available: Decimal) -> bool {
        match *self {
            Self::Exceeds(floor) => available > floor,
            Self::AtLeast(amount) => available >= amount,
        }
    }

    /// The guard's reference value, for error reporting.
    pub fn required(&self) -> Decimal {
        match *self {
            Self::Exceeds(floor) => floor,
            Self::AtLeast(amount) => amount,
        }
    }
}

/// Both balances after a committed transfer, read inside the same atomic
/// unit that applied the legs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferLegs {
    pub sender_balance: Decimal,
    pub receiver_balance: Decimal,
}

/// Storage interface for per-account point balances.
///
/// Accounts are created lazily: reading an unknown account yields zero and
/// the first mutation materializes the row. Rows are never deleted.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Current balance; zero for unknown accounts.
    async fn balance(&self, account: &AccountId) -> StorageResult<Decimal>;

    /// Atomically add `delta` (negative for debits) and return the new
    /// balance. The store enforces no lower bound; preconditions belong to
    /// callers.
    async fn adjust(&self, account: &AccountId, delta: Decimal) -> StorageResult<Decimal>;

    /// Overwrite the balance unconditionally.
    async fn set(&self, account: &AccountId, amount: Decimal) -> StorageResult<()>;

    /// Sum of all known balances outside `excluded`, read as one consistent
    /// snapshot.
    async fn sum_excluding(&self, excluded: &HashSet<AccountId>) -> StorageResult<Decimal>;

    /// Apply both legs of a transfer in one atomic unit: debit `debit` from
    /// `sender` and credit `credit` to `receiver`.
    ///
    /// The sender balance is read inside the same unit and the legs commit
    /// only if `guard` admits it; otherwise nothing is applied and
    /// [`StorageError::InsufficientBalance`] is returned. No other operation
    /// may observe the debit without the credit.
    ///
    /// [`StorageError::InsufficientBalance`]: crate::StorageError::InsufficientBalance
    async fn transfer_legs(
        &self,
        sender: &AccountId,
        receiver: &AccountId,
        debit: Decimal,
        credit: Decimal,
        guard: BalanceGuard,
    ) -> StorageResult<TransferLegs>;
}

/// Storage interface for per-account sign-in records.
#[async_trait]
pub trait SignRecordStore: Send + Sync {
    async fn get(&self, account: &AccountId) -> StorageResult<Option<SignInRecord>>;

    /// Insert or replace the record, guarded by the `last_sign_at` the
    /// caller previously observed (an absent record reads as `None`).
    ///
    /// The write commits only while the stored value still matches;
    /// otherwise [`StorageError::Conflict`] is returned, so two racing
    /// sign-ins on the same account cannot both commit against a stale read.
    ///
    /// [`StorageError::Conflict`]: crate::StorageError::Conflict
    async fn put_guarded(
        &self,
        record: SignInRecord,
        expected_last_sign_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;
}

/// Unified storage bundle consumed by the economy surfaces.
pub trait EconomyStore: BalanceStore + SignRecordStore + Send + Sync {}

impl<T> EconomyStore for T where T: BalanceStore + SignRecordStore + Send + Sync {}
