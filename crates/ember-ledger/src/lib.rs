//! Balance mutation primitives for the ember economy.
//!
//! The ledger is a thin facade over a [`BalanceStore`]: it owns no state of
//! its own and delegates atomicity to the store, so any adapter satisfying
//! the storage contract inherits the transfer invariants. Transfers extract
//! a fee that is destroyed rather than credited anywhere, which makes the
//! fee a deflationary sink the conservation report has to account for.

#![deny(unsafe_code)]

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use ember_storage::{BalanceGuard, BalanceStore, StorageError, StorageResult};
use ember_types::{AccountId, Decimal};
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Attempts at a conflicted storage operation before giving up.
const MAX_CONFLICT_RETRIES: u32 = 3;

/// Fee extraction policy for peer-to-peer transfers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeePolicy {
    /// Fraction of the transferred amount taken as fee.
    pub ratio: Decimal,
    /// Fee floor; its decimal precision is also the precision fees are
    /// rounded to.
    pub min_fee: Decimal,
    /// Require the sender to cover the full amount instead of only the fee
    /// floor. The historical check only demands `balance > min_fee`, which
    /// lets a sender go negative; this switch opts into the stricter gate.
    pub require_covering_balance: bool,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            ratio: Decimal::new(1, 2),   // 0.01
            min_fee: Decimal::new(1, 2), // 0.01
            require_covering_balance: false,
        }
    }
}

impl FeePolicy {
    /// Fee for transferring `amount`: `ratio * amount` rounded to the
    /// precision of `min_fee`, half away from zero, floored at `min_fee`.
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        (self.ratio * amount)
            .round_dp_with_strategy(self.min_fee.scale(), RoundingStrategy::MidpointAwayFromZero)
            .max(self.min_fee)
    }

    /// The sender-balance guard this policy imposes on a transfer of
    /// `amount`.
    pub fn guard_for(&self, amount: Decimal) -> BalanceGuard {
        if self.require_covering_balance {
            BalanceGuard::AtLeast(amount)
        } else {
            BalanceGuard::Exceeds(self.min_fee)
        }
    }
}

/// Outcome of a committed transfer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub receipt_id: String,
    pub sender: AccountId,
    pub receiver: AccountId,
    /// Amount debited from the sender.
    pub amount: Decimal,
    /// Destroyed portion; never credited to any account.
    pub fee: Decimal,
    /// Amount credited to the receiver: `amount - fee`.
    pub net: Decimal,
    pub sender_balance: Decimal,
    pub receiver_balance: Decimal,
}

/// Ledger-level errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient funds: available {available}, guard at {required}")]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<StorageError> for LedgerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::InsufficientBalance {
                available,
                required,
            } => Self::InsufficientFunds {
                available,
                required,
            },
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Balance mutation facade.
pub struct Ledger {
    store: Arc<dyn BalanceStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self { store }
    }

    /// Access the underlying balance store.
    pub fn store(&self) -> Arc<dyn BalanceStore> {
        Arc::clone(&self.store)
    }

    /// Current balance; zero for accounts never seen.
    pub async fn balance(&self, account: &AccountId) -> Result<Decimal, LedgerError> {
        Ok(self.store.balance(account).await?)
    }

    /// Add `delta` (negative for debits) and return the new balance.
    ///
    /// No lower bound is enforced here; pre-flight checks belong to callers.
    pub async fn credit(
        &self,
        account: &AccountId,
        delta: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let balance = self
            .retry_conflicts(|| self.store.adjust(account, delta))
            .await?;
        debug!(account = %account, delta = %delta, balance = %balance, "balance adjusted");
        Ok(balance)
    }

    /// Overwrite a balance unconditionally (administrative).
    pub async fn set(&self, account: &AccountId, amount: Decimal) -> Result<(), LedgerError> {
        self.retry_conflicts(|| self.store.set(account, amount))
            .await?;
        info!(account = %account, amount = %amount, "balance set");
        Ok(())
    }

    /// Aggregate balance over all accounts outside `excluded`, for the
    /// global conservation report.
    pub async fn conservation_sum(
        &self,
        excluded: &HashSet<AccountId>,
    ) -> Result<Decimal, LedgerError> {
        Ok(self.store.sum_excluding(excluded).await?)
    }

    /// Move `amount` from `sender` to `receiver`, extracting the fee.
    ///
    /// The sender is debited the full `amount` while the receiver gains
    /// `amount - fee`; the difference is destroyed. The sender guard, the
    /// debit and the credit commit as one atomic unit in the store, so no
    /// partial transfer is ever observable.
    pub async fn transfer(
        &self,
        sender: &AccountId,
        receiver: &AccountId,
        amount: Decimal,
        policy: &FeePolicy,
    ) -> Result<TransferReceipt, LedgerError> {
        let fee = policy.fee_for(amount);
        let net = amount - fee;
        let guard = policy.guard_for(amount);

        let legs = self
            .retry_conflicts(|| {
                self.store
                    .transfer_legs(sender, receiver, amount, net, guard)
            })
            .await?;

        info!(
            sender = %sender,
            receiver = %receiver,
            amount = %amount,
            fee = %fee,
            net = %net,
            "transfer committed"
        );

        Ok(TransferReceipt {
            receipt_id: uuid::Uuid::new_v4().to_string(),
            sender: sender.clone(),
            receiver: receiver.clone(),
            amount,
            fee,
            net,
            sender_balance: legs.sender_balance,
            receiver_balance: legs.receiver_balance,
        })
    }

    /// Run `op`, retrying a bounded number of times on optimistic-lock
    /// conflicts before surfacing the failure.
    async fn retry_conflicts<T, F, Fut>(&self, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(StorageError::Conflict(reason)) if attempt + 1 < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    warn!(attempt, %reason, "storage conflict, retrying");
                }
                other => return Ok(other?),
            }
        }
    }
}
