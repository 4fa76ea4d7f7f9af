//! In-memory reference adapter for the ember storage traits.
//!
//! Deterministic and test-friendly. Durable deployments should use the
//! Postgres adapter behind the `postgres` feature.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ember_types::{AccountId, Decimal, SignInRecord};

use crate::traits::{BalanceGuard, BalanceStore, SignRecordStore, TransferLegs};
use crate::{StorageError, StorageResult};

/// In-memory economy storage adapter.
#[derive(Default)]
pub struct InMemoryEconomyStore {
    balances: RwLock<HashMap<AccountId, Decimal>>,
    records: RwLock<HashMap<AccountId, SignInRecord>>,
}

impl InMemoryEconomyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BalanceStore for InMemoryEconomyStore {
    async fn balance(&self, account: &AccountId) -> StorageResult<Decimal> {
        let guard = self
            .balances
            .read()
            .map_err(|_| StorageError::Backend("balances lock poisoned".to_string()))?;
        Ok(guard.get(account).copied().unwrap_or_default())
    }

    async fn adjust(&self, account: &AccountId, delta: Decimal) -> StorageResult<Decimal> {
        let mut guard = self
            .balances
            .write()
            .map_err(|_| StorageError::Backend("balances lock poisoned".to_string()))?;
        let balance = guard.entry(account.clone()).or_default();
        *balance += delta;
        Ok(*balance)
    }

    async fn set(&self, account: &AccountId, amount: Decimal) -> StorageResult<()> {
        let mut guard = self
            .balances
            .write()
            .map_err(|_| StorageError::Backend("balances lock poisoned".to_string()))?;
        guard.insert(account.clone(), amount);
        Ok(())
    }

    async fn sum_excluding(&self, excluded: &HashSet<AccountId>) -> StorageResult<Decimal> {
        let guard = self
            .balances
            .read()
            .map_err(|_| StorageError::Backend("balances lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|(account, _)| !excluded.contains(account))
            .fold(Decimal::ZERO, |acc, (_, amount)| acc + *amount))
    }

    async fn transfer_legs(
        &self,
        sender: &AccountId,
        receiver: &AccountId,
        debit: Decimal,
        credit: Decimal,
        guard: BalanceGuard,
    ) -> StorageResult<TransferLegs> {
        // One write lock covers the guard read and both legs, so no reader
        // can observe the debit without the credit.
        let mut balances = self
            .balances
            .write()
            .map_err(|_| StorageError::Backend("balances lock poisoned".to_string()))?;

        let available = balances.get(sender).copied().unwrap_or_default();
        if !guard.admits(available) {
            return Err(StorageError::InsufficientBalance {
                available,
                required: guard.required(),
            });
        }

        let sender_balance = {
            let balance = balances.entry(sender.clone()).or_default();
            *balance -= debit;
            *balance
        };
        let receiver_balance = {
            let balance = balances.entry(receiver.clone()).or_default();
            *balance += credit;
            *balance
        };

        Ok(TransferLegs {
            sender_balance,
            receiver_balance,
        })
    }
}

#[async_trait]
impl SignRecordStore for InMemoryEconomyStore {
    async fn get(&self, account: &AccountId) -> StorageResult<Option<SignInRecord>> {
        let guard = self
            .records
            .read()
            .map_err(|_| StorageError::Backend("records lock poisoned".to_string()))?;
        Ok(guard.get(account).cloned())
    }

    async fn put_guarded(
        &self,
        record: SignInRecord,
        expected_last_sign_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| StorageError::Backend("records lock poisoned".to_string()))?;

        let current = guard.get(&record.account).and_then(|r| r.last_sign_at);
        if current != expected_last_sign_at {
            return Err(StorageError::Conflict(format!(
                "sign record for {} changed since it was read",
                record.account
            )));
        }

        guard.insert(record.account.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn acc(id: &str) -> AccountId {
        AccountId::new(id)
    }

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn unknown_accounts_read_as_zero() {
        let store = InMemoryEconomyStore::new();
        assert_eq!(store.balance(&acc("ghost")).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn adjust_materializes_and_accumulates() {
        let store = InMemoryEconomyStore::new();
        assert_eq!(store.adjust(&acc("a"), dec("2.5")).await.unwrap(), dec("2.5"));
        assert_eq!(store.adjust(&acc("a"), dec("-1")).await.unwrap(), dec("1.5"));
        assert_eq!(store.balance(&acc("a")).await.unwrap(), dec("1.5"));
    }

    #[tokio::test]
    async fn set_overwrites_unconditionally() {
        let store = InMemoryEconomyStore::new();
        store.adjust(&acc("a"), dec("10")).await.unwrap();
        store.set(&acc("a"), dec("3")).await.unwrap();
        assert_eq!(store.balance(&acc("a")).await.unwrap(), dec("3"));
    }

    #[tokio::test]
    async fn sum_skips_excluded_accounts() {
        let store = InMemoryEconomyStore::new();
        store.set(&acc("a"), dec("5")).await.unwrap();
        store.set(&acc("b"), dec("7")).await.unwrap();
        store.set(&acc("op"), dec("1000")).await.unwrap();

        let excluded: HashSet<_> = [acc("op")].into_iter().collect();
        assert_eq!(store.sum_excluding(&excluded).await.unwrap(), dec("12"));
    }

    #[tokio::test]
    async fn transfer_legs_commit_together() {
        let store = InMemoryEconomyStore::new();
        store.set(&acc("a"), dec("100")).await.unwrap();

        let legs = store
            .transfer_legs(
                &acc("a"),
                &acc("b"),
                dec("10"),
                dec("9.90"),
                BalanceGuard::Exceeds(dec("0.01")),
            )
            .await
            .unwrap();

        assert_eq!(legs.sender_balance, dec("90"));
        assert_eq!(legs.receiver_balance, dec("9.90"));
    }

    #[tokio::test]
    async fn failed_guard_applies_nothing() {
        let store = InMemoryEconomyStore::new();
        store.set(&acc("a"), dec("0.01")).await.unwrap();

        let err = store
            .transfer_legs(
                &acc("a"),
                &acc("b"),
                dec("10"),
                dec("9.90"),
                BalanceGuard::Exceeds(dec("0.01")),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::InsufficientBalance { .. }));
        assert_eq!(store.balance(&acc("a")).await.unwrap(), dec("0.01"));
        assert_eq!(store.balance(&acc("b")).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn self_transfer_applies_both_legs() {
        let store = InMemoryEconomyStore::new();
        store.set(&acc("a"), dec("100")).await.unwrap();

        let legs = store
            .transfer_legs(
                &acc("a"),
                &acc("a"),
                dec("10"),
                dec("9"),
                BalanceGuard::Exceeds(dec("0.01")),
            )
            .await
            .unwrap();

        // Debit then credit on the same row: only the fee leaves.
        assert_eq!(legs.receiver_balance, dec("99"));
        assert_eq!(store.balance(&acc("a")).await.unwrap(), dec("99"));
    }

    #[tokio::test]
    async fn guarded_put_rejects_stale_expectations() {
        let store = InMemoryEconomyStore::new();
        let signed_at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

        let mut record = SignInRecord::new(acc("a"));
        record.last_sign_at = Some(signed_at);
        store.put_guarded(record.clone(), None).await.unwrap();

        // A second writer that read the pre-sign state loses.
        let err = store.put_guarded(record, None).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        // A writer that read the committed state wins.
        let fetched = store.get(&acc("a")).await.unwrap().unwrap();
        store
            .put_guarded(fetched.clone(), Some(signed_at))
            .await
            .unwrap();
        assert_eq!(
            store.get(&acc("a")).await.unwrap().unwrap().last_sign_at,
            fetched.last_sign_at
        );
    }

    #[tokio::test]
    async fn concurrent_adjustments_all_land() {
        let store = Arc::new(InMemoryEconomyStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.adjust(&AccountId::new("hot"), Decimal::ONE).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(
            store.balance(&acc("hot")).await.unwrap(),
            Decimal::from(32)
        );
    }
}
