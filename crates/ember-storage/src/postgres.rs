//! PostgreSQL adapter for the ember storage traits.
//!
//! Balances live in `ember_balances` (NUMERIC points) and sign-in records in
//! `ember_sign_records`. Transfer legs run inside one transaction with the
//! sender row locked (`SELECT ... FOR UPDATE`), and guarded record writes use
//! `IS NOT DISTINCT FROM` on the previously observed `last_sign_at`, so the
//! contract's atomicity holds under concurrent connections.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ember_types::{AccountId, BonusKind, Decimal, SignInRecord};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::traits::{BalanceGuard, BalanceStore, SignRecordStore, TransferLegs};
use crate::{StorageError, StorageResult};

/// PostgreSQL economy storage adapter.
#[derive(Clone, Debug)]
pub struct PostgresEconomyStore {
    pool: PgPool,
}

impl PostgresEconomyStore {
    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("postgres connect failed: {e}")))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The caller is responsible for the schema.
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ember_balances (
                account TEXT PRIMARY KEY,
                points NUMERIC NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ember_sign_records (
                account TEXT PRIMARY KEY,
                last_sign_at TIMESTAMPTZ NULL,
                last_bonus_at TIMESTAMPTZ NULL,
                continuous_days INTEGER NOT NULL DEFAULT 0,
                streak_stage INTEGER NOT NULL DEFAULT 0,
                last_base_points BIGINT NOT NULL DEFAULT 0,
                last_bonus_points BIGINT NOT NULL DEFAULT 0,
                last_bonus_kind TEXT NOT NULL DEFAULT 'none',
                last_event_points BIGINT NOT NULL DEFAULT 0,
                last_event_text TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("postgres schema create failed: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl BalanceStore for PostgresEconomyStore {
    async fn balance(&self, account: &AccountId) -> StorageResult<Decimal> {
        let row = sqlx::query("SELECT points FROM ember_balances WHERE account = $1")
            .bind(account.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("postgres balance read failed: {e}")))?;

        match row {
            Some(row) => row
                .try_get("points")
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(Decimal::ZERO),
        }
    }

    async fn adjust(&self, account: &AccountId, delta: Decimal) -> StorageResult<Decimal> {
        let row = sqlx::query(
            r#"
            INSERT INTO ember_balances (account, points) VALUES ($1, $2)
            ON CONFLICT (account)
            DO UPDATE SET points = ember_balances.points + EXCLUDED.points
            RETURNING points
            "#,
        )
        .bind(account.as_str())
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("postgres adjust failed: {e}")))?;

        row.try_get("points")
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn set(&self, account: &AccountId, amount: Decimal) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ember_balances (account, points) VALUES ($1, $2)
            ON CONFLICT (account) DO UPDATE SET points = EXCLUDED.points
            "#,
        )
        .bind(account.as_str())
        .bind(amount)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("postgres set failed: {e}")))?;
        Ok(())
    }

    async fn sum_excluding(&self, excluded: &HashSet<AccountId>) -> StorageResult<Decimal> {
        let excluded: Vec<String> = excluded.iter().map(|a| a.0.clone()).collect();
        let row = sqlx::query(
            "SELECT COALESCE(SUM(points), 0) AS total FROM ember_balances WHERE NOT (account = ANY($1))",
        )
        .bind(&excluded)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("postgres sum failed: {e}")))?;

        row.try_get("total")
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn transfer_legs(
        &self,
        sender: &AccountId,
        receiver: &AccountId,
        debit: Decimal,
        credit: Decimal,
        guard: BalanceGuard,
    ) -> StorageResult<TransferLegs> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(format!("postgres begin failed: {e}")))?;

        // Lock the sender row (when it exists) so the guard and the debit see
        // the same balance.
        let row = sqlx::query("SELECT points FROM ember_balances WHERE account = $1 FOR UPDATE")
            .bind(sender.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(format!("postgres sender lock failed: {e}")))?;

        let available = match row {
            Some(row) => row
                .try_get("points")
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            None => Decimal::ZERO,
        };

        if !guard.admits(available) {
            return Err(StorageError::InsufficientBalance {
                available,
                required: guard.required(),
            });
        }

        let sender_balance = upsert_delta(&mut tx, sender, -debit).await?;
        let receiver_balance = upsert_delta(&mut tx, receiver, credit).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(format!("postgres commit failed: {e}")))?;

        Ok(TransferLegs {
            sender_balance,
            receiver_balance,
        })
    }
}

async fn upsert_delta(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account: &AccountId,
    delta: Decimal,
) -> StorageResult<Decimal> {
    let row = sqlx::query(
        r#"
        INSERT INTO ember_balances (account, points) VALUES ($1, $2)
        ON CONFLICT (account)
        DO UPDATE SET points = ember_balances.points + EXCLUDED.points
        RETURNING points
        "#,
    )
    .bind(account.as_str())
    .bind(delta)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| StorageError::Backend(format!("postgres leg failed: {e}")))?;

    row.try_get("points")
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

#[async_trait]
impl SignRecordStore for PostgresEconomyStore {
    async fn get(&self, account: &AccountId) -> StorageResult<Option<SignInRecord>> {
        let row = sqlx::query(
            r#"
            SELECT account, last_sign_at, last_bonus_at, continuous_days, streak_stage,
                   last_base_points, last_bonus_points, last_bonus_kind,
                   last_event_points, last_event_text
            FROM ember_sign_records WHERE account = $1
            "#,
        )
        .bind(account.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("postgres record read failed: {e}")))?;

        row.map(record_from_row).transpose()
    }

    async fn put_guarded(
        &self,
        record: SignInRecord,
        expected_last_sign_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE ember_sign_records SET
                last_sign_at = $2, last_bonus_at = $3, continuous_days = $4,
                streak_stage = $5, last_base_points = $6, last_bonus_points = $7,
                last_bonus_kind = $8, last_event_points = $9, last_event_text = $10
            WHERE account = $1 AND last_sign_at IS NOT DISTINCT FROM $11
            "#,
        )
        .bind(record.account.as_str())
        .bind(record.last_sign_at)
        .bind(record.last_bonus_at)
        .bind(record.continuous_days as i32)
        .bind(record.streak_stage as i32)
        .bind(record.last_base_points)
        .bind(record.last_bonus_points)
        .bind(kind_to_str(record.last_bonus_kind))
        .bind(record.last_event_points)
        .bind(record.last_event_text.as_str())
        .bind(expected_last_sign_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("postgres record update failed: {e}")))?;

        if updated.rows_affected() == 1 {
            return Ok(());
        }

        // No matching row: either the record does not exist yet (insertable
        // when the caller expected none) or another writer got there first.
        if expected_last_sign_at.is_none() {
            let inserted = sqlx::query(
                r#"
                INSERT INTO ember_sign_records (
                    account, last_sign_at, last_bonus_at, continuous_days, streak_stage,
                    last_base_points, last_bonus_points, last_bonus_kind,
                    last_event_points, last_event_text
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (account) DO NOTHING
                "#,
            )
            .bind(record.account.as_str())
            .bind(record.last_sign_at)
            .bind(record.last_bonus_at)
            .bind(record.continuous_days as i32)
            .bind(record.streak_stage as i32)
            .bind(record.last_base_points)
            .bind(record.last_bonus_points)
            .bind(kind_to_str(record.last_bonus_kind))
            .bind(record.last_event_points)
            .bind(record.last_event_text.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("postgres record insert failed: {e}")))?;

            if inserted.rows_affected() == 1 {
                return Ok(());
            }
        }

        Err(StorageError::Conflict(format!(
            "sign record for {} changed since it was read",
            record.account
        )))
    }
}

fn record_from_row(row: PgRow) -> StorageResult<SignInRecord> {
    let kind: String = row
        .try_get("last_bonus_kind")
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let account: String = row
        .try_get("account")
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    Ok(SignInRecord {
        account: AccountId::new(account),
        last_sign_at: row
            .try_get("last_sign_at")
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        last_bonus_at: row
            .try_get("last_bonus_at")
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        continuous_days: row
            .try_get::<i32, _>("continuous_days")
            .map_err(|e| StorageError::Serialization(e.to_string()))? as u32,
        streak_stage: row
            .try_get::<i32, _>("streak_stage")
            .map_err(|e| StorageError::Serialization(e.to_string()))? as u32,
        last_base_points: row
            .try_get("last_base_points")
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        last_bonus_points: row
            .try_get("last_bonus_points")
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        last_bonus_kind: kind_from_str(&kind)?,
        last_event_points: row
            .try_get("last_event_points")
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        last_event_text: row
            .try_get("last_event_text")
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
    })
}

fn kind_to_str(kind: BonusKind) -> &'static str {
    match kind {
        BonusKind::None => "none",
        BonusKind::Fixed => "fixed",
        BonusKind::Random => "random",
    }
}

fn kind_from_str(raw: &str) -> StorageResult<BonusKind> {
    match raw {
        "none" => Ok(BonusKind::None),
        "fixed" => Ok(BonusKind::Fixed),
        "random" => Ok(BonusKind::Random),
        other => Err(StorageError::Serialization(format!(
            "unknown bonus kind: {other}"
        ))),
    }
}
