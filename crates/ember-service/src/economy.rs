use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use ember_ledger::{Ledger, TransferReceipt};
use ember_reward::{RewardEngine, RewardOutcome};
use ember_storage::{EconomyStore, SignRecordStore, StorageError};
use ember_types::{AccountId, Decimal, RewardBreakdown, SignInRecord};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::{day_start, next_day_start, Clock, SystemClock};
use crate::config::EconomyConfig;
use crate::directory::{Directory, OpenDirectory};
use crate::error::EconomyError;

/// Result of a successful sign-in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignInReceipt {
    pub breakdown: RewardBreakdown,
    /// Points credited to the ledger; base + bonus + event.
    pub total: i64,
    pub new_balance: Decimal,
}

/// Result of a successful transfer, presentation flags included.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub receipt: TransferReceipt,
    /// The receiver is the configured sink: the net is presented as
    /// destroyed even though the sink row was credited as usual.
    pub sink: bool,
}

/// The economy facade the command layer talks to.
///
/// Cooldown states per account and day: not-signed-today and signed-today.
/// A sign-in request moves the account into signed-today exactly once per
/// calendar day; every further attempt that day reports `AlreadySigned`
/// with the time left until the boundary.
pub struct Economy {
    records: Arc<dyn SignRecordStore>,
    ledger: Ledger,
    engine: RewardEngine,
    directory: Arc<dyn Directory>,
    clock: Arc<dyn Clock>,
    config: EconomyConfig,
    rng: Mutex<StdRng>,
}

impl Economy {
    pub fn new<S>(store: Arc<S>, config: EconomyConfig) -> Self
    where
        S: EconomyStore + 'static,
    {
        Self {
            ledger: Ledger::new(store.clone()),
            records: store,
            engine: RewardEngine::default(),
            directory: Arc::new(OpenDirectory),
            clock: Arc::new(SystemClock),
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_engine(mut self, engine: RewardEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed the reward randomness, making every draw replayable.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Daily sign-in for `account`.
    ///
    /// At most one attempt per account succeeds per calendar day. Losers of
    /// a same-day race observe `AlreadySigned` exactly like any late
    /// attempt: the guarded write detects the stale read and the retry sees
    /// the committed record.
    pub async fn sign_in(&self, account: &AccountId) -> Result<SignInReceipt, EconomyError> {
        let mut attempts = 0;
        loop {
            let now = self.clock.now();
            let record = self
                .records
                .get(account)
                .await?
                .unwrap_or_else(|| SignInRecord::new(account.clone()));

            if let Some(last) = record.last_sign_at {
                if last >= day_start(now) {
                    return Err(EconomyError::AlreadySigned {
                        remaining: next_day_start(now) - now,
                    });
                }
            }

            let outcome = {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                self.engine.evaluate(&record, now, &mut *rng)
            };

            let expected = record.last_sign_at;
            match self
                .records
                .put_guarded(apply_outcome(record, &outcome, now), expected)
                .await
            {
                Ok(()) => {
                    let total = outcome.total();
                    let new_balance = self.ledger.credit(account, Decimal::from(total)).await?;
                    info!(
                        account = %account,
                        base = outcome.base_points,
                        bonus = outcome.bonus_points,
                        event = outcome.event_points,
                        days = outcome.continuous_days,
                        balance = %new_balance,
                        "sign-in committed"
                    );
                    return Ok(SignInReceipt {
                        breakdown: breakdown_of(&outcome, now),
                        total,
                        new_balance,
                    });
                }
                Err(StorageError::Conflict(reason)) => {
                    attempts += 1;
                    if attempts >= self.config.max_signin_attempts {
                        return Err(EconomyError::Persistence(format!(
                            "sign-in retries exhausted: {reason}"
                        )));
                    }
                    warn!(
                        account = %account,
                        attempt = attempts,
                        "sign-in raced a concurrent attempt, retrying"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Last persisted reward breakdown; read-only, no cooldown involved.
    pub async fn sign_in_detail(
        &self,
        account: &AccountId,
    ) -> Result<RewardBreakdown, EconomyError> {
        let record = self
            .records
            .get(account)
            .await?
            .ok_or(EconomyError::NoRecord)?;
        record.last_breakdown().ok_or(EconomyError::NoRecord)
    }

    /// Current balance; zero for accounts never seen.
    pub async fn balance(&self, account: &AccountId) -> Result<Decimal, EconomyError> {
        Ok(self.ledger.balance(account).await?)
    }

    /// Peer-to-peer transfer with fee extraction.
    pub async fn transfer(
        &self,
        sender: &AccountId,
        receiver: &AccountId,
        amount: Decimal,
    ) -> Result<TransferOutcome, EconomyError> {
        if !self.directory.contains(receiver).await? {
            warn!(receiver = %receiver, "transfer to ineligible receiver rejected");
            return Err(EconomyError::InvalidReceiver(receiver.clone()));
        }

        let receipt = self
            .ledger
            .transfer(sender, receiver, amount, &self.config.fee)
            .await?;
        let sink = self.config.sink_account.as_ref() == Some(receiver);
        Ok(TransferOutcome { receipt, sink })
    }

    /// Privileged signed adjustment; no preconditions, no eligibility check.
    pub async fn admin_adjust(
        &self,
        account: &AccountId,
        delta: Decimal,
    ) -> Result<Decimal, EconomyError> {
        Ok(self.ledger.credit(account, delta).await?)
    }

    /// Privileged absolute overwrite.
    pub async fn admin_set(
        &self,
        account: &AccountId,
        amount: Decimal,
    ) -> Result<(), EconomyError> {
        Ok(self.ledger.set(account, amount).await?)
    }

    /// Aggregate balance outside `excluded`, for the conservation report.
    pub async fn conservation_sum(
        &self,
        excluded: &HashSet<AccountId>,
    ) -> Result<Decimal, EconomyError> {
        Ok(self.ledger.conservation_sum(excluded).await?)
    }
}

fn apply_outcome(
    mut record: SignInRecord,
    outcome: &RewardOutcome,
    now: DateTime<Utc>,
) -> SignInRecord {
    record.last_sign_at = Some(now);
    record.last_bonus_at = outcome.last_bonus_at;
    record.continuous_days = outcome.continuous_days;
    record.streak_stage = outcome.streak_stage;
    record.last_base_points = outcome.base_points;
    record.last_bonus_points = outcome.bonus_points;
    record.last_bonus_kind = outcome.bonus_kind;
    record.last_event_points = outcome.event_points;
    record.last_event_text = outcome.event_text.clone();
    record
}

fn breakdown_of(outcome: &RewardOutcome, now: DateTime<Utc>) -> RewardBreakdown {
    RewardBreakdown {
        signed_at: now,
        base_points: outcome.base_points,
        bonus_points: outcome.bonus_points,
        bonus_kind: outcome.bonus_kind,
        event_points: outcome.event_points,
        event_text: outcome.event_text.clone(),
        continuous_days: outcome.continuous_days,
    }
}
