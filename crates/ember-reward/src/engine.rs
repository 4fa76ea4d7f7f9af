use chrono::{DateTime, Utc};
use ember_types::{BonusKind, SignInRecord, StreakPhase};
use rand::Rng;

use crate::config::RewardConfig;

/// Everything one sign-in produces, updated streak state included.
///
/// The engine never touches storage: the caller persists the updated fields
/// and credits the ledger with [`RewardOutcome::total`].
#[derive(Clone, Debug, PartialEq)]
pub struct RewardOutcome {
    pub base_points: i64,
    pub bonus_points: i64,
    pub bonus_kind: BonusKind,
    pub event_points: i64,
    pub event_text: String,
    pub continuous_days: u32,
    pub streak_stage: u32,
    pub last_bonus_at: Option<DateTime<Utc>>,
}

impl RewardOutcome {
    /// Total points to credit; negative-heavy event pools can push this
    /// below zero.
    pub fn total(&self) -> i64 {
        self.base_points + self.bonus_points + self.event_points
    }
}

/// Pure sign-in reward engine.
#[derive(Clone, Debug, Default)]
pub struct RewardEngine {
    config: RewardConfig,
}

impl RewardEngine {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Compute the reward for signing in at `now` against `record`.
    ///
    /// Cooldown is the orchestrator's concern; the engine assumes the
    /// attempt is admissible and only reads the record.
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        record: &SignInRecord,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> RewardOutcome {
        let base_points = weighted_choice(&self.config.base_points, rng);
        let continuous_days = next_continuous_days(record, now);
        let (bonus_points, bonus_kind, streak_stage, last_bonus_at) =
            self.streak_bonus(record, continuous_days, now, rng);
        let (event_points, event_text) = self.roll_event(rng);

        RewardOutcome {
            base_points,
            bonus_points,
            bonus_kind,
            event_points,
            event_text,
            continuous_days,
            streak_stage,
            last_bonus_at,
        }
    }

    /// The two-phase streak state machine.
    ///
    /// Ramp: stage `n + 1` unlocks at `cycle_days * (n + 1)` continuous
    /// days. Steady: a fresh interval is drawn on every check and compared
    /// against the days since the last bonus. The ramp-to-steady transition
    /// is permanent because the stage never decreases.
    fn streak_bonus<R: Rng + ?Sized>(
        &self,
        record: &SignInRecord,
        continuous_days: u32,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> (i64, BonusKind, u32, Option<DateTime<Utc>>) {
        let streak = &self.config.streak;
        match record.phase(streak.stage_cap) {
            StreakPhase::Ramp { stage } => {
                if continuous_days >= streak.cycle_days * (stage + 1) {
                    let new_stage = stage + 1;
                    let bonus = streak.fixed_bonus_cap.min(i64::from(new_stage));
                    (bonus, BonusKind::Fixed, new_stage, Some(now))
                } else {
                    (0, BonusKind::None, stage, record.last_bonus_at)
                }
            }
            StreakPhase::Steady => {
                let due = match record.last_bonus_at {
                    // A migrated record can reach the steady phase without a
                    // bonus timestamp; treat the bonus as due, not stuck.
                    None => true,
                    Some(last) => {
                        let (lo, hi) = streak.steady_interval_days;
                        let interval = i64::from(rng.gen_range(lo..=hi));
                        (now - last).num_days() >= interval
                    }
                };
                if due {
                    let (lo, hi) = streak.steady_points;
                    (
                        rng.gen_range(lo..=hi),
                        BonusKind::Random,
                        record.streak_stage,
                        Some(now),
                    )
                } else {
                    (0, BonusKind::None, record.streak_stage, record.last_bonus_at)
                }
            }
        }
    }

    fn roll_event<R: Rng + ?Sized>(&self, rng: &mut R) -> (i64, String) {
        if self.config.events.is_empty() || rng.gen::<f64>() >= self.config.event_prob {
            return (0, String::new());
        }
        let pool = &self.config.events[rng.gen_range(0..self.config.events.len())];
        let text = if pool.texts.is_empty() {
            String::new()
        } else {
            pool.texts[rng.gen_range(0..pool.texts.len())].clone()
        };
        (pool.points, text)
    }
}

/// Streak length after signing at `now`: previous + 1 when the calendar gap
/// to the last sign-in is exactly one day, otherwise back to 1.
fn next_continuous_days(record: &SignInRecord, now: DateTime<Utc>) -> u32 {
    match record.last_sign_at {
        Some(last) if (now.date_naive() - last.date_naive()).num_days() == 1 => {
            record.continuous_days + 1
        }
        _ => 1,
    }
}

/// Cumulative-weight draw over a `(value, weight)` table.
///
/// Draws uniform in `[0, total_weight)` and returns the first entry whose
/// cumulative weight exceeds the draw; the last entry absorbs the
/// floating-point edge at the boundary.
pub fn weighted_choice<R: Rng + ?Sized>(items: &[(i64, u32)], rng: &mut R) -> i64 {
    if items.is_empty() {
        return 0;
    }
    let total: f64 = items.iter().map(|(_, weight)| f64::from(*weight)).sum();
    let draw = rng.gen_range(0.0..total);
    let mut cumulative = 0.0;
    for (value, weight) in items {
        cumulative += f64::from(*weight);
        if draw < cumulative {
            return *value;
        }
    }
    items[items.len() - 1].0
}
