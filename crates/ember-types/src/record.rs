use crate::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of streak bonus granted alongside a sign-in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusKind {
    /// No streak bonus this time.
    #[default]
    None,
    /// Ramp-phase bonus at a fixed day threshold.
    Fixed,
    /// Steady-phase bonus at a randomized interval.
    Random,
}

/// Streak-bonus regime derived from `streak_stage`.
///
/// The transition from `Ramp` to `Steady` is permanent: the stage never
/// decreases, so once the cap is reached a record stays in the steady phase
/// even if the daily streak later breaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreakPhase {
    /// Escalating fixed bonuses at fixed day thresholds.
    Ramp { stage: u32 },
    /// Randomized bonuses at randomized intervals.
    Steady,
}

/// Per-account sign-in state plus a snapshot of the latest reward breakdown.
///
/// The snapshot fields exist purely for the "show my last sign-in" query;
/// they are not a history. Only the sign-in orchestrator mutates a record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignInRecord {
    pub account: AccountId,
    pub last_sign_at: Option<DateTime<Utc>>,
    /// Last time a streak bonus of either kind was granted.
    pub last_bonus_at: Option<DateTime<Utc>>,
    /// Length of the current unbroken daily streak.
    pub continuous_days: u32,
    /// Ramp thresholds crossed so far; monotone, capped by configuration.
    pub streak_stage: u32,
    pub last_base_points: i64,
    pub last_bonus_points: i64,
    pub last_bonus_kind: BonusKind,
    pub last_event_points: i64,
    pub last_event_text: String,
}

impl SignInRecord {
    /// Fresh record for an account that has never signed in.
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            last_sign_at: None,
            last_bonus_at: None,
            continuous_days: 0,
            streak_stage: 0,
            last_base_points: 0,
            last_bonus_points: 0,
            last_bonus_kind: BonusKind::None,
            last_event_points: 0,
            last_event_text: String::new(),
        }
    }

    /// Current streak-bonus regime for the configured stage cap.
    pub fn phase(&self, stage_cap: u32) -> StreakPhase {
        if self.streak_stage < stage_cap {
            StreakPhase::Ramp {
                stage: self.streak_stage,
            }
        } else {
            StreakPhase::Steady
        }
    }

    pub fn has_signed(&self) -> bool {
        self.last_sign_at.is_some()
    }

    /// Breakdown snapshot of the most recent sign-in, if any.
    pub fn last_breakdown(&self) -> Option<RewardBreakdown> {
        self.last_sign_at.map(|signed_at| RewardBreakdown {
            signed_at,
            base_points: self.last_base_points,
            bonus_points: self.last_bonus_points,
            bonus_kind: self.last_bonus_kind,
            event_points: self.last_event_points,
            event_text: self.last_event_text.clone(),
            continuous_days: self.continuous_days,
        })
    }
}

/// Presentation snapshot of one sign-in reward.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub signed_at: DateTime<Utc>,
    pub base_points: i64,
    pub bonus_points: i64,
    pub bonus_kind: BonusKind,
    pub event_points: i64,
    pub event_text: String,
    pub continuous_days: u32,
}

impl RewardBreakdown {
    /// Total points granted. The event delta may be negative, so the total
    /// can fall below the base.
    pub fn total(&self) -> i64 {
        self.base_points + self.bonus_points + self.event_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> SignInRecord {
        SignInRecord::new(AccountId::new("acc-1"))
    }

    #[test]
    fn fresh_record_has_no_breakdown() {
        let r = record();
        assert!(!r.has_signed());
        assert!(r.last_breakdown().is_none());
    }

    #[test]
    fn phase_boundary_is_exclusive() {
        let mut r = record();
        r.streak_stage = 5;
        assert_eq!(r.phase(6), StreakPhase::Ramp { stage: 5 });
        r.streak_stage = 6;
        assert_eq!(r.phase(6), StreakPhase::Steady);
    }

    #[test]
    fn breakdown_total_includes_negative_events() {
        let mut r = record();
        r.last_sign_at = Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        r.last_base_points = 3;
        r.last_bonus_points = 1;
        r.last_bonus_kind = BonusKind::Fixed;
        r.last_event_points = -1;
        r.last_event_text = "turbulence".to_string();
        r.continuous_days = 7;

        let breakdown = r.last_breakdown().unwrap();
        assert_eq!(breakdown.total(), 3);
        assert_eq!(breakdown.continuous_days, 7);
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut r = record();
        r.last_sign_at = Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        r.last_bonus_kind = BonusKind::Random;

        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"random\""));

        let back: SignInRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_bonus_kind, BonusKind::Random);
        assert_eq!(back.last_sign_at, r.last_sign_at);
    }
}
