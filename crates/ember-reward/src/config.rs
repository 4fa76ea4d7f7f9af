//! Reward configuration.
//!
//! All tables, probabilities and ranges are explicit immutable data handed
//! to the engine. Defaults carry the production values.

use serde::{Deserialize, Serialize};

/// One pool of random events sharing a point delta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPool {
    /// Point delta applied when this pool fires (may be negative).
    pub points: i64,
    /// Flavor lines; one is drawn uniformly per event.
    pub texts: Vec<String>,
}

/// Streak-bonus parameters for both phases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreakConfig {
    /// Days per ramp threshold: stage `n + 1` unlocks at
    /// `cycle_days * (n + 1)` continuous days.
    pub cycle_days: u32,
    /// Ramp thresholds before the permanent switch to the steady phase.
    pub stage_cap: u32,
    /// Upper bound on the fixed ramp bonus.
    pub fixed_bonus_cap: i64,
    /// Inclusive range of days between steady-phase bonuses; the interval is
    /// redrawn on every check.
    pub steady_interval_days: (u32, u32),
    /// Inclusive point range of a steady-phase bonus.
    pub steady_points: (i64, i64),
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            cycle_days: 7,
            stage_cap: 6,
            fixed_bonus_cap: 3,
            steady_interval_days: (5, 10),
            steady_points: (1, 15),
        }
    }
}

/// Complete reward-engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Weighted base-point table as `(points, weight)` pairs, sampled by
    /// cumulative weight.
    pub base_points: Vec<(i64, u32)>,
    /// Probability that any random event fires with a sign-in.
    pub event_prob: f64,
    /// Event pools; on a hit one pool is drawn uniformly, then one line
    /// within it.
    pub events: Vec<EventPool>,
    pub streak: StreakConfig,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            base_points: vec![(1, 18), (2, 28), (3, 35), (4, 12), (5, 5), (6, 2), (10, 1)],
            event_prob: 0.05,
            events: vec![
                EventPool {
                    points: 1,
                    texts: vec![
                        "Discovered an energy crystal cluster!".to_string(),
                        "Quantum foam resonance surge!".to_string(),
                        "Captured a stray photon!".to_string(),
                        "Spacetime fold dividend!".to_string(),
                        "Cosmic background anomaly detected!".to_string(),
                    ],
                },
                EventPool {
                    points: -1,
                    texts: vec![
                        "Hit a patch of temporal turbulence!".to_string(),
                        "Antimatter corrosion!".to_string(),
                        "Dimensional collapse loss!".to_string(),
                        "Observer-effect interference!".to_string(),
                        "Entropy took its irreversible cut!".to_string(),
                    ],
                },
            ],
            streak: StreakConfig::default(),
        }
    }
}

impl RewardConfig {
    /// Configuration with events disabled, for deterministic composition
    /// tests and deployments that want base + streak only.
    pub fn without_events(mut self) -> Self {
        self.event_prob = 0.0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_production_weights() {
        let config = RewardConfig::default();
        let total: u32 = config.base_points.iter().map(|(_, w)| *w).sum();
        assert_eq!(total, 101);
        assert_eq!(config.base_points.first(), Some(&(1, 18)));
        assert_eq!(config.base_points.last(), Some(&(10, 1)));
    }

    #[test]
    fn default_pools_are_opposed() {
        let config = RewardConfig::default();
        assert_eq!(config.events.len(), 2);
        assert!(config.events[0].points > 0);
        assert!(config.events[1].points < 0);
        assert!(config.events.iter().all(|pool| pool.texts.len() == 5));
    }

    #[test]
    fn without_events_zeroes_probability() {
        let config = RewardConfig::default().without_events();
        assert_eq!(config.event_prob, 0.0);
    }
}
