//! End-to-end economy flow: a week of sign-ins into the first streak
//! bonus, then transfers and the conservation report over the same store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use ember_reward::{RewardConfig, RewardEngine};
use ember_service::{Economy, EconomyConfig, EconomyError, ManualClock};
use ember_storage::memory::InMemoryEconomyStore;
use ember_types::{AccountId, BonusKind, Decimal};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn dec(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

#[tokio::test]
async fn a_week_of_sign_ins_reaches_the_first_fixed_bonus() {
    init_tracing();

    let clock = Arc::new(ManualClock::starting_at(
        Utc.with_ymd_and_hms(2025, 6, 1, 7, 45, 0).unwrap(),
    ));
    let economy = Economy::new(Arc::new(InMemoryEconomyStore::new()), EconomyConfig::default())
        .with_engine(RewardEngine::new(RewardConfig::default().without_events()))
        .with_clock(clock.clone())
        .with_rng_seed(2025);

    let alice = AccountId::new("qq:1001");
    let mut paid = 0i64;

    for day in 1..=7u32 {
        let receipt = economy.sign_in(&alice).await.unwrap();
        paid += receipt.total;
        assert_eq!(receipt.breakdown.continuous_days, day);

        if day < 7 {
            assert_eq!(receipt.breakdown.bonus_kind, BonusKind::None);
            clock.advance(Duration::days(1));
        } else {
            // Day seven crosses the first ramp threshold.
            assert_eq!(receipt.breakdown.bonus_kind, BonusKind::Fixed);
            assert_eq!(receipt.breakdown.bonus_points, 1);
        }
    }

    assert_eq!(economy.balance(&alice).await.unwrap(), Decimal::from(paid));

    // The detail query replays the day-seven breakdown without mutating it.
    let detail = economy.sign_in_detail(&alice).await.unwrap();
    assert_eq!(detail.continuous_days, 7);
    assert_eq!(detail.bonus_kind, BonusKind::Fixed);
    let again = economy.sign_in_detail(&alice).await.unwrap();
    assert_eq!(again, detail);

    // Same day, second sign-in attempt stays closed.
    assert!(matches!(
        economy.sign_in(&alice).await,
        Err(EconomyError::AlreadySigned { .. })
    ));
}

#[tokio::test]
async fn transfers_and_the_conservation_report_agree() {
    init_tracing();

    let clock = Arc::new(ManualClock::starting_at(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let operator = AccountId::new("qq:9999");
    let config = EconomyConfig {
        sink_account: Some(operator.clone()),
        ..EconomyConfig::default()
    };
    let economy = Economy::new(Arc::new(InMemoryEconomyStore::new()), config)
        .with_clock(clock)
        .with_rng_seed(11);

    let alice = AccountId::new("qq:1001");
    let bob = AccountId::new("qq:1002");

    economy.admin_set(&alice, dec("500")).await.unwrap();
    economy.admin_set(&bob, dec("250")).await.unwrap();
    economy.admin_set(&operator, dec("0")).await.unwrap();

    let excluded: HashSet<_> = [operator.clone()].into_iter().collect();
    let before = economy.conservation_sum(&excluded).await.unwrap();
    assert_eq!(before, dec("750"));

    // 100 at 1% with a 0.01 floor costs exactly 1.00.
    let outcome = economy.transfer(&alice, &bob, dec("100")).await.unwrap();
    assert_eq!(outcome.receipt.fee, dec("1.00"));
    assert_eq!(outcome.receipt.net, dec("99.00"));
    assert_eq!(economy.balance(&alice).await.unwrap(), dec("400"));
    assert_eq!(economy.balance(&bob).await.unwrap(), dec("349.00"));

    // Sender side loses the full amount, receiver side gains amount - fee.
    let after = economy.conservation_sum(&excluded).await.unwrap();
    assert_eq!(before - after, outcome.receipt.fee);

    // Feeding the sink is mechanically a normal transfer, flagged for
    // presentation; the net leaves the non-excluded pool.
    let into_sink = economy.transfer(&bob, &operator, dec("49")).await.unwrap();
    assert!(into_sink.sink);
    assert_eq!(economy.balance(&operator).await.unwrap(), dec("48.51"));
    let final_sum = economy.conservation_sum(&excluded).await.unwrap();
    assert_eq!(after - final_sum, dec("49"));
}
