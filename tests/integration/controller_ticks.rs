//! Controller tick scenarios through the public API.

use chrono::Duration;
use profit_engine::config::HouseConfig;
use profit_engine::engine::controller::{Controller, TickOutcome, MAX_BLEND};
use profit_engine::types::{AdjustmentLogEntry, GameType};
use rust_decimal_macros::dec;

use crate::{fixed_now, play, seeded_store};

#[tokio::test]
async fn test_losing_window_triggers_one_adjustment() {
    let store = seeded_store().await;
    play(&store, GameType::Spin, dec!(600), 0.85, 2).await;
    play(&store, GameType::Spin, dec!(400), 0.85, 5).await;
    let before = store.load_segments(GameType::Spin).await.unwrap();

    let controller = Controller::new(store.clone(), HouseConfig::default());
    let outcome = controller.run_tick_at(GameType::Spin, fixed_now()).await.unwrap();

    let TickOutcome::Adjusted(entry) = outcome else {
        panic!("expected an adjustment, got {outcome:?}");
    };
    assert!(entry.id.is_some());
    assert!(entry.auto);
    assert!((entry.margin_short.unwrap() - 0.15).abs() < 1e-12);
    assert!((entry.margin_long.unwrap() - 0.15).abs() < 1e-12);
    assert_eq!(entry.intensity, 0.5);

    let log = store.recent_adjustments(GameType::Spin, 10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0], entry);

    let after = store.load_segments(GameType::Spin).await.unwrap();
    assert_eq!(after.len(), before.len());
    let total: f64 = after.iter().map(|s| s.probability).sum();
    assert!((total - 1.0).abs() < 1e-9);

    for (old, new) in before.iter().zip(&after) {
        assert_eq!(new.version, old.version + 1);
        if old.payout_multiplier >= 5.0 {
            // High payouts shrink, bounded by the blend factor.
            assert!(new.probability < old.probability);
            assert!(new.payout_multiplier < old.payout_multiplier);
            assert!(new.payout_multiplier >= old.payout_multiplier * (1.0 - MAX_BLEND) - 1e-9);
        } else {
            assert!((new.payout_multiplier - old.payout_multiplier).abs() < 1e-12);
        }
    }
    assert_eq!(entry.parameters_before, before.iter().map(|s| s.snapshot()).collect::<Vec<_>>());
    assert_eq!(entry.parameters_after, after.iter().map(|s| s.snapshot()).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_on_target_ticks_are_idempotent() {
    let store = seeded_store().await;
    play(&store, GameType::Spin, dec!(1000), 0.0, 3).await;
    let before = store.load_segments(GameType::Spin).await.unwrap();

    let controller = Controller::new(store.clone(), HouseConfig::default());
    for _ in 0..2 {
        let outcome = controller.run_tick_at(GameType::Spin, fixed_now()).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::OnTarget { current_margin: 1.0, target_margin: 0.75 }
        );
    }

    assert!(store.recent_adjustments(GameType::Spin, 10).await.unwrap().is_empty());
    assert_eq!(store.load_segments(GameType::Spin).await.unwrap(), before);
}

#[tokio::test]
async fn test_short_window_loss_uses_worse_margin() {
    let store = seeded_store().await;
    // Healthy day, bad last few minutes.
    play(&store, GameType::Spin, dec!(10000), 0.0, 120).await;
    play(&store, GameType::Spin, dec!(100), 2.0, 1).await;

    let controller = Controller::new(store.clone(), HouseConfig::default());
    let outcome = controller.run_tick_at(GameType::Spin, fixed_now()).await.unwrap();
    let TickOutcome::Adjusted(entry) = outcome else {
        panic!("expected an adjustment, got {outcome:?}");
    };
    assert_eq!(entry.margin_short, Some(-1.0));
    assert!(entry.margin_long.unwrap() > 0.75);
}

#[tokio::test]
async fn test_no_rounds_is_insufficient_data() {
    let store = seeded_store().await;
    // Outside both windows.
    play(&store, GameType::Spin, dec!(100), 10.0, 60 * 25).await;

    let controller = Controller::new(store.clone(), HouseConfig::default());
    let outcome = controller.run_tick_at(GameType::Spin, fixed_now()).await.unwrap();
    assert_eq!(outcome, TickOutcome::InsufficientData);
    assert!(store.recent_adjustments(GameType::Spin, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_hourly_budget_blocks_further_adjustments() {
    let store = seeded_store().await;
    play(&store, GameType::Spin, dec!(100), 10.0, 1).await;

    for i in 0..12 {
        let entry = AdjustmentLogEntry {
            id: None,
            game_type: GameType::Spin,
            created_at: fixed_now() - Duration::minutes(5 * i),
            auto: i % 2 == 0,
            margin_short: Some(0.1),
            margin_long: None,
            intensity: 0.5,
            parameters_before: vec![],
            parameters_after: vec![],
            note: "manual".into(),
        };
        store.commit_adjustment(&[], &entry).await.unwrap();
    }
    let before = store.load_segments(GameType::Spin).await.unwrap();

    let controller = Controller::new(store.clone(), HouseConfig::default());
    let outcome = controller.run_tick_at(GameType::Spin, fixed_now()).await.unwrap();
    assert_eq!(outcome, TickOutcome::RateLimited { recent: 12, limit: 12 });
    assert_eq!(store.recent_adjustments(GameType::Spin, 50).await.unwrap().len(), 12);
    assert_eq!(store.load_segments(GameType::Spin).await.unwrap(), before);

    // An hour later the budget has freed up.
    let later = fixed_now() + Duration::minutes(61);
    play(&store, GameType::Spin, dec!(100), 10.0, -60).await;
    let outcome = controller.run_tick_at(GameType::Spin, later).await.unwrap();
    assert!(outcome.is_adjusted());
}

#[tokio::test]
async fn test_pick_box_without_high_payouts_is_left_alone() {
    let store = seeded_store().await;
    play(&store, GameType::PickBox, dec!(100), 3.0, 1).await;
    let before = store.load_segments(GameType::PickBox).await.unwrap();

    let controller = Controller::new(store.clone(), HouseConfig::default());
    let outcome = controller.run_tick_at(GameType::PickBox, fixed_now()).await.unwrap();
    assert_eq!(outcome, TickOutcome::DegenerateSegments { high: 0, low: 4 });
    assert_eq!(store.load_segments(GameType::PickBox).await.unwrap(), before);
    assert!(store.recent_adjustments(GameType::PickBox, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconfigured_target_applies_next_tick() {
    let store = seeded_store().await;
    play(&store, GameType::Spin, dec!(1000), 0.85, 2).await;

    let controller = Controller::new(store.clone(), HouseConfig::default());
    controller
        .reconfigure(HouseConfig { target_margin: 0.1, ..HouseConfig::default() })
        .await;
    let outcome = controller.run_tick_at(GameType::Spin, fixed_now()).await.unwrap();
    assert!(matches!(outcome, TickOutcome::OnTarget { .. }));
}
