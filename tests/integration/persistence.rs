//! Atomicity of committed adjustments.

use profit_engine::config::HouseConfig;
use profit_engine::engine::controller::plan_adjustment;
use profit_engine::types::{AdjustmentLogEntry, GameType, OutcomeSegment, ProfitError};

use crate::{fixed_now, seeded_store};

fn entry_for(before: &[OutcomeSegment], after: &[OutcomeSegment]) -> AdjustmentLogEntry {
    AdjustmentLogEntry {
        id: None,
        game_type: GameType::Spin,
        created_at: fixed_now(),
        auto: true,
        margin_short: Some(0.15),
        margin_long: Some(0.15),
        intensity: 0.5,
        parameters_before: before.iter().map(OutcomeSegment::snapshot).collect(),
        parameters_after: after.iter().map(OutcomeSegment::snapshot).collect(),
        note: "auto-adjust".into(),
    }
}

#[tokio::test]
async fn test_concurrent_edit_rolls_back_whole_adjustment() {
    let store = seeded_store().await;
    let segments = store.load_segments(GameType::Spin).await.unwrap();
    let plan = plan_adjustment(&segments, 0.15, &HouseConfig::default()).unwrap();

    // Someone edits the 10x slice between read and commit.
    let mut edited = segments.last().unwrap().clone();
    edited.payout_multiplier = 8.0;
    let edited = store.update_segment(&edited).await.unwrap();

    let err = store
        .commit_adjustment(&plan.applied, &entry_for(&segments, &plan.applied))
        .await
        .unwrap_err();
    assert!(matches!(err, ProfitError::Conflict { game_type: GameType::Spin, .. }));

    let stored = store.load_segments(GameType::Spin).await.unwrap();
    let mut expected = segments.clone();
    *expected.last_mut().unwrap() = edited;
    assert_eq!(stored, expected);
    assert!(store.recent_adjustments(GameType::Spin, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commit_is_visible_as_latest_adjustment() {
    let store = seeded_store().await;
    let segments = store.load_segments(GameType::Spin).await.unwrap();
    let plan = plan_adjustment(&segments, 0.15, &HouseConfig::default()).unwrap();

    let saved = store
        .commit_adjustment(&plan.applied, &entry_for(&segments, &plan.applied))
        .await
        .unwrap();
    assert_eq!(store.latest_adjustment(GameType::Spin).await.unwrap(), Some(saved));
    assert_eq!(store.latest_adjustment(GameType::PickBox).await.unwrap(), None);
}
