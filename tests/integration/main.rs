//! End-to-end tests against an in-memory SQLite store.

mod controller_ticks;
mod persistence;

use chrono::{DateTime, Duration, TimeZone, Utc};
use profit_engine::storage::Store;
use profit_engine::types::{GameRoundRecord, GameType};
use rust_decimal::Decimal;

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 2, 18, 30, 0).unwrap()
}

pub async fn seeded_store() -> Store {
    let store = Store::in_memory().await.unwrap();
    for &game in GameType::ALL {
        store.ensure_default_segments(game).await.unwrap();
    }
    store
}

/// Record one settled round `minutes_ago` before [`fixed_now`].
pub async fn play(store: &Store, game: GameType, stake: Decimal, multiplier: f64, minutes_ago: i64) {
    let at = fixed_now() - Duration::minutes(minutes_ago);
    let round = GameRoundRecord::settle(game, stake, &format!("{multiplier}x"), multiplier, at).unwrap();
    store.record_round(&round).await.unwrap();
}
