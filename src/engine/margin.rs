//! Margin estimator.
//!
//! Aggregates the game round log into a realized house margin:
//! `(stakes - payouts) / stakes` over a trailing window. Read-only and
//! safe to call concurrently from request paths and the controller.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::storage::{RoundTotals, Store};
use crate::types::{GameType, MarginWindow, ProfitResult};

/// Stake/payout aggregates plus the margin they imply.
#[derive(Debug, Clone, Serialize)]
pub struct MarginStats {
    pub label: &'static str,
    pub total_stakes: Decimal,
    pub total_payouts: Decimal,
    pub rounds: i64,
    pub margin: Option<f64>,
}

impl MarginStats {
    fn from_totals(game: GameType, totals: RoundTotals) -> Self {
        Self {
            label: game.label(),
            total_stakes: totals.total_stakes,
            total_payouts: totals.total_payouts,
            rounds: totals.rounds,
            margin: margin_from_totals(totals.total_stakes, totals.total_payouts),
        }
    }
}

/// `None` when there is nothing staked (cold start or idle window).
pub fn margin_from_totals(total_stakes: Decimal, total_payouts: Decimal) -> Option<f64> {
    if total_stakes <= Decimal::ZERO {
        return None;
    }
    ((total_stakes - total_payouts) / total_stakes).to_f64()
}

#[derive(Clone)]
pub struct MarginEstimator {
    store: Store,
}

impl MarginEstimator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Realized margin for `game` over `window` ending now.
    pub async fn estimate_margin(
        &self,
        game: GameType,
        window: MarginWindow,
    ) -> ProfitResult<Option<f64>> {
        self.estimate_margin_at(game, window, Utc::now()).await
    }

    /// Same as [`estimate_margin`](Self::estimate_margin) with a pinned clock.
    /// A round exactly at `now - window` is included.
    pub async fn estimate_margin_at(
        &self,
        game: GameType,
        window: MarginWindow,
        now: DateTime<Utc>,
    ) -> ProfitResult<Option<f64>> {
        Ok(self.window_stats_at(game, window, now).await?.margin)
    }

    pub async fn window_stats(
        &self,
        game: GameType,
        window: MarginWindow,
    ) -> ProfitResult<MarginStats> {
        self.window_stats_at(game, window, Utc::now()).await
    }

    pub async fn window_stats_at(
        &self,
        game: GameType,
        window: MarginWindow,
        now: DateTime<Utc>,
    ) -> ProfitResult<MarginStats> {
        self.stats_between(game, window.since(now), now).await
    }

    /// Stats for every round from `start` up to `now`, e.g. since midnight.
    pub async fn stats_between(
        &self,
        game: GameType,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ProfitResult<MarginStats> {
        let totals = self.store.round_totals(game, start, now).await?;
        Ok(MarginStats::from_totals(game, totals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameRoundRecord;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn estimator_with(rounds: &[GameRoundRecord]) -> MarginEstimator {
        let store = Store::in_memory().await.unwrap();
        for r in rounds {
            store.record_round(r).await.unwrap();
        }
        MarginEstimator::new(store)
    }

    fn round(stake: Decimal, multiplier: f64, at: DateTime<Utc>) -> GameRoundRecord {
        GameRoundRecord::settle(GameType::Spin, stake, format!("{multiplier}x"), multiplier, at)
            .unwrap()
    }

    #[test]
    fn test_margin_from_totals() {
        let m = margin_from_totals(dec!(1000), dec!(850)).unwrap();
        assert!((m - 0.15).abs() < 1e-12);
        assert_eq!(margin_from_totals(dec!(100), dec!(250)), Some(-1.5));
        assert_eq!(margin_from_totals(Decimal::ZERO, dec!(10)), None);
        assert_eq!(margin_from_totals(dec!(-5), Decimal::ZERO), None);
    }

    #[tokio::test]
    async fn test_no_rounds_is_none() {
        let estimator = estimator_with(&[]).await;
        let margin = estimator
            .estimate_margin(GameType::Spin, MarginWindow::Minutes(10))
            .await
            .unwrap();
        assert!(margin.is_none());
    }

    #[tokio::test]
    async fn test_margin_over_window() {
        let now = Utc::now();
        let estimator = estimator_with(&[
            round(dec!(500), 0.0, now - Duration::minutes(1)),
            round(dec!(500), 1.7, now - Duration::minutes(2)),
            // Outside the short window
            round(dec!(1000), 0.0, now - Duration::minutes(30)),
        ])
        .await;

        let short = estimator
            .estimate_margin_at(GameType::Spin, MarginWindow::Minutes(10), now)
            .await
            .unwrap()
            .unwrap();
        assert!((short - 0.15).abs() < 1e-12);

        let long = estimator
            .estimate_margin_at(GameType::Spin, MarginWindow::Hours(24), now)
            .await
            .unwrap()
            .unwrap();
        // (2000 - 850) / 2000
        assert!((long - 0.575).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_boundary_round_is_included() {
        let now = Utc::now();
        let estimator =
            estimator_with(&[round(dec!(100), 0.0, now - Duration::minutes(10))]).await;
        let margin = estimator
            .estimate_margin_at(GameType::Spin, MarginWindow::Minutes(10), now)
            .await
            .unwrap();
        assert_eq!(margin, Some(1.0));
    }

    #[tokio::test]
    async fn test_window_stats_totals() {
        let now = Utc::now();
        let estimator = estimator_with(&[
            round(dec!(40), 2.0, now - Duration::minutes(3)),
            round(dec!(60), 0.5, now - Duration::minutes(4)),
        ])
        .await;
        let stats = estimator
            .window_stats_at(GameType::Spin, MarginWindow::Minutes(10), now)
            .await
            .unwrap();
        assert_eq!(stats.total_stakes, dec!(100));
        assert_eq!(stats.total_payouts, dec!(110));
        assert_eq!(stats.rounds, 2);
        assert!((stats.margin.unwrap() + 0.1).abs() < 1e-12);
        assert_eq!(stats.label, "Spin & Win");
    }
}
