//! Periodic tick driver.
//!
//! Runs one controller tick per managed game type on each round, never
//! letting two ticks for the same game overlap.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, HouseConfig};
use crate::engine::controller::{Controller, TickOutcome};
use crate::types::{GameType, ProfitError, ProfitResult};

/// Summary of one scheduler round across all managed games.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub adjusted: usize,
    pub no_op: usize,
    /// Ticks skipped because the previous one was still running.
    pub busy: usize,
    pub failed: usize,
}

pub struct Scheduler {
    controller: Arc<Controller>,
    games: Vec<GameType>,
    locks: HashMap<GameType, Arc<Mutex<()>>>,
    config_path: Option<String>,
}

impl Scheduler {
    pub fn new(controller: Arc<Controller>, games: Vec<GameType>) -> Self {
        let locks = GameType::ALL
            .iter()
            .map(|g| (*g, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            controller,
            games,
            locks,
            config_path: None,
        }
    }

    /// Re-read `[house]` from `path` before every round.
    pub fn with_config_reload(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Run one tick for `game` unless one is already in flight.
    /// Returns `Ok(None)` when skipped.
    pub async fn run_tick(&self, game: GameType) -> ProfitResult<Option<TickOutcome>> {
        let lock = &self.locks[&game];
        let Ok(_guard) = lock.try_lock() else {
            debug!(game = %game, "Previous tick still running, skipping");
            return Ok(None);
        };
        self.controller.run_tick(game).await.map(Some)
    }

    /// Tick every managed game once.
    pub async fn run_round(&self) -> RoundReport {
        self.reload_house_config().await;

        let mut report = RoundReport::default();
        for &game in &self.games {
            match self.run_tick(game).await {
                Ok(Some(TickOutcome::Adjusted(entry))) => {
                    report.adjusted += 1;
                    debug!(game = %game, id = ?entry.id, "Tick adjusted segments");
                }
                Ok(Some(_)) => report.no_op += 1,
                Ok(None) => report.busy += 1,
                Err(e) => {
                    // Nothing was applied; the next interval retries.
                    report.failed += 1;
                    error!(game = %game, error = %e, "Tick failed, continuing to next");
                }
            }
        }
        report
    }

    async fn reload_house_config(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        match read_house_config(path) {
            Ok(house) => self.controller.reconfigure(house).await,
            Err(e) => warn!(path = %path, error = %e, "Config reload failed, keeping last good"),
        }
    }
}

/// Read and validate `[house]` from the config file at `path`.
pub fn read_house_config(path: &str) -> ProfitResult<HouseConfig> {
    AppConfig::load(path)
        .map(|cfg| cfg.house)
        .map_err(|e| ProfitError::Config(format!("{e:#}")))
}

/// Log a one-line round summary.
pub fn log_round_report(report: &RoundReport) {
    if report.adjusted > 0 || report.failed > 0 {
        info!(
            adjusted = report.adjusted,
            no_op = report.no_op,
            busy = report.busy,
            failed = report.failed,
            "Scheduler round complete"
        );
    } else {
        debug!(no_op = report.no_op, busy = report.busy, "Scheduler round complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use crate::types::GameRoundRecord;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    async fn scheduler(games: Vec<GameType>) -> (Scheduler, Store) {
        let store = Store::in_memory().await.unwrap();
        let controller = Arc::new(Controller::new(store.clone(), HouseConfig::default()));
        (Scheduler::new(controller, games), store)
    }

    #[tokio::test]
    async fn test_round_without_data_is_no_op() {
        let (scheduler, store) = scheduler(vec![GameType::Spin]).await;
        store.ensure_default_segments(GameType::Spin).await.unwrap();

        let report = scheduler.run_round().await;
        assert_eq!(report, RoundReport { no_op: 1, ..Default::default() });
    }

    #[tokio::test]
    async fn test_round_adjusts_losing_game() {
        let (scheduler, store) = scheduler(vec![GameType::Spin, GameType::Predict]).await;
        store.ensure_default_segments(GameType::Spin).await.unwrap();
        let at = Utc::now() - Duration::minutes(1);
        let round = GameRoundRecord::settle(GameType::Spin, dec!(100), "10x", 10.0, at).unwrap();
        store.record_round(&round).await.unwrap();

        let report = scheduler.run_round().await;
        // Predict has no data at all.
        assert_eq!(report.adjusted, 1);
        assert_eq!(report.no_op, 1);
        assert_eq!(store.recent_adjustments(GameType::Spin, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let (scheduler, _store) = scheduler(vec![GameType::Spin]).await;
        let _held = scheduler.locks[&GameType::Spin].lock().await;

        let outcome = scheduler.run_tick(GameType::Spin).await.unwrap();
        assert!(outcome.is_none());

        // Other games are unaffected.
        let other = scheduler.run_tick(GameType::PickBox).await.unwrap();
        assert_eq!(other, Some(TickOutcome::InsufficientData));
    }

    fn write_config(contents: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("profit_engine_cfg_{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_read_house_config_reports_config_error() {
        let path = write_config("[house]\nhigh_payout_threshold = 1.0\n");
        let err = read_house_config(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        match err {
            ProfitError::Config(msg) => assert!(msg.contains("high_payout_threshold")),
            other => panic!("expected config error, got {other:?}"),
        }

        let err = read_house_config("/nonexistent/profit_engine.toml").unwrap_err();
        assert!(matches!(err, ProfitError::Config(_)));
    }

    #[tokio::test]
    async fn test_round_applies_reloaded_config() {
        let path = write_config("[house]\ntarget_margin = 0.5\n");
        let (scheduler, _store) = scheduler(vec![]).await;
        let scheduler = scheduler.with_config_reload(path.clone());
        scheduler.run_round().await;
        std::fs::remove_file(&path).ok();
        assert_eq!(scheduler.controller().config().await.target_margin, 0.5);
    }

    #[tokio::test]
    async fn test_bad_config_keeps_last_good() {
        let (scheduler, _store) = scheduler(vec![]).await;
        let scheduler = scheduler.with_config_reload("/nonexistent/profit_engine.toml");
        scheduler.run_round().await;
        assert_eq!(scheduler.controller().config().await, HouseConfig::default());
    }
}
