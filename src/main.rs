//! Profit engine — house-margin controller service
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database (seeding default segments), optionally starts the
//! dashboard, and runs the controller tick loop with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use profit_engine::config;
use profit_engine::dashboard::{self, DashboardState};
use profit_engine::engine::controller::Controller;
use profit_engine::engine::scheduler::{log_round_report, Scheduler};
use profit_engine::storage::Store;
use profit_engine::types::GameType;

const CONFIG_ENV: &str = "PROFIT_ENGINE_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    info!(
        config = %config_path,
        database = %cfg.engine.database_path,
        tick_interval_secs = cfg.engine.tick_interval_secs,
        managed_games = ?cfg.engine.managed_games,
        target_margin = cfg.house.target_margin,
        "Profit engine starting up"
    );

    // -- Storage ---------------------------------------------------------

    let store = Store::open(&cfg.engine.database_path).await?;
    for &game in GameType::ALL {
        store.ensure_default_segments(game).await?;
    }

    // -- Components ------------------------------------------------------

    let controller = Arc::new(Controller::new(store.clone(), cfg.house.clone()));

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(store.clone(), controller.clone()));
        dashboard::spawn_dashboard(state, cfg.dashboard.port).await?;
    }

    let mut scheduler = Scheduler::new(controller, cfg.engine.managed_games.clone());
    if cfg.engine.reload_house_config {
        scheduler = scheduler.with_config_reload(config_path.clone());
    }

    // -- Main loop -------------------------------------------------------

    let tick_interval = Duration::from_secs(cfg.engine.tick_interval_secs.max(1));
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = tick_interval.as_secs(),
        "Entering controller loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = scheduler.run_round().await;
                log_round_report(&report);
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    store.pool().close().await;
    info!("Profit engine shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("profit_engine=info"));

    let json_logging = std::env::var("PROFIT_ENGINE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
