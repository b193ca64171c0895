//! Dashboard API route handlers.
//!
//! All endpoints are read-only and return JSON. State is shared via
//! `Arc<DashboardState>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::bias::predict_multiplier;
use crate::engine::controller::Controller;
use crate::engine::margin::MarginStats;
use crate::storage::Store;
use crate::types::{AdjustmentLogEntry, GameType, MarginWindow, OutcomeSegment, ProfitError};

/// Most adjustments returned by `/api/adjustments/:game`.
const ADJUSTMENT_PAGE: i64 = 50;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub store: Store,
    pub controller: Arc<Controller>,
}

impl DashboardState {
    pub fn new(store: Store, controller: Arc<Controller>) -> Self {
        Self { store, controller }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ProfitError> for ApiError {
    fn from(e: ProfitError) -> Self {
        let status = match e {
            ProfitError::UnknownGame(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub target_margin: f64,
    pub short_window_minutes: i64,
    pub long_window_hours: i64,
    /// Multiplier Predict & Win currently pays, from its short-window margin.
    pub predict_multiplier: Decimal,
    pub margin_short: BTreeMap<GameType, MarginStats>,
    pub margin_long: BTreeMap<GameType, MarginStats>,
    pub latest_adjustments: BTreeMap<GameType, Option<AdjustmentLogEntry>>,
    pub daily: DailyStatus,
}

/// Per-game margin since 00:00 UTC and whether each met the target.
#[derive(Debug, Clone, Serialize)]
pub struct DailyStatus {
    pub date: String,
    pub margin: BTreeMap<GameType, MarginStats>,
    pub targets_met: BTreeMap<GameType, bool>,
    pub met_count: usize,
    pub total_games: usize,
    pub all_met: bool,
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let config = state.controller.config().await;
    let estimator = state.controller.estimator();
    let now = Utc::now();
    let midnight = start_of_day(now);

    let mut margin_short = BTreeMap::new();
    let mut margin_long = BTreeMap::new();
    let mut latest_adjustments = BTreeMap::new();
    let mut daily_margin = BTreeMap::new();
    let mut targets_met = BTreeMap::new();

    for &game in GameType::ALL {
        let short = estimator
            .window_stats_at(game, MarginWindow::Minutes(config.short_window_minutes), now)
            .await?;
        let long = estimator
            .window_stats_at(game, MarginWindow::Hours(config.long_window_hours), now)
            .await?;
        let daily = estimator.stats_between(game, midnight, now).await?;

        targets_met.insert(
            game,
            daily.margin.is_some_and(|m| m >= config.target_margin),
        );
        margin_short.insert(game, short);
        margin_long.insert(game, long);
        daily_margin.insert(game, daily);
        latest_adjustments.insert(game, state.store.latest_adjustment(game).await?);
    }

    let predict_margin = margin_short.get(&GameType::Predict).and_then(|s| s.margin);
    let met_count = targets_met.values().filter(|met| **met).count();
    let total_games = targets_met.len();

    Ok(Json(StatusResponse {
        target_margin: config.target_margin,
        short_window_minutes: config.short_window_minutes,
        long_window_hours: config.long_window_hours,
        predict_multiplier: predict_multiplier(&config, predict_margin),
        margin_short,
        margin_long,
        latest_adjustments,
        daily: DailyStatus {
            date: now.date_naive().to_string(),
            margin: daily_margin,
            targets_met,
            met_count,
            total_games,
            all_met: met_count == total_games,
        },
    }))
}

/// GET /api/segments/:game
pub async fn get_segments(
    State(state): State<AppState>,
    Path(game): Path<String>,
) -> ApiResult<Vec<OutcomeSegment>> {
    let game: GameType = game.parse()?;
    Ok(Json(state.store.load_segments(game).await?))
}

/// GET /api/adjustments/:game
pub async fn get_adjustments(
    State(state): State<AppState>,
    Path(game): Path<String>,
) -> ApiResult<Vec<AdjustmentLogEntry>> {
    let game: GameType = game.parse()?;
    Ok(Json(state.store.recent_adjustments(game, ADJUSTMENT_PAGE).await?))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
