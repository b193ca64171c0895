//! Shared types for the profit engine.
//!
//! These types form the data model used across storage, the margin
//! estimator, the controller and the dashboard.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

/// The chance-based minigames that produce game rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameType {
    Spin,
    Predict,
    PickBox,
}

impl GameType {
    /// All known game types (useful for iteration).
    pub const ALL: &'static [GameType] = &[GameType::Spin, GameType::Predict, GameType::PickBox];

    /// Stable storage code.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Spin => "SPIN",
            GameType::Predict => "PREDICT",
            GameType::PickBox => "PICKBOX",
        }
    }

    /// Human-readable name for dashboards.
    pub fn label(&self) -> &'static str {
        match self {
            GameType::Spin => "Spin & Win",
            GameType::Predict => "Predict & Win",
            GameType::PickBox => "Pick a Box",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a game type code (case-insensitive).
impl FromStr for GameType {
    type Err = ProfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SPIN" => Ok(GameType::Spin),
            "PREDICT" => Ok(GameType::Predict),
            "PICKBOX" | "PICK_BOX" => Ok(GameType::PickBox),
            other => Err(ProfitError::UnknownGame(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Margin windows
// ---------------------------------------------------------------------------

/// A trailing time window ending at "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginWindow {
    Minutes(i64),
    Hours(i64),
}

impl MarginWindow {
    pub fn duration(&self) -> Duration {
        match *self {
            MarginWindow::Minutes(m) => Duration::minutes(m),
            MarginWindow::Hours(h) => Duration::hours(h),
        }
    }

    /// Inclusive lower bound of the window relative to `now`.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

impl fmt::Display for MarginWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarginWindow::Minutes(m) => write!(f, "{m}m"),
            MarginWindow::Hours(h) => write!(f, "{h}h"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome segments
// ---------------------------------------------------------------------------

/// One labelled slice of a game's discrete outcome distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSegment {
    pub id: i64,
    pub game_type: GameType,
    /// Unique within the game's segment set.
    pub label: String,
    pub probability: f64,
    /// Negative values represent partial stake loss.
    pub payout_multiplier: f64,
    pub is_high_payout: bool,
    pub order: i64,
    /// Optimistic-concurrency counter, bumped on every write.
    pub version: i64,
}

impl OutcomeSegment {
    pub fn snapshot(&self) -> SegmentSnapshot {
        SegmentSnapshot {
            id: self.id,
            label: self.label.clone(),
            probability: self.probability,
            multiplier: self.payout_multiplier,
            is_high_payout: self.is_high_payout,
        }
    }
}

impl fmt::Display for OutcomeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x{} ({:.3})",
            self.label, self.payout_multiplier, self.probability
        )
    }
}

/// Audit snapshot of a single segment's tunable parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSnapshot {
    pub id: i64,
    pub label: String,
    pub probability: f64,
    pub multiplier: f64,
    pub is_high_payout: bool,
}

/// A segment definition used when seeding a fresh game.
#[derive(Debug, Clone)]
pub struct SegmentSeed {
    pub label: String,
    pub probability: f64,
    pub multiplier: f64,
    pub is_high_payout: bool,
}

// ---------------------------------------------------------------------------
// Game rounds
// ---------------------------------------------------------------------------

/// One completed play. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRoundRecord {
    pub game_type: GameType,
    pub stake: Decimal,
    pub win_amount: Decimal,
    pub result_label: String,
    pub multiplier: f64,
    pub created_at: DateTime<Utc>,
}

impl GameRoundRecord {
    /// Settle a round: the payout is `stake × multiplier` rounded to cents.
    /// Non-positive multipliers pay nothing.
    pub fn settle(
        game_type: GameType,
        stake: Decimal,
        result_label: impl Into<String>,
        multiplier: f64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ProfitError> {
        if stake <= Decimal::ZERO {
            return Err(ProfitError::InvalidRound(format!(
                "stake must be positive, got {stake}"
            )));
        }

        // f64 Display is the shortest round-trip form, so 1.1 stays 1.1.
        let factor = Decimal::from_str(&multiplier.to_string()).map_err(|e| {
            ProfitError::InvalidRound(format!("multiplier {multiplier} not representable: {e}"))
        })?;
        let win_amount = if factor > Decimal::ZERO {
            (stake * factor).round_dp(2)
        } else {
            Decimal::ZERO
        };

        Ok(Self {
            game_type,
            stake,
            win_amount,
            result_label: result_label.into(),
            multiplier,
            created_at,
        })
    }

    pub fn is_win(&self) -> bool {
        self.win_amount > Decimal::ZERO
    }

    /// Stake kept by the house (negative when the round paid out more).
    pub fn house_profit(&self) -> Decimal {
        self.stake - self.win_amount
    }
}

// ---------------------------------------------------------------------------
// Adjustment audit log
// ---------------------------------------------------------------------------

/// Audit record of one controller action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentLogEntry {
    /// Assigned by the store; `None` until persisted.
    pub id: Option<i64>,
    pub game_type: GameType,
    pub created_at: DateTime<Utc>,
    pub auto: bool,
    pub margin_short: Option<f64>,
    pub margin_long: Option<f64>,
    pub intensity: f64,
    pub parameters_before: Vec<SegmentSnapshot>,
    pub parameters_after: Vec<SegmentSnapshot>,
    pub note: String,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the profit engine.
#[derive(Debug, thiserror::Error)]
pub enum ProfitError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Concurrent modification of {game_type} segment {segment_id}; adjustment rolled back")]
    Conflict { game_type: GameType, segment_id: i64 },

    #[error("Unknown game type: {0}")]
    UnknownGame(String),

    #[error("Invalid game round: {0}")]
    InvalidRound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ProfitResult<T> = Result<T, ProfitError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
