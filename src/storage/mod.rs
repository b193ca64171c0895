//! Persistence layer.
//!
//! SQLite store for the three collaborators the profit engine works with:
//! the append-only game round log, the outcome segment store and the
//! adjustment audit log. Only this module executes SQL.

pub mod schema;
pub mod seed;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::{
    AdjustmentLogEntry, GameRoundRecord, GameType, OutcomeSegment, ProfitError, ProfitResult,
    SegmentSeed,
};

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct SegmentRow {
    id: i64,
    game_type: String,
    label: String,
    probability: f64,
    multiplier: f64,
    is_high_payout: bool,
    ord: i64,
    version: i64,
}

impl TryFrom<SegmentRow> for OutcomeSegment {
    type Error = ProfitError;

    fn try_from(row: SegmentRow) -> ProfitResult<Self> {
        Ok(OutcomeSegment {
            id: row.id,
            game_type: row.game_type.parse()?,
            label: row.label,
            probability: row.probability,
            payout_multiplier: row.multiplier,
            is_high_payout: row.is_high_payout,
            order: row.ord,
            version: row.version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AdjustmentRow {
    id: i64,
    game_type: String,
    created_at_ms: i64,
    auto: bool,
    margin_short: Option<f64>,
    margin_long: Option<f64>,
    intensity: f64,
    parameters_before: String,
    parameters_after: String,
    note: String,
}

impl TryFrom<AdjustmentRow> for AdjustmentLogEntry {
    type Error = ProfitError;

    fn try_from(row: AdjustmentRow) -> ProfitResult<Self> {
        Ok(AdjustmentLogEntry {
            id: Some(row.id),
            game_type: row.game_type.parse()?,
            created_at: from_millis(row.created_at_ms)?,
            auto: row.auto,
            margin_short: row.margin_short,
            margin_long: row.margin_long,
            intensity: row.intensity,
            parameters_before: serde_json::from_str(&row.parameters_before)?,
            parameters_after: serde_json::from_str(&row.parameters_after)?,
            note: row.note,
        })
    }
}

fn from_millis(ms: i64) -> ProfitResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        ProfitError::Storage(sqlx::Error::Decode(format!("invalid timestamp {ms}").into()))
    })
}

fn to_cents(amount: Decimal) -> ProfitResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| ProfitError::InvalidRound(format!("amount out of range: {amount}")))
}

const SEGMENT_COLUMNS: &str =
    "id, game_type, label, probability, multiplier, is_high_payout, ord, version";

const ADJUSTMENT_COLUMNS: &str = "id, game_type, created_at_ms, auto, margin_short, margin_long, \
     intensity, parameters_before, parameters_after, note";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Stake and payout sums over a set of rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundTotals {
    pub total_stakes: Decimal,
    pub total_payouts: Decimal,
    pub rounds: i64,
}

/// Handle to the SQLite database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database file at `path` and apply the schema.
    pub async fn open(path: &str) -> ProfitResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(path, "Database initialized");
        Ok(store)
    }

    /// Open a private in-memory database (used in tests).
    pub async fn in_memory() -> ProfitResult<Self> {
        // Every connection to :memory: is its own database, so pin one.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> ProfitResult<()> {
        schema::create_tables(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -- Outcome segments ----------------------------------------------------

    /// Seed the default distribution for `game` if it has no segments yet.
    /// Returns the number of segments inserted.
    pub async fn ensure_default_segments(&self, game: GameType) -> ProfitResult<usize> {
        let seeds = seed::default_segments(game);
        if seeds.is_empty() {
            return Ok(0);
        }
        self.seed_segments(game, &seeds).await
    }

    /// Insert `seeds` as `game`'s segment set unless one already exists.
    pub async fn seed_segments(&self, game: GameType, seeds: &[SegmentSeed]) -> ProfitResult<usize> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outcome_segments WHERE game_type = ?")
                .bind(game.as_str())
                .fetch_one(&mut *tx)
                .await?;
        if existing > 0 {
            return Ok(0);
        }

        for (order, seed) in seeds.iter().enumerate() {
            sqlx::query(
                "INSERT INTO outcome_segments
                    (game_type, label, probability, multiplier, is_high_payout, ord, version)
                 VALUES (?, ?, ?, ?, ?, ?, 0)",
            )
            .bind(game.as_str())
            .bind(&seed.label)
            .bind(seed.probability)
            .bind(seed.multiplier)
            .bind(seed.is_high_payout)
            .bind(order as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(game = %game, count = seeds.len(), "Seeded default segments");
        Ok(seeds.len())
    }

    /// Segments for `game`, in display order.
    pub async fn load_segments(&self, game: GameType) -> ProfitResult<Vec<OutcomeSegment>> {
        let rows: Vec<SegmentRow> = sqlx::query_as(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM outcome_segments
             WHERE game_type = ? ORDER BY ord, id"
        ))
        .bind(game.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutcomeSegment::try_from).collect()
    }

    /// Write one segment's probability and multiplier outside the controller
    /// (operator edits). Fails with `Conflict` if it changed since it was read.
    pub async fn update_segment(&self, segment: &OutcomeSegment) -> ProfitResult<OutcomeSegment> {
        let result = sqlx::query(
            "UPDATE outcome_segments
             SET probability = ?, multiplier = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(segment.probability)
        .bind(segment.payout_multiplier)
        .bind(segment.id)
        .bind(segment.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(ProfitError::Conflict {
                game_type: segment.game_type,
                segment_id: segment.id,
            });
        }

        let mut updated = segment.clone();
        updated.version += 1;
        Ok(updated)
    }

    /// Atomically write the new segment parameters and the audit entry.
    ///
    /// Each segment update is conditioned on the `version` it was read at.
    /// If any segment moved underneath us the transaction is dropped, which
    /// rolls back every write including the log entry.
    pub async fn commit_adjustment(
        &self,
        applied: &[OutcomeSegment],
        entry: &AdjustmentLogEntry,
    ) -> ProfitResult<AdjustmentLogEntry> {
        let before = serde_json::to_string(&entry.parameters_before)?;
        let after = serde_json::to_string(&entry.parameters_after)?;

        let mut tx = self.pool.begin().await?;

        for segment in applied {
            let result = sqlx::query(
                "UPDATE outcome_segments
                 SET probability = ?, multiplier = ?, version = version + 1
                 WHERE id = ? AND game_type = ? AND version = ?",
            )
            .bind(segment.probability)
            .bind(segment.payout_multiplier)
            .bind(segment.id)
            .bind(segment.game_type.as_str())
            .bind(segment.version)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                return Err(ProfitError::Conflict {
                    game_type: segment.game_type,
                    segment_id: segment.id,
                });
            }
        }

        let id = sqlx::query(
            "INSERT INTO adjustment_log
                (game_type, created_at_ms, auto, margin_short, margin_long, intensity,
                 parameters_before, parameters_after, note)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.game_type.as_str())
        .bind(entry.created_at.timestamp_millis())
        .bind(entry.auto)
        .bind(entry.margin_short)
        .bind(entry.margin_long)
        .bind(entry.intensity)
        .bind(before)
        .bind(after)
        .bind(&entry.note)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        debug!(game = %entry.game_type, id, segments = applied.len(), "Adjustment committed");
        Ok(AdjustmentLogEntry {
            id: Some(id),
            ..entry.clone()
        })
    }

    // -- Game rounds ---------------------------------------------------------

    /// Append a completed round to the log.
    pub async fn record_round(&self, round: &GameRoundRecord) -> ProfitResult<i64> {
        let id = sqlx::query(
            "INSERT INTO game_rounds
                (game_type, stake_cents, win_cents, result_label, multiplier, created_at_ms)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(round.game_type.as_str())
        .bind(to_cents(round.stake)?)
        .bind(to_cents(round.win_amount)?)
        .bind(&round.result_label)
        .bind(round.multiplier)
        .bind(round.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Sum stakes and payouts for `game` with `since <= created_at <= until`.
    ///
    /// Bounds are compared at millisecond precision (the stored resolution):
    /// a round less than 1 ms older than `since` shares its millisecond and
    /// is counted as inside the window.
    pub async fn round_totals(
        &self,
        game: GameType,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> ProfitResult<RoundTotals> {
        let (stake_cents, win_cents, rounds): (i64, i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(stake_cents), 0), COALESCE(SUM(win_cents), 0), COUNT(*)
             FROM game_rounds
             WHERE game_type = ? AND created_at_ms >= ? AND created_at_ms <= ?",
        )
        .bind(game.as_str())
        .bind(since.timestamp_millis())
        .bind(until.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(RoundTotals {
            total_stakes: Decimal::new(stake_cents, 2),
            total_payouts: Decimal::new(win_cents, 2),
            rounds,
        })
    }

    // -- Adjustment log ------------------------------------------------------

    /// Number of adjustments (automatic or manual) for `game` since `since`.
    pub async fn count_adjustments_since(
        &self,
        game: GameType,
        since: DateTime<Utc>,
    ) -> ProfitResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM adjustment_log WHERE game_type = ? AND created_at_ms >= ?",
        )
        .bind(game.as_str())
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Most recent adjustments for `game`, newest first.
    pub async fn recent_adjustments(
        &self,
        game: GameType,
        limit: i64,
    ) -> ProfitResult<Vec<AdjustmentLogEntry>> {
        let rows: Vec<AdjustmentRow> = sqlx::query_as(&format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM adjustment_log
             WHERE game_type = ? ORDER BY created_at_ms DESC, id DESC LIMIT ?"
        ))
        .bind(game.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AdjustmentLogEntry::try_from).collect()
    }

    pub async fn latest_adjustment(&self, game: GameType) -> ProfitResult<Option<AdjustmentLogEntry>> {
        Ok(self.recent_adjustments(game, 1).await?.into_iter().next())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
