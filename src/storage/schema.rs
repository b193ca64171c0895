//! Database schema creation.

use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    // Outcome segments: the tunable distribution per game
    "CREATE TABLE IF NOT EXISTS outcome_segments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        game_type TEXT NOT NULL,
        label TEXT NOT NULL,
        probability REAL NOT NULL,
        multiplier REAL NOT NULL,
        is_high_payout INTEGER NOT NULL DEFAULT 0,
        ord INTEGER NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 0,
        UNIQUE (game_type, label)
    )",
    // Game rounds: append-only play log, money in integer cents
    "CREATE TABLE IF NOT EXISTS game_rounds (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        game_type TEXT NOT NULL,
        stake_cents INTEGER NOT NULL,
        win_cents INTEGER NOT NULL,
        result_label TEXT NOT NULL,
        multiplier REAL NOT NULL,
        created_at_ms INTEGER NOT NULL
    )",
    // Adjustment log: append-only audit trail of controller actions
    "CREATE TABLE IF NOT EXISTS adjustment_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        game_type TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL,
        auto INTEGER NOT NULL DEFAULT 1,
        margin_short REAL,
        margin_long REAL,
        intensity REAL NOT NULL,
        parameters_before TEXT NOT NULL,
        parameters_after TEXT NOT NULL,
        note TEXT NOT NULL DEFAULT ''
    )",
    "CREATE INDEX IF NOT EXISTS idx_rounds_game_time ON game_rounds(game_type, created_at_ms)",
    "CREATE INDEX IF NOT EXISTS idx_adjust_game_time ON adjustment_log(game_type, created_at_ms DESC)",
    "CREATE INDEX IF NOT EXISTS idx_segments_game ON outcome_segments(game_type, ord)",
];

/// Create all tables and indexes (idempotent).
pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
