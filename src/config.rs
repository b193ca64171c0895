//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every house tunable has a default so a partial file is valid.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;

use crate::types::GameType;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub house: HouseConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file.
    pub database_path: String,
    pub tick_interval_secs: u64,
    /// Game types the controller adjusts automatically.
    pub managed_games: Vec<GameType>,
    /// Re-read `[house]` from disk before every scheduler round.
    pub reload_house_config: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: "profit_engine.db".to_string(),
            tick_interval_secs: 60,
            managed_games: vec![GameType::Spin],
            reload_house_config: true,
        }
    }
}

/// Controller tunables. Read at tick time.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HouseConfig {
    /// House margin the controller steers toward.
    pub target_margin: f64,
    pub short_window_minutes: i64,
    pub long_window_hours: i64,
    /// Margin gap that maps to an intensity of 1.0 before clamping.
    pub margin_normalizer: f64,
    pub weight_probability: f64,
    pub weight_multiplier: f64,
    /// Segments at or above this multiplier are treated as high payout.
    pub high_payout_threshold: f64,
    /// Floor for shrunk high-payout multipliers.
    pub min_multiplier: f64,
    pub max_adjustments_per_hour: i64,
    /// Predict & Win multiplier when the margin is healthy. Money-facing,
    /// so it is held as a decimal with at most two places.
    pub predict_base_multiplier: Decimal,
}

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            target_margin: 0.75,
            short_window_minutes: 10,
            long_window_hours: 24,
            margin_normalizer: 0.2,
            weight_probability: 0.4,
            weight_multiplier: 0.6,
            high_payout_threshold: 5.0,
            min_multiplier: 1.1,
            max_adjustments_per_hour: 12,
            predict_base_multiplier: dec!(1.8),
        }
    }
}

impl HouseConfig {
    /// Reject values that would make the controller misbehave.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (0.0..1.0).contains(&self.target_margin),
            "target_margin must be in [0, 1), got {}",
            self.target_margin
        );
        anyhow::ensure!(self.short_window_minutes > 0, "short_window_minutes must be positive");
        anyhow::ensure!(self.long_window_hours > 0, "long_window_hours must be positive");
        anyhow::ensure!(
            self.weight_probability >= 0.0 && self.weight_multiplier >= 0.0,
            "adjustment weights must be non-negative"
        );
        anyhow::ensure!(self.margin_normalizer > 0.0, "margin_normalizer must be positive");
        anyhow::ensure!(self.min_multiplier > 0.0, "min_multiplier must be positive");
        // Otherwise a "high" segment below the floor gets its multiplier raised.
        anyhow::ensure!(
            self.high_payout_threshold >= self.min_multiplier,
            "high_payout_threshold ({}) must be at least min_multiplier ({})",
            self.high_payout_threshold,
            self.min_multiplier
        );
        anyhow::ensure!(
            self.predict_base_multiplier > Decimal::ZERO,
            "predict_base_multiplier must be positive"
        );
        anyhow::ensure!(
            self.predict_base_multiplier.scale() <= 2,
            "predict_base_multiplier must have at most 2 decimal places, got {}",
            self.predict_base_multiplier
        );
        anyhow::ensure!(
            self.max_adjustments_per_hour >= 0,
            "max_adjustments_per_hour must be non-negative"
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8090,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.house.validate()?;
        Ok(config)
    }
}
