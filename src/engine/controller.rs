//! Probability/multiplier controller.
//!
//! Closed-loop margin targeting over a game's outcome distribution. Each
//! tick compares the realized margin (short and long window) with the
//! target and, when the house is under target, projects an aggressive
//! corrected distribution and blends only a bounded fraction toward it.
//!
//! Pipeline per tick:
//! 1. Collect short/long window margins.
//! 2. No data in either window → no-op.
//! 3. `min(short, long) >= target` → no-op.
//! 4. Intensity = clamp(gap / normalizer, 0.05, 0.5).
//! 5. Too many adjustments in the last hour → no-op.
//! 6. Split segments into high/low payout; either side empty → no-op.
//! 7. Project (up to 3 attempts, intensity ×1.2 per retry).
//! 8. Blend with `alpha = min(0.25, intensity)`.
//! 9. Commit segments and one audit entry in a single transaction.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::HouseConfig;
use crate::engine::margin::MarginEstimator;
use crate::storage::Store;
use crate::types::{
    AdjustmentLogEntry, GameType, MarginWindow, OutcomeSegment, ProfitError, ProfitResult,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const MIN_INTENSITY: f64 = 0.05;
pub const MAX_INTENSITY: f64 = 0.5;
/// Largest fraction of the way toward the projection a single tick may move.
pub const MAX_BLEND: f64 = 0.25;
pub const MAX_PROJECTION_ATTEMPTS: u32 = 3;
const INTENSITY_ESCALATION: f64 = 1.2;

const AUTO_NOTE: &str = "auto-adjust";

// ---------------------------------------------------------------------------
// Planning (pure)
// ---------------------------------------------------------------------------

/// Map the margin gap onto a bounded step size.
pub fn compute_intensity(target_margin: f64, current_margin: f64, normalizer: f64) -> f64 {
    let gap = target_margin - current_margin;
    let base = if normalizer > 0.0 { gap / normalizer } else { gap };
    base.clamp(MIN_INTENSITY, MAX_INTENSITY)
}

/// Indices of high-payout (`multiplier >= threshold`) and low-payout segments.
pub fn partition_segments(segments: &[OutcomeSegment], threshold: f64) -> (Vec<usize>, Vec<usize>) {
    (0..segments.len()).partition(|&i| segments[i].payout_multiplier >= threshold)
}

/// Expected house margin of a distribution: `1 - Σ p·m`.
pub fn expected_margin(probabilities: &[f64], multipliers: &[f64]) -> f64 {
    let payout: f64 = probabilities
        .iter()
        .zip(multipliers)
        .map(|(p, m)| p * m)
        .sum();
    1.0 - payout
}

fn normalize(probabilities: &mut [f64]) {
    let total: f64 = probabilities.iter().sum();
    let total = if total > 0.0 { total } else { 1.0 };
    for p in probabilities.iter_mut() {
        *p /= total;
    }
}

/// A candidate distribution at one intensity.
#[derive(Debug, Clone)]
pub struct Projection {
    pub intensity: f64,
    pub probabilities: Vec<f64>,
    pub multipliers: Vec<f64>,
    pub margin: f64,
}

fn project(
    segments: &[OutcomeSegment],
    high: &[usize],
    low: &[usize],
    intensity: f64,
    config: &HouseConfig,
) -> Projection {
    let mut probabilities: Vec<f64> = segments.iter().map(|s| s.probability).collect();
    let mut multipliers: Vec<f64> = segments.iter().map(|s| s.payout_multiplier).collect();

    // Move probability mass from high to low payout slices.
    let prob_delta = intensity * config.weight_probability;
    let mut removed_total = 0.0;
    for &i in high {
        let p = probabilities[i];
        let reduced = (p - p * prob_delta).max(0.0);
        removed_total += p - reduced;
        probabilities[i] = reduced;
    }

    let share = removed_total / low.len() as f64;
    for &i in low {
        probabilities[i] += share;
    }
    normalize(&mut probabilities);

    // Shrink the big multipliers, never below the floor.
    let factor = 1.0 - intensity * config.weight_multiplier;
    for &i in high {
        multipliers[i] = (multipliers[i] * factor).max(config.min_multiplier);
    }

    let margin = expected_margin(&probabilities, &multipliers);
    Projection {
        intensity,
        probabilities,
        multipliers,
        margin,
    }
}

/// The full outcome of planning one correction.
#[derive(Debug, Clone)]
pub struct AdjustmentPlan {
    /// Final intensity: the projection's, escalated once more if it
    /// still missed the target. Drives `alpha` and the audit entry.
    pub intensity: f64,
    pub alpha: f64,
    pub attempts: u32,
    pub projection: Projection,
    /// Input segments carrying the blended parameters (versions unchanged).
    pub applied: Vec<OutcomeSegment>,
}

/// Plan a correction for `segments` given the realized margin.
///
/// Returns `None` when the segment set cannot be rebalanced (no high or no
/// low payout segments). The caller is responsible for the on-target and
/// rate-limit gates.
pub fn plan_adjustment(
    segments: &[OutcomeSegment],
    current_margin: f64,
    config: &HouseConfig,
) -> Option<AdjustmentPlan> {
    let (high, low) = partition_segments(segments, config.high_payout_threshold);
    if high.is_empty() || low.is_empty() {
        return None;
    }

    let mut intensity =
        compute_intensity(config.target_margin, current_margin, config.margin_normalizer);
    let mut attempts = 0;
    let projection = loop {
        attempts += 1;
        let candidate = project(segments, &high, &low, intensity, config);
        if candidate.margin >= config.target_margin {
            break candidate;
        }
        // Escalates after every miss, the last one included.
        intensity = (intensity * INTENSITY_ESCALATION).min(MAX_INTENSITY);
        if attempts >= MAX_PROJECTION_ATTEMPTS {
            break candidate;
        }
    };

    let alpha = MAX_BLEND.min(intensity);
    let mut applied: Vec<OutcomeSegment> = segments.to_vec();
    for (i, segment) in applied.iter_mut().enumerate() {
        segment.probability =
            (1.0 - alpha) * segment.probability + alpha * projection.probabilities[i];
        segment.payout_multiplier =
            (1.0 - alpha) * segment.payout_multiplier + alpha * projection.multipliers[i];
    }

    // Keeps Σp = 1 even if the stored set had drifted.
    let mut probabilities: Vec<f64> = applied.iter().map(|s| s.probability).collect();
    normalize(&mut probabilities);
    for (segment, p) in applied.iter_mut().zip(probabilities) {
        segment.probability = p;
    }

    Some(AdjustmentPlan {
        intensity,
        alpha,
        attempts,
        projection,
        applied,
    })
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// What a single controller tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Neither window has any stakes.
    InsufficientData,
    /// Realized margin already meets the target.
    OnTarget { current_margin: f64, target_margin: f64 },
    /// Hourly adjustment budget is spent.
    RateLimited { recent: i64, limit: i64 },
    /// Segment set has no high or no low payout side to rebalance.
    DegenerateSegments { high: usize, low: usize },
    /// A correction was committed.
    Adjusted(AdjustmentLogEntry),
}

impl TickOutcome {
    pub fn is_adjusted(&self) -> bool {
        matches!(self, TickOutcome::Adjusted(_))
    }
}

/// Sole runtime mutator of outcome segments.
///
/// Not reentrant per game type: callers must not run two ticks for the
/// same game concurrently (see [`Scheduler`](super::scheduler::Scheduler)).
pub struct Controller {
    store: Store,
    estimator: MarginEstimator,
    config: RwLock<HouseConfig>,
}

impl Controller {
    pub fn new(store: Store, config: HouseConfig) -> Self {
        Self {
            estimator: MarginEstimator::new(store.clone()),
            store,
            config: RwLock::new(config),
        }
    }

    pub fn estimator(&self) -> &MarginEstimator {
        &self.estimator
    }

    /// Current tunables.
    pub async fn config(&self) -> HouseConfig {
        self.config.read().await.clone()
    }

    /// Swap tunables; takes effect on the next tick.
    pub async fn reconfigure(&self, config: HouseConfig) {
        let mut current = self.config.write().await;
        if *current != config {
            info!(target_margin = config.target_margin, "House configuration updated");
            *current = config;
        }
    }

    /// Run one tick for `game` against the wall clock.
    pub async fn run_tick(&self, game: GameType) -> ProfitResult<TickOutcome> {
        self.run_tick_at(game, Utc::now()).await
    }

    /// Run one tick for `game` with a pinned clock.
    pub async fn run_tick_at(&self, game: GameType, now: DateTime<Utc>) -> ProfitResult<TickOutcome> {
        let config = self.config().await;

        // 1. Collect
        let margin_short = self
            .estimator
            .estimate_margin_at(game, MarginWindow::Minutes(config.short_window_minutes), now)
            .await?;
        let margin_long = self
            .estimator
            .estimate_margin_at(game, MarginWindow::Hours(config.long_window_hours), now)
            .await?;

        // 2. Insufficient data
        let current_margin = match (margin_short, margin_long) {
            (None, None) => {
                debug!(game = %game, "No stakes in either window, skipping");
                return Ok(TickOutcome::InsufficientData);
            }
            (Some(s), Some(l)) => s.min(l),
            (Some(m), None) | (None, Some(m)) => m,
        };

        // 3. On target
        if current_margin >= config.target_margin {
            debug!(
                game = %game,
                current_margin,
                target = config.target_margin,
                "Margin on target"
            );
            return Ok(TickOutcome::OnTarget {
                current_margin,
                target_margin: config.target_margin,
            });
        }

        // 5. Rate limit
        let recent = self
            .store
            .count_adjustments_since(game, now - Duration::hours(1))
            .await?;
        if recent >= config.max_adjustments_per_hour {
            debug!(
                game = %game,
                recent,
                limit = config.max_adjustments_per_hour,
                "Adjustment rate limit reached"
            );
            return Ok(TickOutcome::RateLimited {
                recent,
                limit: config.max_adjustments_per_hour,
            });
        }

        // 6-8. Classify, project, blend
        let segments = self.store.load_segments(game).await?;
        let Some(plan) = plan_adjustment(&segments, current_margin, &config) else {
            let (high, low) = partition_segments(&segments, config.high_payout_threshold);
            warn!(
                game = %game,
                high = high.len(),
                low = low.len(),
                threshold = config.high_payout_threshold,
                "Segment set cannot be auto-managed: need both high and low payout segments"
            );
            return Ok(TickOutcome::DegenerateSegments {
                high: high.len(),
                low: low.len(),
            });
        };

        // 9. Persist and log
        let entry = AdjustmentLogEntry {
            id: None,
            game_type: game,
            created_at: now,
            auto: true,
            margin_short,
            margin_long,
            intensity: plan.intensity,
            parameters_before: segments.iter().map(OutcomeSegment::snapshot).collect(),
            parameters_after: plan.applied.iter().map(OutcomeSegment::snapshot).collect(),
            note: AUTO_NOTE.to_string(),
        };
        let saved = match self.store.commit_adjustment(&plan.applied, &entry).await {
            Ok(saved) => saved,
            Err(e @ ProfitError::Conflict { .. }) => {
                warn!(game = %game, error = %e, "Segments changed during tick, nothing applied");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        info!(
            game = %game,
            margin_short = ?margin_short,
            margin_long = ?margin_long,
            target = config.target_margin,
            intensity = format!("{:.3}", plan.intensity),
            alpha = format!("{:.3}", plan.alpha),
            attempts = plan.attempts,
            projected_margin = format!("{:.4}", plan.projection.margin),
            "Applied margin adjustment"
        );

        Ok(TickOutcome::Adjusted(saved))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
