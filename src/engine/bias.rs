//! In-memory draw biasing.
//!
//! Request-path helpers that lean a single draw toward the house when the
//! recent margin is soft. Nothing here is persisted; the stored
//! distribution is only changed by the controller.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::HouseConfig;
use crate::types::OutcomeSegment;

/// Coarse payout class used for draw biasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutClass {
    /// Strong loss or tiny return (multiplier ≤ 0.5).
    Loss,
    Mid,
    /// Multiplier ≥ 3.
    BigWin,
}

impl PayoutClass {
    pub fn of(multiplier: f64) -> Self {
        if multiplier <= 0.5 {
            PayoutClass::Loss
        } else if multiplier >= 3.0 {
            PayoutClass::BigWin
        } else {
            PayoutClass::Mid
        }
    }
}

fn scale_for(class: PayoutClass, margin: f64, target: f64) -> f64 {
    if margin < target {
        match class {
            PayoutClass::Loss => 1.15,
            PayoutClass::BigWin => 0.8,
            PayoutClass::Mid => 0.95,
        }
    } else if margin < target + 0.05 {
        match class {
            PayoutClass::Loss => 1.05,
            PayoutClass::BigWin => 0.9,
            PayoutClass::Mid => 1.0,
        }
    } else if margin > target + 0.1 {
        match class {
            PayoutClass::Mid => 1.05,
            PayoutClass::BigWin => 1.02,
            PayoutClass::Loss => 1.0,
        }
    } else {
        1.0
    }
}

/// Draw weights for `segments` biased by the recent `margin`.
///
/// The weights are not normalized; the draw routine divides by their sum.
/// Without margin data the (non-negative) base probabilities are returned.
pub fn adjusted_probabilities(
    segments: &[OutcomeSegment],
    margin: Option<f64>,
    target: f64,
) -> Vec<f64> {
    let base: Vec<f64> = segments.iter().map(|s| s.probability.max(0.0)).collect();
    let Some(margin) = margin else {
        return base;
    };

    let adjusted: Vec<f64> = segments
        .iter()
        .zip(&base)
        .map(|(s, p)| p * scale_for(PayoutClass::of(s.payout_multiplier), margin, target))
        .collect();

    if adjusted.iter().sum::<f64>() <= 0.0 {
        return base;
    }
    adjusted
}

/// Predict & Win payout multiplier for the recent margin.
///
/// Healthy (≥ target + 0.05) or unknown margins pay `base`; a soft margin
/// pays 1.7x and a margin below target pays 1.6x.
pub fn predict_multiplier_for_margin(margin: Option<f64>, target: f64, base: Decimal) -> Decimal {
    match margin {
        None => base,
        Some(m) if m < target => dec!(1.6),
        Some(m) if m < target + 0.05 => dec!(1.7),
        Some(_) => base,
    }
}

/// [`predict_multiplier_for_margin`] with the configured target and base.
pub fn predict_multiplier(config: &HouseConfig, margin: Option<f64>) -> Decimal {
    predict_multiplier_for_margin(margin, config.target_margin, config.predict_base_multiplier)
}
