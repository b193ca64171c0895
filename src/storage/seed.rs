//! Default outcome distributions for fresh installs.

use crate::types::{GameType, SegmentSeed};

/// Spin & Win wheel: (label, multiplier, weight, high payout).
/// Big wins stay rare; weights are normalized when seeded.
const SPIN_WHEEL: &[(&str, f64, f64, bool)] = &[
    ("-1.5x", -1.5, 0.08, false),
    ("-1x", -1.0, 0.21, false),
    ("-0.5x", -0.5, 0.17, false),
    ("0x", 0.0, 0.19, false),
    ("0.5x", 0.5, 0.11, false),
    ("1x", 1.0, 0.08, false),
    ("1.5x", 1.5, 0.08, false),
    ("2x", 2.0, 0.06, false),
    ("2.5x", 2.5, 0.03, false),
    ("3x", 3.0, 0.02, false),
    ("5x", 5.0, 0.025, true),
    ("10x", 10.0, 0.015, true),
];

/// Pick a Box reveals. EV = 0.96.
const PICK_BOX: &[(&str, f64, f64, bool)] = &[
    ("X0", 0.0, 0.40, false),
    ("X1", 1.0, 0.34, false),
    ("X2", 2.0, 0.16, false),
    ("X3", 3.0, 0.10, false),
];

/// Default segment set for a game. Predict & Win has none: it pays a
/// single margin-dependent multiplier instead of drawing a segment.
pub fn default_segments(game: GameType) -> Vec<SegmentSeed> {
    let table = match game {
        GameType::Spin => SPIN_WHEEL,
        GameType::PickBox => PICK_BOX,
        GameType::Predict => return Vec::new(),
    };

    let total: f64 = table.iter().map(|(_, _, w, _)| w).sum();
    table
        .iter()
        .map(|&(label, multiplier, weight, is_high_payout)| SegmentSeed {
            label: label.to_string(),
            probability: weight / total,
            multiplier,
            is_high_payout,
        })
        .collect()
}
