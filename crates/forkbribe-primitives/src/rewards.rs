//! Attestation reward weights and the timeliness/distance reward matrix.

use serde::{Deserialize, Serialize};

/// Source vote weight.
pub const W_S: u64 = 14;
/// Target vote weight.
pub const W_T: u64 = 26;
/// Head vote weight.
pub const W_H: u64 = 14;
/// Sync-committee weight (unused by attestations, kept for the full vector).
pub const W_Y: u64 = 2;
/// Proposer weight.
pub const W_P: u64 = 8;
/// Sum of all weights.
pub const W_SUM: u64 = 64;

/// How much of an attestation was correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeliness {
    WrongSource,
    SourceOnly,
    SourceTarget,
    SourceTargetHead,
}

impl Timeliness {
    fn row(self) -> usize {
        match self {
            Timeliness::WrongSource => 0,
            Timeliness::SourceOnly => 1,
            Timeliness::SourceTarget => 2,
            Timeliness::SourceTargetHead => 3,
        }
    }
}

/// Fraction of the committee agreeing on each attribute, relative to
/// [`crate::ATTESTATORS_PER_SLOT`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttestFractions {
    pub source: f64,
    pub target: f64,
    pub head: f64,
}

#[derive(Clone, Copy)]
enum Attr {
    Source,
    Target,
    Head,
}

impl Attr {
    fn weight(self) -> u64 {
        match self {
            Attr::Source => W_S,
            Attr::Target => W_T,
            Attr::Head => W_H,
        }
    }

    fn fraction(self, common: &AttestFractions) -> f64 {
        match self {
            Attr::Source => common.source,
            Attr::Target => common.target,
            Attr::Head => common.head,
        }
    }
}

/// Signed weight subsets indexed by (timeliness row, slot-distance bucket).
/// A positive sign earns the weight scaled by the observed fraction, a
/// negative sign is a flat penalty.
const REWARD_MATRIX: [[&[(Attr, i8)]; 4]; 4] = [
    [
        &[(Attr::Source, -1), (Attr::Target, -1)],
        &[(Attr::Source, -1), (Attr::Target, -1)],
        &[(Attr::Source, -1), (Attr::Target, -1)],
        &[(Attr::Source, -1), (Attr::Target, -1)],
    ],
    [
        &[(Attr::Source, 1), (Attr::Target, -1)],
        &[(Attr::Source, 1), (Attr::Target, -1)],
        &[(Attr::Source, -1), (Attr::Target, -1)],
        &[(Attr::Source, -1), (Attr::Target, -1)],
    ],
    [
        &[(Attr::Source, 1), (Attr::Target, 1)],
        &[(Attr::Source, 1), (Attr::Target, 1)],
        &[(Attr::Source, -1), (Attr::Target, 1)],
        &[(Attr::Source, -1), (Attr::Target, -1)],
    ],
    [
        &[(Attr::Source, 1), (Attr::Target, 1), (Attr::Head, 1)],
        &[(Attr::Source, 1), (Attr::Target, 1)],
        &[(Attr::Source, -1), (Attr::Target, 1)],
        &[(Attr::Source, -1), (Attr::Target, -1)],
    ],
];

fn distance_bucket(slot_distance: u64) -> usize {
    debug_assert!(slot_distance > 0, "vote included in its own slot");
    match slot_distance {
        1 => 0,
        2..=5 => 1,
        6..=32 => 2,
        _ => 3,
    }
}

/// Per-index reward and punishment fractions for one attestation.
///
/// The reward is the sum of the positively-signed weights scaled by the
/// observed committee fraction; the punishment is the flat sum of the
/// negatively-signed weights. Both are normalised by [`W_SUM`] and the
/// punishment is returned non-positive.
pub fn attestation_base_reward(
    timeliness: Timeliness,
    common: &AttestFractions,
    slot_distance: u64,
) -> (f64, f64) {
    let entries = REWARD_MATRIX[timeliness.row()][distance_bucket(slot_distance)];
    let mut reward = 0.0;
    let mut punishment = 0.0;
    for &(attr, sign) in entries {
        if sign >= 0 {
            reward += sign as f64 * attr.weight() as f64 * attr.fraction(common);
        } else {
            punishment += sign as f64 * attr.weight() as f64;
        }
    }
    (reward / W_SUM as f64, punishment / W_SUM as f64)
}
