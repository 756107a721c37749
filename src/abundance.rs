//! Post-coalescing abundance normalization.

use crate::constraints::{Constraint, MateLink};

/// Fills `normalized_abundance` on a window's coalesced constraints and mate
/// links. Runs once per window after coalescing.
pub trait AbundanceNormalizer {
    fn normalize(&self, constraints: &mut [Constraint], mates: &mut [MateLink]);
}

/// Leaves abundances on their raw scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unnormalized;

impl AbundanceNormalizer for Unnormalized {
    fn normalize(&self, constraints: &mut [Constraint], mates: &mut [MateLink]) {
        for ct in constraints {
            ct.normalized_abundance = ct.abundance;
        }
        for mate in mates {
            mate.normalized_abundance = mate.abundance;
        }
    }
}

/// Divides abundances by the window's total read support.
#[derive(Debug, Clone, Copy, Default)]
pub struct TotalSupport;

impl AbundanceNormalizer for TotalSupport {
    fn normalize(&self, constraints: &mut [Constraint], mates: &mut [MateLink]) {
        let total: u64 = constraints.iter().map(|c| u64::from(c.support)).sum();
        let scale = if total == 0 { 0.0 } else { 1.0 / total as f64 };
        for ct in constraints {
            ct.normalized_abundance = ct.abundance * scale;
        }
        for mate in mates {
            mate.normalized_abundance = mate.abundance * scale;
        }
    }
}
