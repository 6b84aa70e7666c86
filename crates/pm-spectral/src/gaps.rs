//! Gap search over a sampled density of states.

use serde::{Deserialize, Serialize};

/// Densities with magnitude below this count as zero.
pub const ZERO_DENSITY_EPS: f64 = 1e-12;

/// A zero-density energy range bounded by nonzero density on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapInterval {
    pub start: f64,
    pub stop: f64,
}

impl GapInterval {
    pub fn size(&self) -> f64 {
        self.stop - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScanState {
    BeforeBand,
    InBand,
    InGap { start: f64 },
}

/// Find every bounded gap in `dos`, sampled at the non-decreasing `energies`.
///
/// A gap runs from the first zero sample after a band to the first nonzero
/// sample after it. Zeros below the lowest band and a zero run that reaches
/// the end of the samples are not gaps. Extra samples in the longer of the
/// two slices are ignored.
pub fn find_gaps(dos: &[f64], energies: &[f64]) -> Vec<GapInterval> {
    let mut gaps = Vec::new();
    let mut state = ScanState::BeforeBand;

    for (&density, &energy) in dos.iter().zip(energies) {
        let zero = density.abs() < ZERO_DENSITY_EPS;

        state = match (state, zero) {
            (ScanState::BeforeBand, true) => ScanState::BeforeBand,
            (ScanState::BeforeBand, false) | (ScanState::InBand, false) => ScanState::InBand,
            (ScanState::InBand, true) => ScanState::InGap { start: energy },
            (ScanState::InGap { start }, true) => ScanState::InGap { start },
            (ScanState::InGap { start }, false) => {
                // Repeated energies give a zero-width run.
                if energy > start {
                    gaps.push(GapInterval { start, stop: energy });
                }
                ScanState::InBand
            }
        };
    }

    gaps
}
