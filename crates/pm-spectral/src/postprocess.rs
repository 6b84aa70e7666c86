use serde::{Deserialize, Serialize};
use tracing::warn;

use pm_types::{DosCurve, DosPoint, EnergyScale, EnvRecord, PmResult};

use crate::dos::DosSource;
use crate::gaps::{find_gaps, GapInterval};

/// Density of states of one record and the gaps found in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    pub curve: DosCurve,
    pub gaps: Vec<GapInterval>,
    /// Size of the first gap divided by the record's energy scale; 0 when
    /// there is no gap.
    pub gap_size: f64,
}

impl GapReport {
    /// Dataset line for this report at grid coordinates (`b`, `temperature`).
    pub fn into_point(self, b: f64, temperature: f64) -> DosPoint {
        let GapReport { curve, gap_size, .. } = self;
        DosPoint {
            b,
            temperature,
            energies: curve.energies().to_vec(),
            dos: curve.dos().to_vec(),
            gap: gap_size,
        }
    }
}

/// Reports the band gap of solved records.
///
/// Only the lowest-energy gap is sized. When several gaps show up the first
/// is taken anyway and a warning is logged.
pub struct GapAnalyzer<D> {
    source: D,
    num_dos: usize,
    k_density: usize,
    scale: EnergyScale,
}

impl<D: DosSource> GapAnalyzer<D> {
    pub fn new(source: D, num_dos: usize, k_density: usize) -> Self {
        Self {
            source,
            num_dos,
            k_density,
            scale: EnergyScale::default(),
        }
    }

    pub fn with_scale(mut self, scale: EnergyScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn analyze(&self, record: &EnvRecord) -> PmResult<GapReport> {
        let scale = self.scale.evaluate(record)?;
        let curve = self.source.density(record, self.num_dos, self.k_density)?;
        let gaps = find_gaps(curve.dos(), curve.energies());

        if gaps.len() > 1 {
            warn!(
                "Found {} gaps; using the lowest one at [{}, {}]",
                gaps.len(),
                gaps[0].start,
                gaps[0].stop
            );
        }
        let gap_size = gaps.first().map_or(0.0, |gap| gap.size() / scale);

        Ok(GapReport {
            curve,
            gaps,
            gap_size,
        })
    }
}
