//! Phase-diagram tables built from stored minima.

use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use pm_sweep::GridSpec;
use pm_types::{EnvRecord, PmResult};

use crate::config::PhasePair;

/// Magnitudes at or below this are treated as a vanishing order parameter.
pub const PHASE_THRESHOLD: f64 = 1e-6;

/// Transform applied to a field before it is tabulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTransform {
    #[default]
    Identity,
    Abs,
    /// 1 where the field is nonzero (ordered), 0 otherwise.
    Phase,
}

impl ValueTransform {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Self::Identity => value,
            Self::Abs => value.abs(),
            Self::Phase => {
                if value.abs() > PHASE_THRESHOLD {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Structural phase read off two order parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralPhase {
    /// Both vanish.
    Rutile,
    /// Exactly one is ordered.
    M2,
    /// Both ordered with different magnitudes.
    TLike,
    /// Both ordered with equal magnitudes.
    M1,
}

impl StructuralPhase {
    pub fn classify(m1: f64, m2: f64) -> Self {
        let ordered1 = m1.abs() > PHASE_THRESHOLD;
        let ordered2 = m2.abs() > PHASE_THRESHOLD;
        match (ordered1, ordered2) {
            (true, true) if (m1.abs() - m2.abs()).abs() < PHASE_THRESHOLD => Self::M1,
            (true, true) => Self::TLike,
            (true, false) | (false, true) => Self::M2,
            (false, false) => Self::Rutile,
        }
    }

    /// Table value: R = 0, M2 = 0.5, T-like = 0.75, M1 = 1.
    pub fn value(&self) -> f64 {
        match self {
            Self::Rutile => 0.0,
            Self::M2 => 0.5,
            Self::TLike => 0.75,
            Self::M1 => 1.0,
        }
    }
}

/// One present grid point of a tabulated field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasePoint {
    pub b_ratio: f64,
    pub t_ratio: f64,
    pub value: f64,
}

/// Collect `field` over every present minimum, located by its own fields.
///
/// Absent points are skipped.
pub fn collect_field(
    minima: &[Option<EnvRecord>],
    grid: &GridSpec,
    field: &str,
    transform: ValueTransform,
) -> PmResult<Vec<PhasePoint>> {
    let mut points = Vec::new();
    for record in minima.iter().flatten() {
        let at = grid.locate(record)?;
        points.push(PhasePoint {
            b_ratio: at.b_ratio,
            t_ratio: at.t_ratio,
            value: transform.apply(record.get(field)?),
        });
    }
    Ok(points)
}

/// Classify every present minimum by the fields of `pair`.
///
/// With `average_with` set, each field is first averaged with its partner.
pub fn collect_pair(
    minima: &[Option<EnvRecord>],
    grid: &GridSpec,
    pair: &PhasePair,
) -> PmResult<Vec<PhasePoint>> {
    let mut points = Vec::new();
    for record in minima.iter().flatten() {
        let at = grid.locate(record)?;
        let mut m1 = record.get(&pair.first)?;
        let mut m2 = record.get(&pair.second)?;
        if let Some((first_partner, second_partner)) = &pair.average_with {
            m1 = 0.5 * (m1 + record.get(first_partner)?);
            m2 = 0.5 * (m2 + record.get(second_partner)?);
        }
        points.push(PhasePoint {
            b_ratio: at.b_ratio,
            t_ratio: at.t_ratio,
            value: StructuralPhase::classify(m1, m2).value(),
        });
    }
    Ok(points)
}

/// Write points as a tab-separated table with a `b_ratio t_ratio value` header.
pub fn write_phase_table<P: AsRef<Path>>(path: P, points: &[PhasePoint]) -> PmResult<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(std::io::Error::from)?;

    for point in points {
        writer.serialize(point).map_err(std::io::Error::from)?;
    }
    writer.flush()?;

    info!("Wrote {} phase points to {}", points.len(), path.display());
    Ok(())
}
