//! Multi-start free-energy minimization.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

use pm_types::{fields, EnvRecord, Overrides, PmResult, RecordError};

use crate::solver::Solver;

/// Inclusive range a sampled initial condition is drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRange {
    pub field: String,
    pub low: f64,
    pub high: f64,
}

/// The fixed set of initial-condition overrides tried at every grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    pub overrides: Vec<Overrides>,
}

impl InitialConditions {
    pub fn new(overrides: Vec<Overrides>) -> Self {
        Self { overrides }
    }

    /// Disordered, fully ordered, and weakly ordered starts for (M, W).
    pub fn order_parameter_defaults() -> Self {
        let start = |m: f64, w: f64| {
            Overrides::from([(fields::M.to_string(), m), (fields::W.to_string(), w)])
        };
        Self::new(vec![start(0.0, 0.0), start(1.0, 1.0), start(0.1, 0.01)])
    }

    /// `count` override sets drawn uniformly from `ranges`.
    ///
    /// The same seed always yields the same sets, so repeated sweeps start
    /// from identical conditions.
    pub fn sampled(ranges: &[FieldRange], count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let overrides = (0..count)
            .map(|_| {
                ranges
                    .iter()
                    .map(|range| {
                        let value = if range.high > range.low {
                            rng.random_range(range.low..=range.high)
                        } else {
                            range.low
                        };
                        (range.field.clone(), value)
                    })
                    .collect()
            })
            .collect();
        Self::new(overrides)
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// One fresh record per override set, each built from `base` alone.
    pub fn candidates(&self, base: &EnvRecord) -> Result<Vec<EnvRecord>, RecordError> {
        self.overrides
            .iter()
            .map(|overrides| base.with_overrides(overrides))
            .collect()
    }
}

impl Default for InitialConditions {
    fn default() -> Self {
        Self::order_parameter_defaults()
    }
}

/// Outcome of minimizing one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimizationResult {
    /// Lowest free-energy solution, if any candidate converged.
    pub selected: Option<EnvRecord>,
    /// Position of `selected` within `attempts`.
    pub selected_index: Option<usize>,
    /// Every solved candidate in initial-condition order; `None` where the
    /// solver found nothing.
    pub attempts: Vec<Option<EnvRecord>>,
}

impl MinimizationResult {
    /// Pick the attempt with the smallest free energy. Ties keep the earliest.
    pub fn select(attempts: Vec<Option<EnvRecord>>) -> Result<Self, RecordError> {
        let mut best: Option<(usize, f64)> = None;

        for (index, attempt) in attempts.iter().enumerate() {
            let Some(record) = attempt else {
                continue;
            };
            let free_energy = record.free_energy()?;
            if free_energy.is_nan() {
                warn!("Ignoring candidate {} with NaN free energy", index);
                continue;
            }
            let improves = match best {
                None => true,
                Some((_, current)) => free_energy < current,
            };
            if improves {
                best = Some((index, free_energy));
            }
        }

        let selected_index = best.map(|(index, _)| index);
        let selected = selected_index.and_then(|index| attempts[index].clone());
        Ok(Self {
            selected,
            selected_index,
            attempts,
        })
    }

    /// A point whose minimization failed outright: nothing selected and
    /// every attempt absent.
    pub fn failed(candidates: usize) -> Self {
        Self {
            selected: None,
            selected_index: None,
            attempts: vec![None; candidates],
        }
    }

    pub fn is_solved(&self) -> bool {
        self.selected.is_some()
    }
}

/// Solves one record from several starting points and keeps the solution
/// with the lowest free energy.
///
/// The solver is not globally convergent, so which start produced the
/// minimum is irrelevant; only the realized free energy counts.
#[derive(Debug)]
pub struct MultiStartMinimizer<S> {
    solver: S,
    conditions: InitialConditions,
    tolerance: f64,
}

impl<S: Solver> MultiStartMinimizer<S> {
    pub fn new(solver: S, conditions: InitialConditions) -> Self {
        Self {
            solver,
            conditions,
            tolerance: 1e-6,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn candidate_count(&self) -> usize {
        self.conditions.len()
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Run every initial condition against `base`. Candidates the solver
    /// cannot converge are recorded as absent; an error from any candidate
    /// fails the whole point.
    pub fn minimize(&self, base: &EnvRecord) -> PmResult<MinimizationResult> {
        let candidates = self.conditions.candidates(base)?;
        let mut attempts = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            attempts.push(self.solver.solve(candidate, self.tolerance)?);
        }
        Ok(MinimizationResult::select(attempts)?)
    }
}
