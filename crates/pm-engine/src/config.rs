//! Run configuration for the phase-diagram pipeline.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use pm_spectral::DosConfig;
use pm_sweep::{GridSpec, InitialConditions, SolverConfig};
use pm_types::{config_error, PmResult};

use crate::aggregate::ValueTransform;

/// A record field to tabulate over the phase diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseField {
    pub field: String,
    #[serde(default)]
    pub transform: ValueTransform,
}

impl PhaseField {
    pub fn new(field: impl Into<String>, transform: ValueTransform) -> Self {
        Self {
            field: field.into(),
            transform,
        }
    }
}

/// Two order-parameter fields classified together into a structural phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePair {
    pub first: String,
    pub second: String,

    /// Fields averaged with `first` and `second` before classifying.
    #[serde(default)]
    pub average_with: Option<(String, String)>,
}

impl PhasePair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
            average_with: None,
        }
    }

    pub fn with_average(mut self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.average_with = Some((first.into(), second.into()));
        self
    }

    /// `<name>_phase_<first>_<second>.tsv`, with `_avg` before the
    /// extension when averaging.
    pub fn table_name(&self, name: &str) -> String {
        let avg = if self.average_with.is_some() { "_avg" } else { "" };
        format!("{}_phase_{}_{}{}.tsv", name, self.first, self.second, avg)
    }
}

/// Everything one run of the pipeline needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// JSON object holding the fixed model parameters.
    pub base_record_path: PathBuf,

    /// Directory for the `<name>_*` datasets.
    pub out_dir: PathBuf,

    /// Dataset name.
    pub name: String,

    /// Load stored results under `name` instead of solving again.
    pub resume: bool,

    /// Worker threads; one per hardware thread when unset.
    pub pool_size: Option<usize>,

    /// Convergence tolerance handed to the solver.
    pub tolerance: f64,

    pub num_bs: usize,
    pub num_ts: usize,

    pub solver: SolverConfig,
    pub grid: GridSpec,
    pub initial_conditions: InitialConditions,

    /// Run the gap stage when set.
    pub dos: Option<DosConfig>,

    /// Fields written as `<name>_<field>.tsv` tables.
    pub phase_fields: Vec<PhaseField>,

    /// Field pairs written as structural-phase tables.
    pub phase_pairs: Vec<PhasePair>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_record_path: PathBuf::from("base.json"),
            out_dir: PathBuf::from("."),
            name: "phase".to_string(),
            resume: false,
            pool_size: None,
            tolerance: 1e-6,
            num_bs: 20,
            num_ts: 20,
            solver: SolverConfig::default(),
            grid: GridSpec::default(),
            initial_conditions: InitialConditions::default(),
            dos: None,
            phase_fields: vec![
                PhaseField::new("M", ValueTransform::Abs),
                PhaseField::new("W", ValueTransform::Abs),
            ],
            phase_pairs: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> PmResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| config_error!("Cannot read config {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| config_error!("Invalid config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PmResult<()> {
        if self.name.is_empty() {
            return Err(config_error!("Dataset name must not be empty"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(config_error!("Tolerance must be positive, got {}", self.tolerance));
        }
        if self.pool_size == Some(0) {
            return Err(config_error!("Pool size must be at least 1"));
        }
        if self.initial_conditions.is_empty() {
            return Err(config_error!("At least one initial condition is required"));
        }
        check_work_dir("Solver", &self.solver.work_dir)?;
        if let Some(dos) = &self.dos {
            check_work_dir("DOS", &dos.work_dir)?;
        }
        Ok(())
    }

    pub fn with_base_record(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_record_path = path.into();
        self
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = Some(pool_size);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_grid_size(mut self, num_bs: usize, num_ts: usize) -> Self {
        self.num_bs = num_bs;
        self.num_ts = num_ts;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_grid(mut self, grid: GridSpec) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_initial_conditions(mut self, initial_conditions: InitialConditions) -> Self {
        self.initial_conditions = initial_conditions;
        self
    }

    pub fn with_dos(mut self, dos: DosConfig) -> Self {
        self.dos = Some(dos);
        self
    }

    pub fn with_phase_fields(mut self, phase_fields: Vec<PhaseField>) -> Self {
        self.phase_fields = phase_fields;
        self
    }

    pub fn with_phase_pairs(mut self, phase_pairs: Vec<PhasePair>) -> Self {
        self.phase_pairs = phase_pairs;
        self
    }
}

fn check_work_dir(label: &str, dir: &Path) -> PmResult<()> {
    let metadata = fs::metadata(dir)
        .map_err(|e| config_error!("{} work_dir {}: {}", label, dir.display(), e))?;
    if !metadata.is_dir() {
        return Err(config_error!("{} work_dir {} is not a directory", label, dir.display()));
    }
    if metadata.permissions().readonly() {
        return Err(config_error!("{} work_dir {} is read-only", label, dir.display()));
    }
    Ok(())
}
