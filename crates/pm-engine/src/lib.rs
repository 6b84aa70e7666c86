//! Phase-diagram pipeline: sweep (or resume), gap stage, dataset writes.

pub mod aggregate;
pub mod config;

use std::fs;

use pm_data::{read_record_file, DatasetKind, ResultStore};
use pm_spectral::{DosSource, GapAnalyzer, ProcessDos};
use pm_sweep::{MultiStartMinimizer, ProcessSolver, Solver, SweepScheduler, SweepStatus};
use pm_types::{DosPoint, EnvRecord, PmError, PmResult};
use tracing::{error, info};

pub use aggregate::{
    collect_field, collect_pair, write_phase_table, PhasePoint, StructuralPhase, ValueTransform,
};
pub use config::{EngineConfig, PhaseField, PhasePair};

/// Everything a run produced or loaded.
#[derive(Debug, Clone)]
pub struct PhaseDiagram {
    /// Selected minimum per grid point.
    pub minima: Vec<Option<EnvRecord>>,
    /// Density of states and gap per grid point, when the gap stage ran.
    pub dos: Option<Vec<Option<DosPoint>>>,
    /// Status of the sweep, or `None` when the minima were loaded.
    pub sweep: Option<SweepStatus>,
}

impl PhaseDiagram {
    pub fn resumed(&self) -> bool {
        self.sweep.is_none()
    }

    /// Normalized first-gap size per grid point.
    pub fn gap_sizes(&self) -> Option<Vec<Option<f64>>> {
        self.dos
            .as_ref()
            .map(|points| points.iter().map(|p| p.as_ref().map(|p| p.gap)).collect())
    }
}

/// Drives one phase-diagram run.
pub struct PhaseDiagramEngine<S, D> {
    config: EngineConfig,
    minimizer: MultiStartMinimizer<S>,
    analyzer: Option<GapAnalyzer<D>>,
    scheduler: SweepScheduler,
    store: ResultStore,
}

impl PhaseDiagramEngine<ProcessSolver, ProcessDos> {
    /// Engine running the external solver and DOS integrator named in `config`.
    ///
    /// A solver `install_root` selects the variant's executable under it.
    pub fn from_config(config: EngineConfig) -> PmResult<Self> {
        let solver = ProcessSolver::new(config.solver.clone());
        let dos = config.dos.clone().map(ProcessDos::new);
        Self::new(config, solver, dos)
    }
}

impl<S: Solver, D: DosSource> PhaseDiagramEngine<S, D> {
    pub fn new(config: EngineConfig, solver: S, dos: Option<D>) -> PmResult<Self> {
        config.validate()?;

        let minimizer = MultiStartMinimizer::new(solver, config.initial_conditions.clone())
            .with_tolerance(config.tolerance);

        let analyzer = dos.map(|source| {
            let sampling = config.dos.clone().unwrap_or_default();
            GapAnalyzer::new(source, sampling.num_dos, sampling.k_density)
                .with_scale(config.grid.scale.clone())
        });

        let scheduler = SweepScheduler::new(config.pool_size)?;
        let store = ResultStore::new(&config.out_dir)?;

        info!(
            "Engine ready: dataset '{}' in {}, {} workers",
            config.name,
            config.out_dir.display(),
            scheduler.pool_size()
        );

        Ok(Self {
            config,
            minimizer,
            analyzer,
            scheduler,
            store,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn minimizer(&self) -> &MultiStartMinimizer<S> {
        &self.minimizer
    }

    /// Load the base record and run every stage.
    pub fn run(&self) -> PmResult<PhaseDiagram> {
        let base = read_record_file(&self.config.base_record_path)?;
        self.run_with_base(&base)
    }

    pub fn run_with_base(&self, base: &EnvRecord) -> PmResult<PhaseDiagram> {
        let (minima, sweep) = self.minima(base)?;
        let dos = match &self.analyzer {
            Some(analyzer) => Some(self.gaps(analyzer, &minima, sweep.is_none())?),
            None => None,
        };
        self.write_phase_tables(&minima)?;

        Ok(PhaseDiagram { minima, dos, sweep })
    }

    /// Stored minima when resuming and they exist; otherwise sweep the grid
    /// and store the result.
    fn minima(
        &self,
        base: &EnvRecord,
    ) -> PmResult<(Vec<Option<EnvRecord>>, Option<SweepStatus>)> {
        let name = &self.config.name;

        if self.config.resume {
            if self.store.has_minima(name) {
                let minima = self.store.read_minima(name)?;
                info!("Resuming '{}' from {} stored points", name, minima.len());
                return Ok((minima, None));
            }
            info!("No stored minima for '{}'; running the sweep", name);
        }

        let records = self
            .config
            .grid
            .sample(base, self.config.num_bs, self.config.num_ts)?;
        let outcome = self.scheduler.run(&self.minimizer, &records)?;

        self.store.write_minima(name, &outcome.minima)?;
        self.store.write_attempts(name, &outcome.attempts)?;

        Ok((outcome.minima, Some(outcome.status)))
    }

    /// Gap stage over every present minimum.
    ///
    /// A point whose DOS cannot be obtained is stored as `null`; only fatal
    /// errors stop the stage.
    fn gaps(
        &self,
        analyzer: &GapAnalyzer<D>,
        minima: &[Option<EnvRecord>],
        resumed: bool,
    ) -> PmResult<Vec<Option<DosPoint>>> {
        let name = &self.config.name;

        if resumed && self.store.exists(name, DatasetKind::Dos) {
            let points = self.store.read_dos(name)?;
            if points.len() == minima.len() {
                info!("Loaded stored DOS for '{}'", name);
                return Ok(points);
            }
            info!(
                "Stored DOS for '{}' has {} points, expected {}; recomputing",
                name,
                points.len(),
                minima.len()
            );
        }

        let grid = &self.config.grid;
        let points = self.scheduler.try_map_ordered(minima, |index, minimum| {
            let Some(record) = minimum else {
                return Ok(None);
            };
            let located = grid
                .locate(record)
                .map_err(PmError::from)
                .and_then(|point| Ok((point, analyzer.analyze(record)?)));
            match located {
                Ok((point, report)) => Ok(Some(report.into_point(point.b_ratio, point.t_ratio))),
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    error!("DOS failed at grid point {}: {}", index, e);
                    Ok(None)
                }
            }
        })?;

        self.store.write_dos(name, &points)?;
        Ok(points)
    }

    fn write_phase_tables(&self, minima: &[Option<EnvRecord>]) -> PmResult<()> {
        if self.config.phase_fields.is_empty() && self.config.phase_pairs.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.config.out_dir)?;

        for phase_field in &self.config.phase_fields {
            let points = match collect_field(
                minima,
                &self.config.grid,
                &phase_field.field,
                phase_field.transform,
            ) {
                Ok(points) => points,
                Err(e) => {
                    error!("Skipping table for {}: {}", phase_field.field, e);
                    continue;
                }
            };
            let path = self
                .config
                .out_dir
                .join(format!("{}_{}.tsv", self.config.name, phase_field.field));
            write_phase_table(path, &points)?;
        }

        for pair in &self.config.phase_pairs {
            let points = match collect_pair(minima, &self.config.grid, pair) {
                Ok(points) => points,
                Err(e) => {
                    error!("Skipping phase table for {}/{}: {}", pair.first, pair.second, e);
                    continue;
                }
            };
            let path = self.config.out_dir.join(pair.table_name(&self.config.name));
            write_phase_table(path, &points)?;
        }
        Ok(())
    }
}
