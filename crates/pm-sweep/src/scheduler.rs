//! Bounded worker pool that fans minimizations out across a grid.

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use pm_types::{config_error, EnvRecord, PmResult};

use crate::minimizer::{MinimizationResult, MultiStartMinimizer};
use crate::solver::Solver;
use crate::status::SweepStatus;

/// Per-point results of a sweep, index-aligned with the submitted records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub minima: Vec<Option<EnvRecord>>,
    pub attempts: Vec<Vec<Option<EnvRecord>>>,
    pub status: SweepStatus,
}

/// Runs work items on a fixed number of threads and returns results in
/// submission order, whatever order they complete in.
///
/// Workers share nothing mutable; each call owns its inputs and any external
/// process it starts.
#[derive(Debug)]
pub struct SweepScheduler {
    pool: ThreadPool,
    pool_size: usize,
}

impl SweepScheduler {
    /// A pool of `pool_size` workers, or one per available hardware thread.
    pub fn new(pool_size: Option<usize>) -> PmResult<Self> {
        let pool_size = match pool_size {
            Some(0) => return Err(config_error!("pool size must be at least 1")),
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size)
            .thread_name(|i| format!("sweep-worker-{i}"))
            .build()
            .map_err(|e| config_error!("failed to build worker pool: {}", e))?;

        Ok(Self { pool, pool_size })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Apply `f` to every item on the pool; the i-th output belongs to the
    /// i-th input. Stops handing out items once any call returns an error.
    /// Calls already running finish first.
    pub fn try_map_ordered<T, R, F>(&self, items: &[T], f: F) -> PmResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> PmResult<R> + Sync + Send,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| f(index, item))
                .collect()
        })
    }

    /// Minimize every record.
    ///
    /// A point that fails is logged and stored as absent; siblings are
    /// unaffected. Only fatal errors (an unavailable solver) abort the sweep.
    pub fn run<S: Solver>(
        &self,
        minimizer: &MultiStartMinimizer<S>,
        records: &[EnvRecord],
    ) -> PmResult<SweepOutcome> {
        let mut status = SweepStatus::new(records.len());
        status.mark_running();
        info!(
            "Starting sweep {} over {} points with {} workers",
            status.id,
            records.len(),
            self.pool_size
        );

        let results = self.try_map_ordered(records, |_, record| {
            match minimizer.minimize(record) {
                Err(e) if e.is_fatal() => Err(e),
                other => Ok(other),
            }
        });
        let results = match results {
            Ok(results) => results,
            Err(e) => {
                error!("Sweep {} aborted: {}", status.id, e);
                status.mark_failed(e.to_string());
                return Err(e);
            }
        };

        let mut minima = Vec::with_capacity(results.len());
        let mut attempts = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            let result = match result {
                Ok(result) => {
                    status.record(&result);
                    result
                }
                Err(e) => {
                    error!("Grid point {} failed: {}", index, e);
                    status.record_failure();
                    MinimizationResult::failed(minimizer.candidate_count())
                }
            };
            minima.push(result.selected);
            attempts.push(result.attempts);
        }

        status.mark_completed();
        info!(
            "Sweep {} finished: {} solved, {} without solution, {} failed",
            status.id, status.points_solved, status.points_absent, status.points_failed
        );

        Ok(SweepOutcome {
            minima,
            attempts,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimizer::InitialConditions;
    use crate::status::SweepState;
    use pm_types::{Overrides, SolverError};
    use rand::Rng;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn indexed_records(count: usize) -> Vec<EnvRecord> {
        (0..count)
            .map(|i| EnvRecord::new().with("B", i as f64).unwrap())
            .collect()
    }

    fn single_start() -> InitialConditions {
        InitialConditions::new(vec![Overrides::from([("M".to_string(), 0.5)])])
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        assert!(SweepScheduler::new(Some(0)).is_err());
        assert_eq!(SweepScheduler::new(Some(3)).unwrap().pool_size(), 3);
        assert!(SweepScheduler::new(None).unwrap().pool_size() >= 1);
    }

    #[test]
    fn results_follow_submission_order() {
        let solver = |record: &EnvRecord, _tolerance: f64| -> PmResult<Option<EnvRecord>> {
            let delay = rand::rng().random_range(0..20);
            std::thread::sleep(Duration::from_millis(delay));
            let b = record.get("B")?;
            Ok(Some(record.clone().with("FreeEnergy", -b)?))
        };
        let minimizer = MultiStartMinimizer::new(solver, single_start());
        let scheduler = SweepScheduler::new(Some(3)).unwrap();
        let records = indexed_records(10);

        let outcome = scheduler.run(&minimizer, &records).unwrap();
        assert_eq!(outcome.minima.len(), 10);
        for (i, minimum) in outcome.minima.iter().enumerate() {
            let minimum = minimum.as_ref().unwrap();
            assert_eq!(minimum.get("B").unwrap(), i as f64);
            assert_eq!(minimum.free_energy().unwrap(), -(i as f64));
        }
        assert_eq!(outcome.status.state, SweepState::Completed);
        assert_eq!(outcome.status.points_solved, 10);
    }

    #[test]
    fn map_uses_at_most_pool_size_workers() {
        let scheduler = SweepScheduler::new(Some(2)).unwrap();
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<usize> = (0..12).collect();

        let out = scheduler
            .try_map_ordered(&items, |index, item| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(index * 100 + item)
            })
            .unwrap();

        assert_eq!(out, (0..12).map(|i| i * 101).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn failing_point_does_not_affect_siblings() {
        let solver = |record: &EnvRecord, _tolerance: f64| -> PmResult<Option<EnvRecord>> {
            match record.get("B")? as usize {
                2 => Err(SolverError::MalformedResult {
                    path: PathBuf::from("bad_fenv.json"),
                    message: "expected value at line 1 column 1".to_string(),
                }
                .into()),
                5 => Ok(None),
                _ => Ok(Some(record.clone().with("FreeEnergy", 1.0)?)),
            }
        };
        let minimizer = MultiStartMinimizer::new(solver, single_start());
        let scheduler = SweepScheduler::new(Some(3)).unwrap();

        let outcome = scheduler.run(&minimizer, &indexed_records(8)).unwrap();
        assert!(outcome.minima[2].is_none());
        assert!(outcome.minima[5].is_none());
        assert_eq!(outcome.minima.iter().filter(|m| m.is_some()).count(), 6);
        assert_eq!(outcome.attempts[2], vec![None]);
        assert_eq!(outcome.status.points_failed, 1);
        assert_eq!(outcome.status.points_absent, 1);
        assert_eq!(outcome.status.points_solved, 6);
    }

    #[test]
    fn unavailable_solver_aborts_the_sweep() {
        let solver = |_record: &EnvRecord, _tolerance: f64| -> PmResult<Option<EnvRecord>> {
            Err(SolverError::Unavailable {
                program: "solve_front".to_string(),
                message: "No such file or directory".to_string(),
            }
            .into())
        };
        let minimizer = MultiStartMinimizer::new(solver, single_start());
        let scheduler = SweepScheduler::new(Some(2)).unwrap();

        let err = scheduler.run(&minimizer, &indexed_records(4)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn fatal_error_stops_remaining_points() {
        let calls = AtomicUsize::new(0);
        let solver = |record: &EnvRecord, _tolerance: f64| -> PmResult<Option<EnvRecord>> {
            calls.fetch_add(1, Ordering::SeqCst);
            if record.get("B")? == 0.0 {
                return Err(SolverError::Unavailable {
                    program: "solve_front".to_string(),
                    message: "No such file or directory".to_string(),
                }
                .into());
            }
            std::thread::sleep(Duration::from_millis(5));
            Ok(None)
        };
        let minimizer = MultiStartMinimizer::new(solver, single_start());
        let scheduler = SweepScheduler::new(Some(2)).unwrap();
        let records = indexed_records(200);

        assert!(scheduler.run(&minimizer, &records).unwrap_err().is_fatal());
        assert!(calls.load(Ordering::SeqCst) < records.len());
    }

    #[test]
    fn try_map_ordered_keeps_order_or_returns_the_error() {
        let scheduler = SweepScheduler::new(Some(2)).unwrap();
        let items: Vec<usize> = (0..6).collect();

        let out = scheduler.try_map_ordered(&items, |_, item| Ok(item * 2)).unwrap();
        assert_eq!(out, vec![0, 2, 4, 6, 8, 10]);

        let err = scheduler
            .try_map_ordered(&items, |index, item| {
                if index == 3 {
                    Err(config_error!("bad item {}", item))
                } else {
                    Ok(*item)
                }
            })
            .unwrap_err();
        assert!(err.to_string().contains("bad item 3"));
    }

    #[test]
    fn empty_grid() {
        let solver =
            |_record: &EnvRecord, _tolerance: f64| -> PmResult<Option<EnvRecord>> { Ok(None) };
        let minimizer = MultiStartMinimizer::new(solver, single_start());
        let scheduler = SweepScheduler::new(Some(2)).unwrap();

        let outcome = scheduler.run(&minimizer, &[]).unwrap();
        assert!(outcome.minima.is_empty());
        assert!(outcome.attempts.is_empty());
    }
}
