//! # pm-sweep
//!
//! Multi-start solving and parameter sweep orchestration for phasemap.
//!
//! Provides the external solver adapter, the multi-start free-energy
//! minimizer, the (B, T) grid sampler, and a bounded worker pool that fans
//! minimizations out across the grid while preserving submission order.

mod grid;
mod minimizer;
mod scheduler;
mod solver;
mod status;

pub use grid::{GridPoint, GridSpec, RatioRange};
pub use minimizer::{FieldRange, InitialConditions, MinimizationResult, MultiStartMinimizer};
pub use scheduler::{SweepOutcome, SweepScheduler};
pub use solver::{ProcessSolver, Solver, SolverConfig, SolverVariant, TransientFiles, RESULT_SUFFIX};
pub use status::{SweepState, SweepStatus};
