//! Band gaps from the electronic density of states.

pub mod dos;
pub mod gaps;
pub mod postprocess;

pub use dos::{DosConfig, DosSource, ProcessDos};
pub use gaps::{find_gaps, GapInterval, ZERO_DENSITY_EPS};
pub use postprocess::{GapAnalyzer, GapReport};
