//! Field names shared across the pipeline.

pub const FREE_ENERGY: &str = "FreeEnergy";
pub const B: &str = "B";
pub const BETA: &str = "Beta";
pub const JA: &str = "Ja";
pub const JC: &str = "Jc";
pub const M: &str = "M";
pub const W: &str = "W";
pub const MU: &str = "Mu";
