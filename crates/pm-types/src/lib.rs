pub mod environment;
pub mod errors;
pub mod fields;
pub mod spectrum;

pub use environment::*;
pub use errors::*;
pub use spectrum::*;
