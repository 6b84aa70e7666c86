use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the phasemap system
#[derive(Error, Debug)]
pub enum PmError {
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Spectral error: {0}")]
    Spectral(#[from] SpectralError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PmError {
    /// Whether this error must abort the whole run rather than a single grid point.
    ///
    /// Only deployment problems qualify: an external executable that cannot be
    /// started, or a configuration that cannot be honoured.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PmError::Solver(SolverError::Unavailable { .. })
                | PmError::Spectral(SpectralError::DosUnavailable { .. })
                | PmError::Config(_)
        )
    }
}

/// Environment record errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Missing field: {field}")]
    MissingField { field: String },

    #[error("Field {field} is not numeric")]
    NonNumeric { field: String },

    #[error("Field {field} is not a scalar; records must be flat")]
    NotFlat { field: String },

    #[error("Cannot store non-finite value {value} in field {field}")]
    NonFinite { field: String, value: f64 },

    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Energy scale evaluated to {value}; cannot normalize by it")]
    DegenerateScale { value: f64 },
}

/// External solver errors
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Solver executable {program} could not be started: {message}")]
    Unavailable { program: String, message: String },

    #[error("Malformed solver result in {path}: {message}")]
    MalformedResult { path: PathBuf, message: String },

    #[error("Transient file {path} failed: {message}")]
    Transient { path: PathBuf, message: String },
}

/// Result store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Dataset not found: {path}")]
    MissingDataset { path: PathBuf },

    #[error("Malformed dataset {path} at line {line}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Density-of-states and gap errors
#[derive(Error, Debug)]
pub enum SpectralError {
    #[error("DOS executable {program} could not be started: {message}")]
    DosUnavailable { program: String, message: String },

    #[error("DOS output missing: {path}")]
    MissingOutput { path: PathBuf },

    #[error("Malformed DOS output {path} at line {line}: {message}")]
    MalformedOutput {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Density has {dos} samples but energy has {energies}")]
    LengthMismatch { dos: usize, energies: usize },

    #[error("Energies decrease at sample {index}")]
    UnsortedEnergies { index: usize },
}

/// Result type alias for phasemap operations
pub type PmResult<T> = Result<T, PmError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::PmError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::PmError::Config(format!($($arg)*))
    };
}
