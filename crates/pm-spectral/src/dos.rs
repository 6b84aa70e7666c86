//! External density-of-states integrator.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};
use uuid::Uuid;

use pm_data::read_dos_table;
use pm_types::{fields, DosCurve, EnvRecord, PmResult, SpectralError};

/// Computes the density of states of a solved record.
pub trait DosSource: Send + Sync {
    /// `num_dos` energy samples, integrated over `k_density` k-points per axis.
    fn density(&self, record: &EnvRecord, num_dos: usize, k_density: usize) -> PmResult<DosCurve>;
}

impl<F> DosSource for F
where
    F: Fn(&EnvRecord, usize, usize) -> PmResult<DosCurve> + Send + Sync,
{
    fn density(&self, record: &EnvRecord, num_dos: usize, k_density: usize) -> PmResult<DosCurve> {
        self(record, num_dos, k_density)
    }
}

/// How to invoke the DOS integrator and how finely to sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DosConfig {
    pub program: PathBuf,
    pub launch_args: Vec<String>,

    /// Record fields passed positionally after the sampling arguments.
    pub fields: Vec<String>,

    /// Number of energy samples.
    pub num_dos: usize,

    /// k-points per reciprocal lattice axis.
    pub k_density: usize,

    pub work_dir: PathBuf,
}

impl Default for DosConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("RunDos"),
            launch_args: Vec::new(),
            fields: [
                "Tae",
                "Tce",
                "Tbe",
                "Tao",
                "Tco",
                "Tbo",
                "EpsilonR",
                "EpsilonM",
                fields::M,
                fields::W,
                fields::MU,
            ]
            .iter()
            .map(|f| f.to_string())
            .collect(),
            num_dos: 500,
            k_density: 8,
            work_dir: std::env::temp_dir(),
        }
    }
}

impl DosConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn with_launch_args(mut self, args: Vec<String>) -> Self {
        self.launch_args = args;
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_sampling(mut self, num_dos: usize, k_density: usize) -> Self {
        self.num_dos = num_dos;
        self.k_density = k_density;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }
}

/// Runs the integrator as a child process and reads back its table.
#[derive(Debug, Clone)]
pub struct ProcessDos {
    config: DosConfig,
}

impl ProcessDos {
    pub fn new(config: DosConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DosConfig {
        &self.config
    }

    fn args(
        &self,
        record: &EnvRecord,
        out: &Path,
        num_dos: usize,
        k_density: usize,
    ) -> PmResult<Vec<OsString>> {
        let mut args: Vec<OsString> = self.config.launch_args.iter().map(OsString::from).collect();
        args.push(out.into());
        args.push(k_density.to_string().into());
        args.push(num_dos.to_string().into());
        for field in &self.config.fields {
            args.push(record.get(field)?.to_string().into());
        }
        Ok(args)
    }
}

impl DosSource for ProcessDos {
    fn density(&self, record: &EnvRecord, num_dos: usize, k_density: usize) -> PmResult<DosCurve> {
        let out = self.config.work_dir.join(format!("{}.dos", Uuid::new_v4()));
        let args = self.args(record, &out, num_dos, k_density)?;
        debug!("Invoking DOS integrator {} {:?}", self.config.program.display(), args);

        let status = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| SpectralError::DosUnavailable {
                program: self.config.program.display().to_string(),
                message: e.to_string(),
            })?;
        if !status.success() {
            debug!("DOS integrator exited with {}", status);
        }

        let curve = read_dos_table(&out);

        if let Err(e) = fs::remove_file(&out) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove DOS output {}: {}", out.display(), e);
            }
        }

        curve
    }
}
