//! External solver adapter.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};
use uuid::Uuid;

use pm_types::{EnvRecord, PmResult, SolverError};

/// Suffix the solver appends to the output prefix when it writes a result.
pub const RESULT_SUFFIX: &str = "_fenv.json";

/// Solves one environment record for its self-consistent state.
pub trait Solver: Send + Sync {
    /// Returns `Ok(None)` when the solver ran but found no solution.
    fn solve(&self, record: &EnvRecord, tolerance: f64) -> PmResult<Option<EnvRecord>>;
}

impl<F> Solver for F
where
    F: Fn(&EnvRecord, f64) -> PmResult<Option<EnvRecord>> + Send + Sync,
{
    fn solve(&self, record: &EnvRecord, tolerance: f64) -> PmResult<Option<EnvRecord>> {
        self(record, tolerance)
    }
}

/// Which solver build to run. Each variant ships as its own executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverVariant {
    /// Single order parameter pair (M, W).
    Standard,
    /// Two ionic degrees of freedom per site.
    TwoDof,
}

impl Default for SolverVariant {
    fn default() -> Self {
        Self::Standard
    }
}

impl SolverVariant {
    fn package_dir(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::TwoDof => "twodof",
        }
    }

    pub fn extra_flags(&self) -> &'static [&'static str] {
        match self {
            Self::Standard => &[],
            Self::TwoDof => &["--twodof", "--body_indep"],
        }
    }

    /// Location of this variant's executable under an installation root.
    pub fn executable_in(&self, install_root: &Path) -> PathBuf {
        install_root
            .join(self.package_dir())
            .join("solve_front")
            .join("solve_front")
    }
}

/// How to invoke the external solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Executable to run.
    pub program: PathBuf,

    /// Arguments placed before the solver's own (e.g. when the executable is
    /// a wrapper or an interpreter).
    pub launch_args: Vec<String>,

    /// Solve only the ionic part of the system.
    pub ions_only: bool,

    pub variant: SolverVariant,

    /// When set, `program` is replaced by this variant's executable under
    /// the root.
    pub install_root: Option<PathBuf>,

    /// Directory for the per-call transient input/output files.
    pub work_dir: PathBuf,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("solve_front"),
            launch_args: Vec::new(),
            ions_only: false,
            variant: SolverVariant::Standard,
            install_root: None,
            work_dir: std::env::temp_dir(),
        }
    }
}

impl SolverConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Use the executable for `variant` found under `install_root`.
    pub fn from_install_root(install_root: &Path, variant: SolverVariant) -> Self {
        Self {
            program: variant.executable_in(install_root),
            variant,
            install_root: Some(install_root.to_path_buf()),
            ..Self::default()
        }
    }

    /// Executable that will actually run.
    pub fn resolved_program(&self) -> PathBuf {
        match &self.install_root {
            Some(root) => self.variant.executable_in(root),
            None => self.program.clone(),
        }
    }

    pub fn with_launch_args(mut self, args: Vec<String>) -> Self {
        self.launch_args = args;
        self
    }

    pub fn with_ions_only(mut self, ions_only: bool) -> Self {
        self.ions_only = ions_only;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Full argument list for one invocation.
    pub fn args(&self, tolerance: f64, input: &Path, out_prefix: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.launch_args.iter().map(OsString::from).collect();
        args.push("--eps".into());
        args.push(tolerance.to_string().into());
        if self.ions_only {
            args.push("--ions".into());
        }
        args.extend(self.variant.extra_flags().iter().map(OsString::from));
        args.push(input.into());
        args.push(out_prefix.into());
        args
    }
}

/// Uniquely named input and output paths for one solver call.
///
/// Both files are removed when this value is dropped, whichever way the call
/// ends.
#[derive(Debug)]
pub struct TransientFiles {
    pub input: PathBuf,
    pub out_prefix: PathBuf,
    pub result: PathBuf,
}

impl TransientFiles {
    pub fn new(work_dir: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            input: work_dir.join(format!("{id}_in.json")),
            out_prefix: work_dir.join(id.to_string()),
            result: work_dir.join(format!("{id}{RESULT_SUFFIX}")),
        }
    }
}

impl Drop for TransientFiles {
    fn drop(&mut self) {
        for path in [&self.input, &self.result] {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove transient file {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Runs the solver as a child process, exchanging records through files.
///
/// The exit code is ignored: the solver signals success only by writing
/// `<out_prefix>_fenv.json`.
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    config: SolverConfig,
}

impl ProcessSolver {
    pub fn new(mut config: SolverConfig) -> Self {
        config.program = config.resolved_program();
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

impl Solver for ProcessSolver {
    fn solve(&self, record: &EnvRecord, tolerance: f64) -> PmResult<Option<EnvRecord>> {
        let files = TransientFiles::new(&self.config.work_dir);

        let json = record.to_json_string()?;
        fs::write(&files.input, json).map_err(|e| SolverError::Transient {
            path: files.input.clone(),
            message: e.to_string(),
        })?;

        let args = self.config.args(tolerance, &files.input, &files.out_prefix);
        debug!("Invoking solver {} {:?}", self.config.program.display(), args);

        let output = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SolverError::Unavailable {
                program: self.config.program.display().to_string(),
                message: e.to_string(),
            })?;

        let contents = match fs::read_to_string(&files.result) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(
                    "Solver produced no result ({}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stdout).trim()
                );
                return Ok(None);
            }
            Err(e) => {
                return Err(SolverError::Transient {
                    path: files.result.clone(),
                    message: e.to_string(),
                }
                .into())
            }
        };

        let solved = EnvRecord::from_json_str(&contents).map_err(|e| SolverError::MalformedResult {
            path: files.result.clone(),
            message: e.to_string(),
        })?;

        Ok(Some(solved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_types::PmError;
    use tempfile::TempDir;

    /// Solver config that runs `script` under `sh -c`; the script sees the
    /// solver arguments as `$@`, with the input path (`$inp`) and output
    /// prefix (`$outp`) last.
    fn script_config(script: &str, work_dir: &Path) -> SolverConfig {
        let script = format!("for a in \"$@\"; do inp=$outp; outp=$a; done; {script}");
        SolverConfig::new("sh")
            .with_launch_args(vec!["-c".into(), script, "solve_front".into()])
            .with_work_dir(work_dir)
    }

    fn sample_record() -> EnvRecord {
        EnvRecord::from_json_str(r#"{"Ja": 0.25, "Jc": 0.5, "B": 0.1, "Beta": 10.0, "M": 0.1}"#)
            .unwrap()
    }

    fn dir_is_empty(dir: &Path) -> bool {
        fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn argument_order() {
        let config = SolverConfig::new("solve_front")
            .with_ions_only(true)
            .with_launch_args(vec!["-q".into()]);
        let args = config.args(1e-8, Path::new("in.json"), Path::new("out"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        assert_eq!(args, vec!["-q", "--eps", "0.00000001", "--ions", "in.json", "out"]);
    }

    #[test]
    fn variant_paths_and_flags() {
        let config = SolverConfig::from_install_root(Path::new("/opt/pm"), SolverVariant::TwoDof);
        assert_eq!(
            config.program,
            PathBuf::from("/opt/pm/twodof/solve_front/solve_front")
        );
        let args = config.args(1e-6, Path::new("i"), Path::new("o"));
        assert!(args.contains(&OsString::from("--twodof")));
        assert!(SolverVariant::Standard.extra_flags().is_empty());
    }

    #[test]
    fn install_root_selects_the_variant_executable() {
        let config: SolverConfig =
            serde_json::from_str(r#"{"install_root": "/opt/pm", "variant": "TwoDof"}"#).unwrap();
        assert_eq!(config.program, PathBuf::from("solve_front"));
        assert_eq!(
            config.resolved_program(),
            PathBuf::from("/opt/pm/twodof/solve_front/solve_front")
        );

        let solver = ProcessSolver::new(config);
        assert_eq!(
            solver.config().program,
            PathBuf::from("/opt/pm/twodof/solve_front/solve_front")
        );

        let plain = ProcessSolver::new(SolverConfig::new("sh"));
        assert_eq!(plain.config().program, PathBuf::from("sh"));
    }

    #[test]
    fn successful_solve_reads_result_and_cleans_up() {
        let work = TempDir::new().unwrap();
        let config = script_config(
            r#"sed 's/^{/{"FreeEnergy":-1.5,/' "$inp" > "${outp}_fenv.json""#,
            work.path(),
        );
        let solver = ProcessSolver::new(config);

        let solved = solver.solve(&sample_record(), 1e-6).unwrap().unwrap();
        assert_eq!(solved.free_energy().unwrap(), -1.5);
        assert_eq!(solved.get("B").unwrap(), 0.1);
        assert!(dir_is_empty(work.path()));
    }

    #[test]
    fn missing_result_is_no_solution_regardless_of_exit_code() {
        let work = TempDir::new().unwrap();

        let failing = ProcessSolver::new(script_config("exit 1", work.path()));
        assert!(failing.solve(&sample_record(), 1e-6).unwrap().is_none());

        let quiet = ProcessSolver::new(script_config("exit 0", work.path()));
        assert!(quiet.solve(&sample_record(), 1e-6).unwrap().is_none());

        assert!(dir_is_empty(work.path()));
    }

    #[test]
    fn malformed_result_is_an_error() {
        let work = TempDir::new().unwrap();
        let config = script_config(r#"echo 'not json' > "${outp}_fenv.json""#, work.path());
        let solver = ProcessSolver::new(config);

        match solver.solve(&sample_record(), 1e-6) {
            Err(PmError::Solver(SolverError::MalformedResult { .. })) => (),
            other => panic!("Expected MalformedResult, got: {:?}", other),
        }
        assert!(dir_is_empty(work.path()));
    }

    #[test]
    fn ions_flag_reaches_the_solver() {
        let work = TempDir::new().unwrap();
        let script = concat!(
            r#"case " $* " in *" --ions "*) ions=1;; *) ions=0;; esac; "#,
            r#"printf '{"ions":%s,"FreeEnergy":0.0}' "$ions" > "${outp}_fenv.json""#,
        );
        let solver = ProcessSolver::new(script_config(script, work.path()).with_ions_only(true));

        let solved = solver.solve(&sample_record(), 1e-6).unwrap().unwrap();
        assert_eq!(solved.get("ions").unwrap(), 1.0);
    }

    #[test]
    fn missing_executable_is_unavailable() {
        let work = TempDir::new().unwrap();
        let config =
            SolverConfig::new("/nonexistent/phasemap/solve_front").with_work_dir(work.path());
        let solver = ProcessSolver::new(config);

        let err = solver.solve(&sample_record(), 1e-6).unwrap_err();
        assert!(err.is_fatal());
        assert!(dir_is_empty(work.path()));
    }

    #[test]
    fn transient_names_are_unique() {
        let dir = Path::new("/tmp");
        let a = TransientFiles::new(dir);
        let b = TransientFiles::new(dir);
        assert_ne!(a.input, b.input);
        assert_ne!(a.result, b.result);
        assert_eq!(
            a.result,
            PathBuf::from(format!("{}{}", a.out_prefix.display(), RESULT_SUFFIX))
        );
    }
}
