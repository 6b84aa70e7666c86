use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use pm_types::{DosPoint, EnvRecord, PmResult, StoreError};

/// The datasets kept for each sweep name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Selected minimum per grid point.
    Minima,
    /// Every attempted solve per grid point.
    Attempts,
    /// Density of states per grid point.
    Dos,
}

impl DatasetKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Minima => "_min_data",
            Self::Attempts => "_all_data",
            Self::Dos => "_dos_data",
        }
    }
}

/// Line-delimited JSON datasets under a root directory.
///
/// Each line is one grid point, in grid order. Absent values are written as
/// `null` and read back as `None`. Files are written once, through a
/// temporary name, so a dataset either exists in full or not at all.
#[derive(Debug, Clone)]
pub struct ResultStore {
    pub data_root: PathBuf,
}

impl ResultStore {
    pub fn new<P: AsRef<Path>>(data_root: P) -> PmResult<Self> {
        let data_root = data_root.as_ref().to_path_buf();
        fs::create_dir_all(&data_root)?;

        Ok(Self { data_root })
    }

    pub fn path(&self, name: &str, kind: DatasetKind) -> PathBuf {
        self.data_root.join(format!("{}{}", name, kind.suffix()))
    }

    pub fn exists(&self, name: &str, kind: DatasetKind) -> bool {
        self.path(name, kind).is_file()
    }

    pub fn has_minima(&self, name: &str) -> bool {
        self.exists(name, DatasetKind::Minima)
    }

    pub fn write_minima(&self, name: &str, minima: &[Option<EnvRecord>]) -> PmResult<()> {
        self.write_lines(&self.path(name, DatasetKind::Minima), minima)
    }

    pub fn read_minima(&self, name: &str) -> PmResult<Vec<Option<EnvRecord>>> {
        self.read_lines(&self.path(name, DatasetKind::Minima))
    }

    pub fn write_attempts(&self, name: &str, attempts: &[Vec<Option<EnvRecord>>]) -> PmResult<()> {
        self.write_lines(&self.path(name, DatasetKind::Attempts), attempts)
    }

    pub fn read_attempts(&self, name: &str) -> PmResult<Vec<Vec<Option<EnvRecord>>>> {
        self.read_lines(&self.path(name, DatasetKind::Attempts))
    }

    pub fn write_dos(&self, name: &str, points: &[Option<DosPoint>]) -> PmResult<()> {
        self.write_lines(&self.path(name, DatasetKind::Dos), points)
    }

    pub fn read_dos(&self, name: &str) -> PmResult<Vec<Option<DosPoint>>> {
        self.read_lines(&self.path(name, DatasetKind::Dos))
    }

    /// Sweep names with stored minima.
    pub fn list_datasets(&self) -> PmResult<Vec<String>> {
        let suffix = DatasetKind::Minima.suffix();
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.data_root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if let Some(name) = file_name.strip_suffix(suffix) {
                if !name.is_empty() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    fn write_lines<T: Serialize>(&self, path: &Path, items: &[T]) -> PmResult<()> {
        let mut partial = path.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);
        {
            let mut file = fs::File::create(&partial)?;
            for item in items {
                serde_json::to_writer(&mut file, item)?;
                file.write_all(b"\n")?;
            }
            file.sync_all()?;
        }
        fs::rename(&partial, path)?;

        info!("Wrote {} lines to {}", items.len(), path.display());
        Ok(())
    }

    fn read_lines<T: DeserializeOwned>(&self, path: &Path) -> PmResult<Vec<T>> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::MissingDataset {
                    path: path.to_path_buf(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };

        let mut items = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let item = serde_json::from_str(&line).map_err(|e| StoreError::Malformed {
                path: path.to_path_buf(),
                line: index + 1,
                message: e.to_string(),
            })?;
            items.push(item);
        }

        debug!("Read {} lines from {}", items.len(), path.display());
        Ok(items)
    }
}
