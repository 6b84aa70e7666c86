use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use pm_types::{DosCurve, EnvRecord, PmResult, SpectralError};

/// Load a single environment record from a JSON object file.
pub fn read_record_file<P: AsRef<Path>>(file_path: P) -> PmResult<EnvRecord> {
    let path = file_path.as_ref();
    let contents = fs::read_to_string(path)?;
    let record = EnvRecord::from_json_str(&contents)?;

    tracing::debug!("Loaded record with {} fields from {}", record.len(), path.display());
    Ok(record)
}

pub fn write_record_file<P: AsRef<Path>>(file_path: P, record: &EnvRecord) -> PmResult<()> {
    fs::write(file_path, record.to_json_string()?)?;
    Ok(())
}

/// Read a tab-separated DOS table.
///
/// The first line is a header; each following row is `energy<TAB>density`.
pub fn read_dos_table<P: AsRef<Path>>(file_path: P) -> PmResult<DosCurve> {
    let path = file_path.as_ref();

    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SpectralError::MissingOutput {
                path: path.to_path_buf(),
            }
            .into())
        }
        Err(e) => return Err(e.into()),
    };

    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(file);

    let mut energies = Vec::new();
    let mut dos = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        // Header is line 1.
        let line = row + 2;
        let record = result.map_err(|e| SpectralError::MalformedOutput {
            path: path.to_path_buf(),
            line,
            message: e.to_string(),
        })?;

        if record.len() < 2 {
            return Err(SpectralError::MalformedOutput {
                path: path.to_path_buf(),
                line,
                message: format!("expected 2 columns, found {}", record.len()),
            }
            .into());
        }

        energies.push(parse_column(path, line, "energy", &record[0])?);
        dos.push(parse_column(path, line, "density", &record[1])?);
    }

    let curve = DosCurve::new(dos, energies)?;
    tracing::info!("Loaded {} DOS samples from {}", curve.len(), path.display());
    Ok(curve)
}

fn parse_column(path: &Path, line: usize, column: &str, value: &str) -> Result<f64, SpectralError> {
    value
        .parse::<f64>()
        .map_err(|e| SpectralError::MalformedOutput {
            path: path.to_path_buf(),
            line,
            message: format!("Could not parse {} value '{}': {}", column, value, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_types::PmError;
    use tempfile::tempdir;

    #[test]
    fn record_file_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("base.json");

        let record = EnvRecord::new()
            .with("Ja", 0.25)
            .unwrap()
            .with("Jc", 0.5)
            .unwrap();
        write_record_file(&path, &record).unwrap();
        assert_eq!(read_record_file(&path).unwrap(), record);
    }

    #[test]
    fn record_file_must_be_object() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("list.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(read_record_file(&path).is_err());
    }

    #[test]
    fn reads_dos_table() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("dos.tsv");
        fs::write(&path, "E\tDOS\n-1.5\t0.25\n0\t0\n1.5\t0.75\n").unwrap();

        let curve = read_dos_table(&path).unwrap();
        assert_eq!(curve.energies(), &[-1.5, 0.0, 1.5]);
        assert_eq!(curve.dos(), &[0.25, 0.0, 0.75]);
    }

    #[test]
    fn missing_dos_table() {
        let temp_dir = tempdir().unwrap();
        match read_dos_table(temp_dir.path().join("absent.tsv")) {
            Err(PmError::Spectral(SpectralError::MissingOutput { .. })) => (),
            other => panic!("Expected MissingOutput error, got: {:?}", other),
        }
    }

    #[test]
    fn malformed_dos_row() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("dos.tsv");
        fs::write(&path, "E\tDOS\n0.0\t1.0\n0.5\tnan?\n").unwrap();

        match read_dos_table(&path) {
            Err(PmError::Spectral(SpectralError::MalformedOutput { line, .. })) => {
                assert_eq!(line, 3)
            }
            other => panic!("Expected MalformedOutput error, got: {:?}", other),
        }
    }

    #[test]
    fn unsorted_dos_energies() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("dos.tsv");
        fs::write(&path, "E\tDOS\n1.0\t1.0\n0.0\t1.0\n").unwrap();

        assert!(matches!(
            read_dos_table(&path),
            Err(PmError::Spectral(SpectralError::UnsortedEnergies { index: 1 }))
        ));
    }
}
