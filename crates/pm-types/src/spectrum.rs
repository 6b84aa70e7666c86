use serde::{Deserialize, Serialize};

use crate::errors::SpectralError;

/// Density of states sampled at non-decreasing energies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosCurve {
    dos: Vec<f64>,
    energies: Vec<f64>,
}

impl DosCurve {
    pub fn new(dos: Vec<f64>, energies: Vec<f64>) -> Result<Self, SpectralError> {
        if dos.len() != energies.len() {
            return Err(SpectralError::LengthMismatch {
                dos: dos.len(),
                energies: energies.len(),
            });
        }
        if let Some(index) = energies.windows(2).position(|w| w[1] < w[0]) {
            return Err(SpectralError::UnsortedEnergies { index: index + 1 });
        }
        Ok(Self { dos, energies })
    }

    pub fn dos(&self) -> &[f64] {
        &self.dos
    }

    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    pub fn len(&self) -> usize {
        self.dos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dos.is_empty()
    }
}

/// One line of a `_dos_data` dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosPoint {
    #[serde(rename = "B")]
    pub b: f64,
    #[serde(rename = "T")]
    pub temperature: f64,
    pub dos: Vec<f64>,
    #[serde(rename = "E")]
    pub energies: Vec<f64>,
    /// First gap size in units of the record's energy scale.
    pub gap: f64,
}
