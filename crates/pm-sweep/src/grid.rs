//! (B, T) grid sampling.

use serde::{Deserialize, Serialize};

use pm_types::{config_error, fields, EnergyScale, EnvRecord, PmError, PmResult, RecordError};

/// Linearly spaced ratio values between `start` and `stop`, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioRange {
    pub start: f64,
    pub stop: f64,
}

impl RatioRange {
    pub fn new(start: f64, stop: f64) -> Self {
        Self { start, stop }
    }

    /// `n` evenly spaced values. A single sample is the range start.
    pub fn linspace(&self, n: usize) -> Vec<f64> {
        match n {
            0 => Vec::new(),
            1 => vec![self.start],
            _ => {
                let step = (self.stop - self.start) / (n - 1) as f64;
                (0..n)
                    .map(|i| {
                        if i == n - 1 {
                            self.stop
                        } else {
                            self.start + i as f64 * step
                        }
                    })
                    .collect()
            }
        }
    }
}

/// A coordinate in the swept space, in units of the record's energy scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub b_ratio: f64,
    pub t_ratio: f64,
}

/// How grid points map onto record fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    pub b_ratio: RatioRange,
    pub t_ratio: RatioRange,

    /// Field receiving `b_ratio * scale`.
    pub b_field: String,

    /// Field receiving `1 / (t_ratio * scale)`.
    pub beta_field: String,

    /// Fields that keep their base-record proportion to `b_field`.
    pub companion_fields: Vec<String>,

    pub scale: EnergyScale,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            b_ratio: RatioRange::new(0.01, 1.2),
            t_ratio: RatioRange::new(0.01, 0.8),
            b_field: fields::B.to_string(),
            beta_field: fields::BETA.to_string(),
            companion_fields: Vec::new(),
            scale: EnergyScale::default(),
        }
    }
}

impl GridSpec {
    pub fn with_bounds(mut self, b_ratio: RatioRange, t_ratio: RatioRange) -> Self {
        self.b_ratio = b_ratio;
        self.t_ratio = t_ratio;
        self
    }

    pub fn with_b_field(mut self, field: impl Into<String>) -> Self {
        self.b_field = field.into();
        self
    }

    pub fn with_companion(mut self, field: impl Into<String>) -> Self {
        self.companion_fields.push(field.into());
        self
    }

    pub fn with_scale(mut self, scale: EnergyScale) -> Self {
        self.scale = scale;
        self
    }

    /// Cartesian product of the two ranges, B outer and T inner.
    pub fn points(&self, num_bs: usize, num_ts: usize) -> Vec<GridPoint> {
        let t_ratios = self.t_ratio.linspace(num_ts);
        let mut points = Vec::with_capacity(num_bs * num_ts);
        for b_ratio in self.b_ratio.linspace(num_bs) {
            for &t_ratio in &t_ratios {
                points.push(GridPoint { b_ratio, t_ratio });
            }
        }
        points
    }

    /// One derived record per grid point, in the order of [`GridSpec::points`].
    pub fn sample(
        &self,
        base: &EnvRecord,
        num_bs: usize,
        num_ts: usize,
    ) -> PmResult<Vec<EnvRecord>> {
        let scale = self.scale.evaluate(base)?;
        let companions = self.companion_ratios(base)?;

        self.points(num_bs, num_ts)
            .into_iter()
            .map(|point| {
                self.record_at(base, scale, &companions, point)
                    .map_err(PmError::from)
            })
            .collect()
    }

    fn companion_ratios(&self, base: &EnvRecord) -> PmResult<Vec<(String, f64)>> {
        if self.companion_fields.is_empty() {
            return Ok(Vec::new());
        }
        let b = base.get(&self.b_field)?;
        if b == 0.0 {
            return Err(config_error!(
                "companion fields need a nonzero {} in the base record",
                self.b_field
            ));
        }
        let mut ratios = Vec::with_capacity(self.companion_fields.len());
        for field in &self.companion_fields {
            ratios.push((field.clone(), base.get(field)? / b));
        }
        Ok(ratios)
    }

    fn record_at(
        &self,
        base: &EnvRecord,
        scale: f64,
        companions: &[(String, f64)],
        point: GridPoint,
    ) -> Result<EnvRecord, RecordError> {
        let b = point.b_ratio * scale;
        let temperature = point.t_ratio * scale;

        let mut record = base.clone();
        record.set(&self.b_field, b)?;
        record.set(&self.beta_field, 1.0 / temperature)?;
        for (field, ratio) in companions {
            record.set(field, ratio * b)?;
        }
        Ok(record)
    }

    /// Recover the grid coordinate of a record from its own fields.
    pub fn locate(&self, record: &EnvRecord) -> Result<GridPoint, RecordError> {
        let scale = self.scale.evaluate(record)?;
        let b = record.get(&self.b_field)?;
        let temperature = 1.0 / record.get(&self.beta_field)?;
        Ok(GridPoint {
            b_ratio: b / scale,
            t_ratio: temperature / scale,
        })
    }

    /// Physical (B, T) of a record.
    pub fn b_and_temperature(&self, record: &EnvRecord) -> Result<(f64, f64), RecordError> {
        let b = record.get(&self.b_field)?;
        let temperature = 1.0 / record.get(&self.beta_field)?;
        Ok((b, temperature))
    }
}
