//! Environment records: the flat numeric parameter maps that flow through the
//! pipeline, plus the energy scales derived from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use crate::errors::{PmResult, RecordError};
use crate::fields;

/// Field overrides merged onto a copy of a base record.
pub type Overrides = BTreeMap<String, f64>;

/// A flat mapping of field names to scalar values.
///
/// Fields the pipeline does not know about pass through untouched, so a
/// record read from disk and written back keeps everything the solver put in
/// it. Nested values are rejected at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct EnvRecord {
    fields: Map<String, Value>,
}

impl EnvRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single JSON object.
    pub fn from_json_str(json: &str) -> PmResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        match value {
            Value::Object(map) => Ok(Self::try_from(map)?),
            _ => Err(RecordError::NotAnObject.into()),
        }
    }

    pub fn to_json_string(&self) -> PmResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Numeric value of `field`; fails if it is absent or not a number.
    pub fn get(&self, field: &str) -> Result<f64, RecordError> {
        match self.fields.get(field) {
            None => Err(RecordError::MissingField {
                field: field.to_string(),
            }),
            Some(value) => value.as_f64().ok_or_else(|| RecordError::NonNumeric {
                field: field.to_string(),
            }),
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn set(&mut self, field: &str, value: f64) -> Result<(), RecordError> {
        let number = Number::from_f64(value).ok_or_else(|| RecordError::NonFinite {
            field: field.to_string(),
            value,
        })?;
        self.fields.insert(field.to_string(), Value::Number(number));
        Ok(())
    }

    /// Builder form of [`EnvRecord::set`].
    pub fn with(mut self, field: &str, value: f64) -> Result<Self, RecordError> {
        self.set(field, value)?;
        Ok(self)
    }

    /// A fresh record equal to `self` with every override applied.
    pub fn with_overrides(&self, overrides: &Overrides) -> Result<Self, RecordError> {
        let mut record = self.clone();
        for (field, value) in overrides {
            record.set(field, *value)?;
        }
        Ok(record)
    }

    pub fn free_energy(&self) -> Result<f64, RecordError> {
        self.get(fields::FREE_ENERGY)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<Map<String, Value>> for EnvRecord {
    type Error = RecordError;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        for (field, value) in &fields {
            match value {
                Value::Number(_) | Value::Bool(_) => {}
                _ => {
                    return Err(RecordError::NotFlat {
                        field: field.clone(),
                    })
                }
            }
        }
        Ok(Self { fields })
    }
}

impl From<EnvRecord> for Map<String, Value> {
    fn from(record: EnvRecord) -> Self {
        record.fields
    }
}

/// One weighted field in an [`EnergyScale`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleTerm {
    pub field: String,
    pub coefficient: f64,
}

/// Characteristic energy of a record, as a linear combination of its couplings.
///
/// Grid ratios and gap sizes are both expressed in units of this scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyScale {
    pub terms: Vec<ScaleTerm>,
}

impl EnergyScale {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    pub fn term(mut self, field: impl Into<String>, coefficient: f64) -> Self {
        self.terms.push(ScaleTerm {
            field: field.into(),
            coefficient,
        });
        self
    }

    /// Ionic exchange scale, `4 Ja + 2 Jc`.
    pub fn ionic_exchange() -> Self {
        Self::new().term(fields::JA, 4.0).term(fields::JC, 2.0)
    }

    /// Evaluate against `record`. A zero or non-finite result is an error
    /// since every caller divides by it.
    pub fn evaluate(&self, record: &EnvRecord) -> Result<f64, RecordError> {
        let mut total = 0.0;
        for term in &self.terms {
            total += term.coefficient * record.get(&term.field)?;
        }
        if total == 0.0 || !total.is_finite() {
            return Err(RecordError::DegenerateScale { value: total });
        }
        Ok(total)
    }
}

impl Default for EnergyScale {
    fn default() -> Self {
        Self::ionic_exchange()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> EnvRecord {
        EnvRecord::from_json_str(
            r#"{"Ja": 0.25, "Jc": 0.5, "B": 0.1, "Beta": 10.0,
                "BZPointsPerDim": 8, "IonsOnly": true}"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_flat_record() {
        let record = sample_record();
        assert_eq!(record.len(), 6);
        assert_eq!(record.get("Ja").unwrap(), 0.25);
        assert_eq!(record.get("BZPointsPerDim").unwrap(), 8.0);
    }

    #[test]
    fn missing_and_non_numeric_fields_fail() {
        let record = sample_record();
        assert_eq!(
            record.get("Mu"),
            Err(RecordError::MissingField {
                field: "Mu".to_string()
            })
        );
        assert_eq!(
            record.get("IonsOnly"),
            Err(RecordError::NonNumeric {
                field: "IonsOnly".to_string()
            })
        );
    }

    #[test]
    fn nested_values_are_rejected() {
        let result = EnvRecord::from_json_str(r#"{"Ja": 0.25, "extra": {"x": 1}}"#);
        assert!(result.is_err());

        let result = EnvRecord::from_json_str("[1, 2]");
        assert!(result.is_err());
    }

    #[test]
    fn overrides_produce_a_new_record() {
        let base = sample_record();
        let mut overrides = Overrides::new();
        overrides.insert("M".to_string(), 1.0);
        overrides.insert("B".to_string(), 0.3);

        let derived = base.with_overrides(&overrides).unwrap();
        assert_eq!(derived.get("M").unwrap(), 1.0);
        assert_eq!(derived.get("B").unwrap(), 0.3);
        assert_eq!(base.get("B").unwrap(), 0.1);
        assert!(!base.contains("M"));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut record = EnvRecord::new();
        assert!(record.set("Beta", f64::INFINITY).is_err());
        assert!(record.set("Beta", f64::NAN).is_err());
        assert!(record.is_empty());
    }

    #[test]
    fn unknown_fields_survive_serialization() {
        let record = sample_record();
        let json = record.to_json_string().unwrap();
        let back = EnvRecord::from_json_str(&json).unwrap();
        assert_eq!(record, back);
        assert!(json.contains("IonsOnly"));
    }

    #[test]
    fn energy_scale_evaluation() {
        let record = sample_record();
        let scale = EnergyScale::default();
        assert_eq!(scale.evaluate(&record).unwrap(), 2.0);

        let zero = EnvRecord::new()
            .with("Ja", 0.0)
            .unwrap()
            .with("Jc", 0.0)
            .unwrap();
        assert!(matches!(
            scale.evaluate(&zero),
            Err(RecordError::DegenerateScale { .. })
        ));
    }
}
