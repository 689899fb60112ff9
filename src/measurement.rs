//! Measurement-type schema: the fields a class of sensor reports and the
//! advisory validation of normalized readings against them.
//!
//! Capability ranges declared here are sanity bounds for what a sensor can
//! physically report. They are unrelated to alerting thresholds.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FieldDataType, NormalizedReading};

// ---

/// One expected field of a measurement type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementFieldSchema {
    // ---
    pub name: String,
    pub label: String,
    pub data_type: FieldDataType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Alternative raw keys that resolve to this field, e.g. `ph` for
    /// `ph_value`.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Schema describing the readings produced by one sensor type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementType {
    // ---
    pub id: Uuid,
    pub sensor_type_id: Uuid,
    pub name: String,
    pub fields: Vec<MeasurementFieldSchema>,
}

/// Outcome of [`MeasurementType::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Ordered by schema field declaration.
    pub violations: Vec<String>,
}

impl MeasurementType {
    /// Field declared under `name`.
    pub fn field(&self, name: &str) -> Option<&MeasurementFieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve a canonical key (already lower-cased) to a declared field,
    /// by name first and then by alias.
    pub fn resolve(&self, key: &str) -> Option<&MeasurementFieldSchema> {
        // ---
        self.field(key).or_else(|| {
            self.fields
                .iter()
                .find(|f| f.aliases.iter().any(|a| canonical_key(a) == key))
        })
    }

    /// Check a batch of readings against this schema. All violations are
    /// collected; nothing short-circuits.
    pub fn validate(&self, readings: &[NormalizedReading]) -> ValidationReport {
        // ---
        let by_field: HashMap<&str, &NormalizedReading> = readings
            .iter()
            .map(|r| (r.measurement_type.as_str(), r))
            .collect();

        let mut violations = Vec::new();

        for field in &self.fields {
            let Some(reading) = by_field.get(field.name.as_str()) else {
                if field.required {
                    violations.push(format!(
                        "{}: required field is missing",
                        field.name
                    ));
                }
                continue;
            };

            let observed = reading.value.data_type();
            if observed != field.data_type {
                violations.push(format!(
                    "{}: expected {} value, got {} {}",
                    field.name,
                    field.data_type.as_str(),
                    observed.as_str(),
                    reading.value
                ));
                continue;
            }

            let Some(value) = reading.numeric_value() else {
                continue;
            };

            if let Some(min) = field.min {
                if value < min {
                    violations.push(format!(
                        "{}: value {} is below capability minimum {}",
                        field.name, value, min
                    ));
                }
            }
            if let Some(max) = field.max {
                if value > max {
                    violations.push(format!(
                        "{}: value {} is above capability maximum {}",
                        field.name, value, max
                    ));
                }
            }

            if let (Some(expected), Some(reported)) = (&field.unit, &reading.measurement_unit) {
                if expected != reported {
                    violations.push(format!(
                        "{}: unit '{}' does not match declared unit '{}'",
                        field.name, reported, expected
                    ));
                }
            }
        }

        ValidationReport {
            valid: violations.is_empty(),
            violations,
        }
    }
}

/// Measurement types indexed by the sensor type that produces them.
#[derive(Debug, Clone, Default)]
pub struct MeasurementCatalog {
    by_sensor_type: HashMap<Uuid, MeasurementType>,
}

impl MeasurementCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a measurement type. Returns the one it replaced, if any.
    pub fn insert(&mut self, measurement_type: MeasurementType) -> Option<MeasurementType> {
        self.by_sensor_type
            .insert(measurement_type.sensor_type_id, measurement_type)
    }

    pub fn for_sensor_type(&self, sensor_type_id: Uuid) -> Option<&MeasurementType> {
        self.by_sensor_type.get(&sensor_type_id)
    }

    pub fn by_id(&self, id: Uuid) -> Option<&MeasurementType> {
        self.by_sensor_type.values().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.by_sensor_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sensor_type.is_empty()
    }
}

/// Canonical form of a raw field key: trimmed, lower-case, with whitespace
/// and dashes folded into single underscores.
pub fn canonical_key(raw: &str) -> String {
    // ---
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_whitespace() || c == '-' {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}
