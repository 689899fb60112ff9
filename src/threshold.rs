//! Threshold definitions and evaluation of numeric readings against them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ThresholdError;
use crate::measurement::canonical_key;
use crate::models::{AlertKey, AlertType, NormalizedReading, Severity, ThresholdStatus};

// ---

/// Operator-supplied threshold as it arrives from configuration, before
/// validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdDefinition {
    // ---
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub asset_id: Uuid,
    pub asset_sensor_id: Uuid,
    pub measurement_type_id: Uuid,
    pub field_name: String,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    pub severity: Severity,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Min/max bound on one (asset sensor, measurement type, field) triple.
///
/// Construct through [`Threshold::new`] (or deserialize, which goes through
/// it) so that at least one bound is set and `min < max` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ThresholdDefinition")]
pub struct Threshold {
    // ---
    pub id: Uuid,
    pub asset_id: Uuid,
    pub asset_sensor_id: Uuid,
    pub measurement_type_id: Uuid,
    pub field_name: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub severity: Severity,
    pub is_active: bool,
}

impl TryFrom<ThresholdDefinition> for Threshold {
    type Error = ThresholdError;

    fn try_from(def: ThresholdDefinition) -> Result<Self, Self::Error> {
        Threshold::new(def)
    }
}

/// Which bound a reading crossed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breach {
    pub alert_type: AlertType,
    pub bound: f64,
}

/// Result of checking one reading against one threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<'a> {
    pub threshold: &'a Threshold,
    pub value: f64,
    pub status: ThresholdStatus,
    pub breach: Option<Breach>,
}

impl Threshold {
    pub fn new(def: ThresholdDefinition) -> Result<Self, ThresholdError> {
        // ---
        let threshold = Threshold {
            id: def.id,
            asset_id: def.asset_id,
            asset_sensor_id: def.asset_sensor_id,
            measurement_type_id: def.measurement_type_id,
            field_name: canonical_key(&def.field_name),
            min_value: def.min_value,
            max_value: def.max_value,
            severity: def.severity,
            is_active: def.is_active,
        };
        threshold.validate()?;
        Ok(threshold)
    }

    /// Creation-time invariants.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        // ---
        if self.field_name.is_empty() {
            return Err(ThresholdError::BlankField { id: self.id });
        }

        let bounds = [self.min_value, self.max_value];
        if bounds.iter().flatten().any(|b| !b.is_finite()) {
            return Err(ThresholdError::NonFiniteBound {
                id: self.id,
                field: self.field_name.clone(),
            });
        }

        match (self.min_value, self.max_value) {
            (None, None) => Err(ThresholdError::NoBounds {
                id: self.id,
                field: self.field_name.clone(),
            }),
            (Some(min), Some(max)) if min >= max => Err(ThresholdError::InvertedBounds {
                id: self.id,
                field: self.field_name.clone(),
                min,
                max,
            }),
            _ => Ok(()),
        }
    }

    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.asset_sensor_id, &self.field_name)
    }

    /// Active and scoped to the reading's asset sensor and field.
    pub fn applies_to(&self, reading: &NormalizedReading) -> bool {
        self.is_active
            && self.asset_sensor_id == reading.asset_sensor_id
            && self.field_name == reading.measurement_type
    }

    /// Bound crossed by `value`, if any. Bounds are inclusive.
    pub fn check(&self, value: f64) -> Option<Breach> {
        // ---
        match (self.min_value, self.max_value) {
            (Some(min), _) if value < min => Some(Breach {
                alert_type: AlertType::MinBreach,
                bound: min,
            }),
            (_, Some(max)) if value > max => Some(Breach {
                alert_type: AlertType::MaxBreach,
                bound: max,
            }),
            _ => None,
        }
    }

    /// `Normal` inside the bounds, the declared severity outside them.
    pub fn evaluate(&self, value: f64) -> ThresholdStatus {
        match self.check(value) {
            Some(_) => self.severity.into(),
            None => ThresholdStatus::Normal,
        }
    }
}

/// Evaluate a reading against every applicable threshold, one result per
/// threshold. Non-numeric readings yield nothing.
pub fn evaluate_each<'a>(
    reading: &NormalizedReading,
    thresholds: &'a [Threshold],
) -> Vec<Evaluation<'a>> {
    // ---
    let Some(value) = reading.numeric_value() else {
        return Vec::new();
    };

    thresholds
        .iter()
        .filter(|t| t.applies_to(reading))
        .map(|threshold| {
            let breach = threshold.check(value);
            let status = match breach {
                Some(_) => threshold.severity.into(),
                None => ThresholdStatus::Normal,
            };
            Evaluation {
                threshold,
                value,
                status,
                breach,
            }
        })
        .collect()
}

/// Overall status of a reading: the most severe result across applicable
/// thresholds, `Normal` when none apply.
pub fn evaluate(reading: &NormalizedReading, thresholds: &[Threshold]) -> ThresholdStatus {
    // ---
    evaluate_each(reading, thresholds)
        .into_iter()
        .map(|e| e.status)
        .max()
        .unwrap_or(ThresholdStatus::Normal)
}

/// Thresholds indexed by (asset sensor, field name).
#[derive(Debug, Clone, Default)]
pub struct ThresholdCatalog {
    by_key: HashMap<AlertKey, Vec<Threshold>>,
}

impl ThresholdCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a threshold, rejecting it if its bounds are misconfigured.
    pub fn insert(&mut self, threshold: Threshold) -> Result<(), ThresholdError> {
        // ---
        threshold.validate()?;
        self.by_key.entry(threshold.key()).or_default().push(threshold);
        Ok(())
    }

    /// All thresholds (active or not) for a key.
    pub fn for_key(&self, key: &AlertKey) -> &[Threshold] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{DataSource, Scalar};
    use chrono::Utc;

    fn definition(min: Option<f64>, max: Option<f64>, severity: Severity) -> ThresholdDefinition {
        // ---
        ThresholdDefinition {
            id: Uuid::new_v4(),
            asset_id: Uuid::nil(),
            asset_sensor_id: Uuid::nil(),
            measurement_type_id: Uuid::nil(),
            field_name: "ph_value".into(),
            min_value: min,
            max_value: max,
            severity,
            is_active: true,
        }
    }

    fn threshold(min: Option<f64>, max: Option<f64>, severity: Severity) -> Threshold {
        Threshold::new(definition(min, max, severity)).unwrap()
    }

    fn reading(field: &str, value: Scalar) -> NormalizedReading {
        // ---
        NormalizedReading {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            asset_sensor_id: Uuid::nil(),
            sensor_type_id: Uuid::nil(),
            mac_address: None,
            location_id: None,
            location_name: None,
            measurement_type: field.into(),
            measurement_label: field.into(),
            measurement_unit: None,
            value,
            data_source: DataSource::Json,
            original_field_name: field.into(),
            reading_time: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_rejects_misconfigured_bounds() {
        // ---
        assert!(matches!(
            Threshold::new(definition(None, None, Severity::Warning)),
            Err(ThresholdError::NoBounds { .. })
        ));
        assert!(matches!(
            Threshold::new(definition(Some(8.5), Some(6.0), Severity::Warning)),
            Err(ThresholdError::InvertedBounds { .. })
        ));
        assert!(matches!(
            Threshold::new(definition(Some(5.0), Some(5.0), Severity::Warning)),
            Err(ThresholdError::InvertedBounds { .. })
        ));
        assert!(matches!(
            Threshold::new(definition(Some(f64::NAN), None, Severity::Warning)),
            Err(ThresholdError::NonFiniteBound { .. })
        ));
    }

    #[test]
    fn test_field_name_is_canonicalized() {
        // ---
        let mut def = definition(Some(6.0), None, Severity::Warning);
        def.field_name = "  Flow-Rate ".into();
        assert_eq!(Threshold::new(def).unwrap().field_name, "flow_rate");

        let mut def = definition(Some(6.0), None, Severity::Warning);
        def.field_name = "   ".into();
        assert!(matches!(
            Threshold::new(def),
            Err(ThresholdError::BlankField { .. })
        ));
    }

    #[test]
    fn test_deserialize_goes_through_validation() {
        // ---
        let body = serde_json::json!({
            "asset_id": Uuid::nil(),
            "asset_sensor_id": Uuid::nil(),
            "measurement_type_id": Uuid::nil(),
            "field_name": "ph_value",
            "min_value": 9.0,
            "max_value": 1.0,
            "severity": "warning"
        });
        assert!(serde_json::from_value::<Threshold>(body).is_err());
    }

    #[test]
    fn test_both_bounds_inclusive() {
        // ---
        let t = threshold(Some(6.0), Some(8.5), Severity::Warning);
        for v in [6.0, 7.2, 8.5] {
            assert_eq!(t.evaluate(v), ThresholdStatus::Normal, "value {v}");
        }
        assert_eq!(t.evaluate(5.99), ThresholdStatus::Warning);
        assert_eq!(t.evaluate(8.51), ThresholdStatus::Warning);
        assert_eq!(t.check(8.7).map(|b| b.alert_type), Some(AlertType::MaxBreach));
        assert_eq!(t.check(5.0).map(|b| b.alert_type), Some(AlertType::MinBreach));
    }

    #[test]
    fn test_single_bound() {
        // ---
        let min_only = threshold(Some(50.0), None, Severity::Critical);
        assert_eq!(min_only.evaluate(50.0), ThresholdStatus::Normal);
        assert_eq!(min_only.evaluate(1e9), ThresholdStatus::Normal);
        assert_eq!(min_only.evaluate(15.0), ThresholdStatus::Critical);
        assert_eq!(
            min_only.check(15.0),
            Some(Breach {
                alert_type: AlertType::MinBreach,
                bound: 50.0
            })
        );

        let max_only = threshold(None, Some(100.0), Severity::Warning);
        assert_eq!(max_only.evaluate(-1e9), ThresholdStatus::Normal);
        assert_eq!(max_only.evaluate(100.0), ThresholdStatus::Normal);
        assert_eq!(max_only.evaluate(100.5), ThresholdStatus::Warning);
    }

    #[test]
    fn test_unbounded_threshold_is_vacuously_normal() {
        // ---
        let mut t = threshold(Some(1.0), None, Severity::Critical);
        t.min_value = None;
        assert_eq!(t.evaluate(-500.0), ThresholdStatus::Normal);
    }

    #[test]
    fn test_evaluate_picks_most_severe_applicable() {
        // ---
        let thresholds = vec![
            threshold(Some(6.0), Some(8.5), Severity::Warning),
            threshold(Some(4.0), Some(10.0), Severity::Critical),
        ];

        assert_eq!(
            evaluate(&reading("ph_value", Scalar::Numeric(7.0)), &thresholds),
            ThresholdStatus::Normal
        );
        assert_eq!(
            evaluate(&reading("ph_value", Scalar::Numeric(9.0)), &thresholds),
            ThresholdStatus::Warning
        );
        assert_eq!(
            evaluate(&reading("ph_value", Scalar::Numeric(11.0)), &thresholds),
            ThresholdStatus::Critical
        );
    }

    #[test]
    fn test_no_matching_threshold_is_normal() {
        // ---
        let thresholds = vec![threshold(Some(6.0), Some(8.5), Severity::Critical)];

        assert_eq!(
            evaluate(&reading("turbidity", Scalar::Numeric(900.0)), &thresholds),
            ThresholdStatus::Normal
        );
        assert_eq!(
            evaluate(&reading("ph_value", Scalar::Text("n/a".into())), &thresholds),
            ThresholdStatus::Normal
        );

        let mut inactive = threshold(Some(6.0), Some(8.5), Severity::Critical);
        inactive.is_active = false;
        assert_eq!(
            evaluate(&reading("ph_value", Scalar::Numeric(20.0)), &[inactive]),
            ThresholdStatus::Normal
        );
    }

    #[test]
    fn test_catalog_indexes_by_key_and_rejects_invalid() {
        // ---
        let mut catalog = ThresholdCatalog::new();
        catalog
            .insert(threshold(Some(6.0), Some(8.5), Severity::Warning))
            .unwrap();

        let mut broken = threshold(Some(6.0), Some(8.5), Severity::Warning);
        broken.max_value = Some(1.0);
        assert!(catalog.insert(broken).is_err());

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.for_key(&AlertKey::new(Uuid::nil(), "ph_value")).len(), 1);
        assert!(catalog.for_key(&AlertKey::new(Uuid::nil(), "flow_rate")).is_empty());
    }
}
