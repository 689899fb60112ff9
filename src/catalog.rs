//! Reference data handed to the pipeline: measurement types and thresholds.
//!
//! Loaded once at startup from a JSON document of the form
//! `{"measurement_types": [...], "thresholds": [...]}`.

use std::path::Path;

use serde::Deserialize;

use crate::error::CatalogError;
use crate::measurement::{MeasurementCatalog, MeasurementType};
use crate::threshold::{Threshold, ThresholdCatalog, ThresholdDefinition};

// ---

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    measurement_types: Vec<MeasurementType>,
    #[serde(default)]
    thresholds: Vec<ThresholdDefinition>,
}

/// Measurement-type and threshold catalogs.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub measurements: MeasurementCatalog,
    pub thresholds: ThresholdCatalog,
}

impl Catalog {
    /// Parse a catalog document. Any invalid threshold, or one naming a
    /// field its measurement type does not declare, rejects the whole
    /// document.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        // ---
        let doc: CatalogDocument = serde_json::from_str(json)?;

        let mut catalog = Catalog::default();
        for measurement_type in doc.measurement_types {
            let sensor_type_id = measurement_type.sensor_type_id;
            if catalog.measurements.insert(measurement_type).is_some() {
                return Err(CatalogError::DuplicateSensorType(sensor_type_id));
            }
        }
        // Thresholds name fields the way readings are stored: canonical and
        // with schema aliases resolved.
        for def in doc.thresholds {
            let mut threshold = Threshold::new(def)?;
            if let Some(schema) = catalog.measurements.by_id(threshold.measurement_type_id) {
                let Some(field) = schema.resolve(&threshold.field_name) else {
                    return Err(CatalogError::UnknownField {
                        threshold_id: threshold.id,
                        field: threshold.field_name,
                        measurement_type: schema.name.clone(),
                    });
                };
                threshold.field_name = field.name.clone();
            }
            catalog.thresholds.insert(threshold)?;
        }

        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        // ---
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_json(&json)?;

        tracing::info!(
            "Loaded catalog from {}: {} measurement type(s), {} threshold(s)",
            path.display(),
            catalog.measurements.len(),
            catalog.thresholds.len()
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::error::ThresholdError;
    use crate::models::AlertKey;
    use uuid::Uuid;

    const SENSOR: &str = "6f1c8e9a-8a53-4c53-9f43-3b0a2c1d0e01";
    const SENSOR_TYPE: &str = "0b7e2a10-52d4-4d5e-9c6b-1a2b3c4d5e6f";

    fn document(thresholds: &str) -> String {
        // ---
        format!(
            r#"{{
                "measurement_types": [{{
                    "id": "c3b0b1d2-0000-4000-8000-000000000001",
                    "sensor_type_id": "{SENSOR_TYPE}",
                    "name": "Water pH Measurement",
                    "fields": [
                        {{"name": "ph_value", "label": "pH", "data_type": "numeric",
                          "required": true, "unit": "pH", "min": 0, "max": 14,
                          "aliases": ["ph"]}}
                    ]
                }}],
                "thresholds": {thresholds}
            }}"#
        )
    }

    #[test]
    fn test_loads_measurement_types_and_thresholds() {
        // ---
        let json = document(&format!(
            r#"[{{
                "asset_id": "{SENSOR}",
                "asset_sensor_id": "{SENSOR}",
                "measurement_type_id": "c3b0b1d2-0000-4000-8000-000000000001",
                "field_name": "ph_value",
                "min_value": 6.0,
                "max_value": 8.5,
                "severity": "warning"
            }}]"#
        ));

        let catalog = Catalog::from_json(&json).unwrap();
        let sensor_type = Uuid::parse_str(SENSOR_TYPE).unwrap();
        let schema = catalog.measurements.for_sensor_type(sensor_type).unwrap();
        assert_eq!(schema.fields[0].aliases, vec!["ph".to_string()]);

        let key = AlertKey::new(Uuid::parse_str(SENSOR).unwrap(), "ph_value");
        let thresholds = catalog.thresholds.for_key(&key);
        assert_eq!(thresholds.len(), 1);
        assert!(thresholds[0].is_active);
    }

    fn ph_threshold(field: &str) -> String {
        // ---
        document(&format!(
            r#"[{{
                "asset_id": "{SENSOR}",
                "asset_sensor_id": "{SENSOR}",
                "measurement_type_id": "c3b0b1d2-0000-4000-8000-000000000001",
                "field_name": "{field}",
                "max_value": 8.5,
                "severity": "warning"
            }}]"#
        ))
    }

    #[test]
    fn test_threshold_on_alias_resolves_to_field() {
        // ---
        let key = AlertKey::new(Uuid::parse_str(SENSOR).unwrap(), "ph_value");
        for field in ["ph", "pH", "PH_Value"] {
            let catalog = Catalog::from_json(&ph_threshold(field)).unwrap();
            let thresholds = catalog.thresholds.for_key(&key);
            assert_eq!(thresholds.len(), 1, "field '{field}'");
            assert_eq!(thresholds[0].field_name, "ph_value");
        }
    }

    #[test]
    fn test_threshold_on_undeclared_field_rejects_document() {
        // ---
        let err = Catalog::from_json(&ph_threshold("chlorine")).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnknownField { ref field, .. } if field == "chlorine"
        ));
    }

    #[test]
    fn test_inverted_threshold_rejects_document() {
        // ---
        let json = document(&format!(
            r#"[{{
                "asset_id": "{SENSOR}",
                "asset_sensor_id": "{SENSOR}",
                "measurement_type_id": "c3b0b1d2-0000-4000-8000-000000000001",
                "field_name": "ph_value",
                "min_value": 9.0,
                "max_value": 8.5,
                "severity": "critical"
            }}]"#
        ));

        let err = Catalog::from_json(&json).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Threshold(ThresholdError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn test_empty_document_is_valid() {
        // ---
        let catalog = Catalog::from_json("{}").unwrap();
        assert!(catalog.measurements.is_empty());
        assert!(catalog.thresholds.is_empty());
    }

    #[test]
    fn test_missing_file_reports_path() {
        // ---
        let err = Catalog::load(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/catalog.json"));
    }
}
