//! Data model for the ingestion pipeline: raw input, typed values,
//! normalized readings and alerts.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseEnumError;

// ---

/// Declared wire format of an ingestion request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Json,
    Text,
    Csv,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Json => "json",
            DataSource::Text => "text",
            DataSource::Csv => "csv",
        }
    }
}

impl FromStr for DataSource {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(DataSource::Json),
            "text" => Ok(DataSource::Text),
            "csv" => Ok(DataSource::Csv),
            other => Err(ParseEnumError {
                kind: "data source",
                value: other.to_string(),
            }),
        }
    }
}

/// Which sensor produced a measurement and where it sits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorIdentity {
    // ---
    pub asset_sensor_id: Uuid,
    pub sensor_type_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
}

/// One ingestion call. Every key that is not part of the identity block,
/// `reading_time` or `data_source` is a measurement field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMeasurementInput {
    // ---
    #[serde(flatten)]
    pub identity: SensorIdentity,
    #[serde(default)]
    pub reading_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_source: DataSource,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Newline-delimited text payload plus the identity block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMeasurementInput {
    // ---
    #[serde(flatten)]
    pub identity: SensorIdentity,
    #[serde(default)]
    pub reading_time: Option<DateTime<Utc>>,
    #[serde(default = "default_text_source")]
    pub data_source: DataSource,
    pub payload: String,
}

fn default_text_source() -> DataSource {
    DataSource::Text
}

/// A classified measurement value; exactly one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Numeric(f64),
    Boolean(bool),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn data_type(&self) -> FieldDataType {
        match self {
            Scalar::Numeric(_) => FieldDataType::Numeric,
            Scalar::Text(_) => FieldDataType::Text,
            Scalar::Boolean(_) => FieldDataType::Boolean,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Numeric(v) => write!(f, "{v}"),
            Scalar::Text(s) => write!(f, "'{s}'"),
            Scalar::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Output of the value parser. `value == None` means "no value".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedValue {
    // ---
    pub value: Option<Scalar>,
    pub unit: Option<String>,
    pub label: Option<String>,
}

/// Declared data type of a measurement field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldDataType {
    Numeric,
    Text,
    Boolean,
}

impl FieldDataType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldDataType::Numeric => "numeric",
            FieldDataType::Text => "text",
            FieldDataType::Boolean => "boolean",
        }
    }
}

/// One normalized row per (asset sensor, field) per reading time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedReading {
    // ---
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub asset_sensor_id: Uuid,
    pub sensor_type_id: Uuid,
    pub mac_address: Option<String>,
    pub location_id: Option<Uuid>,
    pub location_name: Option<String>,
    /// Canonical field name.
    pub measurement_type: String,
    pub measurement_label: String,
    pub measurement_unit: Option<String>,
    pub value: Scalar,
    pub data_source: DataSource,
    pub original_field_name: String,
    pub reading_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NormalizedReading {
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.as_f64()
    }

    pub fn text_value(&self) -> Option<&str> {
        match &self.value {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn boolean_value(&self) -> Option<bool> {
        match self.value {
            Scalar::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn alert_key(&self) -> AlertKey {
        AlertKey::new(self.asset_sensor_id, &self.measurement_type)
    }
}

/// Breach severity declared on a threshold; `Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(ParseEnumError {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

/// Result of evaluating a reading; also the stored alert status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdStatus {
    Normal,
    Warning,
    Critical,
}

impl ThresholdStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdStatus::Normal => "normal",
            ThresholdStatus::Warning => "warning",
            ThresholdStatus::Critical => "critical",
        }
    }
}

impl From<Severity> for ThresholdStatus {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Warning => ThresholdStatus::Warning,
            Severity::Critical => ThresholdStatus::Critical,
        }
    }
}

impl FromStr for ThresholdStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(ThresholdStatus::Normal),
            "warning" => Ok(ThresholdStatus::Warning),
            "critical" => Ok(ThresholdStatus::Critical),
            other => Err(ParseEnumError {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    MinBreach,
    MaxBreach,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::MinBreach => "min_breach",
            AlertType::MaxBreach => "max_breach",
        }
    }
}

impl FromStr for AlertType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min_breach" => Ok(AlertType::MinBreach),
            "max_breach" => Ok(AlertType::MaxBreach),
            other => Err(ParseEnumError {
                kind: "alert type",
                value: other.to_string(),
            }),
        }
    }
}

/// Scope of the at-most-one-open-alert invariant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AlertKey {
    pub asset_sensor_id: Uuid,
    pub field_name: String,
}

impl AlertKey {
    pub fn new(asset_sensor_id: Uuid, field_name: &str) -> Self {
        Self {
            asset_sensor_id,
            field_name: field_name.to_string(),
        }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset_sensor_id, self.field_name)
    }
}

/// Persisted alert. Threshold bounds are a snapshot taken when the alert
/// was raised or escalated, not a live join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    // ---
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub asset_id: Uuid,
    pub asset_sensor_id: Uuid,
    pub threshold_id: Uuid,
    pub measurement_field_name: String,
    pub alert_time: DateTime<Utc>,
    pub resolved_time: Option<DateTime<Utc>>,
    pub severity: Severity,
    pub status: ThresholdStatus,
    pub trigger_value: f64,
    pub threshold_min_value: Option<f64>,
    pub threshold_max_value: Option<f64>,
    pub alert_message: String,
    pub alert_type: AlertType,
    pub is_resolved: bool,
    /// Reading time of the latest reading applied to this alert.
    pub last_reading_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.asset_sensor_id, &self.measurement_field_name)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_input_collects_extra_keys_as_fields() {
        // ---
        let asset_sensor_id = Uuid::new_v4();
        let sensor_type_id = Uuid::new_v4();
        let body = json!({
            "asset_sensor_id": asset_sensor_id,
            "sensor_type_id": sensor_type_id,
            "location_name": "Tank 3",
            "data_source": "json",
            "temperature": 21.5,
            "ph": {"value": "7.1", "unit": "pH"}
        });

        let input: RawMeasurementInput = serde_json::from_value(body).unwrap();

        assert_eq!(input.identity.asset_sensor_id, asset_sensor_id);
        assert_eq!(input.identity.location_name.as_deref(), Some("Tank 3"));
        assert_eq!(input.data_source, DataSource::Json);
        assert!(input.reading_time.is_none());
        assert_eq!(input.fields.len(), 2);
        assert!(input.fields.contains_key("temperature"));
        assert!(input.fields.contains_key("ph"));
        assert!(!input.fields.contains_key("location_name"));
    }

    #[test]
    fn test_text_input_defaults_to_text_source() {
        // ---
        let body = json!({
            "asset_sensor_id": Uuid::new_v4(),
            "sensor_type_id": Uuid::new_v4(),
            "payload": "ph: 7.0"
        });

        let input: TextMeasurementInput = serde_json::from_value(body).unwrap();
        assert_eq!(input.data_source, DataSource::Text);
    }

    #[test]
    fn test_severity_ordering() {
        // ---
        assert!(Severity::Critical > Severity::Warning);
        assert!(ThresholdStatus::Critical > ThresholdStatus::Warning);
        assert!(ThresholdStatus::Warning > ThresholdStatus::Normal);
        assert_eq!(
            ThresholdStatus::from(Severity::Critical),
            ThresholdStatus::Critical
        );
    }

    #[test]
    fn test_enum_text_round_trip_for_storage() {
        // ---
        assert_eq!("max_breach".parse::<AlertType>(), Ok(AlertType::MaxBreach));
        assert_eq!(AlertType::MinBreach.as_str(), "min_breach");
        assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
        assert!("severe".parse::<Severity>().is_err());
        assert_eq!("csv".parse::<DataSource>(), Ok(DataSource::Csv));
    }
}
