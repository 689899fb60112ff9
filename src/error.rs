//! Error types for the ingestion pipeline.
//!
//! Library code returns these typed errors; the binary wraps them in
//! `anyhow` at the startup boundary.

use uuid::Uuid;

// ---

/// Rejected threshold definition. Raised at creation time so a
/// misconfigured threshold never reaches the evaluator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("threshold {id} on field '{field}' has neither a min nor a max bound")]
    NoBounds { id: Uuid, field: String },

    #[error("threshold {id} on field '{field}' has min {min} >= max {max}")]
    InvertedBounds {
        id: Uuid,
        field: String,
        min: f64,
        max: f64,
    },

    #[error("threshold {id} on field '{field}' has a non-finite bound")]
    NonFiniteBound { id: Uuid, field: String },

    #[error("threshold {id} has a blank field name")]
    BlankField { id: Uuid },
}

/// Failure loading the measurement-type / threshold catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid threshold in catalog: {0}")]
    Threshold(#[from] ThresholdError),

    #[error("duplicate measurement type for sensor type {0}")]
    DuplicateSensorType(Uuid),

    #[error("threshold {threshold_id} names field '{field}', which measurement type '{measurement_type}' does not declare")]
    UnknownField {
        threshold_id: Uuid,
        field: String,
        measurement_type: String,
    },
}

/// Persistence failure reported by a [`crate::store::Store`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Storage temporarily unreachable; the write may be retried.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A second open alert would exist for the same key.
    #[error("open alert already exists for asset sensor {asset_sensor_id} field '{field}'")]
    OpenAlertConflict { asset_sensor_id: Uuid, field: String },

    /// Update targeted an alert the store does not know.
    #[error("alert {0} not found")]
    AlertNotFound(Uuid),

    /// Constraint violation such as an unresolvable foreign key.
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    /// Whether a retry of the same write can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        // ---
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // ---
        match &e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::Constraint(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.is_check_violation() => {
                StoreError::Constraint(db.message().to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}

/// Hard failure of an ingestion batch. Field-level problems never surface
/// here; they are reported through [`crate::pipeline::IngestReport`].
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to persist batch for asset sensor {asset_sensor_id} after {attempts} attempt(s): {source}")]
    Persistence {
        asset_sensor_id: Uuid,
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    /// Identifier of the asset sensor whose batch was rejected.
    pub fn asset_sensor_id(&self) -> Uuid {
        match self {
            IngestError::Persistence {
                asset_sensor_id, ..
            } => *asset_sensor_id,
        }
    }
}

/// Unknown textual value for one of the model enums.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
