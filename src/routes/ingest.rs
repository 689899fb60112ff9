//! Ingestion endpoints.
//!
//! - `POST /ingest` – JSON measurement input (identity block + fields)
//! - `POST /ingest/text` – identity block + newline-delimited `payload`
//!
//! Both answer `200` with a summary of the report (`ok` or `partial`). A
//! rejected batch answers `503` when storage was unavailable and `500`
//! otherwise, naming the asset sensor that failed.

use std::sync::Arc;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::alerts::AlertChange;
use crate::error::IngestError;
use crate::models::{RawMeasurementInput, TextMeasurementInput};
use crate::pipeline::{IngestReport, IngestStatus, Pipeline};
use crate::store::Store;

// ---

pub fn router<S: Store>() -> Router<Arc<Pipeline<S>>> {
    // ---
    Router::new()
        .route("/ingest", post(ingest_json::<S>))
        .route("/ingest/text", post(ingest_text::<S>))
}

/// Response body for a persisted batch.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    /// `ok` or `partial`.
    pub status: String,
    pub readings: usize,
    pub dropped_fields: Vec<String>,
    pub violations: Vec<String>,
    pub alerts: Vec<AlertSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertSummary {
    pub change: String,
    pub alert_id: Uuid,
    pub field: String,
    pub status: String,
    pub alert_type: String,
    pub trigger_value: f64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    asset_sensor_id: Uuid,
}

async fn ingest_json<S: Store>(
    State(pipeline): State<Arc<Pipeline<S>>>,
    Json(input): Json<RawMeasurementInput>,
) -> impl IntoResponse {
    // ---
    debug!(
        "POST /ingest - asset sensor {} ({} field(s))",
        input.identity.asset_sensor_id,
        input.fields.len()
    );
    respond(pipeline.ingest(&input).await)
}

async fn ingest_text<S: Store>(
    State(pipeline): State<Arc<Pipeline<S>>>,
    Json(input): Json<TextMeasurementInput>,
) -> impl IntoResponse {
    // ---
    debug!(
        "POST /ingest/text - asset sensor {}",
        input.identity.asset_sensor_id
    );
    respond(pipeline.ingest_text(&input).await)
}

fn respond(result: Result<IngestReport, IngestError>) -> axum::response::Response {
    // ---
    match result {
        Ok(report) => (StatusCode::OK, Json(IngestResponse::from(report))).into_response(),
        Err(e) => {
            error!("Ingestion failed: {}", e);
            let IngestError::Persistence {
                asset_sensor_id,
                ref source,
                ..
            } = e;
            let status = if source.is_transient() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            let body = ErrorResponse {
                error: e.to_string(),
                asset_sensor_id,
            };
            (status, Json(body)).into_response()
        }
    }
}

impl From<IngestReport> for IngestResponse {
    fn from(report: IngestReport) -> Self {
        // ---
        let status = match report.status {
            IngestStatus::Success => "ok",
            IngestStatus::PartialWithWarnings => "partial",
        };

        IngestResponse {
            status: status.to_string(),
            readings: report.readings.len(),
            dropped_fields: report.dropped_fields,
            violations: report.validation.map(|v| v.violations).unwrap_or_default(),
            alerts: report.alert_changes.iter().map(AlertSummary::from).collect(),
        }
    }
}

impl From<&AlertChange> for AlertSummary {
    fn from(change: &AlertChange) -> Self {
        // ---
        let kind = match change {
            AlertChange::Opened(_) => "opened",
            AlertChange::Escalated(_) => "escalated",
            AlertChange::Updated(_) => "updated",
            AlertChange::Resolved(_) => "resolved",
        };
        let alert = change.alert();

        AlertSummary {
            change: kind.to_string(),
            alert_id: alert.id,
            field: alert.measurement_field_name.clone(),
            status: alert.status.as_str().to_string(),
            alert_type: alert.alert_type.as_str().to_string(),
            trigger_value: alert.trigger_value,
        }
    }
}
