// src/routes/health.rs
//! Health check endpoint for the Sensorwatch service.
//!
//! `/health` is used by container orchestrators and CI to verify that the
//! service is up. Besides liveness it reports how much reference data the
//! pipeline was started with, so an empty catalog is visible at a glance.
//! Follows the Explicit Module Boundary Pattern (EMBP): the handler stays
//! private and the gateway (`mod.rs`) only sees the subrouter.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::pipeline::Pipeline;
use crate::store::Store;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    measurement_types: usize,
    thresholds: usize,
}

/// Handle `GET /health`.
///
/// Does not touch the database.
async fn health<S: Store>(State(pipeline): State<Arc<Pipeline<S>>>) -> Json<HealthResponse> {
    // ---
    let catalog = pipeline.catalog();
    Json(HealthResponse {
        status: "ok",
        measurement_types: catalog.measurements.len(),
        thresholds: catalog.thresholds.len(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router<S: Store>() -> Router<Arc<Pipeline<S>>> {
    Router::new().route("/health", get(health::<S>))
}
