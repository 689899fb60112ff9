use std::sync::Arc;

use axum::Router;

use crate::pipeline::Pipeline;
use crate::store::Store;

mod health;
mod ingest;

pub use ingest::IngestResponse;

// ---

pub fn router<S: Store>(pipeline: Arc<Pipeline<S>>) -> Router {
    // ---
    Router::new()
        .merge(ingest::router())
        .merge(health::router())
        .with_state(pipeline)
}
