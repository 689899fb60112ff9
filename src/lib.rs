//! Sensor measurement ingestion, schema validation and threshold alerting.
//!
//! The crate is organized along the data flow (EMBP: each module owns one
//! stage and this file is the only gateway):
//! - `tokenizer` splits line-oriented text into raw fields
//! - `parser` classifies one raw value into a typed value
//! - `normalizer` fans an input into one reading per field
//! - `measurement` validates readings against a measurement-type schema
//! - `threshold` evaluates numeric readings against min/max thresholds
//! - `alerts` drives the per-(asset sensor, field) alert lifecycle
//! - `store` persists each batch atomically
//! - `pipeline` runs the stages in order
//!
//! `catalog`, `config`, `schema` and `routes` support the service binary.

pub mod alerts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod measurement;
pub mod models;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod routes;
pub mod schema;
pub mod store;
pub mod threshold;
pub mod tokenizer;

pub use catalog::Catalog;
pub use config::Config;
pub use error::{CatalogError, IngestError, StoreError, ThresholdError};
pub use models::{
    Alert, AlertKey, AlertType, DataSource, NormalizedReading, RawMeasurementInput, Scalar,
    SensorIdentity, Severity, TextMeasurementInput, ThresholdStatus, TypedValue,
};
pub use pipeline::{IngestReport, IngestStatus, Pipeline, RetryPolicy};
pub use store::{MemoryStore, PgStore, Store};
