//! Ingestion pipeline.
//!
//! raw input -> tokenizer (text) -> value parser -> normalizer -> schema
//! validation -> threshold evaluation -> alert lifecycle -> one atomic
//! store commit.
//!
//! Normalization and validation are best-effort: dropped fields and schema
//! violations are reported, never fatal. The store commit is all-or-nothing
//! and retried a bounded number of times on transient failures.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerts::{transition, AlertChange, KeyedLocks};
use crate::catalog::Catalog;
use crate::error::{IngestError, StoreError};
use crate::measurement::ValidationReport;
use crate::models::{
    Alert, AlertKey, NormalizedReading, RawMeasurementInput, TextMeasurementInput,
};
use crate::normalizer::normalize;
use crate::store::Store;
use crate::threshold::{evaluate_each, Evaluation};

// ---

/// Bounded retry for transient storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Success,
    /// Persisted, but some fields were dropped or failed schema validation.
    PartialWithWarnings,
}

/// What one successful ingestion call produced.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub status: IngestStatus,
    pub readings: Vec<NormalizedReading>,
    pub dropped_fields: Vec<String>,
    /// `None` when no measurement type is registered for the sensor type.
    pub validation: Option<ValidationReport>,
    pub alert_changes: Vec<AlertChange>,
}

pub struct Pipeline<S> {
    tenant_id: Uuid,
    catalog: Catalog,
    store: S,
    locks: KeyedLocks,
    retry: RetryPolicy,
}

impl<S: Store> Pipeline<S> {
    pub fn new(tenant_id: Uuid, catalog: Catalog, store: S) -> Self {
        Self {
            tenant_id,
            catalog,
            store,
            locks: KeyedLocks::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Tokenize a text payload and ingest it.
    pub async fn ingest_text(
        &self,
        input: &TextMeasurementInput,
    ) -> Result<IngestReport, IngestError> {
        // ---
        self.ingest(&RawMeasurementInput::from_text(input)).await
    }

    /// Run one input through the whole pipeline.
    pub async fn ingest(&self, input: &RawMeasurementInput) -> Result<IngestReport, IngestError> {
        // ---
        let asset_sensor_id = input.identity.asset_sensor_id;
        let schema = self
            .catalog
            .measurements
            .for_sensor_type(input.identity.sensor_type_id);
        if schema.is_none() {
            debug!(
                "No measurement type for sensor type {}, skipping validation",
                input.identity.sensor_type_id
            );
        }

        // Step 1: Normalize
        let normalized = normalize(self.tenant_id, input, schema);
        for field in &normalized.dropped_fields {
            warn!("Asset sensor {}: dropped field '{}'", asset_sensor_id, field);
        }

        // Step 2: Validate (advisory)
        let validation = schema.map(|s| s.validate(&normalized.readings));
        if let Some(report) = &validation {
            for violation in &report.violations {
                warn!("Asset sensor {}: {}", asset_sensor_id, violation);
            }
        }

        // Step 3: Evaluate thresholds for every numeric reading; a reading
        // with none applicable is normal and may still resolve an alert.
        let alert_changes = {
            let evaluated: HashMap<AlertKey, (&NormalizedReading, Vec<Evaluation<'_>>)> =
                normalized
                    .readings
                    .iter()
                    .filter(|reading| reading.numeric_value().is_some())
                    .map(|reading| {
                        let key = reading.alert_key();
                        let thresholds = self.catalog.thresholds.for_key(&key);
                        (key, (reading, evaluate_each(reading, thresholds)))
                    })
                    .collect();
            let alert_keys: Vec<AlertKey> = evaluated
                .keys()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            // Step 4: Alert transitions, decided inside the store's per-key
            // critical section and committed with the readings
            let _guards = self.locks.lock_all(alert_keys.iter().cloned()).await;

            let tenant_id = self.tenant_id;
            let now = Utc::now();
            let decide = |key: &AlertKey, latest: Option<&Alert>| -> Option<AlertChange> {
                let (reading, evaluations) = evaluated.get(key)?;
                transition(tenant_id, latest, reading, evaluations, now)
            };

            if normalized.readings.is_empty() {
                Vec::new()
            } else {
                self.retrying("batch commit", || {
                    self.store
                        .commit(&normalized.readings, &alert_keys, &decide)
                })
                .await
                .map_err(|(source, attempts)| {
                    error!(
                        "Rejected batch for asset sensor {} after {} attempt(s): {}",
                        asset_sensor_id, attempts, source
                    );
                    IngestError::Persistence {
                        asset_sensor_id,
                        attempts,
                        source,
                    }
                })?
            }
        };
        alert_changes.iter().for_each(log_change);

        let warned = !normalized.dropped_fields.is_empty()
            || validation.as_ref().is_some_and(|v| !v.valid);
        let status = if warned {
            IngestStatus::PartialWithWarnings
        } else {
            IngestStatus::Success
        };

        info!(
            "Ingested {} reading(s) for asset sensor {} ({} alert change(s), {:?})",
            normalized.readings.len(),
            asset_sensor_id,
            alert_changes.len(),
            status
        );

        Ok(IngestReport {
            status,
            readings: normalized.readings,
            dropped_fields: normalized.dropped_fields,
            validation,
            alert_changes,
        })
    }

    /// Run `op`, retrying transient failures per the retry policy. On
    /// failure returns the last error and the number of attempts made.
    async fn retrying<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, (StoreError, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        // ---
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt <= self.retry.max_retries => {
                    let delay = self.retry.backoff * 2u32.saturating_pow(attempt.min(16) - 1);
                    warn!(
                        "{} failed (attempt {}), retrying in {:?}: {}",
                        what, attempt, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}

fn log_change(change: &AlertChange) {
    // ---
    let alert = change.alert();
    match change {
        AlertChange::Opened(_) => info!(
            "Alert {} opened for {}: {} ({})",
            alert.id,
            alert.key(),
            alert.alert_message,
            alert.severity.as_str()
        ),
        AlertChange::Escalated(_) => info!(
            "Alert {} escalated to {} for {}",
            alert.id,
            alert.severity.as_str(),
            alert.key()
        ),
        AlertChange::Updated(_) => debug!(
            "Alert {} updated for {}: trigger value {}",
            alert.id,
            alert.key(),
            alert.trigger_value
        ),
        AlertChange::Resolved(_) => info!("Alert {} resolved for {}", alert.id, alert.key()),
    }
}
