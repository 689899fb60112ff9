//! Alert lifecycle.
//!
//! Per (asset sensor, field) key the states are no-alert, open-warning,
//! open-critical and resolved. [`transition`] is the pure decision
//! function. The store runs it inside its per-key critical section
//! (see [`crate::store::Store::commit`]), so two concurrent readings for one
//! key cannot both open an alert, even from different processes.
//! [`KeyedLocks`] queues same-key batches inside one process before they
//! reach the store.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Alert, AlertKey, AlertType, NormalizedReading, ThresholdStatus};
use crate::threshold::{Breach, Evaluation};

// ---

/// A state change to apply to alert storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", content = "alert", rename_all = "snake_case")]
pub enum AlertChange {
    /// no-alert -> open; a new row.
    Opened(Alert),
    /// Severity raised in place.
    Escalated(Alert),
    /// Same severity, trigger value refreshed in place.
    Updated(Alert),
    /// open -> resolved; terminal for this alert.
    Resolved(Alert),
}

impl AlertChange {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertChange::Opened(a)
            | AlertChange::Escalated(a)
            | AlertChange::Updated(a)
            | AlertChange::Resolved(a) => a,
        }
    }

    /// Whether storage must insert (rather than update) the alert.
    pub fn is_insert(&self) -> bool {
        matches!(self, AlertChange::Opened(_))
    }
}

/// Decide what happens to the alert state of a reading's key.
///
/// `latest` is the most recent alert stored for the key: the open one if
/// any, else the last resolved one. `evaluations` are the per-threshold
/// results for `reading`; when none apply the reading counts as normal.
/// Returns `None` when nothing changes.
///
/// Only numeric readings drive alert state, and a reading older than the
/// last one applied to `latest` is ignored whether that alert is open or
/// already resolved.
pub fn transition(
    tenant_id: Uuid,
    latest: Option<&Alert>,
    reading: &NormalizedReading,
    evaluations: &[Evaluation<'_>],
    now: DateTime<Utc>,
) -> Option<AlertChange> {
    // ---
    if reading.numeric_value().is_none() {
        return None;
    }

    if let Some(last) = latest {
        if reading.reading_time < last.last_reading_time {
            debug!(
                "Ignoring stale reading for {} at {} (alert {} last saw {})",
                last.key(),
                reading.reading_time,
                last.id,
                last.last_reading_time
            );
            return None;
        }
    }

    let open = latest.filter(|a| !a.is_resolved);

    match (open, dominant_breach(evaluations)) {
        (None, None) => None,
        (None, Some((eval, breach))) => Some(AlertChange::Opened(open_alert(
            tenant_id, reading, eval, breach, now,
        ))),
        (Some(open), None) => {
            if evaluations.is_empty() {
                warn!(
                    "Resolving alert {} for {}: no active threshold applies",
                    open.id,
                    open.key()
                );
            }
            let mut alert = open.clone();
            alert.is_resolved = true;
            alert.resolved_time = Some(reading.reading_time);
            alert.status = ThresholdStatus::Normal;
            alert.last_reading_time = reading.reading_time;
            alert.updated_at = Some(now);
            Some(AlertChange::Resolved(alert))
        }
        (Some(open), Some((eval, breach))) => {
            let severity = eval.threshold.severity;
            if severity < open.severity {
                // Severity never drops while open.
                return None;
            }

            let mut alert = open.clone();
            apply_breach(&mut alert, reading, eval, breach);
            alert.updated_at = Some(now);

            if severity > open.severity {
                Some(AlertChange::Escalated(alert))
            } else {
                Some(AlertChange::Updated(alert))
            }
        }
    }
}

/// Most severe breach; on equal severity the one furthest past its bound.
fn dominant_breach<'e, 'a>(
    evaluations: &'e [Evaluation<'a>],
) -> Option<(&'e Evaluation<'a>, Breach)> {
    // ---
    evaluations
        .iter()
        .filter_map(|e| e.breach.map(|b| (e, b)))
        .max_by(|(a, ab), (b, bb)| {
            a.threshold
                .severity
                .cmp(&b.threshold.severity)
                .then_with(|| {
                    let da = (a.value - ab.bound).abs();
                    let db = (b.value - bb.bound).abs();
                    da.total_cmp(&db)
                })
        })
}

fn open_alert(
    tenant_id: Uuid,
    reading: &NormalizedReading,
    eval: &Evaluation<'_>,
    breach: Breach,
    now: DateTime<Utc>,
) -> Alert {
    // ---
    let threshold = eval.threshold;
    Alert {
        id: Uuid::new_v4(),
        tenant_id,
        asset_id: threshold.asset_id,
        asset_sensor_id: reading.asset_sensor_id,
        threshold_id: threshold.id,
        measurement_field_name: reading.measurement_type.clone(),
        alert_time: reading.reading_time,
        resolved_time: None,
        severity: threshold.severity,
        status: threshold.severity.into(),
        trigger_value: eval.value,
        threshold_min_value: threshold.min_value,
        threshold_max_value: threshold.max_value,
        alert_message: alert_message(&reading.measurement_type, eval.value, breach),
        alert_type: breach.alert_type,
        is_resolved: false,
        last_reading_time: reading.reading_time,
        created_at: now,
        updated_at: None,
    }
}

fn apply_breach(
    alert: &mut Alert,
    reading: &NormalizedReading,
    eval: &Evaluation<'_>,
    breach: Breach,
) {
    // ---
    let threshold = eval.threshold;
    alert.threshold_id = threshold.id;
    alert.severity = threshold.severity;
    alert.status = threshold.severity.into();
    alert.trigger_value = eval.value;
    alert.threshold_min_value = threshold.min_value;
    alert.threshold_max_value = threshold.max_value;
    alert.alert_type = breach.alert_type;
    alert.alert_message = alert_message(&reading.measurement_type, eval.value, breach);
    alert.last_reading_time = reading.reading_time;
}

/// Human-readable description of a breach.
pub fn alert_message(field_name: &str, value: f64, breach: Breach) -> String {
    // ---
    match breach.alert_type {
        AlertType::MinBreach => format!(
            "{} value {} is below minimum threshold {}",
            field_name, value, breach.bound
        ),
        AlertType::MaxBreach => format!(
            "{} value {} exceeds maximum threshold {}",
            field_name, value, breach.bound
        ),
    }
}

/// In-process critical sections keyed by [`AlertKey`].
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<AlertKey, Arc<Mutex<()>>>>,
}

/// Held locks; released on drop.
#[derive(Debug)]
pub struct KeyGuards {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every key, in sorted order so overlapping batches cannot
    /// deadlock.
    pub async fn lock_all(&self, keys: impl IntoIterator<Item = AlertKey>) -> KeyGuards {
        // ---
        let keys: BTreeSet<AlertKey> = keys.into_iter().collect();

        let handles: Vec<Arc<Mutex<()>>> = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            keys.into_iter()
                .map(|key| locks.entry(key).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }

        KeyGuards { _guards: guards }
    }

    /// Number of keys currently tracked.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
