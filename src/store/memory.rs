use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::alerts::AlertChange;
use crate::error::StoreError;
use crate::models::{Alert, AlertKey, NormalizedReading};

use super::{Decide, Store};

// ---

/// In memory store. Reference implementation of [`Store`], used by tests
/// and for running the service without a database.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    readings: Vec<NormalizedReading>,
    alerts: HashMap<Uuid, Alert>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn readings(&self) -> Vec<NormalizedReading> {
        self.state.read().await.readings.clone()
    }

    /// All alerts, resolved or not, oldest first.
    pub async fn alerts(&self) -> Vec<Alert> {
        // ---
        let state = self.state.read().await;
        let mut alerts: Vec<Alert> = state.alerts.values().cloned().collect();
        alerts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.alert_time.cmp(&b.alert_time))
        });
        alerts
    }

    /// All alerts ever raised for `key`.
    pub async fn alerts_for(&self, key: &AlertKey) -> Vec<Alert> {
        self.alerts()
            .await
            .into_iter()
            .filter(|a| &a.key() == key)
            .collect()
    }

    /// Unresolved alerts for `key`; never more than one.
    pub async fn open_alert_count(&self, key: &AlertKey) -> usize {
        // ---
        let state = self.state.read().await;
        state
            .alerts
            .values()
            .filter(|a| !a.is_resolved && &a.key() == key)
            .count()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn commit(
        &self,
        readings: &[NormalizedReading],
        alert_keys: &[AlertKey],
        decide: &Decide<'_>,
    ) -> Result<Vec<AlertChange>, StoreError> {
        // ---
        // The write lock is the critical section for every key at once.
        let mut state = self.state.write().await;

        // Stage on a copy so a failing change leaves nothing applied.
        let mut alerts = state.alerts.clone();
        let mut changes = Vec::new();
        for key in alert_keys {
            let latest = latest_for(&alerts, key).cloned();
            if let Some(change) = decide(key, latest.as_ref()) {
                apply(&mut alerts, &change)?;
                changes.push(change);
            }
        }

        state.alerts = alerts;
        state.readings.extend(readings.iter().cloned());
        Ok(changes)
    }
}

/// Open alert for `key` if any, else the one that saw the latest reading.
fn latest_for<'a>(alerts: &'a HashMap<Uuid, Alert>, key: &AlertKey) -> Option<&'a Alert> {
    // ---
    alerts
        .values()
        .filter(|a| &a.key() == key)
        .max_by_key(|a| (!a.is_resolved, a.last_reading_time, a.created_at))
}

fn apply(alerts: &mut HashMap<Uuid, Alert>, change: &AlertChange) -> Result<(), StoreError> {
    // ---
    let alert = change.alert();

    if change.is_insert() {
        let key = alert.key();
        if alerts.values().any(|a| !a.is_resolved && a.key() == key) {
            return Err(StoreError::OpenAlertConflict {
                asset_sensor_id: key.asset_sensor_id,
                field: key.field_name,
            });
        }
        alerts.insert(alert.id, alert.clone());
        return Ok(());
    }

    match alerts.get_mut(&alert.id) {
        Some(existing) if existing.is_resolved => Err(StoreError::Constraint(format!(
            "alert {} is already resolved",
            alert.id
        ))),
        Some(existing) => {
            *existing = alert.clone();
            Ok(())
        }
        None => Err(StoreError::AlertNotFound(alert.id)),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{AlertType, Severity, ThresholdStatus};
    use chrono::{Duration, Utc};

    fn open(field: &str) -> Alert {
        // ---
        let now = Utc::now();
        Alert {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            asset_id: Uuid::nil(),
            asset_sensor_id: Uuid::from_u128(7),
            threshold_id: Uuid::new_v4(),
            measurement_field_name: field.into(),
            alert_time: now,
            resolved_time: None,
            severity: Severity::Warning,
            status: ThresholdStatus::Warning,
            trigger_value: 1.0,
            threshold_min_value: Some(2.0),
            threshold_max_value: None,
            alert_message: "x".into(),
            alert_type: AlertType::MinBreach,
            is_resolved: false,
            last_reading_time: now,
            created_at: now,
            updated_at: None,
        }
    }

    /// Commit `changes` regardless of the stored state.
    async fn force(store: &MemoryStore, changes: Vec<AlertChange>) -> Result<(), StoreError> {
        // ---
        let keys: Vec<AlertKey> = changes.iter().map(|c| c.alert().key()).collect();
        let decide = |key: &AlertKey, _: Option<&Alert>| -> Option<AlertChange> {
            changes.iter().find(|c| &c.alert().key() == key).cloned()
        };
        store.commit(&[], &keys, &decide).await.map(|_| ())
    }

    #[tokio::test]
    async fn test_decide_sees_latest_alert_for_key() {
        // ---
        let store = MemoryStore::new();
        let alert = open("ph_value");
        force(&store, vec![AlertChange::Opened(alert.clone())])
            .await
            .unwrap();

        let seen = std::sync::Mutex::new(None);
        let decide = |_: &AlertKey, latest: Option<&Alert>| -> Option<AlertChange> {
            *seen.lock().unwrap() = latest.cloned();
            let mut resolved = latest?.clone();
            resolved.is_resolved = true;
            Some(AlertChange::Resolved(resolved))
        };
        let changes = store.commit(&[], &[alert.key()], &decide).await.unwrap();

        assert_eq!(seen.lock().unwrap().as_ref(), Some(&alert));
        assert_eq!(changes.len(), 1);
        assert_eq!(store.open_alert_count(&alert.key()).await, 0);
        assert_eq!(store.alerts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_resolved_alert_is_still_reported_as_latest() {
        // ---
        let store = MemoryStore::new();
        let mut old = open("ph_value");
        old.is_resolved = true;
        let mut newer = open("ph_value");
        newer.is_resolved = true;
        newer.last_reading_time = old.last_reading_time + Duration::minutes(5);
        force(&store, vec![AlertChange::Opened(old)]).await.unwrap();
        force(&store, vec![AlertChange::Opened(newer.clone())])
            .await
            .unwrap();

        let seen = std::sync::Mutex::new(None);
        let decide = |_: &AlertKey, latest: Option<&Alert>| -> Option<AlertChange> {
            *seen.lock().unwrap() = latest.map(|a| a.id);
            None
        };
        store.commit(&[], &[newer.key()], &decide).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(newer.id));
    }

    #[tokio::test]
    async fn test_second_open_alert_for_key_is_rejected() {
        // ---
        let store = MemoryStore::new();
        force(&store, vec![AlertChange::Opened(open("ph_value"))])
            .await
            .unwrap();

        let err = force(&store, vec![AlertChange::Opened(open("ph_value"))])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::OpenAlertConflict { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        // ---
        let store = MemoryStore::new();
        let good = open("flow_rate");
        let unknown = open("ph_value");

        let err = force(
            &store,
            vec![
                AlertChange::Opened(good.clone()),
                AlertChange::Updated(unknown.clone()),
            ],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StoreError::AlertNotFound(id) if id == unknown.id));
        assert!(store.alerts().await.is_empty());
        assert!(store.readings().await.is_empty());
    }
}
