use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::alerts::AlertChange;
use crate::error::StoreError;
use crate::models::{Alert, AlertKey, NormalizedReading, Scalar};

use super::{Decide, Store};

// ---

/// PostgreSQL-backed [`Store`]. Tables come from [`crate::schema`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ALERT_COLUMNS: &str = r#"
    id, tenant_id, asset_id, asset_sensor_id, threshold_id, measurement_field_name,
    alert_time, resolved_time, severity, status, trigger_value,
    threshold_min_value, threshold_max_value, alert_message, alert_type,
    is_resolved, last_reading_time, created_at, updated_at
"#;

#[async_trait]
impl Store for PgStore {
    async fn commit(
        &self,
        readings: &[NormalizedReading],
        alert_keys: &[AlertKey],
        decide: &Decide<'_>,
    ) -> Result<Vec<AlertChange>, StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;

        // Serialize read-decide-write for the same keys across processes.
        // Locks are taken in key order and held until commit or rollback.
        let mut keys = alert_keys.to_vec();
        keys.sort();
        keys.dedup();
        for key in &keys {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(key.to_string())
                .execute(&mut *tx)
                .await?;
        }

        let mut changes = Vec::new();
        for key in &keys {
            let latest = latest_alert(&mut tx, key).await?;
            if let Some(change) = decide(key, latest.as_ref()) {
                changes.push(change);
            }
        }

        for reading in readings {
            insert_reading(&mut tx, reading).await?;
        }

        for change in &changes {
            if change.is_insert() {
                insert_alert(&mut tx, change.alert()).await?;
            } else {
                update_alert(&mut tx, change.alert()).await?;
            }
        }

        tx.commit().await?;
        Ok(changes)
    }
}

/// Open alert for `key` if any, else the one that saw the latest reading.
async fn latest_alert(
    tx: &mut Transaction<'_, Postgres>,
    key: &AlertKey,
) -> Result<Option<Alert>, StoreError> {
    // ---
    let row = sqlx::query(&format!(
        r#"
        SELECT {ALERT_COLUMNS}
        FROM sensor_alerts
        WHERE asset_sensor_id = $1
          AND measurement_field_name = $2
        ORDER BY is_resolved ASC, last_reading_time DESC, created_at DESC
        LIMIT 1
        "#
    ))
    .bind(key.asset_sensor_id)
    .bind(&key.field_name)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(|r| alert_from_row(&r)).transpose()
}

async fn insert_reading(
    tx: &mut Transaction<'_, Postgres>,
    reading: &NormalizedReading,
) -> Result<(), StoreError> {
    // ---
    let (numeric, text, boolean) = match &reading.value {
        Scalar::Numeric(v) => (Some(*v), None, None),
        Scalar::Text(s) => (None, Some(s.as_str()), None),
        Scalar::Boolean(b) => (None, None, Some(*b)),
    };

    sqlx::query(
        r#"
        INSERT INTO sensor_readings (
            id, tenant_id, asset_sensor_id, sensor_type_id, mac_address,
            location_id, location_name, measurement_type, measurement_label,
            measurement_unit, numeric_value, text_value, boolean_value,
            data_source, original_field_name, reading_time, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(reading.id)
    .bind(reading.tenant_id)
    .bind(reading.asset_sensor_id)
    .bind(reading.sensor_type_id)
    .bind(&reading.mac_address)
    .bind(reading.location_id)
    .bind(&reading.location_name)
    .bind(&reading.measurement_type)
    .bind(&reading.measurement_label)
    .bind(&reading.measurement_unit)
    .bind(numeric)
    .bind(text)
    .bind(boolean)
    .bind(reading.data_source.as_str())
    .bind(&reading.original_field_name)
    .bind(reading.reading_time)
    .bind(reading.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_alert(tx: &mut Transaction<'_, Postgres>, alert: &Alert) -> Result<(), StoreError> {
    // ---
    let result = sqlx::query(&format!(
        r#"
        INSERT INTO sensor_alerts ({ALERT_COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19)
        "#
    ))
    .bind(alert.id)
    .bind(alert.tenant_id)
    .bind(alert.asset_id)
    .bind(alert.asset_sensor_id)
    .bind(alert.threshold_id)
    .bind(&alert.measurement_field_name)
    .bind(alert.alert_time)
    .bind(alert.resolved_time)
    .bind(alert.severity.as_str())
    .bind(alert.status.as_str())
    .bind(alert.trigger_value)
    .bind(alert.threshold_min_value)
    .bind(alert.threshold_max_value)
    .bind(&alert.alert_message)
    .bind(alert.alert_type.as_str())
    .bind(alert.is_resolved)
    .bind(alert.last_reading_time)
    .bind(alert.created_at)
    .bind(alert.updated_at)
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Err(StoreError::OpenAlertConflict {
                asset_sensor_id: alert.asset_sensor_id,
                field: alert.measurement_field_name.clone(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

async fn update_alert(tx: &mut Transaction<'_, Postgres>, alert: &Alert) -> Result<(), StoreError> {
    // ---
    let result = sqlx::query(
        r#"
        UPDATE sensor_alerts SET
            threshold_id = $2,
            resolved_time = $3,
            severity = $4,
            status = $5,
            trigger_value = $6,
            threshold_min_value = $7,
            threshold_max_value = $8,
            alert_message = $9,
            alert_type = $10,
            is_resolved = $11,
            last_reading_time = $12,
            updated_at = $13
        WHERE id = $1 AND NOT is_resolved
        "#,
    )
    .bind(alert.id)
    .bind(alert.threshold_id)
    .bind(alert.resolved_time)
    .bind(alert.severity.as_str())
    .bind(alert.status.as_str())
    .bind(alert.trigger_value)
    .bind(alert.threshold_min_value)
    .bind(alert.threshold_max_value)
    .bind(&alert.alert_message)
    .bind(alert.alert_type.as_str())
    .bind(alert.is_resolved)
    .bind(alert.last_reading_time)
    .bind(alert.updated_at)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::AlertNotFound(alert.id));
    }
    Ok(())
}

fn alert_from_row(r: &PgRow) -> Result<Alert, StoreError> {
    // ---
    Ok(Alert {
        id: r.try_get("id")?,
        tenant_id: r.try_get("tenant_id")?,
        asset_id: r.try_get("asset_id")?,
        asset_sensor_id: r.try_get("asset_sensor_id")?,
        threshold_id: r.try_get("threshold_id")?,
        measurement_field_name: r.try_get("measurement_field_name")?,
        alert_time: r.try_get("alert_time")?,
        resolved_time: r.try_get("resolved_time")?,
        severity: parse_column(r, "severity")?,
        status: parse_column(r, "status")?,
        trigger_value: r.try_get("trigger_value")?,
        threshold_min_value: r.try_get("threshold_min_value")?,
        threshold_max_value: r.try_get("threshold_max_value")?,
        alert_message: r.try_get("alert_message")?,
        alert_type: parse_column(r, "alert_type")?,
        is_resolved: r.try_get("is_resolved")?,
        last_reading_time: r.try_get("last_reading_time")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn parse_column<T>(r: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = crate::error::ParseEnumError>,
{
    // ---
    let raw: String = r.try_get(column)?;
    raw.parse()
        .map_err(|e| StoreError::CorruptRow(format!("sensor_alerts.{column}: {e}")))
}
