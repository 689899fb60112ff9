//! Database schema management for `codemetal-sensorwatch`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `sensor_readings` table for normalized readings and the
/// `sensor_alerts` table for alert state. Safe to call on every startup;
/// no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // One row per (asset sensor, field) per reading time
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id                  UUID PRIMARY KEY,
            tenant_id           UUID        NOT NULL,
            asset_sensor_id     UUID        NOT NULL,
            sensor_type_id      UUID        NOT NULL,
            mac_address         TEXT,
            location_id         UUID,
            location_name       TEXT,
            measurement_type    TEXT        NOT NULL,
            measurement_label   TEXT        NOT NULL,
            measurement_unit    TEXT,
            numeric_value       DOUBLE PRECISION,
            text_value          TEXT,
            boolean_value       BOOLEAN,
            data_source         TEXT        NOT NULL,
            original_field_name TEXT        NOT NULL,
            reading_time        TIMESTAMPTZ NOT NULL,
            created_at          TIMESTAMPTZ NOT NULL,
            CHECK (num_nonnulls(numeric_value, text_value, boolean_value) = 1)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Alert state; bounds are snapshots taken at trigger time
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_alerts (
            id                     UUID PRIMARY KEY,
            tenant_id              UUID             NOT NULL,
            asset_id               UUID             NOT NULL,
            asset_sensor_id        UUID             NOT NULL,
            threshold_id           UUID             NOT NULL,
            measurement_field_name TEXT             NOT NULL,
            alert_time             TIMESTAMPTZ      NOT NULL,
            resolved_time          TIMESTAMPTZ,
            severity               TEXT             NOT NULL,
            status                 TEXT             NOT NULL,
            trigger_value          DOUBLE PRECISION NOT NULL,
            threshold_min_value    DOUBLE PRECISION,
            threshold_max_value    DOUBLE PRECISION,
            alert_message          TEXT             NOT NULL,
            alert_type             TEXT             NOT NULL,
            is_resolved            BOOLEAN          NOT NULL DEFAULT FALSE,
            last_reading_time      TIMESTAMPTZ      NOT NULL,
            created_at             TIMESTAMPTZ      NOT NULL,
            updated_at             TIMESTAMPTZ
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // At most one open alert per (asset sensor, field)
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_sensor_alerts_open_key
            ON sensor_alerts (asset_sensor_id, measurement_field_name)
            WHERE NOT is_resolved;
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings_sensor_time
            ON sensor_readings (asset_sensor_id, measurement_type, reading_time);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Latest alert per key, resolved or not
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_alerts_key_latest
            ON sensor_alerts (asset_sensor_id, measurement_field_name, last_reading_time DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_alerts_tenant
            ON sensor_alerts (tenant_id, alert_time);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
