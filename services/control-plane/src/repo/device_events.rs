use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

pub struct DeviceEventRow {
    pub event_id: i64,
    pub device_id: String,
    pub event_type: String,
    pub severity: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

pub async fn insert(
    pool: &PgPool,
    device_id: &str,
    event_type: &str,
    severity: &str,
    payload: Value,
) -> Result<DeviceEventRow, sqlx::Error> {
    let row = sqlx::query!(
        r#"INSERT INTO device_events (device_id, event_type, severity, payload)
           VALUES ($1, $2, $3, $4)
           RETURNING event_id, device_id, event_type, severity, payload, created_at"#,
        device_id,
        event_type,
        severity,
        payload,
    )
    .fetch_one(pool)
    .await?;
    Ok(DeviceEventRow {
        event_id: row.event_id,
        device_id: row.device_id,
        event_type: row.event_type,
        severity: row.severity,
        payload: row.payload,
        created_at: row.created_at,
    })
}

pub async fn list_for_device(pool: &PgPool, device_id: &str, limit: i64) -> Result<Vec<DeviceEventRow>, sqlx::Error> {
    let rows = sqlx::query!(
        r#"SELECT event_id, device_id, event_type, severity, payload, created_at
           FROM device_events WHERE device_id = $1 ORDER BY created_at DESC LIMIT $2"#,
        device_id,
        limit,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| DeviceEventRow {
            event_id: r.event_id,
            device_id: r.device_id,
            event_type: r.event_type,
            severity: r.severity,
            payload: r.payload,
            created_at: r.created_at,
        })
        .collect())
}

pub async fn acknowledge(
    pool: &PgPool,
    event_id: i64,
    acknowledged_by: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query!(
        r#"UPDATE device_events
           SET acknowledged = true, acknowledged_by = $2, acknowledged_at = now()
           WHERE event_id = $1 AND acknowledged = false
           RETURNING event_id"#,
        event_id,
        acknowledged_by,
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}
