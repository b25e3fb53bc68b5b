use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::config::DEVICE_ONLINE_WINDOW;

pub struct DeviceRow {
    pub device_id: String,
    pub display_name: String,
    pub model: Option<String>,
    pub platform: String,
    pub os: Option<String>,
    pub arch: Option<String>,
    pub hostname: Option<String>,
    pub last_seen_at: DateTime<Utc>,
}

impl DeviceRow {
    pub fn online(&self) -> bool {
        (Utc::now() - self.last_seen_at).num_milliseconds()
            < DEVICE_ONLINE_WINDOW.as_millis() as i64
    }
}

/// Inserts a freshly enrolled device. `device_id` is generated by the caller
/// (enrollment redemption), mirroring how `repo::events::upsert_stream`
/// mints its own row key rather than trusting client input.
pub async fn insert_device(
    pool: &PgPool,
    device_id: &str,
    display_name: &str,
    platform: &str,
    agent_version: &str,
    os: &str,
    arch: &str,
    hostname: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"INSERT INTO devices (device_id, display_name, platform, agent_version, os, arch, hostname)
           VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        device_id,
        display_name,
        platform,
        agent_version,
        os,
        arch,
        hostname,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn touch_last_seen(
    pool: &PgPool,
    device_id: &str,
    agent_version: Option<&str>,
    os: Option<&str>,
    arch: Option<&str>,
    hostname: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"UPDATE devices
           SET last_seen_at = now(),
               agent_version = COALESCE($2, agent_version),
               os = COALESCE($3, os),
               arch = COALESCE($4, arch),
               hostname = COALESCE($5, hostname)
           WHERE device_id = $1"#,
        device_id,
        agent_version,
        os,
        arch,
        hostname,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_device(pool: &PgPool, device_id: &str) -> Result<Option<DeviceRow>, sqlx::Error> {
    let row = sqlx::query!(
        r#"SELECT device_id, display_name, model, platform, os, arch, hostname, last_seen_at
           FROM devices WHERE device_id = $1"#,
        device_id
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| DeviceRow {
        device_id: r.device_id,
        display_name: r.display_name,
        model: r.model,
        platform: r.platform,
        os: r.os,
        arch: r.arch,
        hostname: r.hostname,
        last_seen_at: r.last_seen_at,
    }))
}

pub async fn list_devices(pool: &PgPool) -> Result<Vec<DeviceRow>, sqlx::Error> {
    let rows = sqlx::query!(
        r#"SELECT device_id, display_name, model, platform, os, arch, hostname, last_seen_at
           FROM devices ORDER BY display_name ASC"#
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| DeviceRow {
            device_id: r.device_id,
            display_name: r.display_name,
            model: r.model,
            platform: r.platform,
            os: r.os,
            arch: r.arch,
            hostname: r.hostname,
            last_seen_at: r.last_seen_at,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn device(last_seen_at: DateTime<Utc>) -> DeviceRow {
        DeviceRow {
            device_id: "device-1".into(),
            display_name: "Pixel 7".into(),
            model: None,
            platform: "android".into(),
            os: None,
            arch: None,
            hostname: None,
            last_seen_at,
        }
    }

    #[test]
    fn device_is_online_within_the_window() {
        let row = device(Utc::now() - Duration::seconds(30));
        assert!(row.online());
    }

    #[test]
    fn device_is_offline_past_the_window() {
        let row = device(Utc::now() - Duration::seconds(200));
        assert!(!row.online());
    }
}
