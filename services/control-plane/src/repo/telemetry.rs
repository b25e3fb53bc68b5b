use sqlx::PgPool;

use relay_protocol::messages::TelemetryData;

/// The battery reading on file before a new sample lands, so `battery_event`
/// can tell "just crossed the threshold" from "already below it".
pub async fn previous_battery_percent(pool: &PgPool, device_id: &str) -> Result<Option<f32>, sqlx::Error> {
    let row = sqlx::query!(
        r#"SELECT battery_percent FROM device_telemetry WHERE device_id = $1"#,
        device_id
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.and_then(|r| r.battery_percent))
}

pub async fn upsert(pool: &PgPool, device_id: &str, sample: &TelemetryData) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"INSERT INTO device_telemetry (device_id, battery_percent, cpu_percent, memory_percent, storage_percent, network_type, is_charging, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, now())
           ON CONFLICT (device_id) DO UPDATE SET
               battery_percent = EXCLUDED.battery_percent,
               cpu_percent = EXCLUDED.cpu_percent,
               memory_percent = EXCLUDED.memory_percent,
               storage_percent = EXCLUDED.storage_percent,
               network_type = EXCLUDED.network_type,
               is_charging = EXCLUDED.is_charging,
               updated_at = now()"#,
        device_id,
        sample.battery_percent,
        sample.cpu_percent,
        sample.memory_percent,
        sample.storage_percent,
        sample.network_type,
        sample.is_charging,
    )
    .execute(pool)
    .await?;

    sqlx::query!(
        r#"INSERT INTO telemetry_history (device_id, battery_percent, cpu_percent, memory_percent, storage_percent)
           VALUES ($1, $2, $3, $4, $5)"#,
        device_id,
        sample.battery_percent,
        sample.cpu_percent,
        sample.memory_percent,
        sample.storage_percent,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Battery thresholds per §8's boundary tests: exactly 20 triggers nothing,
/// 19 is `battery-low`, below 5 is `battery-critical` (never both at once).
pub fn battery_event(previous: Option<f32>, sample: f32) -> Option<&'static str> {
    if sample < 5.0 {
        return Some("battery-critical");
    }
    if sample < 20.0 {
        let was_already_low = previous.is_some_and(|p| p < 20.0);
        if !was_already_low {
            return Some("battery-low");
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_twenty_triggers_nothing() {
        assert_eq!(battery_event(None, 20.0), None);
    }

    #[test]
    fn nineteen_triggers_battery_low() {
        assert_eq!(battery_event(Some(50.0), 19.0), Some("battery-low"));
    }

    #[test]
    fn four_triggers_battery_critical_not_low() {
        assert_eq!(battery_event(Some(10.0), 4.0), Some("battery-critical"));
    }

    #[test]
    fn repeated_low_sample_does_not_re_fire() {
        assert_eq!(battery_event(Some(15.0), 14.0), None);
    }
}
