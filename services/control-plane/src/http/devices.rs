//! Device listing, heartbeat, and telemetry ingest (§4.H). The listing
//! endpoint is the "core needs something to enumerate devices against"
//! seam called out in §4.H; the surrounding CRUD (groups, policies) stays
//! out of scope.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

use relay_protocol::http_api::{DeviceListResponse, DeviceSummary};
use relay_protocol::messages::TelemetryData;

use crate::auth::{extract_bearer, validate_session};
use crate::http::response::{internal_error, unauthorized, HttpResult};
use crate::repo::{commands, devices, telemetry};
use crate::state::AppState;

/// Maps an agent-reported OS string to the closed platform-kind enum (§3).
/// Anything not explicitly recognized is `"other"`, not an error — the
/// platform kind gates display/grouping, not admission.
pub(crate) fn derive_platform(os: &str) -> &'static str {
    match os.to_ascii_lowercase().as_str() {
        "android" => "android",
        "linux" => "linux",
        "windows" => "windows",
        _ => "other",
    }
}

/// Validates the bearer token on a device-authenticated request and confirms
/// it actually belongs to the device named in the path, not just any device.
pub(crate) async fn authorize_device_session(
    state: &AppState,
    headers: &HeaderMap,
    device_id: &str,
) -> Result<(), axum::response::Response> {
    let raw_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .ok_or_else(|| unauthorized("missing bearer token"))?;

    match validate_session(&state.pool, raw_token).await {
        Some(owner) if owner == device_id => Ok(()),
        Some(_) => Err(unauthorized("token does not authorize this device")),
        None => Err(unauthorized("unknown or revoked session token")),
    }
}

pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    match devices::list_devices(&state.pool).await {
        Ok(rows) => {
            let devices = rows
                .into_iter()
                .map(|row| DeviceSummary {
                    device_id: row.device_id,
                    hostname: row.hostname.unwrap_or_default(),
                    os: row.os.unwrap_or_default(),
                    arch: row.arch.unwrap_or_default(),
                    online: row.online(),
                    last_seen_at: Some(row.last_seen_at.to_rfc3339()),
                })
                .collect();
            Json(DeviceListResponse { devices }).into_response()
        }
        Err(e) => internal_error(e).into_response(),
    }
}

pub async fn device_heartbeat(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> HttpResult<axum::response::Response> {
    authorize_device_session(&state, &headers, &device_id).await?;

    devices::touch_last_seen(&state.pool, &device_id, None, None, None, None)
        .await
        .map_err(internal_error)?;

    let already_syncing = commands::has_pending_of_type(&state.pool, &device_id, "SYNC_APPS")
        .await
        .map_err(internal_error)?;
    if !already_syncing {
        commands::queue(&state.pool, &device_id, "SYNC_APPS", serde_json::json!({}))
            .await
            .map_err(internal_error)?;
    }

    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

pub async fn ingest_telemetry(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(sample): Json<TelemetryData>,
) -> HttpResult<axum::response::Response> {
    authorize_device_session(&state, &headers, &device_id).await?;

    let previous = telemetry::previous_battery_percent(&state.pool, &device_id)
        .await
        .map_err(internal_error)?;

    telemetry::upsert(&state.pool, &device_id, &sample)
        .await
        .map_err(internal_error)?;

    if let Some(battery) = sample.battery_percent {
        if let Some(event_type) = telemetry::battery_event(previous, battery) {
            let severity = if event_type == "battery-critical" { "critical" } else { "warning" };
            state
                .event_bus
                .publish(&state.pool, &device_id, None, event_type, severity, serde_json::json!({"battery_percent": battery}))
                .await
                .map_err(internal_error)?;
        }
    }

    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

