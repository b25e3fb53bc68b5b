//! Admin-facing read/acknowledge surface over the device event log (§4.D).
//! The live fan-out to subscribed admin sockets is `admin_ws`'s job; this
//! module only covers the durable row store side of the same bus.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::http::response::{internal_error, not_found, HttpResult};
use crate::repo::device_events;
use crate::state::AppState;

#[derive(serde::Serialize)]
struct DeviceEventSummary {
    event_id: i64,
    event_type: String,
    severity: String,
    payload: serde_json::Value,
    created_at: String,
}

const DEFAULT_LIMIT: i64 = 50;

pub async fn list_device_events(State(state): State<AppState>, Path(device_id): Path<String>) -> impl IntoResponse {
    match device_events::list_for_device(&state.pool, &device_id, DEFAULT_LIMIT).await {
        Ok(rows) => Json(
            rows.into_iter()
                .map(|row| DeviceEventSummary {
                    event_id: row.event_id,
                    event_type: row.event_type,
                    severity: row.severity,
                    payload: row.payload,
                    created_at: row.created_at.to_rfc3339(),
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

#[derive(Deserialize)]
pub struct AcknowledgeEventRequest {
    acknowledged_by: String,
}

pub async fn acknowledge_event(
    State(state): State<AppState>,
    Path((_device_id, event_id)): Path<(String, i64)>,
    Json(body): Json<AcknowledgeEventRequest>,
) -> HttpResult<axum::response::Response> {
    let acknowledged = device_events::acknowledge(&state.pool, event_id, &body.acknowledged_by)
        .await
        .map_err(internal_error)?;

    if acknowledged {
        Ok(axum::http::StatusCode::NO_CONTENT.into_response())
    } else {
        Err(not_found("event not found or already acknowledged"))
    }
}
