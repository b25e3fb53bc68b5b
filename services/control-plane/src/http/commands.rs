//! Command Queue HTTP surface (§4.C, §4.H): admin enqueue, device polling
//! and acknowledgment. Terminal-state acknowledgment is idempotent-safe per
//! §7/§8 — a repeat ack reports success rather than an error.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use relay_protocol::http_api::{EnqueueCommandRequest, EnqueueCommandResponse};

use crate::http::devices::authorize_device_session;
use crate::http::response::{bad_request, internal_error, not_found, HttpResult};
use crate::repo::commands::{self, AckOutcome};
use crate::state::AppState;

pub async fn enqueue_command(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(body): Json<EnqueueCommandRequest>,
) -> HttpResult<axum::response::Response> {
    if crate::repo::devices::get_device(&state.pool, &device_id)
        .await
        .map_err(internal_error)?
        .is_none()
    {
        return Err(not_found(format!("device '{device_id}' not found")));
    }

    let row = commands::queue(&state.pool, &device_id, &body.command_type, body.payload)
        .await
        .map_err(internal_error)?;

    Ok(Json(EnqueueCommandResponse {
        command_id: row.command_id.to_string(),
        status: row.status,
    })
    .into_response())
}

#[derive(serde::Serialize)]
struct CommandSummary {
    command_id: String,
    command_type: String,
    payload: serde_json::Value,
    status: String,
}

pub async fn poll_pending(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> HttpResult<axum::response::Response> {
    authorize_device_session(&state, &headers, &device_id).await?;

    let rows = commands::poll_pending(&state.pool, &device_id).await.map_err(internal_error)?;
    let summaries: Vec<CommandSummary> = rows
        .into_iter()
        .map(|row| CommandSummary {
            command_id: row.command_id.to_string(),
            command_type: row.command_type,
            payload: row.payload,
            status: row.status,
        })
        .collect();
    Ok(Json(summaries).into_response())
}

#[derive(Deserialize)]
pub struct AcknowledgeRequest {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

const VALID_ACK_STATUSES: [&str; 3] = ["executing", "completed", "failed"];

pub async fn acknowledge_command(
    State(state): State<AppState>,
    Path((device_id, command_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Json(body): Json<AcknowledgeRequest>,
) -> HttpResult<axum::response::Response> {
    authorize_device_session(&state, &headers, &device_id).await?;

    if !VALID_ACK_STATUSES.contains(&body.status.as_str()) {
        return Err(bad_request(format!("invalid command status '{}'", body.status)));
    }

    let outcome = commands::acknowledge(&state.pool, command_id, &body.status, body.error.as_deref())
        .await
        .map_err(internal_error)?;

    match outcome {
        AckOutcome::NotFound => Err(not_found("command not found")),
        AckOutcome::Applied | AckOutcome::AlreadyTerminal => {
            if matches!(outcome, AckOutcome::Applied) && matches!(body.status.as_str(), "completed" | "failed") {
                let event_type = if body.status == "completed" { "command-completed" } else { "command-failed" };
                let _ = state
                    .event_bus
                    .publish(
                        &state.pool,
                        &device_id,
                        None,
                        event_type,
                        "info",
                        serde_json::json!({"command_id": command_id, "error": body.error}),
                    )
                    .await;
            }
            Ok(axum::http::StatusCode::NO_CONTENT.into_response())
        }
    }
}
