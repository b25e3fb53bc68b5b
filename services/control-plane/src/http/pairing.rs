//! Phone pairing HTTP surface (§4.B, §4.H): initiate, complete, and poll
//! status. Initiate/complete are rate-limited per remote IP; the complete
//! endpoint deliberately conflates "unknown code" and "already paired" into
//! one "invalid pairing code" response to reduce the pairing oracle (§7).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;

use relay_protocol::http_api::{
    PairCompleteRequest, PairCompleteResponse, PairInitiateRequest, PairInitiateResponse, PairStatusResponse,
};

use crate::config::PAIRING_TTL;
use crate::http::devices::derive_platform;
use crate::http::response::{internal_error, not_found, rate_limited, unauthorized, HttpResult};
use crate::pairing::{generate_device_id, PairingError, PairingStatus};
use crate::repo::{devices, sessions};
use crate::state::AppState;

pub async fn initiate_pairing(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<PairInitiateRequest>,
) -> HttpResult<axum::response::Response> {
    if !state.pair_initiate_limiter.check(addr.ip()).await {
        return Err(rate_limited("too many pairing attempts, try again shortly"));
    }

    let device_id = generate_device_id();
    let (code, _expires_at) = state.pairing.initiate(device_id.clone(), body.device_name).await;
    let expires_at = Utc::now() + chrono::Duration::from_std(PAIRING_TTL).unwrap_or_default();
    let qr_code_data = format!("android-remote://pair?code={code}&device={device_id}");

    Ok(Json(PairInitiateResponse {
        pairing_id: device_id,
        pairing_code: code,
        qr_code_data,
        expires_at: expires_at.to_rfc3339(),
    })
    .into_response())
}

pub async fn complete_pairing(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<PairCompleteRequest>,
) -> HttpResult<axum::response::Response> {
    if !state.pair_complete_limiter.check(addr.ip()).await {
        return Err(rate_limited("too many pairing attempts, try again shortly"));
    }

    let (device_id, session_token, device_public_key) =
        state.pairing.complete_by_code(&body.pairing_code).await.map_err(|e| match e {
            PairingError::InvalidCode => unauthorized("invalid pairing code"),
            PairingError::Expired => unauthorized("pairing code has expired"),
            PairingError::NotFound => unauthorized("invalid pairing code"),
        })?;

    let platform = derive_platform(&body.os);
    let display_name = format!("{} ({})", body.hostname, &device_id[device_id.len().saturating_sub(6)..]);
    devices::insert_device(
        &state.pool,
        &device_id,
        &display_name,
        platform,
        &body.agent_version,
        &body.os,
        &body.arch,
        &body.hostname,
    )
    .await
    .map_err(internal_error)?;

    sessions::create_session(&state.pool, &device_id, &session_token)
        .await
        .map_err(internal_error)?;

    Ok(Json(PairCompleteResponse {
        device_id,
        session_token,
        device_name: display_name,
        device_public_key,
    })
    .into_response())
}

pub async fn pairing_status(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> HttpResult<axum::response::Response> {
    let (status, session_token) = state
        .pairing
        .status(&device_id)
        .await
        .map_err(|_| not_found("no pairing session for this device"))?;

    let server_url = session_token.as_ref().map(|_| {
        let host = headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let base = crate::config::derive_external_base(&state.config, &headers, host);
        format!("{}/ws", base.replacen("http", "ws", 1))
    });

    Ok(Json(PairStatusResponse {
        pairing_id: device_id.clone(),
        status: match status {
            PairingStatus::Pending => "pending",
            PairingStatus::Paired => "paired",
            PairingStatus::Expired => "expired",
        }
        .to_owned(),
        device_id: matches!(status, PairingStatus::Paired).then_some(device_id),
        session_token,
        server_url,
    })
    .into_response())
}
