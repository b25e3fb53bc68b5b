//! Enrollment token lifecycle and device enrollment redemption (§3, §4.H).
//! Token codes use an 8-char confusion-free alphabet (omitting `0 O 1 I`),
//! the same flavor of human-typeable code `pairing.rs` uses for its 6-digit
//! phone codes, just drawn from letters+digits instead of digits alone.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::{Rng, RngCore};
use uuid::Uuid;

use relay_protocol::http_api::{
    EnrollDeviceRequest, EnrollDeviceResponse, EnrollmentTokenRequest, EnrollmentTokenResponse,
};

use crate::config::ENROLLMENT_TOKEN_TTL;
use crate::http::devices::derive_platform;
use crate::http::response::{bad_request, internal_error, not_found, unauthorized, HttpResult};
use crate::pairing::generate_device_id;
use crate::repo::enrollment::{self, RedeemOutcome};
use crate::repo::{devices, sessions};
use crate::state::AppState;

const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const CODE_LEN: usize = 8;

fn generate_enrollment_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

pub async fn create_enrollment_token(
    State(state): State<AppState>,
    Json(body): Json<EnrollmentTokenRequest>,
) -> HttpResult<axum::response::Response> {
    let max_uses = body.max_uses.unwrap_or(1) as i32;
    if max_uses < 1 {
        return Err(bad_request("max_uses must be at least 1"));
    }
    let ttl = body
        .expires_in_secs
        .map(std::time::Duration::from_secs)
        .unwrap_or(ENROLLMENT_TOKEN_TTL);
    let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();

    let code = generate_enrollment_code();
    let token_id = enrollment::create_token(&state.pool, &code, body.label.as_deref(), max_uses, expires_at)
        .await
        .map_err(internal_error)?;

    Ok(Json(EnrollmentTokenResponse {
        token_id: token_id.to_string(),
        token: code,
        expires_at: expires_at.to_rfc3339(),
    })
    .into_response())
}

#[derive(serde::Serialize)]
struct EnrollmentTokenSummary {
    token_id: String,
    status: String,
    max_uses: i32,
    used_count: i32,
    expires_at: String,
}

pub async fn list_enrollment_tokens(State(state): State<AppState>) -> impl IntoResponse {
    match enrollment::list_tokens(&state.pool).await {
        Ok(rows) => Json(
            rows.into_iter()
                .map(|row| EnrollmentTokenSummary {
                    token_id: row.token_id.to_string(),
                    status: row.status,
                    max_uses: row.max_uses,
                    used_count: row.used_count,
                    expires_at: row.expires_at.to_rfc3339(),
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

pub async fn revoke_enrollment_token(
    State(state): State<AppState>,
    Path(token_id): Path<Uuid>,
) -> HttpResult<axum::response::Response> {
    let revoked = enrollment::revoke_token(&state.pool, token_id).await.map_err(internal_error)?;
    if revoked {
        Ok(axum::http::StatusCode::NO_CONTENT.into_response())
    } else {
        Err(not_found("token not found or already revoked"))
    }
}

pub async fn enroll_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EnrollDeviceRequest>,
) -> HttpResult<axum::response::Response> {
    let outcome = enrollment::redeem_token(&state.pool, &body.enrollment_token)
        .await
        .map_err(internal_error)?;

    match outcome {
        RedeemOutcome::Invalid => return Err(unauthorized("invalid enrollment token")),
        RedeemOutcome::Expired => return Err(unauthorized("enrollment token has expired")),
        RedeemOutcome::Exhausted => return Err(unauthorized("enrollment token has no uses remaining")),
        RedeemOutcome::Ok => {}
    }

    let device_id = generate_device_id();
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

    let mut token_bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut token_bytes);
    let session_token = URL_SAFE_NO_PAD.encode(token_bytes);

    sessions::create_session(&state.pool, &device_id, &session_token)
        .await
        .map_err(internal_error)?;

    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let server_url = crate::config::derive_external_base(&state.config, &headers, host);

    Ok(Json(EnrollDeviceResponse {
        device_id,
        session_token,
        server_url,
    })
    .into_response())
}
