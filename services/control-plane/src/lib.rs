pub mod admin_ws;
pub mod auth;
pub mod config;
pub mod db;
pub mod events;
pub mod http;
pub mod pairing;
pub mod rate_limit;
pub mod registry;
pub mod relay;
pub mod repo;
pub mod signaling;
pub mod state;

pub use state::AppState;

use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Wires the real-time connection/session plane (relay, signaling, admin
/// socket) alongside the HTTP control surface (§4.H) onto one router,
/// following the teacher's single `build_router` composition root.
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
    };

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/ws/relay", get(relay::relay_handler))
        .route("/ws", get(signaling::signaling_handler))
        .route("/admin", get(admin_ws::admin_handler))
        .route("/api/pair/initiate", post(http::pairing::initiate_pairing))
        .route("/api/pair/complete", post(http::pairing::complete_pairing))
        .route("/api/pair/status/:device_id", get(http::pairing::pairing_status))
        .route(
            "/api/enroll/tokens",
            get(http::enrollment::list_enrollment_tokens).post(http::enrollment::create_enrollment_token),
        )
        .route(
            "/api/enroll/tokens/:token_id",
            delete(http::enrollment::revoke_enrollment_token),
        )
        .route("/api/enroll/device", post(http::enrollment::enroll_device))
        .route("/api/devices", get(http::devices::list_devices))
        .route("/api/devices/:id/heartbeat", post(http::devices::device_heartbeat))
        .route("/api/devices/:id/telemetry", post(http::devices::ingest_telemetry))
        .route(
            "/api/devices/:id/commands",
            post(http::commands::enqueue_command),
        )
        .route(
            "/api/devices/:id/commands/pending",
            get(http::commands::poll_pending),
        )
        .route(
            "/api/devices/:id/commands/:cid",
            patch(http::commands::acknowledge_command),
        )
        .route("/api/devices/:id/events", get(http::events::list_device_events))
        .route(
            "/api/devices/:id/events/:eid/ack",
            patch(http::events::acknowledge_event),
        )
        .fallback(fallback_404)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, axum::Json(relay_protocol::HttpErrorEnvelope::new("not found")))
}

mod health {
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use crate::state::AppState;

    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }

    pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
        match sqlx::query("SELECT 1").execute(&state.pool).await {
            Ok(_) => (StatusCode::OK, "ok").into_response(),
            Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response(),
        }
    }
}
