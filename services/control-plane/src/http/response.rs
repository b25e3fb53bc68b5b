use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_protocol::HttpErrorEnvelope;
use std::fmt::Display;

pub type HttpResponse = Response;
pub type HttpResult<T = ()> = Result<T, HttpResponse>;

pub(crate) fn json_error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    (status, Json(HttpErrorEnvelope::new(message))).into_response()
}

pub fn internal_error(err: impl Display) -> HttpResponse {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, message)
}

pub fn unauthorized(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::UNAUTHORIZED, message)
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, message)
}

pub fn conflict(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::CONFLICT, message)
}

pub fn rate_limited(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::TOO_MANY_REQUESTS, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_error_response(response: Response, expected_status: StatusCode, expected_message: &str) {
        assert_eq!(response.status(), expected_status);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        let parsed: HttpErrorEnvelope =
            serde_json::from_slice(&body).expect("response body should be valid error json");

        assert_eq!(parsed.error, expected_message);
    }

    #[tokio::test]
    async fn json_error_sets_status_code_and_message() {
        let response = json_error(StatusCode::BAD_GATEWAY, "upstream failure");
        assert_error_response(response, StatusCode::BAD_GATEWAY, "upstream failure").await;
    }

    #[tokio::test]
    async fn internal_error_sets_500() {
        let response = internal_error("database unavailable");
        assert_error_response(response, StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").await;
    }

    #[tokio::test]
    async fn bad_request_sets_400() {
        let response = bad_request("invalid query");
        assert_error_response(response, StatusCode::BAD_REQUEST, "invalid query").await;
    }

    #[tokio::test]
    async fn unauthorized_sets_401() {
        let response = unauthorized("unknown or revoked token");
        assert_error_response(response, StatusCode::UNAUTHORIZED, "unknown or revoked token").await;
    }

    #[tokio::test]
    async fn not_found_sets_404() {
        let response = not_found("device not found");
        assert_error_response(response, StatusCode::NOT_FOUND, "device not found").await;
    }

    #[tokio::test]
    async fn conflict_sets_409() {
        let response = conflict("role already taken");
        assert_error_response(response, StatusCode::CONFLICT, "role already taken").await;
    }

    #[tokio::test]
    async fn rate_limited_sets_429() {
        let response = rate_limited("too many pairing attempts");
        assert_error_response(response, StatusCode::TOO_MANY_REQUESTS, "too many pairing attempts").await;
    }
}
