use sqlx::PgPool;

use crate::repo::sessions;

/// Validates a device session bearer token against the `sessions` table's
/// SHA-256 digest, the same lookup shape this stack already uses for
/// forwarder/receiver device tokens — never the plaintext token itself.
pub async fn validate_session(pool: &PgPool, raw_token: &str) -> Option<String> {
    sessions::device_id_for_token(pool, raw_token).await.ok()?
}

pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_requires_the_prefix() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("Basic abc123"), None);
        assert_eq!(extract_bearer(""), None);
    }
}
