use sha2::{Digest, Sha256};
use sqlx::PgPool;

pub async fn create_session(pool: &PgPool, device_id: &str, raw_token: &str) -> Result<(), sqlx::Error> {
    let hash = Sha256::digest(raw_token.as_bytes());
    sqlx::query!(
        "INSERT INTO sessions (device_id, token_hash) VALUES ($1, $2)",
        device_id,
        hash.as_slice(),
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns the device id bound to a live (non-revoked) session token, the
/// same SHA-256-hash-comparison shape `auth::validate_token` already uses
/// for the forwarder/receiver device-token table.
pub async fn device_id_for_token(pool: &PgPool, raw_token: &str) -> Result<Option<String>, sqlx::Error> {
    let hash = Sha256::digest(raw_token.as_bytes());
    let row = sqlx::query!(
        "SELECT device_id FROM sessions WHERE token_hash = $1 AND revoked_at IS NULL",
        hash.as_slice()
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.device_id))
}
