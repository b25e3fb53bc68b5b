use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

pub struct EnrollmentTokenRow {
    pub token_id: Uuid,
    pub max_uses: i32,
    pub used_count: i32,
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

pub enum RedeemOutcome {
    Ok,
    Invalid,
    Expired,
    Exhausted,
}

pub async fn create_token(
    pool: &PgPool,
    raw_token: &str,
    label: Option<&str>,
    max_uses: i32,
    expires_at: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error> {
    let hash = Sha256::digest(raw_token.as_bytes());
    let row = sqlx::query!(
        r#"INSERT INTO enrollment_tokens (token_hash, label, max_uses, expires_at)
           VALUES ($1, $2, $3, $4) RETURNING token_id"#,
        hash.as_slice(),
        label,
        max_uses,
        expires_at,
    )
    .fetch_one(pool)
    .await?;
    Ok(row.token_id)
}

/// Atomically validates and consumes one use of an enrollment token,
/// mirroring `repo::events::upsert_event`'s existing-row-check pattern but
/// folding the bound checks into the `UPDATE ... RETURNING` itself so two
/// concurrent redemptions can't both succeed past `max_uses`.
pub async fn redeem_token(pool: &PgPool, raw_token: &str) -> Result<RedeemOutcome, sqlx::Error> {
    let hash = Sha256::digest(raw_token.as_bytes());
    let row = sqlx::query!(
        r#"SELECT token_id, status, expires_at, used_count, max_uses
           FROM enrollment_tokens WHERE token_hash = $1"#,
        hash.as_slice()
    )
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(RedeemOutcome::Invalid);
    };

    if row.status == "revoked" {
        return Ok(RedeemOutcome::Invalid);
    }
    if Utc::now() > row.expires_at {
        sqlx::query!(
            "UPDATE enrollment_tokens SET status = 'expired' WHERE token_id = $1 AND status = 'active'",
            row.token_id
        )
        .execute(pool)
        .await?;
        return Ok(RedeemOutcome::Expired);
    }
    if row.used_count >= row.max_uses {
        return Ok(RedeemOutcome::Exhausted);
    }

    let updated = sqlx::query!(
        r#"UPDATE enrollment_tokens
           SET used_count = used_count + 1,
               status = CASE WHEN used_count + 1 >= max_uses THEN 'exhausted' ELSE status END
           WHERE token_id = $1 AND used_count < max_uses
           RETURNING token_id"#,
        row.token_id
    )
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(_) => Ok(RedeemOutcome::Ok),
        None => Ok(RedeemOutcome::Exhausted),
    }
}

pub async fn revoke_token(pool: &PgPool, token_id: Uuid) -> Result<bool, sqlx::Error> {
    let row = sqlx::query!(
        r#"UPDATE enrollment_tokens SET status = 'revoked' WHERE token_id = $1 AND status != 'revoked' RETURNING token_id"#,
        token_id
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn list_tokens(pool: &PgPool) -> Result<Vec<EnrollmentTokenRow>, sqlx::Error> {
    let rows = sqlx::query!(
        r#"SELECT token_id, max_uses, used_count, status, expires_at
           FROM enrollment_tokens ORDER BY created_at ASC"#
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| EnrollmentTokenRow {
            token_id: r.token_id,
            max_uses: r.max_uses,
            used_count: r.used_count,
            status: r.status,
            expires_at: r.expires_at,
        })
        .collect())
}
