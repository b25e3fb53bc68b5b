use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub struct CommandRow {
    pub command_id: Uuid,
    pub device_id: String,
    pub command_type: String,
    pub payload: Value,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AckOutcome {
    Applied,
    AlreadyTerminal,
    NotFound,
}

pub async fn queue(
    pool: &PgPool,
    device_id: &str,
    command_type: &str,
    payload: Value,
) -> Result<CommandRow, sqlx::Error> {
    let row = sqlx::query!(
        r#"INSERT INTO device_commands (device_id, command_type, payload)
           VALUES ($1, $2, $3)
           RETURNING command_id, device_id, command_type, payload, status, error, created_at, delivered_at, completed_at"#,
        device_id,
        command_type,
        payload,
    )
    .fetch_one(pool)
    .await?;
    Ok(CommandRow {
        command_id: row.command_id,
        device_id: row.device_id,
        command_type: row.command_type,
        payload: row.payload,
        status: row.status,
        error: row.error,
        created_at: row.created_at,
        delivered_at: row.delivered_at,
        completed_at: row.completed_at,
    })
}

/// Atomically claims every `pending` command for a device, in FIFO order,
/// transitioning each to `delivered`. The single `UPDATE ... RETURNING`
/// inside one transaction is what keeps two concurrent polls from handing
/// out the same command twice (§4.C, §8 universal invariant).
pub async fn poll_pending(pool: &PgPool, device_id: &str) -> Result<Vec<CommandRow>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let rows = sqlx::query!(
        r#"UPDATE device_commands
           SET status = 'delivered', delivered_at = now()
           WHERE command_id IN (
               SELECT command_id FROM device_commands
               WHERE device_id = $1 AND status = 'pending'
               ORDER BY created_at ASC
               FOR UPDATE
           )
           RETURNING command_id, device_id, command_type, payload, status, error, created_at, delivered_at, completed_at"#,
        device_id,
    )
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await?;

    let mut commands: Vec<CommandRow> = rows
        .into_iter()
        .map(|r| CommandRow {
            command_id: r.command_id,
            device_id: r.device_id,
            command_type: r.command_type,
            payload: r.payload,
            status: r.status,
            error: r.error,
            created_at: r.created_at,
            delivered_at: r.delivered_at,
            completed_at: r.completed_at,
        })
        .collect();
    commands.sort_by_key(|c| c.created_at);
    Ok(commands)
}

fn is_valid_predecessor(current: &str, next: &str) -> bool {
    matches!(
        (current, next),
        ("pending" | "delivered" | "executing", "executing")
            | ("pending" | "delivered" | "executing", "completed")
            | ("pending" | "delivered" | "executing", "failed")
    )
}

/// Idempotent-safe: a repeated ack of an already-terminal command is a
/// non-error no-op (§7, §8 round-trip property), not a failure the agent
/// needs to retry around.
pub async fn acknowledge(
    pool: &PgPool,
    command_id: Uuid,
    next_status: &str,
    error: Option<&str>,
) -> Result<AckOutcome, sqlx::Error> {
    let current = sqlx::query!(
        "SELECT status FROM device_commands WHERE command_id = $1",
        command_id
    )
    .fetch_optional(pool)
    .await?;

    let Some(current) = current else {
        return Ok(AckOutcome::NotFound);
    };

    if matches!(current.status.as_str(), "completed" | "failed" | "cancelled") {
        return Ok(AckOutcome::AlreadyTerminal);
    }

    if !is_valid_predecessor(&current.status, next_status) {
        return Ok(AckOutcome::AlreadyTerminal);
    }

    let is_terminal = matches!(next_status, "completed" | "failed");
    sqlx::query!(
        r#"UPDATE device_commands
           SET status = $2,
               error = $3,
               completed_at = CASE WHEN $4 THEN now() ELSE completed_at END
           WHERE command_id = $1"#,
        command_id,
        next_status,
        error,
        is_terminal,
    )
    .execute(pool)
    .await?;
    Ok(AckOutcome::Applied)
}

pub async fn cancel(pool: &PgPool, command_id: Uuid) -> Result<bool, sqlx::Error> {
    let row = sqlx::query!(
        "DELETE FROM device_commands WHERE command_id = $1 AND status = 'pending' RETURNING command_id",
        command_id
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Whether a not-yet-terminal command of this type is already queued for the
/// device — used to avoid stacking duplicate `SYNC_APPS` commands on every
/// heartbeat.
pub async fn has_pending_of_type(pool: &PgPool, device_id: &str, command_type: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query!(
        r#"SELECT command_id FROM device_commands
           WHERE device_id = $1 AND command_type = $2 AND status IN ('pending', 'delivered', 'executing')
           LIMIT 1"#,
        device_id,
        command_type,
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn history(pool: &PgPool, device_id: &str, limit: i64) -> Result<Vec<CommandRow>, sqlx::Error> {
    let rows = sqlx::query!(
        r#"SELECT command_id, device_id, command_type, payload, status, error, created_at, delivered_at, completed_at
           FROM device_commands WHERE device_id = $1 ORDER BY created_at DESC LIMIT $2"#,
        device_id,
        limit,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| CommandRow {
            command_id: r.command_id,
            device_id: r.device_id,
            command_type: r.command_type,
            payload: r.payload,
            status: r.status,
            error: r.error,
            created_at: r.created_at,
            delivered_at: r.delivered_at,
            completed_at: r.completed_at,
        })
        .collect())
}
