//! Pairing State Machine (§4.B). Kept in-memory per §6 ("pairing may be
//! in-memory only") and §9's design note that lazy-expiry state needs no
//! background job — only the relay's stale scanner needs a timer. Shaped
//! after `state.rs`'s `active_receiver_sessions` map: one `RwLock<HashMap>`
//! guarding the whole critical section, since the code index and the
//! session map must update together to preserve code uniqueness.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{Rng, RngCore};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::config::PAIRING_TTL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    Pending,
    Paired,
    Expired,
}

impl PairingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PairingStatus::Pending => "pending",
            PairingStatus::Paired => "paired",
            PairingStatus::Expired => "expired",
        }
    }
}

#[derive(Clone)]
pub struct PairingSession {
    pub device_id: String,
    pub code: String,
    pub device_name: Option<String>,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub status: PairingStatus,
    pub session_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("invalid pairing code")]
    InvalidCode,
    #[error("pairing code has expired")]
    Expired,
    #[error("no pairing session for this device")]
    NotFound,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, PairingSession>,
    code_index: HashMap<String, String>,
}

#[derive(Clone)]
pub struct PairingRegistry {
    inner: Arc<RwLock<Inner>>,
}

fn generate_code(existing: &HashMap<String, String>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let code: String = (0..6).map(|_| rng.gen_range(0..10).to_string()).collect();
        if !existing.contains_key(&code) {
            return code;
        }
    }
}

pub fn generate_device_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("device-{}", URL_SAFE_NO_PAD.encode(bytes))
}

impl PairingRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    pub async fn initiate(&self, device_id: String, device_name: Option<String>) -> (String, Instant) {
        let mut inner = self.inner.write().await;
        let code = generate_code(&inner.code_index);
        let now = Instant::now();
        let expires_at = now + PAIRING_TTL;
        inner.code_index.insert(code.clone(), device_id.clone());
        inner.sessions.insert(
            device_id.clone(),
            PairingSession {
                device_id,
                code: code.clone(),
                device_name,
                created_at: now,
                expires_at,
                status: PairingStatus::Pending,
                session_token: None,
            },
        );
        (code, expires_at)
    }

    /// Atomically transitions `pending -> paired` iff the code is live.
    /// Double-complete and unknown codes both report `InvalidCode` (§4.B's
    /// deliberate oracle-reduction for the complete endpoint, per §7).
    pub async fn complete_by_code(&self, code: &str) -> Result<(String, String, Option<String>), PairingError> {
        let mut inner = self.inner.write().await;
        let Some(device_id) = inner.code_index.get(code).cloned() else {
            return Err(PairingError::InvalidCode);
        };

        let now = Instant::now();
        let session = inner.sessions.get_mut(&device_id).ok_or(PairingError::InvalidCode)?;

        if session.status != PairingStatus::Pending {
            return Err(PairingError::InvalidCode);
        }
        if now > session.expires_at {
            session.status = PairingStatus::Expired;
            return Err(PairingError::Expired);
        }

        let mut token_bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut token_bytes);
        let token = URL_SAFE_NO_PAD.encode(token_bytes);

        session.status = PairingStatus::Paired;
        session.session_token = Some(token.clone());
        let device_name = session.device_name.clone();
        inner.code_index.remove(code);

        Ok((device_id, token, device_name))
    }

    /// Read with lazy expiry: a `pending` session past its TTL is flipped to
    /// `expired` on the way out, per §9's "observed on next access" rule.
    pub async fn status(&self, device_id: &str) -> Result<(PairingStatus, Option<String>), PairingError> {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.get_mut(device_id).ok_or(PairingError::NotFound)?;

        if session.status == PairingStatus::Pending && Instant::now() > session.expires_at {
            session.status = PairingStatus::Expired;
        }

        let session = inner.sessions.get(device_id).unwrap();
        Ok((session.status, session.session_token.clone()))
    }
}

impl Default for PairingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initiate_then_complete_yields_a_session_token() {
        let registry = PairingRegistry::new();
        let (code, _) = registry.initiate("device-1".into(), None).await;
        let (device_id, token, _device_name) = registry.complete_by_code(&code).await.unwrap();
        assert_eq!(device_id, "device-1");
        assert!(!token.is_empty());
    }

    #[tokio::test]
    async fn double_complete_reports_invalid_code() {
        let registry = PairingRegistry::new();
        let (code, _) = registry.initiate("device-1".into(), None).await;
        registry.complete_by_code(&code).await.unwrap();
        let second = registry.complete_by_code(&code).await;
        assert!(matches!(second, Err(PairingError::InvalidCode)));
    }

    #[tokio::test]
    async fn unknown_code_reports_invalid_code() {
        let registry = PairingRegistry::new();
        assert!(matches!(
            registry.complete_by_code("000000").await,
            Err(PairingError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn status_after_successful_pairing_is_paired_with_token() {
        let registry = PairingRegistry::new();
        let (code, _) = registry.initiate("device-1".into(), None).await;
        registry.complete_by_code(&code).await.unwrap();
        let (status, token) = registry.status("device-1").await.unwrap();
        assert_eq!(status, PairingStatus::Paired);
        assert!(token.is_some());
    }

    #[tokio::test]
    async fn status_on_unknown_device_is_not_found() {
        let registry = PairingRegistry::new();
        assert!(matches!(registry.status("nope").await, Err(PairingError::NotFound)));
    }

    #[tokio::test]
    async fn generated_codes_are_six_digits() {
        let registry = PairingRegistry::new();
        let (code, _) = registry.initiate("device-1".into(), None).await;
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test(start_paused = true)]
    async fn completing_after_the_ttl_reports_expired_and_status_agrees() {
        let registry = PairingRegistry::new();
        let (code, _) = registry.initiate("device-1".into(), None).await;

        tokio::time::advance(crate::config::PAIRING_TTL + std::time::Duration::from_secs(1)).await;

        assert!(matches!(
            registry.complete_by_code(&code).await,
            Err(PairingError::Expired)
        ));
        let (status, _) = registry.status("device-1").await.unwrap();
        assert_eq!(status, PairingStatus::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_exactly_at_expiry_still_succeeds() {
        let registry = PairingRegistry::new();
        let (code, _) = registry.initiate("device-1".into(), None).await;

        tokio::time::advance(crate::config::PAIRING_TTL).await;

        assert!(registry.complete_by_code(&code).await.is_ok());
    }
}
