//! Agent Connection Registry (§4.E): the one shared mutable structure the
//! relay touches. Keyed by device id, it owns the live agent socket's
//! outbound channel plus its viewer sessions, and hands out monotonic
//! channel ids the way `state.rs`'s `broadcast_registry` hands out
//! per-stream broadcast senders.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};

use relay_protocol::messages::AgentInfo;

pub type FrameSender = mpsc::Sender<relay_protocol::Frame>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionType {
    Desktop,
    Terminal,
    Files,
}

pub struct ViewerSession {
    pub channel_id: u16,
    pub session_type: SessionType,
    pub user_id: String,
    pub outbound: FrameSender,
}

pub struct AgentConnection {
    pub device_id: String,
    pub outbound: FrameSender,
    pub info: Option<AgentInfo>,
    pub last_heartbeat: Instant,
    pub next_channel_id: u16,
    pub sessions: HashMap<u16, ViewerSession>,
}

impl AgentConnection {
    fn new(device_id: String, outbound: FrameSender) -> Self {
        Self {
            device_id,
            outbound,
            info: None,
            last_heartbeat: Instant::now(),
            next_channel_id: 1,
            sessions: HashMap::new(),
        }
    }
}

/// What `add` did to the registry, so the caller knows whether to evict a
/// previous socket.
pub enum AddOutcome {
    Fresh,
    Replaced { evicted: AgentConnection },
}

#[derive(Default, Clone)]
pub struct Registry {
    connections: Arc<RwLock<HashMap<String, AgentConnection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, device_id: &str, outbound: FrameSender) -> AddOutcome {
        let mut map = self.connections.write().await;
        let conn = AgentConnection::new(device_id.to_owned(), outbound);
        match map.insert(device_id.to_owned(), conn) {
            Some(evicted) => AddOutcome::Replaced { evicted },
            None => AddOutcome::Fresh,
        }
    }

    pub async fn remove(&self, device_id: &str) -> Option<AgentConnection> {
        self.connections.write().await.remove(device_id)
    }

    /// Removes the entry only if it's still the connection identified by
    /// `outbound` — guards against a just-reconnected agent's socket task
    /// tearing down the replacement that evicted it, once its own outbound
    /// channel closes out from under it.
    pub async fn remove_if_current(&self, device_id: &str, outbound: &FrameSender) -> Option<AgentConnection> {
        let mut map = self.connections.write().await;
        if map.get(device_id).is_some_and(|conn| conn.outbound.same_channel(outbound)) {
            map.remove(device_id)
        } else {
            None
        }
    }

    pub async fn update_agent_info(&self, device_id: &str, info: AgentInfo) {
        if let Some(conn) = self.connections.write().await.get_mut(device_id) {
            conn.info = Some(info);
        }
    }

    pub async fn update_heartbeat(&self, device_id: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(device_id) {
            conn.last_heartbeat = Instant::now();
        }
    }

    /// Allocates a channel id and registers the viewer session under it.
    /// Returns `None` if the agent isn't connected.
    pub async fn allocate_channel(
        &self,
        device_id: &str,
        session_type: SessionType,
        user_id: String,
        outbound: FrameSender,
    ) -> Option<u16> {
        let mut map = self.connections.write().await;
        let conn = map.get_mut(device_id)?;
        let channel_id = conn.next_channel_id;
        conn.next_channel_id = conn.next_channel_id.checked_add(1)?;
        conn.sessions.insert(
            channel_id,
            ViewerSession {
                channel_id,
                session_type,
                user_id,
                outbound,
            },
        );
        Some(channel_id)
    }

    pub async fn remove_session(&self, device_id: &str, channel_id: u16) -> Option<ViewerSession> {
        self.connections
            .write()
            .await
            .get_mut(device_id)
            .and_then(|conn| conn.sessions.remove(&channel_id))
    }

    pub async fn agent_outbound(&self, device_id: &str) -> Option<FrameSender> {
        self.connections
            .read()
            .await
            .get(device_id)
            .map(|conn| conn.outbound.clone())
    }

    pub async fn viewer_outbound(&self, device_id: &str, channel_id: u16) -> Option<FrameSender> {
        self.connections
            .read()
            .await
            .get(device_id)
            .and_then(|conn| conn.sessions.get(&channel_id))
            .map(|session| session.outbound.clone())
    }

    pub async fn viewer_outbounds(&self, device_id: &str) -> Vec<FrameSender> {
        self.connections
            .read()
            .await
            .get(device_id)
            .map(|conn| conn.sessions.values().map(|s| s.outbound.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn is_connected(&self, device_id: &str) -> bool {
        self.connections.read().await.contains_key(device_id)
    }

    /// Devices whose last heartbeat is older than `threshold`.
    pub async fn stale_devices(&self, threshold: Duration) -> Vec<String> {
        let now = Instant::now();
        self.connections
            .read()
            .await
            .iter()
            .filter(|(_, conn)| now.duration_since(conn.last_heartbeat) > threshold)
            .map(|(device_id, _)| device_id.clone())
            .collect()
    }
}
