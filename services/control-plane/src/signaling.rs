//! WebRTC Signaling Switchboard (§4.G). A room registry plus a single
//! WebSocket handler that relays JSON verbatim between the two peers of a
//! room. Grounded on `ws_common.rs`'s JSON-over-`Message::Text` helpers —
//! there's no prior teacher file for room-based relaying, so the socket
//! loop itself follows `ws_forwarder.rs`'s accept/select!/cleanup shape.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::info;

use relay_protocol::{PeerRole, SignalingClientMessage, SignalingServerMessage};

use crate::state::AppState;

type PeerSender = mpsc::UnboundedSender<SignalingServerMessage>;

#[derive(Default)]
struct Room {
    device: Option<PeerSender>,
    controller: Option<PeerSender>,
}

impl Room {
    fn is_empty(&self) -> bool {
        self.device.is_none() && self.controller.is_none()
    }

    fn slot(&mut self, role: PeerRole) -> &mut Option<PeerSender> {
        match role {
            PeerRole::Device => &mut self.device,
            PeerRole::Controller => &mut self.controller,
        }
    }

    fn counterpart(&self, role: PeerRole) -> Option<&PeerSender> {
        match role {
            PeerRole::Device => self.controller.as_ref(),
            PeerRole::Controller => self.device.as_ref(),
        }
    }
}

fn other_role(role: PeerRole) -> PeerRole {
    match role {
        PeerRole::Device => PeerRole::Controller,
        PeerRole::Controller => PeerRole::Device,
    }
}

#[derive(Default, Clone)]
pub struct SignalingRegistry {
    rooms: Arc<RwLock<HashMap<String, Room>>>,
}

impl SignalingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok(None)` means admission with no notification yet (room was
    /// empty); `Ok(Some(tx))` means the counterpart is present and should
    /// be told `peer-joined`.
    async fn join(
        &self,
        device_id: &str,
        role: PeerRole,
        tx: PeerSender,
    ) -> Result<Option<PeerSender>, ()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(device_id.to_owned()).or_default();
        if room.slot(role).is_some() {
            return Err(());
        }
        *room.slot(role) = Some(tx);
        Ok(room.counterpart(role).cloned())
    }

    async fn relay_to_counterpart(&self, device_id: &str, role: PeerRole) -> Option<PeerSender> {
        self.rooms
            .read()
            .await
            .get(device_id)
            .and_then(|room| room.counterpart(role).cloned())
    }

    async fn leave(&self, device_id: &str, role: PeerRole) -> Option<PeerSender> {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(device_id) else {
            return None;
        };
        *room.slot(role) = None;
        let counterpart = room.counterpart(role).cloned();
        if room.is_empty() {
            rooms.remove(device_id);
        }
        counterpart
    }
}

pub async fn signaling_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_signaling_socket(socket, state))
}

async fn handle_signaling_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<SignalingServerMessage>();

    let mut joined: Option<(String, PeerRole)> = None;

    loop {
        tokio::select! {
            outgoing = out_rx.recv() => {
                let Some(outgoing) = outgoing else { break };
                if let Ok(json) = serde_json::to_string(&outgoing) {
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
            incoming = stream.next() => {
                let Some(Ok(Message::Text(text))) = incoming else { break };
                let Ok(client_msg) = serde_json::from_str::<SignalingClientMessage>(&text) else { continue };

                match client_msg {
                    SignalingClientMessage::Join { device_id, role } => {
                        if joined.is_some() {
                            continue;
                        }
                        match state.signaling.join(&device_id, role, out_tx.clone()).await {
                            Ok(Some(counterpart)) => {
                                let _ = out_tx.send(SignalingServerMessage::Joined {
                                    device_id: device_id.clone(),
                                    peer_present: true,
                                });
                                let _ = counterpart.send(SignalingServerMessage::PeerJoined { role: other_role(role) });
                                let _ = out_tx.send(SignalingServerMessage::PeerJoined { role: other_role(role) });
                                joined = Some((device_id, role));
                            }
                            Ok(None) => {
                                let _ = out_tx.send(SignalingServerMessage::Joined {
                                    device_id: device_id.clone(),
                                    peer_present: false,
                                });
                                joined = Some((device_id, role));
                            }
                            Err(()) => {
                                let _ = out_tx.send(SignalingServerMessage::Error {
                                    code: "ROLE_TAKEN".to_owned(),
                                    message: format!("role {role:?} already taken"),
                                });
                            }
                        }
                    }
                    SignalingClientMessage::Leave => {
                        let Some((device_id, role)) = joined.take() else { continue };
                        if let Some(counterpart) = state.signaling.leave(&device_id, role).await {
                            let _ = counterpart.send(SignalingServerMessage::PeerLeft { role });
                        }
                    }
                    other => {
                        let Some((device_id, role)) = &joined else { continue };
                        if let Some(counterpart) = state.signaling.relay_to_counterpart(device_id, *role).await {
                            let server_msg = match other {
                                SignalingClientMessage::Offer { sdp } => SignalingServerMessage::Offer { sdp },
                                SignalingClientMessage::Answer { sdp } => SignalingServerMessage::Answer { sdp },
                                SignalingClientMessage::IceCandidate { candidate } => {
                                    SignalingServerMessage::IceCandidate { candidate }
                                }
                                SignalingClientMessage::Leave | SignalingClientMessage::Join { .. } => continue,
                            };
                            let _ = counterpart.send(server_msg);
                        }
                    }
                }
            }
        }
    }

    if let Some((device_id, role)) = joined {
        if let Some(counterpart) = state.signaling.leave(&device_id, role).await {
            let _ = counterpart.send(SignalingServerMessage::PeerLeft { role });
        }
        info!(device_id = %device_id, role = ?role, "signaling peer left");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> (PeerSender, mpsc::UnboundedReceiver<SignalingServerMessage>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn first_peer_in_an_empty_room_gets_no_notification() {
        let registry = SignalingRegistry::new();
        let (tx, _rx) = sender();
        let result = registry.join("device-1", PeerRole::Device, tx).await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn second_peer_learns_about_the_first() {
        let registry = SignalingRegistry::new();
        let (device_tx, _device_rx) = sender();
        registry.join("device-1", PeerRole::Device, device_tx).await.unwrap();

        let (controller_tx, _controller_rx) = sender();
        let result = registry.join("device-1", PeerRole::Controller, controller_tx).await;
        assert!(result.unwrap().is_some());
    }

    #[tokio::test]
    async fn joining_an_occupied_role_is_rejected() {
        let registry = SignalingRegistry::new();
        let (tx1, _rx1) = sender();
        registry.join("device-1", PeerRole::Device, tx1).await.unwrap();
        let (tx2, _rx2) = sender();
        assert!(registry.join("device-1", PeerRole::Device, tx2).await.is_err());
    }

    #[tokio::test]
    async fn leaving_an_empty_room_garbage_collects_it() {
        let registry = SignalingRegistry::new();
        let (tx, _rx) = sender();
        registry.join("device-1", PeerRole::Device, tx).await.unwrap();
        registry.leave("device-1", PeerRole::Device).await;
        assert!(registry.rooms.read().await.get("device-1").is_none());
    }
}
