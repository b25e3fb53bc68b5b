//! Admin Socket (§4.I): a filtered live view over the event bus. Each
//! socket owns one mutable `SubscriptionFilters` and a dedicated broadcast
//! receiver; the select! loop combining inbound control messages with
//! outbound bus events follows the same shape as the relay's agent loop.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};

use relay_protocol::{AdminClientMessage, AdminServerMessage, SubscriptionFilters};

use crate::state::AppState;

pub async fn admin_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_admin_socket(socket, state))
}

async fn handle_admin_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut filters = SubscriptionFilters::default();
    let mut events = state.event_bus.subscribe();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(client_msg) = serde_json::from_str::<AdminClientMessage>(&text) else { continue };
                        let reply = match client_msg {
                            AdminClientMessage::Subscribe { filters: new_filters } => {
                                filters = new_filters;
                                AdminServerMessage::Subscribed { filters: filters.clone() }
                            }
                            AdminClientMessage::Unsubscribe => {
                                filters = SubscriptionFilters::default();
                                AdminServerMessage::Subscribed { filters: filters.clone() }
                            }
                            AdminClientMessage::Ping => AdminServerMessage::Pong {
                                timestamp: Utc::now().to_rfc3339(),
                            },
                        };
                        if let Ok(json) = serde_json::to_string(&reply) {
                            if sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            event = events.recv() => {
                let Ok(event) = event else { continue };
                if !filters.matches(&event.device_id, &event.event_type, event.group_id.as_deref()) {
                    continue;
                }
                let reply = AdminServerMessage::Event { event };
                if let Ok(json) = serde_json::to_string(&reply) {
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}
