//! The Relay (§4.F): one long-lived binary socket per agent, multiplexed
//! into per-viewer channels. Grounded on `ws_forwarder.rs`'s accept →
//! auth-timeout → select!-loop → cleanup shape, generalized from JSON
//! `WsMessage` framing to the binary `Frame` codec, and from a single
//! fixed peer role (forwarder) to the agent/viewer split this spec needs.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{info, warn};

use relay_protocol::frame::message_type;
use relay_protocol::messages::{AgentInfo, AuthRequest, AuthResponse, DesktopOpenPayload, TelemetryData, TerminalOpenPayload};
use relay_protocol::{Frame, RelayCodec, CONTROL_CHANNEL};

use crate::auth::validate_session;
use crate::config::{RELAY_AUTH_TIMEOUT, RELAY_HEARTBEAT_INTERVAL, RELAY_HEARTBEAT_TIMEOUT};
use crate::registry::{AddOutcome, SessionType};
use crate::state::AppState;

const CLOSE_AUTH_TIMEOUT: u16 = 4001;
const CLOSE_AUTH_FAILED: u16 = 4003;
const CLOSE_AGENT_GONE: u16 = 4004;
const CLOSE_CHANNEL_ALLOC_FAILED: u16 = 4005;

async fn close_with(socket: &mut WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_owned().into(),
        })))
        .await;
}

async fn send_frame(socket: &mut WebSocket, codec: &mut RelayCodec, frame: Frame) -> bool {
    let mut buf = BytesMut::new();
    if codec.encode(frame, &mut buf).is_err() {
        return false;
    }
    socket.send(Message::Binary(buf.freeze())).await.is_ok()
}

pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let device_id = params.get("deviceId").cloned();
    let session = params.get("session").cloned();
    let token = params.get("token").cloned();

    match (device_id, session, token) {
        (Some(device_id), Some(session), Some(token)) => {
            let session_type = match session.as_str() {
                "desktop" => SessionType::Desktop,
                "terminal" => SessionType::Terminal,
                "files" => SessionType::Files,
                _ => return (axum::http::StatusCode::BAD_REQUEST, "unknown session type").into_response(),
            };
            // §9 open question: viewer credential is either a JWT (subject
            // becomes userId) or an opaque device session token (userId is
            // the literal "agent-session"). This stack carries no JWT
            // dependency anywhere, so only the session-token path is
            // implemented — see DESIGN.md.
            if validate_session(&state.pool, &token).await.is_none() {
                return (axum::http::StatusCode::UNAUTHORIZED, "unknown or revoked session token").into_response();
            }
            ws.on_upgrade(move |socket| handle_viewer_socket(socket, state, device_id, session_type, "agent-session".to_owned()))
        }
        _ => ws.on_upgrade(move |socket| handle_agent_socket(socket, state)),
    }
}

async fn handle_agent_socket(mut socket: WebSocket, state: AppState) {
    let mut codec = RelayCodec::new();
    let mut decode_buf = BytesMut::new();

    let auth_frame = match tokio::time::timeout(RELAY_AUTH_TIMEOUT, recv_frame(&mut socket, &mut codec, &mut decode_buf)).await {
        Ok(Some(frame)) if frame.message_type == message_type::AUTH_REQUEST => frame,
        Ok(Some(_)) => {
            close_with(&mut socket, CLOSE_AUTH_FAILED, "expected AUTH_REQUEST").await;
            return;
        }
        Ok(None) => return,
        Err(_) => {
            close_with(&mut socket, CLOSE_AUTH_TIMEOUT, "auth timeout").await;
            return;
        }
    };

    let Ok(auth) = auth_frame.decode_json::<AuthRequest>() else {
        close_with(&mut socket, CLOSE_AUTH_FAILED, "malformed AUTH_REQUEST").await;
        return;
    };

    let Some(device_id) = validate_session(&state.pool, &auth.session_token).await else {
        let response = AuthResponse {
            success: false,
            device_id: None,
            heartbeat_interval_secs: None,
            error: Some("unknown or revoked session token".to_owned()),
        };
        if let Ok(frame) = Frame::control_json(message_type::AUTH_RESPONSE, auth_frame.request_id, &response) {
            send_frame(&mut socket, &mut codec, frame).await;
        }
        close_with(&mut socket, CLOSE_AUTH_FAILED, "auth failed").await;
        return;
    };

    let _ = crate::repo::devices::touch_last_seen(
        &state.pool,
        &device_id,
        Some(&auth.agent_version),
        Some(&auth.os),
        Some(&auth.arch),
        Some(&auth.hostname),
    )
    .await;

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(64);
    if let AddOutcome::Replaced { evicted } = state.registry.add(&device_id, outbound_tx.clone()).await {
        // Dropping `evicted` closes its outbound channel; the stale socket
        // task's own `recv()` arm sees `None` next, breaks, and tears itself
        // down via `remove_if_current` below (a no-op against this entry).
        info!(device_id = %device_id, "evicting prior agent connection");
        drop(evicted);
    }
    state.registry.update_agent_info(&device_id, AgentInfo {
        agent_version: auth.agent_version.clone(),
        os: auth.os.clone(),
        arch: auth.arch.clone(),
        hostname: auth.hostname.clone(),
    }).await;

    let response = AuthResponse {
        success: true,
        device_id: Some(device_id.clone()),
        heartbeat_interval_secs: Some(RELAY_HEARTBEAT_INTERVAL.as_secs()),
        error: None,
    };
    if let Ok(frame) = Frame::control_json(message_type::AUTH_RESPONSE, auth_frame.request_id, &response) {
        if !send_frame(&mut socket, &mut codec, frame).await {
            state.registry.remove_if_current(&device_id, &outbound_tx).await;
            return;
        }
    }
    info!(device_id = %device_id, "agent authenticated");

    let mut heartbeat_interval = tokio::time::interval(RELAY_HEARTBEAT_INTERVAL);
    heartbeat_interval.tick().await;

    loop {
        tokio::select! {
            frame = tokio::time::timeout(RELAY_HEARTBEAT_TIMEOUT, recv_frame(&mut socket, &mut codec, &mut decode_buf)) => {
                match frame {
                    Ok(Some(frame)) => {
                        state.registry.update_heartbeat(&device_id).await;
                        let _ = crate::repo::devices::touch_last_seen(&state.pool, &device_id, None, None, None, None).await;
                        if let Err(reason) = route_from_agent(&state, &device_id, frame).await {
                            warn!(device_id = %device_id, error = %reason, "dropping malformed agent frame");
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        warn!(device_id = %device_id, "heartbeat timeout");
                        break;
                    }
                }
            }
            _ = heartbeat_interval.tick() => {
                let frame = Frame::control(message_type::HEARTBEAT, 0, Vec::new());
                if !send_frame(&mut socket, &mut codec, frame).await {
                    break;
                }
            }
            outgoing = outbound_rx.recv() => {
                let Some(outgoing) = outgoing else { break };
                if !send_frame(&mut socket, &mut codec, outgoing).await {
                    break;
                }
            }
        }
    }

    state.registry.remove_if_current(&device_id, &outbound_tx).await;
    info!(device_id = %device_id, "agent disconnected");
}

/// Agent → viewer routing, §4.F step 4.
async fn route_from_agent(state: &AppState, device_id: &str, frame: Frame) -> Result<(), &'static str> {
    if frame.channel == CONTROL_CHANNEL {
        match frame.message_type {
            message_type::AGENT_INFO => {
                let info: AgentInfo = frame.decode_json().map_err(|_| "malformed AGENT_INFO")?;
                state.registry.update_agent_info(device_id, info).await;
            }
            message_type::COMMAND_RESULT => {
                for viewer in state.registry.viewer_outbounds(device_id).await {
                    let _ = viewer.send(frame.clone()).await;
                }
            }
            message_type::TELEMETRY_DATA => {
                let sample: TelemetryData = frame.decode_json().map_err(|_| "malformed TELEMETRY_DATA")?;
                let previous = crate::repo::telemetry::previous_battery_percent(&state.pool, device_id)
                    .await
                    .unwrap_or(None);
                let _ = crate::repo::telemetry::upsert(&state.pool, device_id, &sample).await;
                if let Some(battery) = sample.battery_percent {
                    if let Some(event_type) = crate::repo::telemetry::battery_event(previous, battery) {
                        let _ = state
                            .event_bus
                            .publish(&state.pool, device_id, None, event_type, "warning", serde_json::json!({"battery_percent": battery}))
                            .await;
                    }
                }
                for viewer in state.registry.viewer_outbounds(device_id).await {
                    let _ = viewer.send(frame.clone()).await;
                }
            }
            message_type::HEARTBEAT => {
                if let Some(outbound) = state.registry.agent_outbound(device_id).await {
                    let ack = Frame::control(message_type::HEARTBEAT_ACK, frame.request_id, Vec::new());
                    let _ = outbound.send(ack).await;
                }
            }
            message_type::HEARTBEAT_ACK => {}
            _ => warn!(device_id = %device_id, message_type = frame.message_type, "unknown control message, dropping"),
        }
        return Ok(());
    }

    if let Some(outbound) = state.registry.viewer_outbound(device_id, frame.channel).await {
        let _ = outbound.send(frame).await;
    }
    Ok(())
}

async fn handle_viewer_socket(
    mut socket: WebSocket,
    state: AppState,
    device_id: String,
    session_type: SessionType,
    user_id: String,
) {
    let mut codec = RelayCodec::new();
    let mut decode_buf = BytesMut::new();

    if !state.registry.is_connected(&device_id).await {
        close_with(&mut socket, CLOSE_AGENT_GONE, "agent not connected").await;
        return;
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(64);
    let Some(channel_id) = state.registry.allocate_channel(&device_id, session_type, user_id, outbound_tx).await else {
        close_with(&mut socket, CLOSE_CHANNEL_ALLOC_FAILED, "channel allocation failed").await;
        return;
    };

    if let Some(agent_outbound) = state.registry.agent_outbound(&device_id).await {
        let open_frame = match session_type {
            SessionType::Desktop => Frame::session_json(
                message_type::DESKTOP_OPEN,
                channel_id,
                0,
                &DesktopOpenPayload { quality: 70, fps: 15, encoding: "jpeg".to_owned() },
            ),
            SessionType::Terminal => Frame::session_json(
                message_type::TERMINAL_OPEN,
                channel_id,
                0,
                &TerminalOpenPayload { cols: 80, rows: 24, shell: None },
            ),
            SessionType::Files => Ok(Frame::new(message_type::FILE_LIST_REQUEST, channel_id, 0, Vec::new())),
        };
        if let Ok(open_frame) = open_frame {
            let _ = agent_outbound.send(open_frame).await;
        }
    }

    loop {
        tokio::select! {
            frame = recv_frame(&mut socket, &mut codec, &mut decode_buf) => {
                let Some(frame) = frame else { break };
                if let Some(agent_outbound) = state.registry.agent_outbound(&device_id).await {
                    let rewritten = Frame::new(frame.message_type, channel_id, frame.request_id, frame.payload);
                    if agent_outbound.send(rewritten).await.is_err() {
                        break;
                    }
                } else {
                    close_with(&mut socket, CLOSE_AGENT_GONE, "agent disconnected").await;
                    break;
                }
            }
            outgoing = outbound_rx.recv() => {
                let Some(outgoing) = outgoing else {
                    close_with(&mut socket, CLOSE_AGENT_GONE, "agent disconnected").await;
                    break;
                };
                if !send_frame(&mut socket, &mut codec, outgoing).await {
                    break;
                }
            }
        }
    }

    if state.registry.remove_session(&device_id, channel_id).await.is_some() {
        if let Some(agent_outbound) = state.registry.agent_outbound(&device_id).await {
            let close_type = match session_type {
                SessionType::Desktop => Some(message_type::DESKTOP_CLOSE),
                SessionType::Terminal => Some(message_type::TERMINAL_CLOSE),
                SessionType::Files => Some(message_type::FILE_CLOSE),
            };
            if let Some(close_type) = close_type {
                let _ = agent_outbound.send(Frame::new(close_type, channel_id, 0, Vec::new())).await;
            }
        }
    }
    info!(device_id = %device_id, channel_id, "viewer session ended");
}

async fn recv_frame(socket: &mut WebSocket, codec: &mut RelayCodec, buf: &mut BytesMut) -> Option<Frame> {
    loop {
        if let Ok(Some(frame)) = codec.decode(buf) {
            return Some(frame);
        }
        match socket.recv().await {
            Some(Ok(Message::Binary(bytes))) => buf.extend_from_slice(&bytes),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(Message::Text(_))) => continue,
            Some(Err(_)) => return None,
        }
    }
}

/// Periodic stale-connection sweep (§4.F step 3, §5 cancellation rules):
/// closes any agent whose heartbeat has gone silent past the threshold.
/// Spawned once at startup alongside the router.
pub async fn run_stale_scanner(state: AppState) {
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        ticker.tick().await;
        for device_id in state.registry.stale_devices(RELAY_HEARTBEAT_TIMEOUT).await {
            if let Some(conn) = state.registry.remove(&device_id).await {
                warn!(device_id = %device_id, "stale scanner closing connection");
                drop(conn);
            }
        }
    }
}
