//! JSON payloads carried on control-channel and session-setup frames.
//!
//! These travel inside [`crate::frame::Frame::payload`] — the frame header
//! carries the message type code, these structs carry the body.

use serde::{Deserialize, Serialize};

/// Sent by the agent immediately after the TCP/TLS handshake, on
/// `message_type::AUTH_REQUEST`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub session_token: String,
    pub agent_version: String,
    pub os: String,
    pub arch: String,
    pub hostname: String,
}

/// Server's reply on `message_type::AUTH_RESPONSE`. Authentication failure
/// is terminal: the server closes the socket after sending this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Agent self-description, re-sent whenever agent version or OS metadata
/// changes (not only at connect time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_version: String,
    pub os: String,
    pub arch: String,
    pub hostname: String,
}

/// Terminal status for a previously dispatched command, on
/// `message_type::COMMAND_RESULT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command_id: String,
    pub status: CommandOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Succeeded,
    Failed,
    Rejected,
}

/// Point-in-time device telemetry sample, on `message_type::TELEMETRY_DATA`.
/// All fields are optional: an agent reports whatever it can observe on its
/// platform and omits the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_charging: Option<bool>,
}

/// Viewer-issued setup payload for `message_type::DESKTOP_OPEN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopOpenPayload {
    pub quality: u8,
    pub fps: u8,
    pub encoding: String,
}

/// Viewer-issued setup payload for `message_type::TERMINAL_OPEN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalOpenPayload {
    pub cols: u16,
    pub rows: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalResizePayload {
    pub cols: u16,
    pub rows: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListRequestPayload {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListResponsePayload {
    pub path: String,
    pub entries: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDownloadRequestPayload {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUploadRequestPayload {
    pub path: String,
    pub total_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDeletePayload {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileErrorPayload {
    pub message: String,
}
