//! JSON message vocabulary for the WebRTC signaling switchboard (`/ws/signal`).
//!
//! Unlike the relay's binary frames, signaling is pure JSON over a text
//! WebSocket — there is no SDP/ICE parsing here, only opaque pass-through
//! of values the browser's WebRTC stack produced.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Device,
    Controller,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(rename = "usernameFragment", skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Inbound messages, client to switchboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalingClientMessage {
    #[serde(rename = "join")]
    Join {
        #[serde(rename = "deviceId")]
        device_id: String,
        role: PeerRole,
    },
    #[serde(rename = "offer")]
    Offer { sdp: String },
    #[serde(rename = "answer")]
    Answer { sdp: String },
    #[serde(rename = "ice-candidate")]
    IceCandidate { candidate: IceCandidate },
    #[serde(rename = "leave")]
    Leave,
}

/// Outbound messages, switchboard to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalingServerMessage {
    #[serde(rename = "joined")]
    Joined {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "peerPresent")]
        peer_present: bool,
    },
    #[serde(rename = "peer-joined")]
    PeerJoined { role: PeerRole },
    #[serde(rename = "peer-left")]
    PeerLeft { role: PeerRole },
    #[serde(rename = "offer")]
    Offer { sdp: String },
    #[serde(rename = "answer")]
    Answer { sdp: String },
    #[serde(rename = "ice-candidate")]
    IceCandidate { candidate: IceCandidate },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_message_tag_is_kebab_case_and_fields_are_camel_case() {
        let msg = SignalingClientMessage::Join {
            device_id: "dev-1".to_owned(),
            role: PeerRole::Controller,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "join");
        assert_eq!(json["deviceId"], "dev-1");
        assert_eq!(json["role"], "controller");
    }

    #[test]
    fn ice_candidate_tag_is_hyphenated() {
        let msg = SignalingServerMessage::IceCandidate {
            candidate: IceCandidate {
                candidate: "candidate:1 1 UDP 1 0.0.0.0 1 typ host".to_owned(),
                sdp_mid: Some("0".to_owned()),
                sdp_m_line_index: Some(0),
                username_fragment: None,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ice-candidate");
        assert_eq!(json["candidate"]["sdpMid"], "0");
        assert!(json["candidate"].get("usernameFragment").is_none());
    }

    #[test]
    fn parses_a_raw_offer_message() {
        let raw = r#"{"type":"offer","sdp":"v=0..."}"#;
        let msg: SignalingClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, SignalingClientMessage::Offer { sdp } if sdp == "v=0..."));
    }
}
