//! JSON message vocabulary for the operator admin socket (`/admin/stream`).
//!
//! The admin socket is a read-mostly fan-out of the in-process event bus:
//! an operator subscribes with a filter and receives a live feed of events
//! matching it, without touching per-device relay state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Empty sets mean "match everything" for that dimension — see
/// `SubscriptionFilters::matches`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilters {
    #[serde(default, rename = "deviceIds", skip_serializing_if = "HashSet::is_empty")]
    pub device_ids: HashSet<String>,
    #[serde(default, rename = "eventTypes", skip_serializing_if = "HashSet::is_empty")]
    pub event_types: HashSet<String>,
    #[serde(default, rename = "groupIds", skip_serializing_if = "HashSet::is_empty")]
    pub group_ids: HashSet<String>,
}

impl SubscriptionFilters {
    pub fn matches(&self, device_id: &str, event_type: &str, group_id: Option<&str>) -> bool {
        let device_ok = self.device_ids.is_empty() || self.device_ids.contains(device_id);
        let type_ok = self.event_types.is_empty() || self.event_types.contains(event_type);
        let group_ok = self.group_ids.is_empty()
            || group_id.is_some_and(|g| self.group_ids.contains(g));
        device_ok && type_ok && group_ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminClientMessage {
    Subscribe {
        #[serde(default)]
        filters: SubscriptionFilters,
    },
    Unsubscribe,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminServerMessage {
    Subscribed { filters: SubscriptionFilters },
    Pong { timestamp: String },
    Event { event: DeviceEventMessage },
    Error { code: String, message: String },
}

/// Wire shape of one event-bus item as delivered to an admin subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEventMessage {
    pub event_id: String,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub event_type: String,
    pub occurred_at: String,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filters_match_everything() {
        let filters = SubscriptionFilters::default();
        assert!(filters.matches("dev-1", "online", None));
        assert!(filters.matches("dev-2", "anything", Some("g1")));
    }

    #[test]
    fn non_empty_filters_require_membership() {
        let mut filters = SubscriptionFilters::default();
        filters.device_ids.insert("dev-1".to_owned());
        assert!(filters.matches("dev-1", "online", None));
        assert!(!filters.matches("dev-2", "online", None));
    }

    #[test]
    fn group_filter_excludes_ungrouped_events() {
        let mut filters = SubscriptionFilters::default();
        filters.group_ids.insert("g1".to_owned());
        assert!(!filters.matches("dev-1", "online", None));
        assert!(filters.matches("dev-1", "online", Some("g1")));
        assert!(!filters.matches("dev-1", "online", Some("g2")));
    }

    #[test]
    fn subscribe_message_defaults_filters_when_absent() {
        let msg: AdminClientMessage = serde_json::from_str(r#"{"type":"subscribe"}"#).unwrap();
        assert!(matches!(msg, AdminClientMessage::Subscribe { filters } if filters.device_ids.is_empty()));
    }

    #[test]
    fn pong_carries_a_server_timestamp() {
        let msg = AdminServerMessage::Pong {
            timestamp: "2026-07-31T00:00:00Z".to_owned(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "pong");
        assert_eq!(json["timestamp"], "2026-07-31T00:00:00Z");
    }
}
