//! Admin Event Bus (§4.D): persist a `DeviceEvent` row, then fan it out to
//! every subscribed admin socket. Built on `tokio::sync::broadcast`, the
//! same primitive `state.rs`'s `broadcast_registry` already reaches for
//! per-stream fan-out, generalized here to a single bus shared by all
//! admin-socket subscribers rather than one channel per key.

use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::broadcast;

use relay_protocol::DeviceEventMessage;

const BUS_CAPACITY: usize = 4096;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DeviceEventMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEventMessage> {
        self.tx.subscribe()
    }

    /// Persists the event, then publishes it. A subscriber that's lagging or
    /// gone is not this call's problem — fan-out is best-effort, per §4.D's
    /// "subscriber failures are isolated" rule.
    pub async fn publish(
        &self,
        pool: &PgPool,
        device_id: &str,
        group_id: Option<&str>,
        event_type: &str,
        severity: &str,
        data: Value,
    ) -> Result<DeviceEventMessage, sqlx::Error> {
        let row = crate::repo::device_events::insert(pool, device_id, event_type, severity, data.clone()).await?;
        let message = DeviceEventMessage {
            event_id: row.event_id.to_string(),
            device_id: device_id.to_owned(),
            group_id: group_id.map(ToOwned::to_owned),
            event_type: event_type.to_owned(),
            occurred_at: row.created_at.to_rfc3339(),
            data,
        };
        let _ = self.tx.send(message.clone());
        Ok(message)
    }

    /// Publishes without a prior persisted row id — used for events this
    /// stack treats as transient, like command lifecycle notifications that
    /// are already durable as `device_commands` rows.
    pub fn publish_ephemeral(&self, device_id: &str, event_type: &str, data: Value) {
        let message = DeviceEventMessage {
            event_id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_owned(),
            group_id: None,
            event_type: event_type.to_owned(),
            occurred_at: Utc::now().to_rfc3339(),
            data,
        };
        let _ = self.tx.send(message);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_ephemeral_fans_out_to_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish_ephemeral("device-1", "command-completed", serde_json::json!({"command_id": "c-1"}));
        let event = rx.try_recv().expect("should receive the event");
        assert_eq!(event.device_id, "device-1");
        assert_eq!(event.event_type, "command-completed");
    }

    #[test]
    fn a_subscriber_added_after_publish_does_not_see_past_events() {
        let bus = EventBus::new();
        bus.publish_ephemeral("device-1", "battery-low", serde_json::json!({}));
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn multiple_subscribers_each_receive_their_own_copy() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish_ephemeral("device-1", "battery-critical", serde_json::json!({}));
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }
}
