pub mod listener;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use utoipa::ToSchema;

pub use listener::StateListener;

/// New state of an entity as reported by the home automation host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EntityState {
    pub state: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub attributes: Map<String, Value>,
    pub last_updated: DateTime<Utc>,
}

/// State-change notification. `new_state` is `None` when the entity was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StateChangedEvent {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<EntityState>,
}

/// Fan-out channel for local state-change notifications.
///
/// Cheap to clone; every clone publishes into the same channel. Delivery
/// order per subscriber matches publish order.
#[derive(Debug, Clone)]
pub struct StateBus {
    tx: broadcast::Sender<StateChangedEvent>,
}

impl StateBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Returns how many subscribers will see it; zero when
    /// nothing is listening (the event is dropped).
    pub fn publish(&self, event: StateChangedEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChangedEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StateBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn removed(entity_id: &str) -> StateChangedEvent {
        StateChangedEvent {
            entity_id: entity_id.to_owned(),
            new_state: None,
        }
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let bus = StateBus::new(8);
        assert_eq!(bus.publish(removed("sensor.a")), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let bus = StateBus::new(8);
        let mut rx = bus.subscribe();

        assert_eq!(bus.publish(removed("sensor.a")), 1);
        bus.publish(removed("sensor.b"));

        assert_eq!(rx.recv().await.unwrap().entity_id, "sensor.a");
        assert_eq!(rx.recv().await.unwrap().entity_id, "sensor.b");
    }

    #[test]
    fn event_without_new_state_deserializes() {
        let event: StateChangedEvent =
            serde_json::from_str(r#"{"entity_id":"sensor.solar","new_state":null}"#).unwrap();
        assert!(event.new_state.is_none());

        let event: StateChangedEvent =
            serde_json::from_str(r#"{"entity_id":"sensor.solar"}"#).unwrap();
        assert!(event.new_state.is_none());
    }

    #[test]
    fn event_with_state_deserializes() {
        let event: StateChangedEvent = serde_json::from_str(
            r#"{
                "entity_id": "sensor.solar",
                "new_state": {
                    "state": "1200",
                    "attributes": {"unit_of_measurement": "W"},
                    "last_updated": "2025-06-01T12:00:00+00:00"
                }
            }"#,
        )
        .unwrap();
        let state = event.new_state.unwrap();
        assert_eq!(state.state, "1200");
        assert_eq!(state.attributes["unit_of_measurement"], "W");
    }
}
