use std::collections::HashSet;

use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, info, warn};

use super::StateChangedEvent;
use crate::{readings::Reading, sync::SyncCoordinator};

/// Forwards state changes of the monitored entities into the coordinator's
/// reading buffer.
pub struct StateListener {
    entities: HashSet<String>,
    coordinator: SyncCoordinator,
}

impl StateListener {
    pub fn new(entities: impl IntoIterator<Item = String>, coordinator: SyncCoordinator) -> Self {
        Self {
            entities: entities.into_iter().collect(),
            coordinator,
        }
    }

    /// Runs until the bus closes or the task is aborted.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(self, mut rx: Receiver<StateChangedEvent>) {
        info!(entities = ?self.entities, "State listener started");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(reading) = self.to_reading(event) {
                        self.coordinator.record(reading).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "State listener fell behind; notifications dropped");
                }
                Err(RecvError::Closed) => {
                    info!("State bus closed; listener exiting");
                    break;
                }
            }
        }
    }

    /// Map a notification to a reading. Unmonitored entities and removed
    /// entities (no new state) yield `None`.
    fn to_reading(&self, event: StateChangedEvent) -> Option<Reading> {
        if !self.entities.contains(&event.entity_id) {
            return None;
        }
        match event.new_state {
            Some(state) => Some(Reading::from_state(event.entity_id, &state)),
            None => {
                debug!(entity_id = %event.entity_id, "Entity removed; nothing to buffer");
                None
            }
        }
    }
}
