use std::mem;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::events::EntityState;

/// Attribute keys forwarded to the cloud. Everything else is dropped.
pub const FORWARDED_ATTRIBUTES: [&str; 4] = [
    "unit_of_measurement",
    "device_class",
    "state_class",
    "friendly_name",
];

/// One local state change, as uploaded to `POST /api/ha/readings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub entity_id: String,
    /// Raw state string. `"unavailable"` and `"unknown"` are kept as-is.
    pub state: String,
    #[schema(value_type = Object)]
    pub attributes: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Build a reading from a new entity state, keeping only the
    /// [`FORWARDED_ATTRIBUTES`].
    pub fn from_state(entity_id: impl Into<String>, state: &EntityState) -> Self {
        let attributes = state
            .attributes
            .iter()
            .filter(|(k, _)| FORWARDED_ATTRIBUTES.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            entity_id: entity_id.into(),
            state: state.state.clone(),
            attributes,
            timestamp: state.last_updated,
        }
    }
}

/// Ordered, append-only list of readings waiting for upload.
///
/// A flush takes the whole content in one step, so readings arriving while
/// the upload is on the wire land in a fresh buffer.
#[derive(Debug, Default)]
pub struct ReadingBuffer {
    items: Vec<Reading>,
}

impl ReadingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reading: Reading) {
        self.items.push(reading);
    }

    /// Swap the buffered readings out and leave the buffer empty.
    pub fn take(&mut self) -> Vec<Reading> {
        mem::take(&mut self.items)
    }

    /// Put a failed batch back in front of anything buffered since it was taken.
    pub fn restore(&mut self, batch: Vec<Reading>) {
        let newer = mem::replace(&mut self.items, batch);
        self.items.extend(newer);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
