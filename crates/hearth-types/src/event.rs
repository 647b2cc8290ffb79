//! Messages that cross the bridge boundaries.

use serde::{Deserialize, Serialize};

use crate::schema::{Category, FieldPath, FieldValue};
use crate::state::{DeviceState, Sensors};

/// A raw topic-addressed message as carried by the pub/sub bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// A decoded, schema-validated change to one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub path: FieldPath,
    pub value: FieldValue,
}

impl Update {
    pub fn new(path: FieldPath, value: FieldValue) -> Self {
        Self { path, value }
    }

    pub fn category(&self) -> Category {
        self.path.category()
    }
}

/// Body of a `deviceUpdate` push frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub category: Category,
    pub device: String,
    pub state: FieldValue,
}

impl DeviceUpdate {
    pub fn new(path: &FieldPath, state: FieldValue) -> Self {
        Self {
            category: path.category(),
            device: path.device(),
            state,
        }
    }
}

/// Frames pushed from the bridge to a connected viewer.
///
/// Serialized as `{"event": "<name>", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ViewerEvent {
    /// Full snapshot; sent once, to a newly connected viewer only.
    DeviceState(DeviceState),
    DeviceUpdate(DeviceUpdate),
    /// The whole sensors map after any sensor field changed.
    SensorUpdate(Sensors),
    /// Rejection of a command sent upstream by this viewer.
    CommandError { error: String },
}
