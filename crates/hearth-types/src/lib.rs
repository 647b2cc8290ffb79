//! `hearth-types` – shared vocabulary of the Hearth bridge.
//!
//! - [`state`] – the canonical [`DeviceState`] aggregate and its categories.
//! - [`schema`] – the closed schema: [`Category`], [`FieldPath`],
//!   [`FieldValue`] and the startup-frozen [`Schema`] key sets.
//! - [`event`] – bus messages, decoded [`Update`]s and the [`ViewerEvent`]
//!   frames pushed to connected viewers.
//!
//! The error type [`HearthError`] spans every crate in the workspace.

pub mod event;
pub mod schema;
pub mod state;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use event::{BusMessage, DeviceUpdate, Update, ViewerEvent};
pub use schema::{
    BoolTable, Category, FieldPath, FieldValue, Schema, SensorField, ThermostatField, ValueKind,
};
pub use state::{DeviceState, Security, Sensors, Thermostat, ThermostatMode};

/// Global error type for the bridge.
///
/// Decode-time anomalies (unknown topics, malformed payloads) are never
/// represented here; they are absorbed by the topic translator. Only
/// writer-originated validation failures and transport/bootstrap problems
/// surface as a `HearthError`.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HearthError {
    #[error("Device not found: {category}/{device}")]
    DeviceNotFound { category: String, device: String },

    #[error("Device is read-only: {0}")]
    ReadOnlyField(String),

    #[error("Invalid value for {field}: {details}")]
    InvalidValue { field: String, details: String },

    #[error("Bus Error: {0}")]
    Bus(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("I/O Error: {0}")]
    Io(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

impl HearthError {
    /// HTTP status code used when this error is answered over the API.
    pub fn status_code(&self) -> u16 {
        match self {
            HearthError::DeviceNotFound { .. } => 404,
            HearthError::ReadOnlyField(_) | HearthError::InvalidValue { .. } => 400,
            HearthError::Bus(_) => 502,
            HearthError::Config(_) | HearthError::Io(_) | HearthError::Serialization(_) => 500,
        }
    }

    /// Short message suitable for the `error` member of an API response.
    pub fn api_message(&self) -> String {
        match self {
            HearthError::DeviceNotFound { .. } => "Device not found".to_string(),
            HearthError::ReadOnlyField(_) => "Device is read-only".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for HearthError {
    fn from(e: std::io::Error) -> Self {
        HearthError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_not_found_maps_to_404() {
        let err = HearthError::DeviceNotFound {
            category: "lights".into(),
            device: "attic".into(),
        };
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.api_message(), "Device not found");
        assert!(err.to_string().contains("lights/attic"));
    }

    #[test]
    fn validation_errors_map_to_400() {
        assert_eq!(HearthError::ReadOnlyField("sensors/motion".into()).status_code(), 400);
        let err = HearthError::InvalidValue {
            field: "lights/kitchen".into(),
            details: "expected a boolean".into(),
        };
        assert_eq!(err.status_code(), 400);
        assert!(err.api_message().contains("expected a boolean"));
    }

    #[test]
    fn io_error_converts() {
        let err: HearthError = std::io::Error::other("broken pipe").into();
        assert!(matches!(err, HearthError::Io(ref m) if m.contains("broken pipe")));
    }
}
