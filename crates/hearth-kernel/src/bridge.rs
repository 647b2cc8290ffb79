//! [`BridgeCore`] – the single gateway through which device state changes.
//!
//! Two kinds of producers feed the core:
//!
//! | Origin | Entry point | Side effects |
//! |---|---|---|
//! | hardware | [`BridgeCore::ingest`] / [`BridgeCore::apply_inbound`] | state, viewer fan-out |
//! | writer (API, viewer commands) | [`BridgeCore::apply_write`] | state, viewer fan-out, actuator command |
//!
//! Every mutation runs under one lock covering the state and the viewer hub,
//! so all viewers observe updates in the same order in which they were
//! applied, and a viewer's initial snapshot is never interleaved with an
//! update. Broadcasts are emitted only when a stored value actually changes.
//!
//! The lock is never held across an `.await`; actuator commands are handed
//! to an unbounded queue drained by [`run_outbound`][crate::pump::run_outbound].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hearth_middleware::TopicTranslator;
use hearth_middleware::payload::normalize;
use hearth_types::{
    BusMessage, DeviceState, DeviceUpdate, FieldPath, FieldValue, HearthError, Schema,
    SensorField, Sensors, ThermostatField, Update, ViewerEvent,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::{ViewerHub, ViewerId, ViewerSubscription};

/// Who produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Hardware,
    Writer,
}

/// Result of an accepted writer update.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteAck {
    pub path: FieldPath,
    pub value: FieldValue,
    /// Whether the stored value differed before the write.
    pub changed: bool,
}

impl WriteAck {
    /// Human-readable confirmation, e.g. `"kitchen updated to true"`.
    pub fn message(&self) -> String {
        format!("{} updated to {}", self.path.device(), self.value)
    }
}

struct Shared {
    state: DeviceState,
    hub: ViewerHub,
}

pub struct BridgeCore {
    translator: TopicTranslator,
    shared: Mutex<Shared>,
    outbound: mpsc::UnboundedSender<BusMessage>,
}

impl BridgeCore {
    /// Seed the core with `state` and freeze its key sets as the schema.
    ///
    /// Returns the receiving end of the actuator-command queue.
    pub fn new(
        state: DeviceState,
        topic_prefix: &str,
        viewer_capacity: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<BusMessage>) {
        let schema = Arc::new(Schema::from_state(&state));
        let (outbound, commands) = mpsc::unbounded_channel();
        let core = Arc::new(Self {
            translator: TopicTranslator::new(topic_prefix, schema),
            shared: Mutex::new(Shared {
                state,
                hub: ViewerHub::new(viewer_capacity),
            }),
            outbound,
        });
        (core, commands)
    }

    pub fn translator(&self) -> &TopicTranslator {
        &self.translator
    }

    pub fn schema(&self) -> &Schema {
        self.translator.schema()
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    /// Deep copy of the whole state.
    pub fn snapshot(&self) -> DeviceState {
        self.lock().state.clone()
    }

    pub fn sensors(&self) -> Sensors {
        self.lock().state.sensors.clone()
    }

    pub fn get(&self, path: &FieldPath) -> Option<FieldValue> {
        self.lock().state.get(path)
    }

    // ── Hardware origin ────────────────────────────────────────────────────

    /// Decode and apply one inbound bus message.
    ///
    /// Unknown topics and malformed payloads are dropped. Returns whether the
    /// state changed.
    pub fn ingest(&self, topic: &str, payload: &[u8]) -> bool {
        match self.translator.decode(topic, payload) {
            Some(update) => self.apply_inbound(update),
            None => false,
        }
    }

    /// Apply a hardware-reported update. Returns whether the state changed.
    ///
    /// Updates addressing keys outside the schema, or the derived motion
    /// flag, are dropped.
    pub fn apply_inbound(&self, update: Update) -> bool {
        if !self.schema().contains(&update.path)
            || update.path == FieldPath::Sensor(SensorField::Motion)
        {
            debug!(path = %update.path, "dropping inbound update outside the schema");
            return false;
        }
        let mut shared = self.lock();
        match apply(&mut shared, &update, Origin::Hardware) {
            Ok(changed) => changed,
            Err(e) => {
                debug!(path = %update.path, error = %e, "dropping inbound update");
                false
            }
        }
    }

    // ── Writer origin ──────────────────────────────────────────────────────

    /// Validate and apply a writer update addressed as `category/device`.
    ///
    /// Rejections leave the state untouched and publish nothing:
    /// unknown targets yield [`HearthError::DeviceNotFound`], measured or
    /// derived fields [`HearthError::ReadOnlyField`], and values that do not
    /// normalize [`HearthError::InvalidValue`].
    ///
    /// An accepted write always queues the actuator command, even when the
    /// stored value is unchanged.
    pub fn apply_write(
        &self,
        category: &str,
        device: &str,
        raw: &Value,
    ) -> Result<WriteAck, HearthError> {
        let path = self
            .schema()
            .resolve(category, device)
            .ok_or_else(|| HearthError::DeviceNotFound {
                category: category.to_string(),
                device: device.to_string(),
            })?;
        if !path.is_writable() {
            return Err(HearthError::ReadOnlyField(path.to_string()));
        }
        let kind = path.kind();
        let value = normalize(kind, raw).ok_or_else(|| HearthError::InvalidValue {
            field: path.to_string(),
            details: format!("expected {}, got {raw}", kind.describe()),
        })?;
        let command = self.translator.encode(&path, value);

        let changed = {
            let mut shared = self.lock();
            let changed = apply(&mut shared, &Update::new(path.clone(), value), Origin::Writer)?;
            // Queued under the lock so commands leave in mutation order.
            if let Some(command) = command
                && self.outbound.send(command).is_err()
            {
                warn!(path = %path, "outbound queue closed; command dropped");
            }
            changed
        };

        info!(path = %path, value = %value, changed, "writer update applied");
        Ok(WriteAck {
            path,
            value,
            changed,
        })
    }

    // ── Viewers ────────────────────────────────────────────────────────────

    /// Register a viewer. Its first frame is the snapshot taken at
    /// registration; every later frame is an update applied after it.
    pub fn connect_viewer(&self) -> ViewerSubscription {
        let mut shared = self.lock();
        let snapshot = ViewerEvent::DeviceState(shared.state.clone());
        shared.hub.register(snapshot)
    }

    pub fn disconnect_viewer(&self, id: ViewerId) {
        self.lock().hub.remove(id);
    }

    pub fn viewer_count(&self) -> usize {
        self.lock().hub.len()
    }

    /// Queue `event` for one viewer only.
    pub fn notify_viewer(&self, id: ViewerId, event: ViewerEvent) -> bool {
        self.lock().hub.send_to(id, event)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mutate the state and broadcast whatever changed.
///
/// A reported temperature, from either the sensor topic or the thermostat
/// topic, is stored in both temperature fields. A motion change recomputes
/// the derived flag.
fn apply(shared: &mut Shared, update: &Update, origin: Origin) -> Result<bool, HearthError> {
    let targets = match (&update.path, origin) {
        (
            FieldPath::Sensor(SensorField::Temperature)
            | FieldPath::Thermostat(ThermostatField::Temperature),
            Origin::Hardware,
        ) => vec![
            FieldPath::Thermostat(ThermostatField::Temperature),
            FieldPath::Sensor(SensorField::Temperature),
        ],
        (path, _) => vec![path.clone()],
    };

    let mut events = Vec::new();
    let mut sensors_changed = false;
    for path in &targets {
        if !shared.state.set(path, update.value)? {
            continue;
        }
        match path {
            FieldPath::Sensor(_) => sensors_changed = true,
            FieldPath::Motion(_) => {
                events.push(ViewerEvent::DeviceUpdate(DeviceUpdate::new(path, update.value)));
                sensors_changed |= shared.state.recompute_motion();
            }
            _ => events.push(ViewerEvent::DeviceUpdate(DeviceUpdate::new(path, update.value))),
        }
    }
    if sensors_changed {
        events.push(ViewerEvent::SensorUpdate(shared.state.sensors.clone()));
    }

    if events.is_empty() {
        return Ok(false);
    }
    debug!(path = %update.path, value = %update.value, ?origin, "state changed");
    shared.hub.broadcast(&events);
    Ok(true)
}
