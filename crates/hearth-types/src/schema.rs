//! Closed schema of addressable fields.
//!
//! Every field of [`DeviceState`] is named by exactly one [`FieldPath`]
//! variant. Keyed categories (rooms, doors, appliances…) carry their key as a
//! string, and the set of valid keys is frozen into a [`Schema`] at startup.
//! Nothing in the bridge looks a key up in the state dynamically: lookups go
//! through [`Schema::contains`] and exhaustive matches on [`FieldPath`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::{DeviceState, ThermostatMode};

// ────────────────────────────────────────────────────────────────────────────
// Tags
// ────────────────────────────────────────────────────────────────────────────

/// Top-level device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Lights,
    Thermostat,
    Security,
    Appliances,
    Sensors,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Lights => "lights",
            Category::Thermostat => "thermostat",
            Category::Security => "security",
            Category::Appliances => "appliances",
            Category::Sensors => "sensors",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "lights" => Some(Category::Lights),
            "thermostat" => Some(Category::Thermostat),
            "security" => Some(Category::Security),
            "appliances" => Some(Category::Appliances),
            "sensors" => Some(Category::Sensors),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermostatField {
    Temperature,
    Target,
    Mode,
}

impl ThermostatField {
    pub fn as_str(self) -> &'static str {
        match self {
            ThermostatField::Temperature => "temperature",
            ThermostatField::Target => "target",
            ThermostatField::Mode => "mode",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "temperature" => Some(ThermostatField::Temperature),
            "target" => Some(ThermostatField::Target),
            "mode" => Some(ThermostatField::Mode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorField {
    Humidity,
    Light,
    Temperature,
    Motion,
    Smoke,
}

impl SensorField {
    pub fn as_str(self) -> &'static str {
        match self {
            SensorField::Humidity => "humidity",
            SensorField::Light => "light",
            SensorField::Temperature => "temperature",
            SensorField::Motion => "motion",
            SensorField::Smoke => "smoke",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "humidity" => Some(SensorField::Humidity),
            "light" => Some(SensorField::Light),
            "temperature" => Some(SensorField::Temperature),
            "motion" => Some(SensorField::Motion),
            "smoke" => Some(SensorField::Smoke),
            _ => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Field paths and values
// ────────────────────────────────────────────────────────────────────────────

/// Which wire vocabulary a boolean field speaks.
///
/// Lock-style fields report `LOCKED`/`UNLOCKED` and are commanded with
/// `LOCK`/`UNLOCK`; everything else is plain `ON`/`OFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolTable {
    OnOff,
    Lock,
}

/// The value type a [`FieldPath`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool(BoolTable),
    Number,
    Mode,
}

impl ValueKind {
    pub fn describe(self) -> &'static str {
        match self {
            ValueKind::Bool(_) => "a boolean",
            ValueKind::Number => "a number",
            ValueKind::Mode => "a thermostat mode (auto, heat, cool, eco, off)",
        }
    }
}

/// Address of a single field inside [`DeviceState`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    Light(String),
    Thermostat(ThermostatField),
    Armed,
    Door(String),
    Motion(String),
    Window(String),
    Appliance(String),
    Sensor(SensorField),
}

impl FieldPath {
    pub fn category(&self) -> Category {
        match self {
            FieldPath::Light(_) => Category::Lights,
            FieldPath::Thermostat(_) => Category::Thermostat,
            FieldPath::Armed | FieldPath::Door(_) | FieldPath::Motion(_) | FieldPath::Window(_) => {
                Category::Security
            }
            FieldPath::Appliance(_) => Category::Appliances,
            FieldPath::Sensor(_) => Category::Sensors,
        }
    }

    /// Device label used in `deviceUpdate` events and API paths.
    ///
    /// Doors are addressed by their bare name under `security`; motion
    /// sensors and windows are prefixed (`motion_<loc>`, `window_<room>`).
    pub fn device(&self) -> String {
        match self {
            FieldPath::Light(key) | FieldPath::Appliance(key) | FieldPath::Door(key) => key.clone(),
            FieldPath::Thermostat(field) => field.as_str().to_string(),
            FieldPath::Armed => "armed".to_string(),
            FieldPath::Motion(loc) => format!("motion_{loc}"),
            FieldPath::Window(room) => format!("window_{room}"),
            FieldPath::Sensor(field) => field.as_str().to_string(),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            FieldPath::Door(_) => ValueKind::Bool(BoolTable::Lock),
            FieldPath::Light(_)
            | FieldPath::Armed
            | FieldPath::Motion(_)
            | FieldPath::Window(_)
            | FieldPath::Appliance(_)
            | FieldPath::Sensor(SensorField::Motion | SensorField::Smoke) => {
                ValueKind::Bool(BoolTable::OnOff)
            }
            FieldPath::Thermostat(ThermostatField::Mode) => ValueKind::Mode,
            FieldPath::Thermostat(_)
            | FieldPath::Sensor(SensorField::Humidity | SensorField::Light | SensorField::Temperature) => {
                ValueKind::Number
            }
        }
    }

    /// Whether API/viewer writers may set this field.
    ///
    /// Measured values, motion and window contacts belong to hardware, and
    /// `sensors.motion` is derived.
    pub fn is_writable(&self) -> bool {
        match self {
            FieldPath::Light(_)
            | FieldPath::Appliance(_)
            | FieldPath::Armed
            | FieldPath::Door(_)
            | FieldPath::Thermostat(ThermostatField::Target | ThermostatField::Mode) => true,
            FieldPath::Thermostat(ThermostatField::Temperature)
            | FieldPath::Motion(_)
            | FieldPath::Window(_)
            | FieldPath::Sensor(_) => false,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category(), self.device())
    }
}

/// A normalized field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Mode(ThermostatMode),
}

impl FieldValue {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Mode(m) => write!(f, "{m}"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Schema
// ────────────────────────────────────────────────────────────────────────────

/// Key sets of every keyed category, frozen at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    lights: BTreeSet<String>,
    doors: BTreeSet<String>,
    motion: BTreeSet<String>,
    windows: BTreeSet<String>,
    appliances: BTreeSet<String>,
}

impl Schema {
    /// Freeze the key sets of a freshly seeded state.
    pub fn from_state(state: &DeviceState) -> Self {
        Self {
            lights: state.lights.keys().cloned().collect(),
            doors: state.security.doors.keys().cloned().collect(),
            motion: state.security.motion.keys().cloned().collect(),
            windows: state.security.windows.keys().cloned().collect(),
            appliances: state.appliances.keys().cloned().collect(),
        }
    }

    pub fn contains(&self, path: &FieldPath) -> bool {
        match path {
            FieldPath::Light(room) => self.lights.contains(room),
            FieldPath::Door(door) => self.doors.contains(door),
            FieldPath::Motion(loc) => self.motion.contains(loc),
            FieldPath::Window(room) => self.windows.contains(room),
            FieldPath::Appliance(name) => self.appliances.contains(name),
            FieldPath::Thermostat(_) | FieldPath::Armed | FieldPath::Sensor(_) => true,
        }
    }

    /// Resolve an API `(category, device)` pair to a field in the schema.
    ///
    /// `security/<door>` reaches the nested doors map; `security/armed` wins
    /// over a door of the same name. Read-only fields resolve too; callers
    /// decide whether the field may be written.
    pub fn resolve(&self, category: &str, device: &str) -> Option<FieldPath> {
        let path = match Category::parse(category)? {
            Category::Lights => FieldPath::Light(device.to_string()),
            Category::Appliances => FieldPath::Appliance(device.to_string()),
            Category::Thermostat => FieldPath::Thermostat(ThermostatField::parse(device)?),
            Category::Sensors => FieldPath::Sensor(SensorField::parse(device)?),
            Category::Security => {
                if device == "armed" {
                    FieldPath::Armed
                } else if self.doors.contains(device) {
                    FieldPath::Door(device.to_string())
                } else if let Some(loc) = device.strip_prefix("motion_") {
                    FieldPath::Motion(loc.to_string())
                } else if let Some(room) = device.strip_prefix("window_") {
                    FieldPath::Window(room.to_string())
                } else {
                    return None;
                }
            }
        };
        self.contains(&path).then_some(path)
    }

    pub fn lights(&self) -> impl Iterator<Item = &str> {
        self.lights.iter().map(String::as_str)
    }

    pub fn doors(&self) -> impl Iterator<Item = &str> {
        self.doors.iter().map(String::as_str)
    }

    pub fn motion_locations(&self) -> impl Iterator<Item = &str> {
        self.motion.iter().map(String::as_str)
    }

    pub fn appliances(&self) -> impl Iterator<Item = &str> {
        self.appliances.iter().map(String::as_str)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::from_state(&DeviceState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_flat_categories() {
        let schema = Schema::default();
        assert_eq!(
            schema.resolve("lights", "kitchen"),
            Some(FieldPath::Light("kitchen".into()))
        );
        assert_eq!(
            schema.resolve("appliances", "fan"),
            Some(FieldPath::Appliance("fan".into()))
        );
        assert_eq!(
            schema.resolve("thermostat", "target"),
            Some(FieldPath::Thermostat(ThermostatField::Target))
        );
    }

    #[test]
    fn resolve_rejects_keys_outside_schema() {
        let schema = Schema::default();
        assert_eq!(schema.resolve("lights", "attic"), None);
        assert_eq!(schema.resolve("thermostat", "humidity"), None);
        assert_eq!(schema.resolve("garage", "door"), None);
        assert_eq!(schema.resolve("security", "cellar"), None);
    }

    #[test]
    fn resolve_reaches_nested_security_maps() {
        let schema = Schema::default();
        assert_eq!(schema.resolve("security", "armed"), Some(FieldPath::Armed));
        assert_eq!(
            schema.resolve("security", "front"),
            Some(FieldPath::Door("front".into()))
        );
        assert_eq!(
            schema.resolve("security", "motion_living"),
            Some(FieldPath::Motion("living".into()))
        );
        assert_eq!(schema.resolve("security", "motion_attic"), None);
    }

    #[test]
    fn device_labels_round_trip_through_resolve() {
        let schema = Schema::default();
        let paths = [
            FieldPath::Light("garden".into()),
            FieldPath::Armed,
            FieldPath::Door("back".into()),
            FieldPath::Motion("kitchen".into()),
            FieldPath::Window("bedroom".into()),
            FieldPath::Appliance("car_charger".into()),
            FieldPath::Thermostat(ThermostatField::Mode),
            FieldPath::Sensor(SensorField::Smoke),
        ];
        for path in paths {
            let resolved = schema.resolve(path.category().as_str(), &path.device());
            assert_eq!(resolved, Some(path.clone()), "label of {path} did not resolve");
        }
    }

    #[test]
    fn writability_follows_ownership() {
        assert!(FieldPath::Door("front".into()).is_writable());
        assert!(FieldPath::Thermostat(ThermostatField::Target).is_writable());
        assert!(!FieldPath::Thermostat(ThermostatField::Temperature).is_writable());
        assert!(!FieldPath::Sensor(SensorField::Motion).is_writable());
        assert!(!FieldPath::Motion("living".into()).is_writable());
    }

    #[test]
    fn doors_use_lock_table() {
        assert_eq!(FieldPath::Door("front".into()).kind(), ValueKind::Bool(BoolTable::Lock));
        assert_eq!(FieldPath::Armed.kind(), ValueKind::Bool(BoolTable::OnOff));
        assert_eq!(FieldPath::Sensor(SensorField::Light).kind(), ValueKind::Number);
    }

    #[test]
    fn field_value_serializes_untagged() {
        assert_eq!(serde_json::to_string(&FieldValue::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&FieldValue::Number(21.5)).unwrap(), "21.5");
        assert_eq!(
            serde_json::to_string(&FieldValue::Mode(ThermostatMode::Heat)).unwrap(),
            "\"heat\""
        );
        assert_eq!(FieldValue::Number(24.0).to_string(), "24");
    }
}
