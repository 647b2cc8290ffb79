//! The canonical device-state aggregate.
//!
//! [`DeviceState`] is seeded once with [`DeviceState::default`] and from then
//! on only ever mutated through [`DeviceState::set`], which addresses existing
//! keys exclusively. The key sets of every category are therefore frozen for
//! the life of the process.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::HearthError;
use crate::schema::{FieldPath, FieldValue, SensorField, ThermostatField};

/// Operating mode of the thermostat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermostatMode {
    #[default]
    Auto,
    Heat,
    Cool,
    Eco,
    Off,
}

impl ThermostatMode {
    pub const ALL: [ThermostatMode; 5] = [
        ThermostatMode::Auto,
        ThermostatMode::Heat,
        ThermostatMode::Cool,
        ThermostatMode::Eco,
        ThermostatMode::Off,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ThermostatMode::Auto => "auto",
            ThermostatMode::Heat => "heat",
            ThermostatMode::Cool => "cool",
            ThermostatMode::Eco => "eco",
            ThermostatMode::Off => "off",
        }
    }

    /// Case-insensitive parse; surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for ThermostatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thermostat {
    /// Measured temperature; owned by hardware.
    pub temperature: f64,
    /// Setpoint; owned by writers.
    pub target: f64,
    pub mode: ThermostatMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub armed: bool,
    /// door → locked
    pub doors: BTreeMap<String, bool>,
    /// location → motion detected
    pub motion: BTreeMap<String, bool>,
    /// room → closed
    pub windows: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensors {
    /// Derived: logical OR over `security.motion`.
    pub motion: bool,
    pub smoke: bool,
    pub humidity: f64,
    pub light: f64,
    pub temperature: f64,
}

/// Root aggregate for every device category in the home.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub lights: BTreeMap<String, bool>,
    pub thermostat: Thermostat,
    pub security: Security,
    pub appliances: BTreeMap<String, bool>,
    pub sensors: Sensors,
}

fn flags(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_string(), *value))
        .collect()
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            lights: flags(&[
                ("living_room", false),
                ("bedroom", true),
                ("kitchen", false),
                ("bathroom", false),
                ("garage", false),
                ("garden", false),
            ]),
            thermostat: Thermostat {
                temperature: 22.0,
                target: 24.0,
                mode: ThermostatMode::Auto,
            },
            security: Security {
                armed: true,
                doors: flags(&[("front", true), ("back", true)]),
                motion: flags(&[("living", false), ("bedroom", false), ("kitchen", false)]),
                windows: flags(&[("living", true), ("bedroom", true), ("kitchen", true)]),
            },
            appliances: flags(&[
                ("ac", false),
                ("fan", true),
                ("tv", false),
                ("car_charger", false),
            ]),
            sensors: Sensors {
                motion: false,
                smoke: false,
                humidity: 45.0,
                light: 75.0,
                temperature: 22.0,
            },
        }
    }
}

impl DeviceState {
    /// Current value at `path`, or `None` when the key is not in the schema.
    pub fn get(&self, path: &FieldPath) -> Option<FieldValue> {
        let value = match path {
            FieldPath::Light(room) => FieldValue::Bool(*self.lights.get(room)?),
            FieldPath::Appliance(name) => FieldValue::Bool(*self.appliances.get(name)?),
            FieldPath::Armed => FieldValue::Bool(self.security.armed),
            FieldPath::Door(door) => FieldValue::Bool(*self.security.doors.get(door)?),
            FieldPath::Motion(loc) => FieldValue::Bool(*self.security.motion.get(loc)?),
            FieldPath::Window(room) => FieldValue::Bool(*self.security.windows.get(room)?),
            FieldPath::Thermostat(ThermostatField::Temperature) => {
                FieldValue::Number(self.thermostat.temperature)
            }
            FieldPath::Thermostat(ThermostatField::Target) => FieldValue::Number(self.thermostat.target),
            FieldPath::Thermostat(ThermostatField::Mode) => FieldValue::Mode(self.thermostat.mode),
            FieldPath::Sensor(SensorField::Motion) => FieldValue::Bool(self.sensors.motion),
            FieldPath::Sensor(SensorField::Smoke) => FieldValue::Bool(self.sensors.smoke),
            FieldPath::Sensor(SensorField::Humidity) => FieldValue::Number(self.sensors.humidity),
            FieldPath::Sensor(SensorField::Light) => FieldValue::Number(self.sensors.light),
            FieldPath::Sensor(SensorField::Temperature) => {
                FieldValue::Number(self.sensors.temperature)
            }
        };
        Some(value)
    }

    /// Store `value` at `path`. Returns whether the stored value changed.
    ///
    /// Never inserts: an unknown key yields [`HearthError::DeviceNotFound`]
    /// and a value of the wrong kind yields [`HearthError::InvalidValue`].
    /// Derived fields are not recomputed here.
    pub fn set(&mut self, path: &FieldPath, value: FieldValue) -> Result<bool, HearthError> {
        let mismatch = || HearthError::InvalidValue {
            field: path.to_string(),
            details: format!("expected {}", path.kind().describe()),
        };
        let not_found = || HearthError::DeviceNotFound {
            category: path.category().to_string(),
            device: path.device(),
        };

        match path {
            FieldPath::Thermostat(ThermostatField::Mode) => {
                let FieldValue::Mode(mode) = value else {
                    return Err(mismatch());
                };
                Ok(replace(&mut self.thermostat.mode, mode))
            }
            FieldPath::Thermostat(_) | FieldPath::Sensor(SensorField::Humidity)
            | FieldPath::Sensor(SensorField::Light)
            | FieldPath::Sensor(SensorField::Temperature) => {
                let FieldValue::Number(number) = value else {
                    return Err(mismatch());
                };
                let slot = match path {
                    FieldPath::Thermostat(ThermostatField::Temperature) => {
                        &mut self.thermostat.temperature
                    }
                    FieldPath::Thermostat(_) => &mut self.thermostat.target,
                    FieldPath::Sensor(SensorField::Humidity) => &mut self.sensors.humidity,
                    FieldPath::Sensor(SensorField::Light) => &mut self.sensors.light,
                    _ => &mut self.sensors.temperature,
                };
                Ok(replace(slot, number))
            }
            _ => {
                let FieldValue::Bool(flag) = value else {
                    return Err(mismatch());
                };
                let slot = match path {
                    FieldPath::Light(room) => self.lights.get_mut(room),
                    FieldPath::Appliance(name) => self.appliances.get_mut(name),
                    FieldPath::Armed => Some(&mut self.security.armed),
                    FieldPath::Door(door) => self.security.doors.get_mut(door),
                    FieldPath::Motion(loc) => self.security.motion.get_mut(loc),
                    FieldPath::Window(room) => self.security.windows.get_mut(room),
                    FieldPath::Sensor(SensorField::Motion) => Some(&mut self.sensors.motion),
                    _ => Some(&mut self.sensors.smoke),
                };
                let slot = slot.ok_or_else(not_found)?;
                Ok(replace(slot, flag))
            }
        }
    }

    /// Logical OR over every motion location.
    pub fn any_motion(&self) -> bool {
        self.security.motion.values().any(|detected| *detected)
    }

    /// Recompute the derived `sensors.motion` flag. Returns whether it flipped.
    pub fn recompute_motion(&mut self) -> bool {
        let derived = self.any_motion();
        replace(&mut self.sensors.motion, derived)
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_home() {
        let state = DeviceState::default();
        assert_eq!(state.lights.len(), 6);
        assert_eq!(state.lights.get("bedroom"), Some(&true));
        assert_eq!(state.security.doors.len(), 2);
        assert_eq!(state.appliances.get("fan"), Some(&true));
        assert_eq!(state.thermostat.mode, ThermostatMode::Auto);
        assert!(!state.sensors.motion);
        assert_eq!(state.sensors.temperature, state.thermostat.temperature);
    }

    #[test]
    fn set_reports_change_only_when_value_differs() {
        let mut state = DeviceState::default();
        let path = FieldPath::Light("kitchen".into());
        assert_eq!(state.set(&path, FieldValue::Bool(true)), Ok(true));
        assert_eq!(state.set(&path, FieldValue::Bool(true)), Ok(false));
        assert_eq!(state.get(&path), Some(FieldValue::Bool(true)));
    }

    #[test]
    fn set_never_inserts_unknown_keys() {
        let mut state = DeviceState::default();
        let before = state.clone();
        let result = state.set(&FieldPath::Light("attic".into()), FieldValue::Bool(true));
        assert!(matches!(result, Err(HearthError::DeviceNotFound { .. })));
        assert_eq!(state, before);
    }

    #[test]
    fn set_rejects_wrong_value_kind() {
        let mut state = DeviceState::default();
        let result = state.set(
            &FieldPath::Thermostat(ThermostatField::Target),
            FieldValue::Bool(true),
        );
        assert!(matches!(result, Err(HearthError::InvalidValue { .. })));
        assert_eq!(state.thermostat.target, 24.0);
    }

    #[test]
    fn numeric_and_mode_fields_round_through_get() {
        let mut state = DeviceState::default();
        let target = FieldPath::Thermostat(ThermostatField::Target);
        state.set(&target, FieldValue::Number(21.5)).unwrap();
        assert_eq!(state.get(&target), Some(FieldValue::Number(21.5)));

        let mode = FieldPath::Thermostat(ThermostatField::Mode);
        state.set(&mode, FieldValue::Mode(ThermostatMode::Cool)).unwrap();
        assert_eq!(state.thermostat.mode, ThermostatMode::Cool);
    }

    #[test]
    fn recompute_motion_tracks_or_of_locations() {
        let mut state = DeviceState::default();
        state
            .set(&FieldPath::Motion("kitchen".into()), FieldValue::Bool(true))
            .unwrap();
        assert!(state.recompute_motion());
        assert!(state.sensors.motion);
        // Still true while any location reports motion.
        state
            .set(&FieldPath::Motion("living".into()), FieldValue::Bool(true))
            .unwrap();
        assert!(!state.recompute_motion());
        state
            .set(&FieldPath::Motion("kitchen".into()), FieldValue::Bool(false))
            .unwrap();
        state
            .set(&FieldPath::Motion("living".into()), FieldValue::Bool(false))
            .unwrap();
        assert!(state.recompute_motion());
        assert!(!state.sensors.motion);
    }

    #[test]
    fn thermostat_mode_parse_is_case_insensitive() {
        assert_eq!(ThermostatMode::parse(" HEAT "), Some(ThermostatMode::Heat));
        assert_eq!(ThermostatMode::parse("eco"), Some(ThermostatMode::Eco));
        assert_eq!(ThermostatMode::parse("turbo"), None);
    }

    #[test]
    fn state_serializes_with_category_names() {
        let json = serde_json::to_value(DeviceState::default()).unwrap();
        assert_eq!(json["thermostat"]["mode"], "auto");
        assert_eq!(json["security"]["doors"]["front"], true);
        assert_eq!(json["sensors"]["humidity"], 45.0);
    }
}
