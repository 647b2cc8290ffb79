//! [`TopicTranslator`] – the bus ↔ state-model schema mapping.
//!
//! # Inbound patterns
//!
//! Every inbound topic is `<prefix>/<pattern>`. Exactly one rule matches any
//! accepted topic; the first segment (and for `security`, the second) is
//! literal and unique per rule.
//!
//! | Pattern | Field |
//! |---|---|
//! | `security/armed/state` | `security.armed` |
//! | `security/doors/+/state` | `security.doors.<door>` |
//! | `security/motion_sensors/+/state` | `security.motion.<loc>` |
//! | `lights/+/state` | `lights.<room>` |
//! | `appliances/+/state` | `appliances.<name>` |
//! | `thermostat/+/state` | `thermostat.<field>` |
//! | `sensors/+` | `sensors.<key>` (never `motion`) |
//!
//! # Outbound commands
//!
//! Writer updates are published on the mirrored command topic with `/set`
//! in place of `/state`, e.g. `home/security/doors/front/set` ← `UNLOCK`.

use std::sync::Arc;

use hearth_types::{
    BusMessage, FieldPath, FieldValue, Schema, SensorField, ThermostatField, Update, ValueKind,
};
use tracing::debug;

use crate::payload::{command_word, normalize, parse_payload};

/// Default topic namespace shared with the hardware nodes.
pub const DEFAULT_PREFIX: &str = "home";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Literal(&'static str),
    /// Single-level key bound to the device/field name.
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Armed,
    Door,
    Motion,
    Light,
    Appliance,
    Thermostat,
    Sensor,
}

struct Rule {
    pattern: &'static [Segment],
    binding: Binding,
}

use Segment::{Key, Literal};

/// Inbound rules, most specific first.
const RULES: &[Rule] = &[
    Rule {
        pattern: &[Literal("security"), Literal("armed"), Literal("state")],
        binding: Binding::Armed,
    },
    Rule {
        pattern: &[Literal("security"), Literal("doors"), Key, Literal("state")],
        binding: Binding::Door,
    },
    Rule {
        pattern: &[Literal("security"), Literal("motion_sensors"), Key, Literal("state")],
        binding: Binding::Motion,
    },
    Rule {
        pattern: &[Literal("lights"), Key, Literal("state")],
        binding: Binding::Light,
    },
    Rule {
        pattern: &[Literal("appliances"), Key, Literal("state")],
        binding: Binding::Appliance,
    },
    Rule {
        pattern: &[Literal("thermostat"), Key, Literal("state")],
        binding: Binding::Thermostat,
    },
    Rule {
        pattern: &[Literal("sensors"), Key],
        binding: Binding::Sensor,
    },
];

impl Rule {
    /// Match `segments` and return the bound key (empty for key-less rules).
    fn capture<'a>(&self, segments: &[&'a str]) -> Option<&'a str> {
        if segments.len() != self.pattern.len() {
            return None;
        }
        let mut key = "";
        for (segment, actual) in self.pattern.iter().zip(segments) {
            match segment {
                Literal(expected) if expected == actual => {}
                Literal(_) => return None,
                Key if actual.is_empty() => return None,
                Key => key = *actual,
            }
        }
        Some(key)
    }

    fn filter(&self) -> String {
        self.pattern
            .iter()
            .map(|segment| match segment {
                Literal(literal) => *literal,
                Key => "+",
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Translates between bus topics/payloads and schema-validated field updates.
#[derive(Debug, Clone)]
pub struct TopicTranslator {
    prefix: String,
    schema: Arc<Schema>,
}

impl TopicTranslator {
    /// Create a translator for topics under `prefix` (e.g. `"home"`).
    ///
    /// An empty prefix means topics start directly with the category.
    pub fn new(prefix: impl Into<String>, schema: Arc<Schema>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        Self { prefix, schema }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The subscription filters covering every inbound rule.
    pub fn subscriptions(&self) -> Vec<String> {
        RULES.iter().map(|rule| self.qualify(&rule.filter())).collect()
    }

    /// Decode one inbound bus message.
    ///
    /// Returns `None` for unmatched topics, keys outside the schema and
    /// payloads that do not normalize to the field's kind. Never fails.
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Option<Update> {
        let Some(path) = self.match_topic(topic) else {
            debug!(topic, "ignoring topic outside the schema");
            return None;
        };
        let raw = parse_payload(payload);
        let Some(value) = normalize(path.kind(), &raw) else {
            debug!(topic, payload = %raw, "ignoring payload that does not normalize");
            return None;
        };
        Some(Update::new(path, value))
    }

    /// Resolve an inbound state topic to the field it reports.
    pub fn match_topic(&self, topic: &str) -> Option<FieldPath> {
        let rest = self.strip_prefix(topic)?;
        let segments: Vec<&str> = rest.split('/').collect();
        let (binding, key) = RULES
            .iter()
            .find_map(|rule| rule.capture(&segments).map(|key| (rule.binding, key)))?;

        let path = match binding {
            Binding::Armed => FieldPath::Armed,
            Binding::Door => FieldPath::Door(key.to_string()),
            Binding::Motion => FieldPath::Motion(key.to_string()),
            Binding::Light => FieldPath::Light(key.to_string()),
            Binding::Appliance => FieldPath::Appliance(key.to_string()),
            Binding::Thermostat => FieldPath::Thermostat(ThermostatField::parse(key)?),
            Binding::Sensor => match SensorField::parse(key)? {
                SensorField::Motion => return None,
                field => FieldPath::Sensor(field),
            },
        };
        self.schema.contains(&path).then_some(path)
    }

    /// Encode a writer update as the actuator command for `path`.
    ///
    /// Returns `None` for fields that have no actuator (measured or derived
    /// values).
    pub fn encode(&self, path: &FieldPath, value: FieldValue) -> Option<BusMessage> {
        let topic = match path {
            FieldPath::Light(room) => format!("lights/{room}/set"),
            FieldPath::Appliance(name) => format!("appliances/{name}/set"),
            FieldPath::Armed => "security/armed/set".to_string(),
            FieldPath::Door(door) => format!("security/doors/{door}/set"),
            FieldPath::Thermostat(field @ (ThermostatField::Target | ThermostatField::Mode)) => {
                format!("thermostat/{}/set", field.as_str())
            }
            FieldPath::Thermostat(ThermostatField::Temperature)
            | FieldPath::Motion(_)
            | FieldPath::Window(_)
            | FieldPath::Sensor(_) => return None,
        };
        let payload = match (path.kind(), value) {
            (ValueKind::Bool(table), FieldValue::Bool(on)) => command_word(table, on).to_string(),
            (_, other) => other.to_string(),
        };
        Some(BusMessage::new(self.qualify(&topic), payload))
    }

    /// The topic on which hardware reports `path`, if it has one.
    pub fn state_topic(&self, path: &FieldPath) -> Option<String> {
        let topic = match path {
            FieldPath::Light(room) => format!("lights/{room}/state"),
            FieldPath::Appliance(name) => format!("appliances/{name}/state"),
            FieldPath::Armed => "security/armed/state".to_string(),
            FieldPath::Door(door) => format!("security/doors/{door}/state"),
            FieldPath::Motion(loc) => format!("security/motion_sensors/{loc}/state"),
            FieldPath::Thermostat(field) => format!("thermostat/{}/state", field.as_str()),
            FieldPath::Sensor(SensorField::Motion) | FieldPath::Window(_) => return None,
            FieldPath::Sensor(field) => format!("sensors/{}", field.as_str()),
        };
        Some(self.qualify(&topic))
    }

    fn qualify(&self, topic: &str) -> String {
        if self.prefix.is_empty() {
            topic.to_string()
        } else {
            format!("{}/{topic}", self.prefix)
        }
    }

    fn strip_prefix<'a>(&self, topic: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            return Some(topic);
        }
        topic.strip_prefix(self.prefix.as_str())?.strip_prefix('/')
    }
}

/// MQTT filter matching: `+` matches one level, a trailing `#` matches the
/// remaining levels (including none).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut topic_levels = topic.split('/');
    for level in filter.split('/') {
        match level {
            "#" => return true,
            "+" => {
                if topic_levels.next().is_none() {
                    return false;
                }
            }
            literal => {
                if topic_levels.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    topic_levels.next().is_none()
}
