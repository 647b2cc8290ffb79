//! Payload decoding and value normalization.
//!
//! Hardware reports the same fact in many spellings (`true`, `1`, `"ON"`,
//! `"LOCKED"` …). [`parse_payload`] turns raw bytes into a JSON value and
//! never fails; [`normalize`] then maps that value onto the kind a field
//! expects, consulting a fixed vocabulary per [`BoolTable`].

use hearth_types::{BoolTable, FieldValue, ThermostatMode, ValueKind};
use serde_json::Value;

/// Spellings accepted by plain on/off fields.
const ON_OFF_WORDS: &[(&str, bool)] = &[
    ("ON", true),
    ("1", true),
    ("TRUE", true),
    ("OFF", false),
    ("0", false),
    ("FALSE", false),
];

/// Extra spellings accepted by lock-style fields, on top of [`ON_OFF_WORDS`].
const LOCK_WORDS: &[(&str, bool)] = &[
    ("LOCKED", true),
    ("LOCK", true),
    ("UNLOCKED", false),
    ("UNLOCK", false),
];

/// Members unwrapped when a payload arrives as a JSON object.
const ENVELOPE_KEYS: [&str; 2] = ["state", "value"];

/// Decode a raw payload.
///
/// The payload is read as (lossy) UTF-8 and parsed as JSON. Anything that is
/// not valid JSON becomes a trimmed [`Value::String`]. Objects with a `state`
/// or `value` member are unwrapped to that member.
pub fn parse_payload(raw: &[u8]) -> Value {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(mut map)) => ENVELOPE_KEYS
            .iter()
            .find_map(|key| map.remove(*key))
            .unwrap_or(Value::Object(map)),
        Ok(value) => value,
        Err(_) => Value::String(trimmed.to_string()),
    }
}

/// Map `raw` onto a value of `kind`, or `None` when no table entry applies.
pub fn normalize(kind: ValueKind, raw: &Value) -> Option<FieldValue> {
    match kind {
        ValueKind::Bool(table) => normalize_bool(table, raw).map(FieldValue::Bool),
        ValueKind::Number => normalize_number(raw).map(FieldValue::Number),
        ValueKind::Mode => raw.as_str().and_then(ThermostatMode::parse).map(FieldValue::Mode),
    }
}

pub fn normalize_bool(table: BoolTable, raw: &Value) -> Option<bool> {
    let word = match raw {
        Value::Bool(flag) => return Some(*flag),
        Value::Number(n) => n.as_u64()?.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    let extra: &[(&str, bool)] = match table {
        BoolTable::OnOff => &[],
        BoolTable::Lock => LOCK_WORDS,
    };
    ON_OFF_WORDS
        .iter()
        .chain(extra)
        .find(|(spelling, _)| spelling.eq_ignore_ascii_case(&word))
        .map(|(_, flag)| *flag)
}

pub fn normalize_number(raw: &Value) -> Option<f64> {
    let number = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Command word sent to an actuator for a boolean field.
pub fn command_word(table: BoolTable, on: bool) -> &'static str {
    match (table, on) {
        (BoolTable::OnOff, true) => "ON",
        (BoolTable::OnOff, false) => "OFF",
        (BoolTable::Lock, true) => "LOCK",
        (BoolTable::Lock, false) => "UNLOCK",
    }
}
