use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field aliases seen in device payloads, checked in order.
const HEART_RATE_KEYS: &[&str] = &["heartRate", "heart_rate", "hr"];
const OXYGEN_KEYS: &[&str] = &["oxygen", "spo2", "oxygen_level"];
const TEMPERATURE_KEYS: &[&str] = &["temperature", "body_temperature", "temp"];

/// Kind of vital carried by a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalKind {
    HeartRate,
    OxygenSaturation,
    Temperature,
}

impl VitalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VitalKind::HeartRate => "heart_rate",
            VitalKind::OxygenSaturation => "oxygen_saturation",
            VitalKind::Temperature => "temperature",
        }
    }

    /// Display unit for this vital.
    pub fn unit(self) -> &'static str {
        match self {
            VitalKind::HeartRate => "bpm",
            VitalKind::OxygenSaturation => "%",
            VitalKind::Temperature => "°C",
        }
    }
}

/// One canonical vital-signs sample.
///
/// Built once from the raw database record; every later consumer reads these
/// fields directly instead of re-resolving aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Database key of the record.
    pub id: String,
    /// Milliseconds since epoch. 0 when the record carried none.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl Reading {
    /// Normalize a raw record into a canonical reading.
    pub fn from_fields(id: &str, fields: &Map<String, Value>) -> Self {
        let timestamp = fields
            .get("timestamp")
            .and_then(number_of)
            .map(|ts| ts as i64)
            .unwrap_or(0);

        Self {
            id: id.to_string(),
            timestamp,
            heart_rate: first_number(fields, HEART_RATE_KEYS),
            oxygen_saturation: first_number(fields, OXYGEN_KEYS),
            temperature: first_number(fields, TEMPERATURE_KEYS),
        }
    }

    pub fn value(&self, kind: VitalKind) -> Option<f64> {
        match kind {
            VitalKind::HeartRate => self.heart_rate,
            VitalKind::OxygenSaturation => self.oxygen_saturation,
            VitalKind::Temperature => self.temperature,
        }
    }
}

/// Convert a readings snapshot (`null`, `{key: record}` or an array) into
/// readings ordered by timestamp. Records that are not objects are skipped.
pub fn readings_from_snapshot(snapshot: &Value) -> Vec<Reading> {
    let mut readings: Vec<Reading> = super::snapshot_entries(snapshot)
        .into_iter()
        .filter_map(|(id, record)| record.as_object().map(|f| Reading::from_fields(&id, f)))
        .collect();
    // Stable: equal timestamps keep key order.
    readings.sort_by_key(|r| r.timestamp);
    readings
}

/// First alias that holds a usable number wins. `null` falls through.
fn first_number(fields: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| fields.get(*key).and_then(number_of))
}

/// Accept JSON numbers and numeric strings; reject non-finite values.
fn number_of(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
