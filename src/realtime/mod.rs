pub mod firebase;
pub mod watch;

pub use firebase::*;
pub use watch::*;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Readings fetched per poll (most recent by timestamp).
pub const READINGS_LIMIT: usize = 50;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RealtimeError {
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Database unreachable: {0}")]
    Connection(String),

    #[error("Database request failed: {0}")]
    Http(String),

    #[error("Database returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Could not decode database response: {0}")]
    Decode(String),
}

/// Read access to the realtime database, one snapshot per call.
///
/// Snapshots are returned raw; normalization into models happens at the
/// consumer. A path with no data yields `Value::Null`.
#[async_trait]
pub trait RealtimeSource: Send + Sync {
    /// `patients`: `{id: {profile, readings}}`.
    async fn fetch_patients(&self) -> Result<Value, RealtimeError>;

    /// `patients/{id}/profile`.
    async fn fetch_profile(&self, patient_id: &str) -> Result<Value, RealtimeError>;

    /// `patients/{id}/readings`, last `limit` by timestamp.
    async fn fetch_readings(&self, patient_id: &str, limit: usize)
        -> Result<Value, RealtimeError>;
}

/// In-memory source for tests and offline runs.
#[derive(Default)]
pub struct StaticSource {
    patients: Mutex<Map<String, Value>>,
    failing: AtomicBool,
    reading_fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patient(self, patient_id: &str, profile: Value) -> Self {
        self.set_profile(patient_id, profile);
        self
    }

    pub fn set_profile(&self, patient_id: &str, profile: Value) {
        self.update(patient_id, "profile", profile);
    }

    /// Replace the readings node with `{id: reading}` records.
    pub fn set_readings(&self, patient_id: &str, readings: Value) {
        self.update(patient_id, "readings", readings);
    }

    /// Simulate a lost connection.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reading_fetches(&self) -> usize {
        self.reading_fetches.load(Ordering::SeqCst)
    }

    fn update(&self, patient_id: &str, key: &str, value: Value) {
        if let Ok(mut patients) = self.patients.lock() {
            let node = patients
                .entry(patient_id.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(fields) = node {
                fields.insert(key.to_string(), value);
            }
        }
    }

    fn check(&self) -> Result<(), RealtimeError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RealtimeError::Connection("static source offline".into()));
        }
        Ok(())
    }

    fn node(&self, patient_id: &str, key: &str) -> Value {
        self.patients
            .lock()
            .ok()
            .and_then(|p| p.get(patient_id).and_then(|n| n.get(key)).cloned())
            .unwrap_or(Value::Null)
    }
}

/// Keep the last `limit` records ordered by `timestamp`, as the database query does.
fn limit_to_last(readings: Value, limit: usize) -> Value {
    let Value::Object(records) = readings else {
        return readings;
    };
    let mut entries: Vec<(String, Value)> = records.into_iter().collect();
    entries.sort_by_key(|(_, r)| r.get("timestamp").and_then(Value::as_i64).unwrap_or(0));
    let start = entries.len().saturating_sub(limit);
    Value::Object(entries.into_iter().skip(start).collect())
}

#[async_trait]
impl RealtimeSource for StaticSource {
    async fn fetch_patients(&self) -> Result<Value, RealtimeError> {
        self.check()?;
        let patients = self.patients.lock().map(|p| p.clone()).unwrap_or_default();
        if patients.is_empty() {
            return Ok(Value::Null);
        }
        Ok(Value::Object(patients))
    }

    async fn fetch_profile(&self, patient_id: &str) -> Result<Value, RealtimeError> {
        self.check()?;
        Ok(self.node(patient_id, "profile"))
    }

    async fn fetch_readings(
        &self,
        patient_id: &str,
        limit: usize,
    ) -> Result<Value, RealtimeError> {
        self.reading_fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(limit_to_last(self.node(patient_id, "readings"), limit))
    }
}

/// Build a readings node `{"r<ts>": {timestamp, heartRate, oxygen, temperature}}`
/// for the given timestamps.
pub fn readings_node(timestamps: impl IntoIterator<Item = i64>) -> Value {
    let records: Map<String, Value> = timestamps
        .into_iter()
        .map(|ts| {
            (
                format!("r{ts}"),
                serde_json::json!({
                    "timestamp": ts,
                    "heartRate": 70 + ts % 10,
                    "oxygen": 97,
                    "temperature": 36.6,
                }),
            )
        })
        .collect();
    Value::Object(records)
}
