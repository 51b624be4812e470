use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AnalysisError;
use crate::models::{PatientProfile, Reading};

/// Most recent readings sent with each analysis request.
pub const VITALS_WINDOW: usize = 20;

/// Body of one analysis request. Built fresh per trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequestPayload {
    pub patient_id: String,
    pub profile: PatientProfile,
    pub vitals: Vec<Reading>,
}

impl AnalysisRequestPayload {
    /// Keep only the last `VITALS_WINDOW` readings.
    pub fn new(patient_id: &str, profile: &PatientProfile, readings: &[Reading]) -> Self {
        let start = readings.len().saturating_sub(VITALS_WINDOW);
        Self {
            patient_id: patient_id.to_string(),
            profile: profile.clone(),
            vitals: readings[start..].to_vec(),
        }
    }
}

/// A risk or recommendation, either a bare line or a titled record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdviceItem {
    Text(String),
    Detailed {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl AdviceItem {
    /// Lenient reading of one list entry. Strings stay bare lines; any other
    /// non-null value becomes a record whose falsy fields read as absent.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self::Text(s.clone())),
            other => Some(Self::Detailed {
                title: other.get("title").and_then(truthy_text),
                description: other.get("description").and_then(truthy_text),
            }),
        }
    }

    /// Title, or `fallback` for a record without one.
    pub fn title_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self {
            Self::Text(text) => text.as_str(),
            Self::Detailed { title, .. } => title
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(fallback),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Text(_) => None,
            Self::Detailed { description, .. } => {
                description.as_deref().filter(|d| !d.is_empty())
            }
        }
    }
}

/// Best-effort structured reading of an AI response.
///
/// Both naming variants are kept as delivered; use `risk_items()` and
/// `recommendation_items()` to read whichever one is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedAiResponse {
    pub overview: Option<String>,
    pub health_risks: Option<Vec<AdviceItem>>,
    pub risks: Option<Vec<AdviceItem>>,
    pub precautionary_measures: Option<Vec<AdviceItem>>,
    pub recommendations: Option<Vec<AdviceItem>>,
    /// Upstream failure payload; when set, show it instead of results.
    pub error: Option<String>,
    pub details: Option<Value>,
}

impl ParsedAiResponse {
    /// Read fields leniently from a parsed JSON value. Only objects qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            overview: obj.get("overview").and_then(text_of),
            health_risks: obj.get("health_risks").and_then(advice_list),
            risks: obj.get("risks").and_then(advice_list),
            precautionary_measures: obj.get("precautionary_measures").and_then(advice_list),
            recommendations: obj.get("recommendations").and_then(advice_list),
            error: obj.get("error").and_then(truthy_text),
            details: obj.get("details").filter(|d| !d.is_null()).cloned(),
        })
    }

    /// Response carrying only free text as its overview.
    pub fn from_overview(text: &str) -> Self {
        Self {
            overview: Some(text.to_string()).filter(|t| !t.trim().is_empty()),
            ..Self::default()
        }
    }

    /// `health_risks` when present, else `risks`.
    pub fn risk_items(&self) -> &[AdviceItem] {
        self.health_risks
            .as_deref()
            .or(self.risks.as_deref())
            .unwrap_or(&[])
    }

    /// `precautionary_measures` when present, else `recommendations`.
    pub fn recommendation_items(&self) -> &[AdviceItem] {
        self.precautionary_measures
            .as_deref()
            .or(self.recommendations.as_deref())
            .unwrap_or(&[])
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Falsy values (null, false, "", 0) read as absent.
fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Arrays keep every non-null item; a lone string becomes one item.
fn advice_list(value: &Value) -> Option<Vec<AdviceItem>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(AdviceItem::from_value).collect()),
        Value::String(s) if !s.trim().is_empty() => Some(vec![AdviceItem::Text(s.clone())]),
        _ => None,
    }
}

/// Generative-AI analysis backend (allows mocking).
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Run one analysis. Single attempt; no retry.
    async fn analyze(
        &self,
        payload: AnalysisRequestPayload,
    ) -> Result<ParsedAiResponse, AnalysisError>;

    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reading(ts: i64) -> Reading {
        Reading {
            id: format!("r{ts}"),
            timestamp: ts,
            heart_rate: Some(70.0),
            oxygen_saturation: None,
            temperature: None,
        }
    }

    #[test]
    fn payload_keeps_last_twenty_readings() {
        let readings: Vec<Reading> = (1..=30).map(reading).collect();
        let payload = AnalysisRequestPayload::new("p1", &PatientProfile::default(), &readings);
        assert_eq!(payload.vitals.len(), VITALS_WINDOW);
        assert_eq!(payload.vitals[0].timestamp, 11);
        assert_eq!(payload.vitals[19].timestamp, 30);
    }

    #[test]
    fn payload_serializes_camel_case() {
        let payload = AnalysisRequestPayload::new("p1", &PatientProfile::default(), &[reading(1)]);
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["patientId"], "p1");
        assert!(v["profile"].is_object());
        assert_eq!(v["vitals"][0]["heartRate"], 70.0);
    }

    #[test]
    fn advice_items_accept_both_shapes() {
        let parsed = ParsedAiResponse::from_value(&json!({
            "health_risks": ["Tachycardia", {"title": "Hypoxia", "description": "SpO2 under 92%"}, null]
        }))
        .unwrap();
        let risks = parsed.risk_items();
        assert_eq!(risks.len(), 2);
        assert_eq!(risks[0].title_or("Risk"), "Tachycardia");
        assert_eq!(risks[0].description(), None);
        assert_eq!(risks[1].title_or("Risk"), "Hypoxia");
        assert_eq!(risks[1].description(), Some("SpO2 under 92%"));
    }

    #[test]
    fn untitled_record_uses_fallback() {
        let item: AdviceItem = serde_json::from_value(json!({"description": "Hydrate"})).unwrap();
        assert_eq!(item.title_or("Recommendation"), "Recommendation");
    }

    #[test]
    fn mistyped_records_keep_default_title() {
        let parsed = ParsedAiResponse::from_value(&json!({
            "precautionary_measures": [
                {"title": 42, "description": "Recheck in an hour"},
                {"title": "", "description": false},
                7
            ]
        }))
        .unwrap();
        let items = parsed.recommendation_items();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title_or("Recommendation"), "42");
        assert_eq!(items[0].description(), Some("Recheck in an hour"));
        assert_eq!(items[1].title_or("Recommendation"), "Recommendation");
        assert_eq!(items[1].description(), None);
        assert_eq!(items[2].title_or("Recommendation"), "Recommendation");
    }

    #[test]
    fn naming_variants_resolve_in_order() {
        let parsed = ParsedAiResponse::from_value(&json!({
            "risks": ["from risks"],
            "recommendations": ["rest"],
            "precautionary_measures": ["monitor"]
        }))
        .unwrap();
        assert_eq!(parsed.risk_items()[0].title_or(""), "from risks");
        assert_eq!(parsed.recommendation_items()[0].title_or(""), "monitor");
    }

    #[test]
    fn string_risks_become_single_item() {
        let parsed = ParsedAiResponse::from_value(&json!({"risks": "None reported"})).unwrap();
        assert_eq!(parsed.risk_items().len(), 1);
    }

    #[test]
    fn error_field_is_read() {
        let parsed = ParsedAiResponse::from_value(&json!({"error": "quota", "details": "try later"})).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("quota"));
        assert_eq!(parsed.details, Some(json!("try later")));

        let parsed = ParsedAiResponse::from_value(&json!({"error": "", "overview": "ok"})).unwrap();
        assert_eq!(parsed.error, None);
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(ParsedAiResponse::from_value(&json!([1, 2])).is_none());
        assert!(ParsedAiResponse::from_value(&json!("text")).is_none());
    }

    #[test]
    fn blank_overview_is_absent() {
        assert_eq!(ParsedAiResponse::from_overview("  ").overview, None);
        assert_eq!(ParsedAiResponse::from_overview("ok").overview.as_deref(), Some("ok"));
    }
}
