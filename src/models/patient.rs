use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form patient profile record, passed to the analysis service as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientProfile(pub Map<String, Value>);

impl PatientProfile {
    /// Build from a profile snapshot; anything but an object is an empty profile.
    pub fn from_snapshot(snapshot: &Value) -> Self {
        Self(snapshot.as_object().cloned().unwrap_or_default())
    }

    fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<String> {
        self.text("name")
    }

    pub fn status(&self) -> Option<String> {
        self.text("status")
    }

    /// `name`, or `Patient <id>` when the profile has none.
    pub fn display_name(&self, patient_id: &str) -> String {
        self.name().unwrap_or_else(|| format!("Patient {patient_id}"))
    }

    /// `<age> yrs · <gender> · <label>`, skipping absent parts.
    pub fn meta_line(&self) -> String {
        let bits: Vec<String> = [
            self.text("age").map(|a| format!("{a} yrs")),
            self.text("gender"),
            self.text("label"),
        ]
        .into_iter()
        .flatten()
        .collect();

        if bits.is_empty() {
            "No profile data".to_string()
        } else {
            bits.join(" · ")
        }
    }
}

/// One entry of the patient list.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientEntry {
    pub id: String,
    pub name: String,
    pub status: String,
}

impl PatientEntry {
    /// Avatar initial, upper-cased.
    pub fn initial(&self) -> char {
        self.name
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('P')
    }
}

/// Snapshot of all patients visible to the signed-in doctor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientDirectory {
    pub entries: Vec<PatientEntry>,
}

impl PatientDirectory {
    /// Build from the `patients` snapshot (`{id: {profile: {...}, readings: {...}}}`).
    pub fn from_snapshot(snapshot: &Value) -> Self {
        let entries = super::snapshot_entries(snapshot)
            .into_iter()
            .map(|(id, data)| {
                let profile =
                    PatientProfile::from_snapshot(data.get("profile").unwrap_or(&Value::Null));
                PatientEntry {
                    name: profile.display_name(&id),
                    id,
                    status: profile.status().unwrap_or_else(|| "No status".to_string()),
                }
            })
            .collect();

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, patient_id: &str) -> bool {
        self.entries.iter().any(|e| e.id == patient_id)
    }

    pub fn first_id(&self) -> Option<&str> {
        self.entries.first().map(|e| e.id.as_str())
    }
}
