//! Terminal rendering of dashboard updates.
//!
//! Pure text formatting. Nothing here touches the network or the
//! controller, so every view is built from plain values.

use std::fmt::Write as _;

use chrono::{Local, TimeZone};

use crate::analysis::{AdviceItem, AnalysisError, ParsedAiResponse};
use crate::models::{PatientDirectory, PatientProfile, Reading, VitalKind};
use crate::monitor::{AnalysisMode, DashboardUpdate};

pub const PLACEHOLDER: &str = "—";
const AWAITING_DATA: &str = "Awaiting data";
const STABLE_DELTA: f64 = 0.5;
const TIME_FORMAT: &str = "%b %-d, %H:%M";
const CHART_ROWS: usize = 10;

const NO_RISKS: &str = "No specific health risks identified based on current data.";
const NO_PRECAUTIONS: &str = "No specific precautionary measures suggested based on current data.";
const NO_OVERVIEW: &str = "No overview returned.";

/// Local `Mon D, HH:MM` for a millisecond timestamp; `—` for 0 or out of range.
pub fn format_time(timestamp_ms: i64) -> String {
    if timestamp_ms == 0 {
        return PLACEHOLDER.to_string();
    }
    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(time) => time.format(TIME_FORMAT).to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

/// Change against the previous sample.
pub fn trend_text(current: Option<f64>, previous: Option<f64>) -> String {
    let (Some(current), Some(previous)) = (current, previous) else {
        return PLACEHOLDER.to_string();
    };
    let delta = current - previous;
    if delta.abs() < STABLE_DELTA {
        "Stable".to_string()
    } else if delta > 0.0 {
        format!("+{delta:.1} vs last")
    } else {
        format!("{delta:.1} vs last")
    }
}

/// Whole numbers print without a fraction.
fn number(value: f64) -> String {
    format!("{value}")
}

fn vital_label(kind: VitalKind) -> &'static str {
    match kind {
        VitalKind::HeartRate => "Heart rate",
        VitalKind::OxygenSaturation => "SpO2",
        VitalKind::Temperature => "Temp",
    }
}

fn vital_value(kind: VitalKind, value: Option<f64>) -> String {
    let unit = kind.unit();
    match (kind, value) {
        (_, None) => format!("-- {unit}"),
        (VitalKind::Temperature, Some(v)) => format!("{v:.1} {unit}"),
        (_, Some(v)) => format!("{} {unit}", number(v)),
    }
}

/// Latest value and trend for one vital.
#[derive(Debug, Clone, PartialEq)]
pub struct VitalLine {
    pub kind: VitalKind,
    pub value: String,
    pub trend: String,
}

/// The vitals card for the latest readings window.
#[derive(Debug, Clone, PartialEq)]
pub struct VitalsCard {
    pub lines: Vec<VitalLine>,
    pub samples: String,
    pub last_updated: String,
}

impl VitalsCard {
    pub fn from_readings(readings: &[Reading]) -> Self {
        let kinds = [
            VitalKind::HeartRate,
            VitalKind::OxygenSaturation,
            VitalKind::Temperature,
        ];
        let samples = format!("{} samples", readings.len());

        let Some(last) = readings.last() else {
            return Self {
                lines: kinds
                    .into_iter()
                    .map(|kind| VitalLine {
                        kind,
                        value: vital_value(kind, None),
                        trend: AWAITING_DATA.to_string(),
                    })
                    .collect(),
                samples,
                last_updated: format!("Last updated: {PLACEHOLDER}"),
            };
        };
        let previous = readings.len().checked_sub(2).map(|i| &readings[i]);

        let lines = kinds
            .into_iter()
            .map(|kind| VitalLine {
                kind,
                value: vital_value(kind, last.value(kind)),
                trend: trend_text(last.value(kind), previous.and_then(|p| p.value(kind))),
            })
            .collect();

        Self {
            lines,
            samples,
            last_updated: format!("Last updated: {}", format_time(last.timestamp)),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let _ = writeln!(out, "  {:<12} {:>10}  {}", vital_label(line.kind), line.value, line.trend);
        }
        let _ = write!(out, "  {} · {}", self.samples, self.last_updated);
        out
    }
}

/// Chart data: one label per reading and one series per vital, gaps as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub heart_rate: Vec<Option<f64>>,
    pub oxygen_saturation: Vec<Option<f64>>,
    pub temperature: Vec<Option<f64>>,
}

impl ChartSeries {
    pub fn from_readings(readings: &[Reading]) -> Self {
        Self {
            labels: readings.iter().map(|r| format_time(r.timestamp)).collect(),
            heart_rate: readings.iter().map(|r| r.heart_rate).collect(),
            oxygen_saturation: readings.iter().map(|r| r.oxygen_saturation).collect(),
            temperature: readings.iter().map(|r| r.temperature).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// The most recent `rows` points as a table.
    pub fn render_tail(&self, rows: usize) -> String {
        let cell = |v: Option<f64>| v.map(number).unwrap_or_else(|| PLACEHOLDER.to_string());
        let start = self.len().saturating_sub(rows);
        let mut out = format!("  {:<14} {:>6} {:>6} {:>6}", "time", "bpm", "%", "°C");
        for i in start..self.len() {
            let temp = self.temperature[i]
                .map(|t| format!("{t:.1}"))
                .unwrap_or_else(|| PLACEHOLDER.to_string());
            let _ = write!(
                out,
                "\n  {:<14} {:>6} {:>6} {:>6}",
                self.labels[i],
                cell(self.heart_rate[i]),
                cell(self.oxygen_saturation[i]),
                temp
            );
        }
        out
    }
}

/// One rendered risk or precaution.
#[derive(Debug, Clone, PartialEq)]
pub struct AdviceLine {
    pub title: String,
    pub description: Option<String>,
}

impl AdviceLine {
    fn note(text: impl Into<String>) -> Self {
        Self {
            title: text.into(),
            description: None,
        }
    }

    fn from_item(item: &AdviceItem, fallback: &str) -> Self {
        Self {
            title: item.title_or(fallback).to_string(),
            description: item
                .description()
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        }
    }
}

/// What the analysis panel shows.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisView {
    pub overview: String,
    pub risks: Vec<AdviceLine>,
    pub precautions: Vec<AdviceLine>,
    /// Error banner, when the request or the service failed.
    pub error: Option<String>,
}

impl AnalysisView {
    /// Shown while a request runs.
    pub fn pending(mode: AnalysisMode) -> Self {
        let overview = match mode {
            AnalysisMode::Auto => "Auto-analyzing with Gemini...",
            AnalysisMode::Manual => "Analyzing with Gemini...",
        };
        Self {
            overview: overview.to_string(),
            risks: vec![AdviceLine::note("Analyzing risks...")],
            precautions: vec![AdviceLine::note("Generating precautions...")],
            error: None,
        }
    }

    pub fn from_outcome(outcome: &Result<ParsedAiResponse, AnalysisError>) -> Self {
        match outcome {
            Ok(parsed) => Self::from_response(parsed),
            Err(err) => Self::from_error(err),
        }
    }

    fn from_response(parsed: &ParsedAiResponse) -> Self {
        if let Some(error) = parsed.error.as_deref() {
            let details = parsed.details.as_ref().map(|d| match d {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            return Self {
                overview: format!("Error generating summary: {error}"),
                risks: vec![AdviceLine::note(format!("Error generating risks: {error}"))],
                precautions: vec![AdviceLine::note(format!(
                    "Error generating precautions: {error}"
                ))],
                error: Some(match details {
                    Some(details) if !details.is_empty() => format!("{error} ({details})"),
                    _ => error.to_string(),
                }),
            };
        }

        let lines = |items: &[AdviceItem], fallback: &str, empty: &str| {
            if items.is_empty() {
                vec![AdviceLine::note(empty)]
            } else {
                items.iter().map(|i| AdviceLine::from_item(i, fallback)).collect()
            }
        };

        Self {
            overview: parsed
                .overview
                .clone()
                .filter(|o| !o.trim().is_empty())
                .unwrap_or_else(|| NO_OVERVIEW.to_string()),
            risks: lines(parsed.risk_items(), "Risk", NO_RISKS),
            precautions: lines(parsed.recommendation_items(), "Recommendation", NO_PRECAUTIONS),
            error: None,
        }
    }

    fn from_error(err: &AnalysisError) -> Self {
        let message = err.user_message();
        match err {
            AnalysisError::RateLimited => Self {
                overview: message.clone(),
                risks: vec![AdviceLine::note(message.clone())],
                precautions: vec![AdviceLine::note(message)],
                error: None,
            },
            AnalysisError::NoData => Self {
                overview: "Select a patient and run analysis.".to_string(),
                risks: Vec::new(),
                precautions: Vec::new(),
                error: Some(message),
            },
            AnalysisError::Busy => Self {
                overview: AnalysisView::pending(AnalysisMode::Manual).overview,
                risks: Vec::new(),
                precautions: Vec::new(),
                error: Some(message),
            },
            AnalysisError::NotConfigured => Self {
                overview: message,
                risks: vec![AdviceLine::note("N/A")],
                precautions: vec![AdviceLine::note("N/A")],
                error: Some(
                    "Set CARDIOLINK_GEMINI_PROXY_URL or CARDIOLINK_GEMINI_API_KEY".to_string(),
                ),
            },
            AnalysisError::InvalidResponse(_) => Self {
                overview: message,
                risks: vec![AdviceLine::note("Failed to load risks.")],
                precautions: vec![AdviceLine::note("Failed to load precautions.")],
                error: None,
            },
            _ => Self {
                overview: "Analysis unavailable.".to_string(),
                risks: vec![AdviceLine::note("Failed to load risks.")],
                precautions: vec![AdviceLine::note("Failed to load precautions.")],
                error: Some(message),
            },
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(error) = &self.error {
            let _ = writeln!(out, "  ! {error}");
        }
        let _ = writeln!(out, "  Overview: {}", self.overview);
        let sections = [("Risks", &self.risks), ("Precautions", &self.precautions)];
        for (heading, items) in sections {
            if items.is_empty() {
                continue;
            }
            let _ = writeln!(out, "  {heading}:");
            for item in items.iter() {
                let _ = writeln!(out, "   - {}", item.title);
                if let Some(description) = &item.description {
                    let _ = writeln!(out, "     {description}");
                }
            }
        }
        out.trim_end().to_string()
    }
}

/// Patient chips; the selected one is starred.
pub fn render_patient_list(directory: &PatientDirectory, selected: Option<&str>) -> String {
    if directory.is_empty() {
        return "No patients found.".to_string();
    }
    let mut out = String::from("Patients:");
    for entry in &directory.entries {
        let marker = if selected == Some(entry.id.as_str()) { '*' } else { ' ' };
        let _ = write!(
            out,
            "\n {marker} [{}] {:<20} {:<12} {}",
            entry.initial(),
            entry.name,
            entry.status,
            entry.id
        );
    }
    out
}

/// Name, meta line and status for the selected patient.
pub fn render_profile(patient_id: &str, profile: &PatientProfile) -> String {
    format!(
        "{}\n  {}\n  Status: {}",
        profile.display_name(patient_id),
        profile.meta_line(),
        profile.status().unwrap_or_else(|| PLACEHOLDER.to_string())
    )
}

/// Text for one dashboard update.
pub fn render_update(update: &DashboardUpdate, selected: Option<&str>) -> String {
    match update {
        DashboardUpdate::Patients(directory) => render_patient_list(directory, selected),
        DashboardUpdate::Selected { patient_id } => format!("Selected patient {patient_id}"),
        DashboardUpdate::Profile {
            patient_id,
            profile,
        } => render_profile(patient_id, profile),
        DashboardUpdate::Vitals { readings, .. } => {
            let card = VitalsCard::from_readings(readings);
            let chart = ChartSeries::from_readings(readings);
            if chart.is_empty() {
                format!("Vitals:\n{}", card.render())
            } else {
                format!("Vitals:\n{}\n{}", card.render(), chart.render_tail(CHART_ROWS))
            }
        }
        DashboardUpdate::Link(status) => format!("[{}]", status.label()),
        DashboardUpdate::AnalysisStarted { mode } => AnalysisView::pending(*mode).overview,
        DashboardUpdate::AnalysisFinished { outcome, .. } => {
            format!("Analysis:\n{}", AnalysisView::from_outcome(outcome).render())
        }
    }
}
