use crate::analysis::{AnalysisError, ParsedAiResponse};
use crate::models::{PatientDirectory, PatientProfile, Reading};
use crate::realtime::{LinkStatus, WatchEvent};

/// Who asked for an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Fired by the threshold trigger; failures stay silent.
    Auto,
    /// Requested by the doctor.
    Manual,
}

impl AnalysisMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

/// Message on a patient session's channel.
#[derive(Debug)]
pub enum SessionEvent {
    Watch(WatchEvent),
    AnalysisDone {
        mode: AnalysisMode,
        result: Result<ParsedAiResponse, AnalysisError>,
    },
}

/// Anything the controller's loop can receive.
#[derive(Debug)]
pub enum ControllerEvent {
    /// From the patient directory watcher.
    Directory(WatchEvent),
    /// From the selected patient's session.
    Session(SessionEvent),
}

/// A change the dashboard should render.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardUpdate {
    Patients(PatientDirectory),
    Selected { patient_id: String },
    Profile {
        patient_id: String,
        profile: PatientProfile,
    },
    Vitals {
        patient_id: String,
        readings: Vec<Reading>,
    },
    Link(LinkStatus),
    AnalysisStarted { mode: AnalysisMode },
    AnalysisFinished {
        mode: AnalysisMode,
        outcome: Result<ParsedAiResponse, AnalysisError>,
    },
}
