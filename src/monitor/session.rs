use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::events::{AnalysisMode, SessionEvent};
use super::trigger::{AutoAnalysisTrigger, TriggerDecision};
use crate::analysis::{AnalysisClient, AnalysisRequestPayload};
use crate::models::{readings_from_snapshot, PatientProfile, Reading};
use crate::realtime::{RealtimeSource, Subscription, WatchTarget};

const SESSION_CHANNEL_CAPACITY: usize = 64;

/// Everything tied to the currently selected patient.
///
/// Created on selection, dropped on switch. Dropping aborts the profile and
/// readings watchers and any analysis still running, so nothing from the old
/// patient can reach the next session.
pub struct PatientSession {
    patient_id: String,
    profile: PatientProfile,
    readings: Vec<Reading>,
    trigger: AutoAnalysisTrigger,
    tx: mpsc::Sender<SessionEvent>,
    rx: mpsc::Receiver<SessionEvent>,
    _subscription: Subscription,
    auto_task: Option<JoinHandle<()>>,
    manual_task: Option<JoinHandle<()>>,
}

impl PatientSession {
    /// Open a session and start watching the patient's profile and readings.
    pub fn open(
        patient_id: &str,
        source: Arc<dyn RealtimeSource>,
        poll_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);

        let mut subscription = Subscription::new();
        subscription.watch(
            source.clone(),
            WatchTarget::Profile(patient_id.to_string()),
            poll_interval,
            tx.clone(),
            SessionEvent::Watch,
        );
        subscription.watch(
            source,
            WatchTarget::Readings(patient_id.to_string()),
            poll_interval,
            tx.clone(),
            SessionEvent::Watch,
        );

        Self {
            patient_id: patient_id.to_string(),
            profile: PatientProfile::default(),
            readings: Vec::new(),
            trigger: AutoAnalysisTrigger::default(),
            tx,
            rx,
            _subscription: subscription,
            auto_task: None,
            manual_task: None,
        }
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn profile(&self) -> &PatientProfile {
        &self.profile
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn trigger(&self) -> &AutoAnalysisTrigger {
        &self.trigger
    }

    pub fn has_data(&self) -> bool {
        !self.readings.is_empty()
    }

    pub fn is_running(&self, mode: AnalysisMode) -> bool {
        self.slot(mode).is_some()
    }

    pub(crate) async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    pub(crate) fn apply_profile(&mut self, snapshot: &serde_json::Value) {
        self.profile = PatientProfile::from_snapshot(snapshot);
    }

    /// Replace the readings window and feed it to the trigger.
    pub(crate) fn apply_readings(&mut self, snapshot: &serde_json::Value) -> TriggerDecision {
        self.readings = readings_from_snapshot(snapshot);
        self.trigger.observe(&self.readings)
    }

    /// Payload from the readings held right now.
    pub fn payload(&self) -> AnalysisRequestPayload {
        AnalysisRequestPayload::new(&self.patient_id, &self.profile, &self.readings)
    }

    /// Run one analysis in the background; the result comes back on the
    /// session channel as `SessionEvent::AnalysisDone`.
    pub(crate) fn spawn_analysis(&mut self, mode: AnalysisMode, client: Arc<dyn AnalysisClient>) {
        let payload = self.payload();
        let tx = self.tx.clone();
        let patient_id = self.patient_id.clone();
        let request_id = Uuid::new_v4();

        tracing::info!(
            %request_id,
            patient_id = %patient_id,
            mode = mode.as_str(),
            vitals = payload.vitals.len(),
            backend = client.backend_name(),
            "Analysis requested"
        );

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = client.analyze(payload).await;
            tracing::debug!(
                %request_id,
                ok = result.is_ok(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Analysis returned"
            );
            if tx.send(SessionEvent::AnalysisDone { mode, result }).await.is_err() {
                tracing::debug!(%request_id, patient_id = %patient_id, "Session closed before analysis finished");
            }
        });
        *self.slot_mut(mode) = Some(task);
    }

    /// Clear the slot of a finished analysis. For auto runs, returns whether
    /// the backlog calls for the next chunk.
    pub(crate) fn finish_analysis(&mut self, mode: AnalysisMode) -> TriggerDecision {
        self.slot_mut(mode).take();
        match mode {
            AnalysisMode::Auto => self.trigger.complete(),
            AnalysisMode::Manual => TriggerDecision::Hold,
        }
    }

    fn slot(&self, mode: AnalysisMode) -> Option<&JoinHandle<()>> {
        match mode {
            AnalysisMode::Auto => self.auto_task.as_ref(),
            AnalysisMode::Manual => self.manual_task.as_ref(),
        }
    }

    fn slot_mut(&mut self, mode: AnalysisMode) -> &mut Option<JoinHandle<()>> {
        match mode {
            AnalysisMode::Auto => &mut self.auto_task,
            AnalysisMode::Manual => &mut self.manual_task,
        }
    }
}

impl Drop for PatientSession {
    fn drop(&mut self) {
        for task in [self.auto_task.take(), self.manual_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}
