use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use super::events::{AnalysisMode, ControllerEvent, DashboardUpdate, SessionEvent};
use super::session::PatientSession;
use super::trigger::TriggerDecision;
use crate::analysis::{AnalysisClient, AnalysisError};
use crate::models::PatientDirectory;
use crate::realtime::{LinkStatus, RealtimeSource, Subscription, WatchEvent, WatchTarget};

const DIRECTORY_CHANNEL_CAPACITY: usize = 16;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("Unknown patient: {0}")]
    UnknownPatient(String),
}

/// The patient directory watch, alive from `start` until the controller drops.
struct DirectoryWatch {
    _subscription: Subscription,
    rx: mpsc::Receiver<WatchEvent>,
}

/// Single owner of dashboard state.
///
/// All mutation happens in `handle` and the command methods, called from one
/// loop; background tasks only talk back through channels.
pub struct MonitorController {
    source: Arc<dyn RealtimeSource>,
    analysis: Arc<dyn AnalysisClient>,
    poll_interval: Duration,
    directory: PatientDirectory,
    directory_watch: Option<DirectoryWatch>,
    preferred_patient: Option<String>,
    session: Option<PatientSession>,
    link: Option<LinkStatus>,
}

impl MonitorController {
    pub fn new(
        source: Arc<dyn RealtimeSource>,
        analysis: Arc<dyn AnalysisClient>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            analysis,
            poll_interval,
            directory: PatientDirectory::default(),
            directory_watch: None,
            preferred_patient: None,
            session: None,
            link: None,
        }
    }

    /// Patient to select once the directory lists it, instead of the first one.
    pub fn with_preferred_patient(mut self, patient_id: Option<String>) -> Self {
        self.preferred_patient = patient_id;
        self
    }

    pub fn directory(&self) -> &PatientDirectory {
        &self.directory
    }

    pub fn session(&self) -> Option<&PatientSession> {
        self.session.as_ref()
    }

    pub fn selected_patient(&self) -> Option<&str> {
        self.session.as_ref().map(PatientSession::patient_id)
    }

    pub fn link(&self) -> Option<&LinkStatus> {
        self.link.as_ref()
    }

    /// Begin watching the patient directory. Idempotent.
    pub fn start(&mut self) {
        if self.directory_watch.is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel(DIRECTORY_CHANNEL_CAPACITY);
        let mut subscription = Subscription::new();
        subscription.watch(
            self.source.clone(),
            WatchTarget::Patients,
            self.poll_interval,
            tx,
            |event| event,
        );
        self.directory_watch = Some(DirectoryWatch {
            _subscription: subscription,
            rx,
        });
        tracing::info!(interval_ms = self.poll_interval.as_millis() as u64, "Watching patient directory");
    }

    /// Wait for the next event from the directory or the selected session.
    /// Cancel-safe.
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        let directory = self.directory_watch.as_mut().map(|w| &mut w.rx);
        let session = self.session.as_mut();

        tokio::select! {
            Some(event) = recv_directory(directory) => Some(ControllerEvent::Directory(event)),
            Some(event) = recv_session(session) => Some(ControllerEvent::Session(event)),
            else => None,
        }
    }

    /// Apply one event and return what changed on screen.
    pub fn handle(&mut self, event: ControllerEvent) -> Vec<DashboardUpdate> {
        match event {
            ControllerEvent::Directory(WatchEvent::Snapshot { value, .. }) => {
                // The snapshot nests readings, so it changes with every sample.
                let directory = PatientDirectory::from_snapshot(&value);
                let mut updates = Vec::new();
                if directory != self.directory {
                    self.directory = directory;
                    updates.push(DashboardUpdate::Patients(self.directory.clone()));
                }
                if self.session.is_none() {
                    if let Some(patient_id) = self.initial_patient() {
                        updates.extend(self.open_session(&patient_id));
                    }
                }
                updates
            }
            ControllerEvent::Directory(WatchEvent::Link(status)) => self.set_link(status),
            ControllerEvent::Session(event) => self.handle_session(event),
        }
    }

    /// Switch to `patient_id`, discarding all state of the previous patient.
    /// Re-selecting the current patient changes nothing.
    pub fn select_patient(
        &mut self,
        patient_id: &str,
    ) -> Result<Vec<DashboardUpdate>, MonitorError> {
        if self.selected_patient() == Some(patient_id) {
            return Ok(Vec::new());
        }
        if !self.directory.contains(patient_id) {
            return Err(MonitorError::UnknownPatient(patient_id.to_string()));
        }
        Ok(self.open_session(patient_id))
    }

    /// Doctor-requested analysis of the current readings.
    pub fn analyze_now(&mut self) -> Result<DashboardUpdate, AnalysisError> {
        let session = match self.session.as_mut() {
            Some(session) if session.has_data() => session,
            _ => return Err(AnalysisError::NoData),
        };
        if session.is_running(AnalysisMode::Manual) {
            return Err(AnalysisError::Busy);
        }
        session.spawn_analysis(AnalysisMode::Manual, self.analysis.clone());
        Ok(DashboardUpdate::AnalysisStarted {
            mode: AnalysisMode::Manual,
        })
    }

    fn initial_patient(&self) -> Option<String> {
        match self.preferred_patient.as_deref() {
            Some(preferred) if self.directory.contains(preferred) => Some(preferred.to_string()),
            Some(preferred) => {
                tracing::warn!(patient_id = %preferred, "Requested patient not in directory");
                self.directory.first_id().map(str::to_string)
            }
            None => self.directory.first_id().map(str::to_string),
        }
    }

    fn open_session(&mut self, patient_id: &str) -> Vec<DashboardUpdate> {
        if let Some(previous) = self.session.take() {
            tracing::info!(
                from = %previous.patient_id(),
                to = %patient_id,
                pending = previous.trigger().pending(),
                "Switching patient"
            );
        }
        self.preferred_patient = None;
        self.session = Some(PatientSession::open(
            patient_id,
            self.source.clone(),
            self.poll_interval,
        ));
        vec![DashboardUpdate::Selected {
            patient_id: patient_id.to_string(),
        }]
    }

    fn handle_session(&mut self, event: SessionEvent) -> Vec<DashboardUpdate> {
        let event = match event {
            SessionEvent::Watch(WatchEvent::Link(status)) => return self.set_link(status),
            other => other,
        };
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let patient_id = session.patient_id().to_string();

        match event {
            SessionEvent::Watch(WatchEvent::Snapshot {
                target: WatchTarget::Profile(_),
                value,
            }) => {
                session.apply_profile(&value);
                vec![DashboardUpdate::Profile {
                    patient_id,
                    profile: session.profile().clone(),
                }]
            }
            SessionEvent::Watch(WatchEvent::Snapshot {
                target: WatchTarget::Readings(_),
                value,
            }) => {
                let decision = session.apply_readings(&value);
                let mut updates = vec![DashboardUpdate::Vitals {
                    patient_id,
                    readings: session.readings().to_vec(),
                }];
                if decision == TriggerDecision::Fire {
                    session.spawn_analysis(AnalysisMode::Auto, self.analysis.clone());
                    updates.push(DashboardUpdate::AnalysisStarted {
                        mode: AnalysisMode::Auto,
                    });
                }
                updates
            }
            SessionEvent::Watch(_) => Vec::new(),
            SessionEvent::AnalysisDone { mode, result } => {
                let mut updates = Vec::new();
                match (mode, result) {
                    (AnalysisMode::Auto, Err(err)) => {
                        tracing::warn!(patient_id = %patient_id, error = %err, "Auto analysis failed");
                    }
                    (mode, outcome) => {
                        if let Err(err) = &outcome {
                            tracing::warn!(patient_id = %patient_id, error = %err, "Analysis failed");
                        }
                        updates.push(DashboardUpdate::AnalysisFinished { mode, outcome });
                    }
                }

                if session.finish_analysis(mode) == TriggerDecision::Fire {
                    tracing::debug!(
                        patient_id = %patient_id,
                        pending = session.trigger().pending(),
                        "Draining auto analysis backlog"
                    );
                    session.spawn_analysis(AnalysisMode::Auto, self.analysis.clone());
                    updates.push(DashboardUpdate::AnalysisStarted {
                        mode: AnalysisMode::Auto,
                    });
                }
                updates
            }
        }
    }

    fn set_link(&mut self, status: LinkStatus) -> Vec<DashboardUpdate> {
        if self.link.as_ref() == Some(&status) {
            return Vec::new();
        }
        self.link = Some(status.clone());
        vec![DashboardUpdate::Link(status)]
    }
}

async fn recv_directory(rx: Option<&mut mpsc::Receiver<WatchEvent>>) -> Option<WatchEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_session(session: Option<&mut PatientSession>) -> Option<SessionEvent> {
    match session {
        Some(session) => session.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{MockAnalysisClient, ParsedAiResponse};
    use crate::realtime::{readings_node, StaticSource};
    use serde_json::json;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(5);
    const WAIT: Duration = Duration::from_secs(3);

    fn overview(text: &str) -> ParsedAiResponse {
        ParsedAiResponse::from_overview(text)
    }

    fn source_with_patients() -> Arc<StaticSource> {
        let source = StaticSource::new()
            .with_patient("p1", json!({"name": "Ada", "status": "Stable"}))
            .with_patient("p2", json!({"name": "Grace"}));
        Arc::new(source)
    }

    fn controller(source: &Arc<StaticSource>, client: &Arc<MockAnalysisClient>) -> MonitorController {
        let source: Arc<dyn RealtimeSource> = source.clone();
        let client: Arc<dyn AnalysisClient> = client.clone();
        MonitorController::new(source, client, TICK)
    }

    /// Run the event loop until `done` holds, returning every update seen.
    async fn pump_until<F>(ctl: &mut MonitorController, mut done: F) -> Vec<DashboardUpdate>
    where
        F: FnMut(&MonitorController, &[DashboardUpdate]) -> bool,
    {
        let mut seen = Vec::new();
        let result = timeout(WAIT, async {
            while !done(ctl, &seen) {
                let Some(event) = ctl.next_event().await else {
                    break;
                };
                seen.extend(ctl.handle(event));
            }
        })
        .await;
        assert!(result.is_ok(), "timed out; updates so far: {seen:?}");
        seen
    }

    fn has_vitals(updates: &[DashboardUpdate]) -> bool {
        updates.iter().any(|u| matches!(u, DashboardUpdate::Vitals { .. }))
    }

    fn count_started(updates: &[DashboardUpdate], mode: AnalysisMode) -> usize {
        updates
            .iter()
            .filter(|u| matches!(u, DashboardUpdate::AnalysisStarted { mode: m } if *m == mode))
            .count()
    }

    fn finished(updates: &[DashboardUpdate], mode: AnalysisMode) -> Vec<&Result<ParsedAiResponse, AnalysisError>> {
        updates
            .iter()
            .filter_map(|u| match u {
                DashboardUpdate::AnalysisFinished { mode: m, outcome } if *m == mode => Some(outcome),
                _ => None,
            })
            .collect()
    }

    /// Start, auto-select p1 and wait for its first readings window.
    async fn seeded(ctl: &mut MonitorController) -> Vec<DashboardUpdate> {
        ctl.start();
        pump_until(ctl, |c, seen| {
            has_vitals(seen) && c.session().is_some_and(|s| s.trigger().is_armed())
        })
        .await
    }

    #[tokio::test]
    async fn first_patient_auto_selected() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=15));
        let client = Arc::new(MockAnalysisClient::new(overview("ok")));
        let mut ctl = controller(&source, &client);

        let updates = seeded(&mut ctl).await;
        assert_eq!(ctl.selected_patient(), Some("p1"));
        assert_eq!(ctl.directory().len(), 2);
        assert!(updates.contains(&DashboardUpdate::Selected {
            patient_id: "p1".into()
        }));
        assert!(updates.contains(&DashboardUpdate::Link(LinkStatus::Live)));
    }

    #[tokio::test]
    async fn history_before_selection_never_fires() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=15));
        let client = Arc::new(MockAnalysisClient::new(overview("ok")));
        let mut ctl = controller(&source, &client);

        let updates = seeded(&mut ctl).await;
        let session = ctl.session().unwrap();
        assert_eq!(session.trigger().watermark(), 15);
        assert_eq!(session.trigger().pending(), 0);
        assert_eq!(count_started(&updates, AnalysisMode::Auto), 0);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn preferred_patient_wins_over_first() {
        let source = source_with_patients();
        let client = Arc::new(MockAnalysisClient::new(overview("ok")));
        let mut ctl = controller(&source, &client).with_preferred_patient(Some("p2".into()));
        ctl.start();

        pump_until(&mut ctl, |c, _| c.selected_patient().is_some()).await;
        assert_eq!(ctl.selected_patient(), Some("p2"));
    }

    #[tokio::test]
    async fn ten_new_readings_fire_one_auto_analysis() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=15));
        let client = Arc::new(MockAnalysisClient::new(overview("Stable trend")));
        let mut ctl = controller(&source, &client);
        seeded(&mut ctl).await;

        source.set_readings("p1", readings_node(1..=27));
        let updates = pump_until(&mut ctl, |_, seen| !finished(seen, AnalysisMode::Auto).is_empty()).await;

        assert_eq!(count_started(&updates, AnalysisMode::Auto), 1);
        assert_eq!(client.calls(), 1);
        let payload = &client.payloads()[0];
        assert_eq!(payload.patient_id, "p1");
        assert_eq!(payload.vitals.len(), 20);
        assert_eq!(payload.vitals.last().map(|r| r.timestamp), Some(27));
        assert_eq!(payload.profile.name().as_deref(), Some("Ada"));

        let session = ctl.session().unwrap();
        assert_eq!(session.trigger().pending(), 2);
        assert!(!session.is_running(AnalysisMode::Auto));
        let outcome = finished(&updates, AnalysisMode::Auto)[0].clone().unwrap();
        assert_eq!(outcome.overview.as_deref(), Some("Stable trend"));
    }

    #[tokio::test]
    async fn backlog_drains_one_chunk_at_a_time() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=5));
        let client = Arc::new(MockAnalysisClient::new(overview("ok")));
        let mut ctl = controller(&source, &client);
        seeded(&mut ctl).await;

        source.set_readings("p1", readings_node(1..=30));
        let updates = pump_until(&mut ctl, |_, seen| finished(seen, AnalysisMode::Auto).len() == 2).await;

        assert_eq!(client.calls(), 2);
        assert_eq!(count_started(&updates, AnalysisMode::Auto), 2);
        let trigger = ctl.session().unwrap().trigger();
        assert_eq!(trigger.pending(), 5);
        assert!(!trigger.in_flight());
    }

    #[tokio::test]
    async fn auto_failure_is_silent_and_keeps_counting() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=5));
        let client = Arc::new(MockAnalysisClient::failing(AnalysisError::RateLimited));
        let mut ctl = controller(&source, &client);
        seeded(&mut ctl).await;

        source.set_readings("p1", readings_node(1..=18));
        let updates = pump_until(&mut ctl, |c, _| {
            client.calls() == 1 && c.session().is_some_and(|s| !s.trigger().in_flight())
        })
        .await;
        assert!(finished(&updates, AnalysisMode::Auto).is_empty());
        assert_eq!(ctl.session().unwrap().trigger().pending(), 3);

        source.set_readings("p1", readings_node(1..=25));
        pump_until(&mut ctl, |c, _| {
            client.calls() == 2 && c.session().is_some_and(|s| !s.trigger().in_flight())
        })
        .await;
        assert_eq!(ctl.session().unwrap().trigger().pending(), 0);
    }

    #[tokio::test]
    async fn readings_during_flight_do_not_start_second_request() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=5));
        let client = Arc::new(
            MockAnalysisClient::new(overview("ok")).with_delay(Duration::from_millis(300)),
        );
        let mut ctl = controller(&source, &client);
        seeded(&mut ctl).await;

        source.set_readings("p1", readings_node(1..=15));
        pump_until(&mut ctl, |_, seen| count_started(seen, AnalysisMode::Auto) == 1).await;

        source.set_readings("p1", readings_node(1..=21));
        pump_until(&mut ctl, |c, _| c.session().is_some_and(|s| s.trigger().watermark() == 21)).await;
        source.set_readings("p1", readings_node(1..=27));
        pump_until(&mut ctl, |c, _| c.session().is_some_and(|s| s.trigger().watermark() == 27)).await;

        let trigger = ctl.session().unwrap().trigger();
        assert!(trigger.in_flight());
        assert_eq!(trigger.pending(), 12);
        assert_eq!(client.calls(), 1);

        // Completion immediately fires the queued chunk.
        let updates = pump_until(&mut ctl, |_, seen| count_started(seen, AnalysisMode::Auto) == 1).await;
        assert_eq!(finished(&updates, AnalysisMode::Auto).len(), 1);
        assert_eq!(ctl.session().unwrap().trigger().pending(), 2);
    }

    #[tokio::test]
    async fn switching_patient_is_a_hard_reset() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=5));
        source.set_readings("p2", readings_node(1000..=1040));
        let client = Arc::new(
            MockAnalysisClient::new(overview("late")).with_delay(Duration::from_millis(200)),
        );
        let mut ctl = controller(&source, &client);
        seeded(&mut ctl).await;

        // Leave p1 with an in-flight request and a backlog.
        source.set_readings("p1", readings_node(1..=22));
        pump_until(&mut ctl, |_, seen| count_started(seen, AnalysisMode::Auto) == 1).await;
        assert_eq!(ctl.session().unwrap().trigger().pending(), 7);
        let reached = timeout(WAIT, async {
            while client.calls() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(reached.is_ok(), "p1 request never reached the client");

        let updates = ctl.select_patient("p2").unwrap();
        assert_eq!(
            updates,
            vec![DashboardUpdate::Selected {
                patient_id: "p2".into()
            }]
        );
        let trigger = ctl.session().unwrap().trigger();
        assert_eq!(trigger.pending(), 0);
        assert_eq!(trigger.watermark(), 0);
        assert!(!trigger.in_flight());

        let updates = pump_until(&mut ctl, |c, seen| {
            has_vitals(seen) && c.session().is_some_and(|s| s.trigger().is_armed())
        })
        .await;
        assert_eq!(ctl.session().unwrap().trigger().watermark(), 1040);
        assert_eq!(count_started(&updates, AnalysisMode::Auto), 0);

        // The aborted p1 request never reports back.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut late = Vec::new();
        while let Ok(Some(event)) = timeout(Duration::from_millis(50), ctl.next_event()).await {
            late.extend(ctl.handle(event));
        }
        assert!(finished(&late, AnalysisMode::Auto).is_empty());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn directory_redrawn_only_when_list_changes() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=3));
        let client = Arc::new(MockAnalysisClient::new(overview("ok")));
        let mut ctl = controller(&source, &client);
        let updates = seeded(&mut ctl).await;
        let lists = |u: &[DashboardUpdate]| {
            u.iter()
                .filter(|u| matches!(u, DashboardUpdate::Patients(_)))
                .count()
        };
        assert_eq!(lists(&updates), 1);

        // New readings change the raw snapshot but not the list.
        source.set_readings("p1", readings_node(1..=4));
        let updates = pump_until(&mut ctl, |c, _| {
            c.session().is_some_and(|s| s.trigger().watermark() == 4)
        })
        .await;
        assert_eq!(lists(&updates), 0);

        source.set_profile("p3", json!({"name": "Linus"}));
        let updates = pump_until(&mut ctl, |c, _| c.directory().len() == 3).await;
        assert_eq!(lists(&updates), 1);
        assert_eq!(ctl.selected_patient(), Some("p1"));
    }

    #[tokio::test]
    async fn reselecting_current_patient_is_a_no_op() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=15));
        let client = Arc::new(MockAnalysisClient::new(overview("ok")));
        let mut ctl = controller(&source, &client);
        seeded(&mut ctl).await;

        assert_eq!(ctl.select_patient("p1"), Ok(Vec::new()));
        assert!(ctl.session().unwrap().trigger().is_armed());
    }

    #[tokio::test]
    async fn unknown_patient_rejected() {
        let source = source_with_patients();
        let client = Arc::new(MockAnalysisClient::new(overview("ok")));
        let mut ctl = controller(&source, &client);
        ctl.start();
        pump_until(&mut ctl, |c, _| c.selected_patient().is_some()).await;

        assert_eq!(
            ctl.select_patient("nobody"),
            Err(MonitorError::UnknownPatient("nobody".into()))
        );
        assert_eq!(ctl.selected_patient(), Some("p1"));
    }

    #[tokio::test]
    async fn manual_analysis_needs_data() {
        let source = source_with_patients();
        let client = Arc::new(MockAnalysisClient::new(overview("ok")));
        let mut ctl = controller(&source, &client);
        assert_eq!(ctl.analyze_now(), Err(AnalysisError::NoData));

        ctl.start();
        pump_until(&mut ctl, |c, _| c.selected_patient().is_some()).await;
        assert_eq!(ctl.analyze_now(), Err(AnalysisError::NoData));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn manual_analysis_reports_result_and_refuses_overlap() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=8));
        let client = Arc::new(
            MockAnalysisClient::new(overview("manual"))
                .then(Err(AnalysisError::RateLimited))
                .with_delay(Duration::from_millis(50)),
        );
        let mut ctl = controller(&source, &client);
        seeded(&mut ctl).await;

        assert_eq!(
            ctl.analyze_now(),
            Ok(DashboardUpdate::AnalysisStarted {
                mode: AnalysisMode::Manual
            })
        );
        assert_eq!(ctl.analyze_now(), Err(AnalysisError::Busy));

        let updates = pump_until(&mut ctl, |_, seen| !finished(seen, AnalysisMode::Manual).is_empty()).await;
        assert_eq!(finished(&updates, AnalysisMode::Manual)[0], &Err(AnalysisError::RateLimited));

        assert!(ctl.analyze_now().is_ok());
        let updates = pump_until(&mut ctl, |_, seen| !finished(seen, AnalysisMode::Manual).is_empty()).await;
        let outcome = finished(&updates, AnalysisMode::Manual)[0].clone().unwrap();
        assert_eq!(outcome.overview.as_deref(), Some("manual"));

        // Manual runs leave the auto trigger alone.
        assert_eq!(ctl.session().unwrap().trigger().pending(), 0);
    }

    #[tokio::test]
    async fn link_status_deduplicated_across_watchers() {
        let source = source_with_patients();
        source.set_readings("p1", readings_node(1..=3));
        let client = Arc::new(MockAnalysisClient::new(overview("ok")));
        let mut ctl = controller(&source, &client);
        let updates = seeded(&mut ctl).await;
        let live = updates
            .iter()
            .filter(|u| matches!(u, DashboardUpdate::Link(_)))
            .count();
        assert_eq!(live, 1);

        source.set_failing(true);
        let updates = pump_until(&mut ctl, |c, _| c.link() == Some(&LinkStatus::Disconnected)).await;
        assert!(updates.contains(&DashboardUpdate::Link(LinkStatus::Disconnected)));
        tokio::time::sleep(TICK * 4).await;
        let mut more = Vec::new();
        while let Ok(Some(event)) = timeout(Duration::from_millis(30), ctl.next_event()).await {
            more.extend(ctl.handle(event));
        }
        assert!(!more.iter().any(|u| matches!(u, DashboardUpdate::Link(_))));
    }

    #[tokio::test]
    async fn profile_updates_flow_through() {
        let source = source_with_patients();
        let client = Arc::new(MockAnalysisClient::new(overview("ok")));
        let mut ctl = controller(&source, &client);
        ctl.start();

        let updates = pump_until(&mut ctl, |_, seen| {
            seen.iter().any(|u| matches!(u, DashboardUpdate::Profile { .. }))
        })
        .await;
        let profile = updates
            .iter()
            .find_map(|u| match u {
                DashboardUpdate::Profile { profile, .. } => Some(profile.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(profile.display_name("p1"), "Ada");
    }
}
