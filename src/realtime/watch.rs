//! Poll-based watchers standing in for push subscriptions.
//!
//! Each watched path gets one task that fetches on an interval and forwards
//! the snapshot only when it differs from the last one delivered. Tasks live
//! as long as their `Subscription`; dropping it is the unsubscribe.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{RealtimeError, RealtimeSource, READINGS_LIMIT};

/// A database path that can be watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    Patients,
    Profile(String),
    Readings(String),
}

impl WatchTarget {
    pub fn path(&self) -> String {
        match self {
            Self::Patients => "patients".to_string(),
            Self::Profile(id) => format!("patients/{id}/profile"),
            Self::Readings(id) => format!("patients/{id}/readings"),
        }
    }

    async fn fetch(&self, source: &dyn RealtimeSource) -> Result<Value, RealtimeError> {
        match self {
            Self::Patients => source.fetch_patients().await,
            Self::Profile(id) => source.fetch_profile(id).await,
            Self::Readings(id) => source.fetch_readings(id, READINGS_LIMIT).await,
        }
    }
}

/// Reachability of the database as seen by a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Live,
    Disconnected,
}

impl LinkStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Live => "Firebase live",
            Self::Disconnected => "Firebase disconnected",
        }
    }
}

/// What a watcher delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Snapshot { target: WatchTarget, value: Value },
    Link(LinkStatus),
}

/// Scoped handle over a set of watch tasks. Dropping it aborts them all.
#[derive(Default)]
pub struct Subscription {
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start polling `target`, wrapping each event with `wrap` before sending.
    pub fn watch<M, F>(
        &mut self,
        source: Arc<dyn RealtimeSource>,
        target: WatchTarget,
        interval: Duration,
        tx: mpsc::Sender<M>,
        wrap: F,
    ) where
        M: Send + 'static,
        F: Fn(WatchEvent) -> M + Send + 'static,
    {
        let task = tokio::spawn(poll_loop(source, target, interval, tx, wrap));
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// True while at least one watcher is still running.
    pub fn is_active(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn poll_loop<M, F>(
    source: Arc<dyn RealtimeSource>,
    target: WatchTarget,
    interval: Duration,
    tx: mpsc::Sender<M>,
    wrap: F,
) where
    F: Fn(WatchEvent) -> M,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<Value> = None;
    let mut link: Option<LinkStatus> = None;

    tracing::debug!(path = %target.path(), "Watch started");

    loop {
        ticker.tick().await;

        let mut outgoing = Vec::with_capacity(2);
        match target.fetch(source.as_ref()).await {
            Ok(value) => {
                if link != Some(LinkStatus::Live) {
                    link = Some(LinkStatus::Live);
                    outgoing.push(WatchEvent::Link(LinkStatus::Live));
                }
                if last.as_ref() != Some(&value) {
                    last = Some(value.clone());
                    outgoing.push(WatchEvent::Snapshot {
                        target: target.clone(),
                        value,
                    });
                }
            }
            Err(err) => {
                if link != Some(LinkStatus::Disconnected) {
                    tracing::warn!(path = %target.path(), error = %err, "Watch lost database");
                    link = Some(LinkStatus::Disconnected);
                    outgoing.push(WatchEvent::Link(LinkStatus::Disconnected));
                }
            }
        }

        for event in outgoing {
            if tx.send(wrap(event)).await.is_err() {
                tracing::debug!(path = %target.path(), "Watch receiver dropped");
                return;
            }
        }
    }
}
