//! Auto-analysis trigger: counts readings that arrived since the last
//! analysis and fires one request per threshold-chunk.
//!
//! The first batch after patient selection only seeds the watermark, so
//! history that predates selection never fires. While a request is in flight
//! batches keep accumulating; the backlog is drained one chunk at a time as
//! each request completes.

use crate::models::Reading;

/// New readings that make up one threshold-chunk.
pub const AUTO_ANALYZE_STEP: u32 = 10;

/// What the caller must do after feeding the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Issue exactly one analysis request now.
    Fire,
    /// Nothing to do.
    Hold,
}

/// Trigger bookkeeping for one selected patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoAnalysisTrigger {
    threshold: u32,
    baseline_set: bool,
    /// Highest timestamp already counted.
    last_seen_timestamp: i64,
    /// Counted readings not yet covered by a fired request.
    pending: u32,
    in_flight: bool,
}

impl Default for AutoAnalysisTrigger {
    fn default() -> Self {
        Self::new(AUTO_ANALYZE_STEP)
    }
}

impl AutoAnalysisTrigger {
    /// A zero threshold is raised to one.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            baseline_set: false,
            last_seen_timestamp: 0,
            pending: 0,
            in_flight: false,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_armed(&self) -> bool {
        self.baseline_set
    }

    pub fn watermark(&self) -> i64 {
        self.last_seen_timestamp
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Feed one freshly fetched window of readings.
    pub fn observe(&mut self, readings: &[Reading]) -> TriggerDecision {
        if readings.is_empty() {
            return TriggerDecision::Hold;
        }

        let max_timestamp = readings.iter().map(|r| r.timestamp).max().unwrap_or(0);

        if !self.baseline_set {
            self.last_seen_timestamp = max_timestamp;
            self.baseline_set = true;
            return TriggerDecision::Hold;
        }

        let fresh = readings
            .iter()
            .filter(|r| r.timestamp > self.last_seen_timestamp)
            .count() as u32;
        self.last_seen_timestamp = self.last_seen_timestamp.max(max_timestamp);

        if fresh == 0 {
            return TriggerDecision::Hold;
        }

        self.pending = self.pending.saturating_add(fresh);
        self.try_fire()
    }

    /// Mark the in-flight request finished, successful or not, and say
    /// whether the remaining backlog warrants another request.
    pub fn complete(&mut self) -> TriggerDecision {
        self.in_flight = false;
        self.try_fire()
    }

    fn try_fire(&mut self) -> TriggerDecision {
        if self.in_flight || self.pending < self.threshold {
            return TriggerDecision::Hold;
        }
        self.in_flight = true;
        self.pending -= self.threshold;
        TriggerDecision::Fire
    }
}
