use std::sync::Mutex;

use crate::broadcast::progress_channel::{ProgressChannel, ProgressEvent};

/// Where the engine sends progress. It knows nothing about subscribers.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

impl ProgressReporter for ProgressChannel {
    fn report(&self, event: ProgressEvent) {
        let job_id = event.job_id.clone();
        let delivered = self.publish(&job_id, event);
        log::debug!("Progress for job {} delivered to {} connection(s)", job_id, delivered);
    }
}

/// Keeps every event in memory, in report order.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn events_for(&self, job_id: &str) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.job_id == job_id)
            .collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
