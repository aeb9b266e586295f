//! Publish/subscribe fan-out of job progress events.
//!
//! Connections register once and receive a bounded mailbox. They then
//! subscribe to any number of job ids. Publishing never blocks: a mailbox
//! that is full or closed is logged and skipped, and closed connections are
//! torn down after the publish completes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

/// Default per-connection mailbox size.
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    Error,
    Completed,
}

/// Immutable progress notification for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub kind: EventKind,
    /// Stage name, e.g. `script` or `render`.
    pub stage: String,
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// Creates a progress event.
    pub fn new(job_id: &str, stage: &str, progress: u8, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind: EventKind::Progress,
            stage: stage.to_string(),
            progress,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Creates the terminal completion event.
    pub fn completed(job_id: &str, message: &str) -> Self {
        Self {
            kind: EventKind::Completed,
            ..Self::new(job_id, "completed", 100, message)
        }
    }

    /// Creates the terminal failure event.
    pub fn failed(job_id: &str, stage: &str, progress: u8, error: &str) -> Self {
        Self {
            kind: EventKind::Error,
            error: Some(error.to_string()),
            ..Self::new(job_id, stage, progress, &format!("Failed at {} stage", stage))
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Completed | EventKind::Error)
    }
}

#[derive(Default)]
struct Subscriptions {
    connections: HashMap<String, mpsc::Sender<ProgressEvent>>,
    by_job: HashMap<String, HashSet<String>>,
}

impl Subscriptions {
    fn remove_connection(&mut self, connection_id: &str) -> usize {
        self.connections.remove(connection_id);
        let mut removed = 0;
        for subscribers in self.by_job.values_mut() {
            if subscribers.remove(connection_id) {
                removed += 1;
            }
        }
        removed
    }

    /// Removes the connection only if its current mailbox is closed.
    fn remove_if_closed(&mut self, connection_id: &str) -> bool {
        let closed = self
            .connections
            .get(connection_id)
            .map_or(false, mpsc::Sender::is_closed);
        if closed {
            self.remove_connection(connection_id);
        }
        closed
    }
}

/// Process-wide progress channel shared by all job runs.
#[derive(Clone)]
pub struct ProgressChannel {
    inner: Arc<RwLock<Subscriptions>>,
    firehose: Arc<broadcast::Sender<ProgressEvent>>,
    buffer: usize,
}

impl ProgressChannel {
    /// Creates a channel whose connection mailboxes hold `buffer` events.
    pub fn new(buffer: usize) -> Self {
        let (firehose, _) = broadcast::channel(buffer.max(1) * 4);
        Self {
            inner: Arc::new(RwLock::new(Subscriptions::default())),
            firehose: Arc::new(firehose),
            buffer: buffer.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Subscriptions> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Progress channel lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Subscriptions> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Progress channel lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Registers a connection and returns its mailbox.
    ///
    /// Reconnecting with an existing id replaces the old mailbox but keeps
    /// its subscriptions.
    pub fn connect(&self, connection_id: &str) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.write().connections.insert(connection_id.to_string(), tx);
        log::info!("Client connected: {}", connection_id);
        rx
    }

    /// Subscribes a connection to a job's events.
    pub fn subscribe(&self, connection_id: &str, job_id: &str) {
        let mut subs = self.write();
        if !subs.connections.contains_key(connection_id) {
            log::warn!(
                "Subscription for unconnected client {} to job {}",
                connection_id,
                job_id
            );
        }
        subs.by_job
            .entry(job_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
        log::info!("Client {} subscribed to job {}", connection_id, job_id);
    }

    /// Removes one subscription. Returns whether it existed.
    pub fn unsubscribe(&self, connection_id: &str, job_id: &str) -> bool {
        self.write()
            .by_job
            .get_mut(job_id)
            .map(|subscribers| subscribers.remove(connection_id))
            .unwrap_or(false)
    }

    /// Tears down a connection and every subscription it holds.
    pub fn unsubscribe_all(&self, connection_id: &str) {
        let removed = self.write().remove_connection(connection_id);
        log::info!(
            "Client disconnected: {} ({} subscriptions removed)",
            connection_id,
            removed
        );
    }

    /// Alias for [`unsubscribe_all`](Self::unsubscribe_all).
    pub fn disconnect(&self, connection_id: &str) {
        self.unsubscribe_all(connection_id);
    }

    /// Fans an event out to every connection subscribed to `job_id`.
    ///
    /// Returns the number of connections that accepted the event.
    pub fn publish(&self, job_id: &str, event: ProgressEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let subs = self.read();
            if let Some(subscribers) = subs.by_job.get(job_id) {
                for connection_id in subscribers {
                    let Some(sender) = subs.connections.get(connection_id) else {
                        log::debug!(
                            "Skipping subscriber {} of job {}: not connected",
                            connection_id,
                            job_id
                        );
                        continue;
                    };
                    match sender.try_send(event.clone()) {
                        Ok(()) => delivered += 1,
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            log::warn!(
                                "Dropping {:?} event for job {}: client {} is not keeping up",
                                event.kind,
                                job_id,
                                connection_id
                            );
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            log::warn!(
                                "Error sending to {}: connection closed",
                                connection_id
                            );
                            closed.push(connection_id.clone());
                        }
                    }
                }
            }
        }

        self.prune_closed(&closed);

        // No firehose receivers is fine
        let _ = self.firehose.send(event);

        log::debug!("Progress event for job {} delivered to {} clients", job_id, delivered);
        delivered
    }

    /// Drops the given connections whose mailbox is still closed.
    ///
    /// A connection may have reconnected since it was seen closed; its new
    /// mailbox is kept.
    fn prune_closed(&self, candidates: &[String]) {
        if candidates.is_empty() {
            return;
        }
        let mut subs = self.write();
        for connection_id in candidates {
            if !subs.remove_if_closed(connection_id) {
                log::debug!("Client {} reconnected, keeping its mailbox", connection_id);
            }
        }
    }

    /// Receives every event published on this channel, for any job.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ProgressEvent> {
        self.firehose.subscribe()
    }

    /// Drops job entries that have no subscribers left. Returns how many were removed.
    pub fn prune_empty(&self) -> usize {
        let mut subs = self.write();
        let before = subs.by_job.len();
        subs.by_job.retain(|_, subscribers| !subscribers.is_empty());
        before - subs.by_job.len()
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.read().by_job.get(job_id).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.read().connections.len()
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_BUFFER)
    }
}
