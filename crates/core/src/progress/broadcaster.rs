//! Broadcast channels keyed by job id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::event::ProgressEvent;
use crate::job::{Job, JobError, JobStore};
use crate::metrics::{PROGRESS_EVENTS, PROGRESS_EVENTS_LAGGED};

type Channels = Arc<Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>>;

/// Publishes progress events to per-job subscribers.
///
/// Channels are created lazily by the first subscriber and removed when the
/// last subscriber goes away or the job is closed. Publishing never blocks:
/// a subscriber whose buffer overflows loses its oldest events.
pub struct ProgressBroadcaster {
    store: Arc<dyn JobStore>,
    capacity: usize,
    channels: Channels,
}

impl ProgressBroadcaster {
    pub fn new(store: Arc<dyn JobStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Deliver `event` to every current subscriber of its job.
    pub fn publish(&self, event: ProgressEvent) {
        PROGRESS_EVENTS.inc();
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = channels.get(&event.job_id) {
            // No receivers is not an error.
            let _ = sender.send(event);
        }
    }

    /// Publish the state of a freshly committed job.
    pub fn publish_job(&self, job: &Job) {
        self.publish(ProgressEvent::from_job(job));
    }

    /// Close the job's channel. Subscribers drain what is buffered, then end.
    ///
    /// Idempotent.
    pub fn close(&self, job_id: &str) {
        let removed = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);
        if removed.is_some() {
            debug!(job_id = job_id, "Closed progress channel");
        }
    }

    /// Subscribe to a job's progress.
    ///
    /// The first item is always the job's current snapshot.
    pub fn subscribe(&self, job_id: &str) -> Result<ProgressSubscription, JobError> {
        // Attach to the channel before reading the snapshot so no update can
        // fall between the two.
        let receiver = {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            channels
                .entry(job_id.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let mut subscription = ProgressSubscription {
            job_id: job_id.to_string(),
            snapshot: None,
            last_seq: 0,
            finished: false,
            receiver,
            channels: self.channels.clone(),
        };

        // On NotFound the subscription is dropped here, which releases the channel.
        let snapshot = ProgressEvent::from_job(&self.store.get(job_id)?);
        subscription.last_seq = snapshot.seq;
        subscription.snapshot = Some(snapshot);
        Ok(subscription)
    }

    /// Number of live subscribers for a job.
    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of jobs with an open channel.
    pub fn channel_count(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A live subscription to one job's progress. Dropping it unsubscribes.
pub struct ProgressSubscription {
    job_id: String,
    snapshot: Option<ProgressEvent>,
    last_seq: u64,
    finished: bool,
    receiver: broadcast::Receiver<ProgressEvent>,
    channels: Channels,
}

impl ProgressSubscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Next event, or `None` once the job is terminal or its channel closed.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }

        if let Some(snapshot) = self.snapshot.take() {
            self.finished = snapshot.is_terminal();
            return Some(snapshot);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) if event.seq <= self.last_seq => continue,
                Ok(event) => {
                    self.last_seq = event.seq;
                    self.finished = event.is_terminal();
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        job_id = %self.job_id,
                        "Progress subscriber lagged, skipped {} events",
                        skipped
                    );
                    PROGRESS_EVENTS_LAGGED.inc_by(skipped);
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|event| (event, subscription))
        })
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        // Our receiver is still alive here, so a count of one means we are the last.
        let last = channels
            .get(&self.job_id)
            .map(|sender| sender.receiver_count() <= 1)
            .unwrap_or(false);
        if last {
            channels.remove(&self.job_id);
        }
    }
}
