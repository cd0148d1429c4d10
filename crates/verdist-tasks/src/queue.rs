//! Upload queue and per-item upload state
//!
//! The queue connects packaging completion to the upload pool. Any number of
//! producers hold a cloned [`UploadQueue`]; the pool owns the single
//! [`UploadReceiver`]. Items sent by one producer are received in the order
//! they were sent. Every item is recorded in a shared [`UploadTracker`] as
//! soon as it is enqueued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, TaskError};
use crate::task::{CompletedItem, TaskId};

/// Upload state of a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Waiting in the queue
    Queued,
    /// Picked up by an upload worker
    Uploading,
    /// Delivered to every sink
    Succeeded,
    /// At least one sink rejected it
    Failed,
}

impl UploadState {
    /// Whether the item reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Number of items per upload state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerCounts {
    pub queued: usize,
    pub uploading: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl TrackerCounts {
    /// Items that have not reached a final state
    pub fn pending(&self) -> usize {
        self.queued + self.uploading
    }
}

/// Shared record of where every enqueued item is in the upload lifecycle
#[derive(Debug, Clone, Default)]
pub struct UploadTracker {
    states: Arc<Mutex<HashMap<TaskId, UploadState>>>,
}

impl UploadTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, UploadState>> {
        // A panicking writer cannot leave the map half-updated.
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the state of an item
    pub fn set(&self, id: &TaskId, state: UploadState) {
        debug!(task = %id, state = ?state, "Upload state changed");
        self.lock().insert(id.clone(), state);
    }

    /// Current state of an item
    pub fn state(&self, id: &TaskId) -> Option<UploadState> {
        self.lock().get(id).copied()
    }

    /// Forget an item
    pub fn remove(&self, id: &TaskId) -> Option<UploadState> {
        self.lock().remove(id)
    }

    /// Count items per state
    pub fn counts(&self) -> TrackerCounts {
        let mut counts = TrackerCounts::default();
        for state in self.lock().values() {
            match state {
                UploadState::Queued => counts.queued += 1,
                UploadState::Uploading => counts.uploading += 1,
                UploadState::Succeeded => counts.succeeded += 1,
                UploadState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// All tracked items, sorted by task id
    pub fn snapshot(&self) -> Vec<(TaskId, UploadState)> {
        let mut items: Vec<_> = self.lock().iter().map(|(id, s)| (id.clone(), *s)).collect();
        items.sort();
        items
    }

    /// Whether no item is queued or uploading
    pub fn is_settled(&self) -> bool {
        self.lock().values().all(UploadState::is_terminal)
    }

    /// Number of tracked items
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been tracked
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Create a connected upload queue and receiver
pub fn upload_queue() -> (UploadQueue, UploadReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let tracker = UploadTracker::new();
    (
        UploadQueue {
            tx,
            tracker: tracker.clone(),
        },
        UploadReceiver { rx, tracker },
    )
}

/// Producer side of the upload queue
#[derive(Debug, Clone)]
pub struct UploadQueue {
    tx: mpsc::UnboundedSender<CompletedItem>,
    tracker: UploadTracker,
}

impl UploadQueue {
    /// Append an item to the queue
    ///
    /// Fails with [`TaskError::QueueClosed`] when the receiver is gone; the
    /// item is returned inside the error.
    pub fn enqueue(&self, item: CompletedItem) -> Result<()> {
        let id = item.id().clone();
        self.tracker.set(&id, UploadState::Queued);

        match self.tx.send(item) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(item)) => {
                self.tracker.remove(&id);
                Err(TaskError::QueueClosed(Box::new(item)))
            }
        }
    }

    /// Whether the receiver has been dropped or closed
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Tracker shared with the receiver
    pub fn tracker(&self) -> &UploadTracker {
        &self.tracker
    }
}

/// Consumer side of the upload queue
#[derive(Debug)]
pub struct UploadReceiver {
    rx: mpsc::UnboundedReceiver<CompletedItem>,
    tracker: UploadTracker,
}

impl UploadReceiver {
    /// Wait for the next item
    ///
    /// Returns `None` once every producer is dropped and the queue is empty.
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<CompletedItem> {
        self.rx.recv().await
    }

    /// Close the queue and take every item still waiting in it
    ///
    /// Drained items are removed from the tracker; later enqueues fail.
    pub fn close_and_drain(&mut self) -> Vec<CompletedItem> {
        self.rx.close();
        let mut drained = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            self.tracker.remove(item.id());
            drained.push(item);
        }
        drained
    }

    /// Tracker shared with the producers
    pub fn tracker(&self) -> &UploadTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::CompletedItem;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use verdist_stores::{Artifact, ArtifactKind};

    fn item(version: &str, variant: &str) -> CompletedItem {
        let artifact = Artifact {
            path: PathBuf::from(format!("/out/{}-{}.zip", version, variant)),
            kind: ArtifactKind::File,
            size: 0,
            sha256: None,
        };
        CompletedItem::from_artifact(
            TaskId::new(version, variant),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            artifact,
        )
    }

    #[tokio::test]
    async fn test_enqueue_marks_queued() {
        let (queue, mut receiver) = upload_queue();
        queue.enqueue(item("1.0", "linux")).unwrap();

        let id = TaskId::new("1.0", "linux");
        assert_eq!(receiver.tracker().state(&id), Some(UploadState::Queued));
        assert_eq!(receiver.recv().await.unwrap().id(), &id);
    }

    #[tokio::test]
    async fn test_single_producer_order_preserved() {
        let (queue, mut receiver) = upload_queue();
        for variant in ["a", "b", "c", "d"] {
            queue.enqueue(item("1.0", variant)).unwrap();
        }
        drop(queue);

        let mut order = Vec::new();
        while let Some(item) = receiver.recv().await {
            order.push(item.task.id.variant);
        }
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_per_producer_order_with_concurrent_producers() {
        let (queue, mut receiver) = upload_queue();

        let mut handles = Vec::new();
        for producer in ["p1", "p2", "p3"] {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..20 {
                    queue.enqueue(item(producer, &n.to_string())).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        drop(queue);
        for handle in handles {
            handle.await.unwrap();
        }

        let mut seen: HashMap<String, Vec<u32>> = HashMap::new();
        while let Some(item) = receiver.recv().await {
            seen.entry(item.task.id.version.clone())
                .or_default()
                .push(item.task.id.variant.parse().unwrap());
        }
        for (_, sequence) in seen {
            assert_eq!(sequence, (0..20).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_enqueue_after_close_returns_item() {
        let (queue, mut receiver) = upload_queue();
        receiver.close_and_drain();

        let err = queue.enqueue(item("1.0", "linux")).unwrap_err();
        match err {
            TaskError::QueueClosed(item) => assert_eq!(item.task.id.variant, "linux"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(queue.is_closed());
        assert!(queue.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_close_and_drain() {
        let (queue, mut receiver) = upload_queue();
        queue.enqueue(item("1.0", "a")).unwrap();
        queue.enqueue(item("1.0", "b")).unwrap();

        let drained = receiver.close_and_drain();
        assert_eq!(drained.len(), 2);
        assert!(receiver.tracker().is_empty());
    }

    #[test]
    fn test_tracker_counts() {
        let tracker = UploadTracker::new();
        tracker.set(&TaskId::new("1", "a"), UploadState::Queued);
        tracker.set(&TaskId::new("1", "b"), UploadState::Uploading);
        tracker.set(&TaskId::new("1", "c"), UploadState::Succeeded);
        tracker.set(&TaskId::new("1", "d"), UploadState::Failed);

        let counts = tracker.counts();
        assert_eq!(counts.pending(), 2);
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.failed, 1);
        assert!(!tracker.is_settled());

        tracker.set(&TaskId::new("1", "a"), UploadState::Succeeded);
        tracker.set(&TaskId::new("1", "b"), UploadState::Failed);
        assert!(tracker.is_settled());
        assert_eq!(tracker.snapshot().len(), 4);
    }
}
