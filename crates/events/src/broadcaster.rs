//! Per-job fan-out of progress snapshots.
//!
//! [`ProgressBroadcaster`] keeps, for every job, the list of observers that
//! asked for live progress. Each observer owns a [`Subscription`]: the
//! receiving half of an unbounded channel plus enough context to unregister
//! itself on [`close`](Subscription::close) or drop.
//!
//! Delivery is best effort. An observer whose channel is closed is removed
//! on the next notification and nothing is reported to the notifier.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use bookmeta_core::job::ProgressSnapshot;
use bookmeta_core::types::{JobId, Timestamp};
use futures::Stream;
use tokio::sync::mpsc;

/// Identifier of one observer registration, unique per broadcaster.
pub type SubscriberId = u64;

/// Channel sender half for pushing snapshots to one observer.
type SnapshotSender = mpsc::UnboundedSender<ProgressSnapshot>;

/// A registered observer of one job.
struct Observer {
    id: SubscriberId,
    sender: SnapshotSender,
    subscribed_at: Timestamp,
}

/// Shared registry; subscriptions hold a weak reference to it.
#[derive(Default)]
struct Registry {
    observers: Mutex<HashMap<JobId, Vec<Observer>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Vec<Observer>>> {
        // The map stays consistent even if a holder panicked mid-update:
        // every mutation is a single insert/retain/remove.
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, job_id: &str, id: SubscriberId) -> bool {
        let mut observers = self.lock();
        let Some(list) = observers.get_mut(job_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|o| o.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            observers.remove(job_id);
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// ProgressBroadcaster
// ---------------------------------------------------------------------------

/// Fan-out notifier for job progress.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct ProgressBroadcaster {
    registry: Arc<Registry>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for `initial.job_id`.
    ///
    /// `initial` is delivered straight away. When it is already terminal the
    /// observer is not registered, so its stream yields that one snapshot and
    /// then ends.
    pub fn subscribe(&self, initial: ProgressSnapshot) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let job_id = initial.job_id.clone();
        let terminal = initial.is_terminal();

        // The receiver is alive, so this cannot fail.
        let _ = sender.send(initial);

        if !terminal {
            self.registry
                .lock()
                .entry(job_id.clone())
                .or_default()
                .push(Observer {
                    id,
                    sender,
                    subscribed_at: chrono::Utc::now(),
                });
            tracing::debug!(job_id = %job_id, subscriber_id = id, "Progress observer subscribed");
        }

        Subscription {
            job_id,
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove one observer. Returns whether it was registered.
    pub fn unsubscribe(&self, job_id: &str, id: SubscriberId) -> bool {
        let removed = self.registry.remove(job_id, id);
        if removed {
            tracing::debug!(job_id, subscriber_id = id, "Progress observer unsubscribed");
        }
        removed
    }

    /// Push `snapshot` to every observer of its job.
    ///
    /// Observers whose channel is closed are dropped. A terminal snapshot
    /// also closes every remaining observer, ending their streams. Returns
    /// the number of observers the snapshot was delivered to.
    pub fn notify(&self, snapshot: &ProgressSnapshot) -> usize {
        let mut observers = self.registry.lock();
        let Some(list) = observers.get_mut(&snapshot.job_id) else {
            return 0;
        };

        let mut delivered = 0;
        list.retain(|observer| match observer.sender.send(snapshot.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                tracing::debug!(
                    job_id = %snapshot.job_id,
                    subscriber_id = observer.id,
                    subscribed_for_ms = (chrono::Utc::now() - observer.subscribed_at).num_milliseconds(),
                    "Dropping disconnected progress observer",
                );
                false
            }
        });

        if snapshot.is_terminal() || list.is_empty() {
            observers.remove(&snapshot.job_id);
        }
        delivered
    }

    /// Remove every observer of `job_id`, ending their streams.
    ///
    /// Returns the number of registrations removed.
    pub fn drop_job(&self, job_id: &str) -> usize {
        self.registry
            .lock()
            .remove(job_id)
            .map_or(0, |list| list.len())
    }

    /// Number of live registrations for `job_id`.
    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.registry.lock().get(job_id).map_or(0, Vec::len)
    }

    /// Number of jobs with at least one registration.
    pub fn observed_job_count(&self) -> usize {
        self.registry.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A live progress subscription for one job.
///
/// Yields snapshots in notification order and ends once the job reaches a
/// terminal state (or is evicted). Dropping it unregisters the observer.
pub struct Subscription {
    job_id: JobId,
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<ProgressSnapshot>,
    registry: Weak<Registry>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("job_id", &self.job_id)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next snapshot; `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<ProgressSnapshot> {
        self.receiver.recv().await
    }

    /// Unregister explicitly. Equivalent to dropping the subscription.
    pub fn close(self) {}
}

impl Stream for Subscription {
    type Item = ProgressSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.job_id, self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
