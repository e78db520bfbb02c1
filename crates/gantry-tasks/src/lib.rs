//! Task progress tracking with subscriber fan-out.
//!
//! The manager issues task handles, accepts partial updates from the
//! operation's owner, and fans serialized snapshots out to subscribers. A
//! new subscriber always receives the current snapshot first
//! (replay-on-subscribe), then live updates, and its stream ends once a
//! terminal snapshot has been delivered.
//!
//! Memory is bounded three ways: a periodic sweep purges aged tasks, a hard
//! capacity bound evicts on `create`, and owners may `cleanup` explicitly.
//! The store is lossy under pressure but never exceeds `max_tasks`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gantry_protocol::{TaskError, TaskId, TaskProgress, TaskStatus, TaskUpdate};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

/// Tunables for the task store.
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Hard capacity bound on the store.
    pub max_tasks: usize,
    /// Tasks older than this are purged unconditionally by the sweep.
    pub max_age: Duration,
    /// Terminal tasks are retained this long so a slow poller still
    /// observes the final state.
    pub terminal_grace: Duration,
    /// Per-subscriber channel depth.
    pub subscriber_buffer: usize,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            max_tasks: 1000,
            max_age: Duration::from_secs(60 * 60),
            terminal_grace: Duration::from_secs(5 * 60),
            subscriber_buffer: 64,
        }
    }
}

struct TaskEntry {
    snapshot: TaskProgress,
    /// Creation instant, used only for expiry arithmetic.
    inserted: Instant,
    subscribers: Vec<mpsc::Sender<TaskProgress>>,
}

/// Issues task handles, applies updates, and fans snapshots out to
/// subscribers.
///
/// One coarse lock guards the store; per-operation cost is bounded by the
/// subscriber-set size, and holding the lock across fan-out is what
/// serializes delivery order per task regardless of concurrent writers.
pub struct TaskManager {
    config: TaskManagerConfig,
    store: Mutex<IndexMap<TaskId, TaskEntry>>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(TaskManagerConfig::default())
    }
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig) -> Self {
        Self {
            config,
            store: Mutex::new(IndexMap::new()),
        }
    }

    /// Insert a pending task, evicting first when the store is at capacity.
    pub fn create(&self) -> TaskId {
        let task_id = TaskId::new_uuid();
        let mut store = self.store.lock();
        if store.len() >= self.config.max_tasks {
            Self::evict_locked(&mut store);
        }
        store.insert(
            task_id.clone(),
            TaskEntry {
                snapshot: TaskProgress::new(task_id.clone()),
                inserted: Instant::now(),
                subscribers: Vec::new(),
            },
        );
        debug!(task_id = %task_id, "task created");
        task_id
    }

    /// Apply a partial update, fan the new snapshot out, and return that
    /// snapshot — all under one lock acquisition, so callers never race a
    /// concurrent sweep or cleanup to re-read the result.
    ///
    /// Updating a terminal task is a no-op, never an error: the terminal
    /// state is sticky and the unchanged snapshot comes back. A subscriber
    /// whose channel has closed is pruned silently; a lagging one may lose
    /// non-terminal events.
    #[instrument(skip(self, update), fields(task_id = %task_id))]
    pub fn update(
        &self,
        task_id: &TaskId,
        update: TaskUpdate,
    ) -> Result<TaskProgress, TaskError> {
        let mut store = self.store.lock();
        let entry = store
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        if entry.snapshot.status.is_terminal() {
            debug!(status = ?entry.snapshot.status, "update ignored, task already terminal");
            return Ok(entry.snapshot.clone());
        }

        Self::apply_and_publish(entry, update);
        Ok(entry.snapshot.clone())
    }

    /// Current snapshot, if the task exists.
    pub fn get(&self, task_id: &TaskId) -> Option<TaskProgress> {
        self.store
            .lock()
            .get(task_id)
            .map(|entry| entry.snapshot.clone())
    }

    /// Snapshots of every tracked task, in creation order.
    pub fn list(&self) -> Vec<TaskProgress> {
        self.store
            .lock()
            .values()
            .map(|entry| entry.snapshot.clone())
            .collect()
    }

    /// Subscribe to a task's progress.
    ///
    /// The first event on the stream is the *current* snapshot, so a late
    /// subscriber is never blind to already-elapsed progress. The stream
    /// ends after a terminal snapshot has been delivered; subscribing to an
    /// already-terminal task yields that one snapshot and then ends.
    ///
    /// Delivery is lossy under lag: a subscriber that stops draining may
    /// miss intermediate events, but the terminal snapshot is always
    /// delivered — one buffer slot is reserved for it.
    pub fn subscribe(&self, task_id: &TaskId) -> Result<ReceiverStream<TaskProgress>, TaskError> {
        let mut store = self.store.lock();
        let entry = store
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        let (sender, receiver) = mpsc::channel(self.config.subscriber_buffer.max(2));
        let snapshot = entry.snapshot.clone();
        let terminal = snapshot.status.is_terminal();
        // A fresh channel always has room for the replay snapshot.
        let _ = sender.try_send(snapshot);
        if !terminal {
            entry.subscribers.push(sender);
        }
        Ok(ReceiverStream::new(receiver))
    }

    /// Cooperative cancellation: flips the status to Cancelled and notifies
    /// subscribers. It does **not** interrupt the underlying operation —
    /// the owner observes the status and winds down on its own schedule.
    /// Returns false when the task was already terminal.
    pub fn cancel(&self, task_id: &TaskId) -> Result<bool, TaskError> {
        let mut store = self.store.lock();
        let entry = store
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        if entry.snapshot.status.is_terminal() {
            return Ok(false);
        }
        Self::apply_and_publish(entry, TaskUpdate::status(TaskStatus::Cancelled));
        debug!(task_id = %task_id, "task cancelled");
        Ok(true)
    }

    /// Explicitly drop a task once the owner has confirmed final delivery.
    /// Returns true when a record was removed.
    pub fn cleanup(&self, task_id: &TaskId) -> bool {
        let removed = self.store.lock().shift_remove(task_id).is_some();
        if removed {
            debug!(task_id = %task_id, "task cleaned up");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Purge tasks past `max_age` regardless of state, and terminal tasks
    /// whose final update is older than `terminal_grace`. Returns the
    /// number purged.
    pub fn sweep(&self) -> usize {
        let max_age = self.config.max_age;
        let grace = chrono::Duration::from_std(self.config.terminal_grace)
            .unwrap_or(chrono::Duration::MAX);
        let now = chrono::Utc::now();

        let mut store = self.store.lock();
        let before = store.len();
        store.retain(|_, entry| {
            if entry.inserted.elapsed() > max_age {
                return false;
            }
            if entry.snapshot.status.is_terminal() && now - entry.snapshot.updated_at > grace {
                return false;
            }
            true
        });
        before - store.len()
    }

    /// Run `sweep` on an interval until the handle is aborted or the
    /// runtime shuts down.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = manager.sweep();
                if purged > 0 {
                    debug!(purged, "task sweep purged records");
                }
            }
        })
    }

    fn apply_and_publish(entry: &mut TaskEntry, update: TaskUpdate) {
        entry.snapshot.apply(update);
        let snapshot = entry.snapshot.clone();
        let terminal = snapshot.status.is_terminal();

        entry.subscribers.retain(|sender| {
            // Non-terminal events never take the last buffer slot: it is
            // held back so the terminal snapshot always fits.
            if !terminal && sender.capacity() <= 1 {
                warn!(task_id = %snapshot.task_id, "subscriber lagging, progress event dropped");
                return !sender.is_closed();
            }
            match sender.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(TrySendError::Closed(_)) => false,
                Err(TrySendError::Full(_)) => {
                    warn!(task_id = %snapshot.task_id, "subscriber lagging, progress event dropped");
                    true
                }
            }
        });

        // Dropping the senders is what ends subscriber streams after the
        // terminal snapshot.
        if terminal {
            entry.subscribers.clear();
        }
    }

    /// Capacity eviction: prefer the oldest half of terminal tasks; with no
    /// terminal tasks, drop the single oldest task regardless of state.
    fn evict_locked(store: &mut IndexMap<TaskId, TaskEntry>) {
        let terminal_ids: Vec<TaskId> = store
            .iter()
            .filter(|(_, entry)| entry.snapshot.status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();

        if terminal_ids.is_empty() {
            // Insertion order doubles as creation order.
            if let Some((oldest, _)) = store.shift_remove_index(0) {
                warn!(task_id = %oldest, "store at capacity, evicted oldest live task");
            }
            return;
        }

        let evict_count = terminal_ids.len().div_ceil(2);
        for task_id in terminal_ids.into_iter().take(evict_count) {
            store.shift_remove(&task_id);
        }
        debug!(evicted = evict_count, "store at capacity, evicted terminal tasks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn small_manager(max_tasks: usize) -> TaskManager {
        TaskManager::new(TaskManagerConfig {
            max_tasks,
            ..TaskManagerConfig::default()
        })
    }

    #[tokio::test]
    async fn create_and_get_pending_task() {
        let manager = TaskManager::default();
        let id = manager.create();
        let snapshot = manager.get(&id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Pending);
        assert_eq!(snapshot.progress, 0);
    }

    #[tokio::test]
    async fn update_unknown_task_is_not_found() {
        let manager = TaskManager::default();
        let err = manager
            .update(&TaskId::from_string("ghost"), TaskUpdate::default())
            .unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[tokio::test]
    async fn terminal_state_is_sticky() {
        let manager = TaskManager::default();
        let id = manager.create();
        manager
            .update(&id, TaskUpdate::failed("disk full"))
            .unwrap();

        // Further updates are accepted but change nothing.
        manager
            .update(&id, TaskUpdate::status(TaskStatus::Running))
            .unwrap();
        manager.update(&id, TaskUpdate::progress(99, "zombie")).unwrap();

        let snapshot = manager.get(&id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_ne!(snapshot.progress, 99);
    }

    #[tokio::test]
    async fn replay_on_subscribe_shows_latest_snapshot() {
        let manager = TaskManager::default();
        let id = manager.create();
        manager.update(&id, TaskUpdate::progress(50, "halfway")).unwrap();

        let mut stream = manager.subscribe(&id).unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.progress, 50);
        assert_eq!(first.message, "halfway");
    }

    #[tokio::test]
    async fn stream_delivers_live_updates_in_order_and_ends_on_terminal() {
        let manager = TaskManager::default();
        let id = manager.create();
        let mut stream = manager.subscribe(&id).unwrap();

        // Replay of the pending snapshot.
        assert_eq!(stream.next().await.unwrap().progress, 0);

        manager.update(&id, TaskUpdate::progress(30, "loading")).unwrap();
        manager.update(&id, TaskUpdate::progress(60, "crunching")).unwrap();
        manager
            .update(&id, TaskUpdate::completed(Some(serde_json::json!({"n": 3}))))
            .unwrap();

        assert_eq!(stream.next().await.unwrap().progress, 30);
        assert_eq!(stream.next().await.unwrap().progress, 60);
        let last = stream.next().await.unwrap();
        assert_eq!(last.status, TaskStatus::Completed);
        assert_eq!(last.progress, 100);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn subscribing_to_terminal_task_yields_one_event_then_ends() {
        let manager = TaskManager::default();
        let id = manager.create();
        manager.update(&id, TaskUpdate::completed(None)).unwrap();

        let mut stream = manager.subscribe(&id).unwrap();
        assert_eq!(stream.next().await.unwrap().status, TaskStatus::Completed);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn update_returns_the_post_update_snapshot() {
        let manager = TaskManager::default();
        let id = manager.create();

        let snapshot = manager
            .update(&id, TaskUpdate::progress(40, "indexing"))
            .unwrap();
        assert_eq!(snapshot.progress, 40);
        assert_eq!(snapshot.message, "indexing");

        // Terminal no-op hands back the unchanged snapshot.
        manager.update(&id, TaskUpdate::completed(None)).unwrap();
        let unchanged = manager
            .update(&id, TaskUpdate::progress(5, "zombie"))
            .unwrap();
        assert_eq!(unchanged.status, TaskStatus::Completed);
        assert_eq!(unchanged.progress, 100);
    }

    #[tokio::test]
    async fn lagging_subscriber_still_receives_the_terminal_snapshot() {
        let manager = TaskManager::new(TaskManagerConfig {
            subscriber_buffer: 2,
            ..TaskManagerConfig::default()
        });
        let id = manager.create();
        let mut stream = manager.subscribe(&id).unwrap();

        // The replay snapshot fills one slot; without draining, the
        // remaining slot is reserved and these intermediate events drop.
        manager.update(&id, TaskUpdate::progress(25, "step 1")).unwrap();
        manager.update(&id, TaskUpdate::progress(75, "step 3")).unwrap();
        manager.update(&id, TaskUpdate::completed(None)).unwrap();

        assert_eq!(stream.next().await.unwrap().progress, 0);
        let last = stream.next().await.unwrap();
        assert_eq!(last.status, TaskStatus::Completed);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned_without_affecting_others() {
        let manager = TaskManager::default();
        let id = manager.create();

        let dead = manager.subscribe(&id).unwrap();
        let mut live = manager.subscribe(&id).unwrap();
        drop(dead);

        manager.update(&id, TaskUpdate::progress(10, "tick")).unwrap();
        manager.update(&id, TaskUpdate::progress(20, "tock")).unwrap();

        assert_eq!(live.next().await.unwrap().progress, 0);
        assert_eq!(live.next().await.unwrap().progress, 10);
        assert_eq!(live.next().await.unwrap().progress, 20);
    }

    #[tokio::test]
    async fn capacity_bound_is_never_exceeded() {
        let manager = small_manager(5);
        for _ in 0..25 {
            let _ = manager.create();
            assert!(manager.len() <= 5);
        }
    }

    #[tokio::test]
    async fn eviction_prefers_terminal_tasks() {
        let manager = small_manager(4);
        let finished_a = manager.create();
        let finished_b = manager.create();
        let live_a = manager.create();
        let live_b = manager.create();
        manager.update(&finished_a, TaskUpdate::completed(None)).unwrap();
        manager.update(&finished_b, TaskUpdate::completed(None)).unwrap();

        let _new = manager.create();
        assert!(manager.len() <= 4);
        // The live tasks survive; at least the oldest terminal task is gone.
        assert!(manager.get(&live_a).is_some());
        assert!(manager.get(&live_b).is_some());
        assert!(manager.get(&finished_a).is_none());
    }

    #[tokio::test]
    async fn eviction_falls_back_to_oldest_live_task() {
        let manager = small_manager(2);
        let oldest = manager.create();
        let newer = manager.create();

        let _third = manager.create();
        assert_eq!(manager.len(), 2);
        assert!(manager.get(&oldest).is_none());
        assert!(manager.get(&newer).is_some());
    }

    #[tokio::test]
    async fn cancel_is_bookkeeping_only_and_idempotent_on_terminal() {
        let manager = TaskManager::default();
        let id = manager.create();

        assert!(manager.cancel(&id).unwrap());
        assert_eq!(manager.get(&id).unwrap().status, TaskStatus::Cancelled);
        assert!(!manager.cancel(&id).unwrap());
    }

    #[tokio::test]
    async fn cleanup_removes_the_record() {
        let manager = TaskManager::default();
        let id = manager.create();
        assert!(manager.cleanup(&id));
        assert!(!manager.cleanup(&id));
        assert!(manager.get(&id).is_none());
    }

    #[tokio::test]
    async fn sweep_purges_aged_terminal_tasks_but_keeps_live_ones() {
        let manager = TaskManager::new(TaskManagerConfig {
            max_tasks: 100,
            max_age: Duration::from_secs(3600),
            terminal_grace: Duration::from_millis(10),
            subscriber_buffer: 8,
        });
        let finished = manager.create();
        let live = manager.create();
        manager.update(&finished, TaskUpdate::completed(None)).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let purged = manager.sweep();
        assert_eq!(purged, 1);
        assert!(manager.get(&finished).is_none());
        assert!(manager.get(&live).is_some());
    }

    #[tokio::test]
    async fn sweeper_purges_in_the_background() {
        let manager = Arc::new(TaskManager::new(TaskManagerConfig {
            max_tasks: 100,
            max_age: Duration::from_millis(10),
            terminal_grace: Duration::from_secs(3600),
            subscriber_buffer: 8,
        }));
        let id = manager.create();

        let sweeper = manager.clone().spawn_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(manager.get(&id).is_none());
        sweeper.abort();
    }

    #[tokio::test]
    async fn sweep_purges_tasks_past_max_age_regardless_of_state() {
        let manager = TaskManager::new(TaskManagerConfig {
            max_tasks: 100,
            max_age: Duration::from_millis(10),
            terminal_grace: Duration::from_secs(3600),
            subscriber_buffer: 8,
        });
        let live = manager.create();
        manager.update(&live, TaskUpdate::status(TaskStatus::Running)).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.sweep(), 1);
        assert!(manager.is_empty());
    }
}
