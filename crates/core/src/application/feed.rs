// Change Feed - per-professor stream of committed queue snapshots

use crate::domain::{ProfessorId, QueueSnapshot, Revision};
use crate::error::{AppError, Result};
use crate::port::LedgerStore;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Snapshots buffered per professor before a slow subscriber lags
pub const DEFAULT_FEED_CAPACITY: usize = 64;

/// How often an observed queue is checked for commits made elsewhere
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    pub capacity: usize,
    pub poll_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_FEED_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

struct Channel {
    latest: Arc<QueueSnapshot>,
    sender: broadcast::Sender<Arc<QueueSnapshot>>,
    watching: bool,
}

struct Shared {
    store: Arc<dyn LedgerStore>,
    config: FeedConfig,
    channels: Mutex<HashMap<ProfessorId, Channel>>,
}

/// Fan-out of queue snapshots, one broadcast channel per professor.
///
/// A channel only ever moves forward in revision: publishing a snapshot
/// that is not strictly newer than the latest one is a no-op. Subscribers
/// receive one snapshot per published commit, in revision order. A
/// subscriber that falls more than `capacity` snapshots behind is
/// resynchronized from the store and continues from the newest committed
/// state.
///
/// While a professor's queue has subscribers, a background task polls
/// `LedgerStore::latest_revision` and reloads the snapshot when another
/// process has committed. The task stops once the last subscriber is gone.
pub struct ChangeFeed {
    shared: Arc<Shared>,
}

impl ChangeFeed {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, FeedConfig::default())
    }

    pub fn with_config(store: Arc<dyn LedgerStore>, config: FeedConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                config: FeedConfig {
                    capacity: config.capacity.max(1),
                    ..config
                },
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Publish a committed snapshot. Returns `true` if subscribers will see it.
    pub fn publish(&self, snapshot: QueueSnapshot) -> Result<bool> {
        self.shared.publish(snapshot)
    }

    /// Start observing a professor's queue.
    ///
    /// The subscription starts at the newest known committed snapshot; a
    /// professor nobody has observed yet is seeded from the store.
    pub async fn subscribe(&self, professor_id: &str) -> Result<QueueSubscription> {
        if self.shared.latest(professor_id)?.is_none() {
            let seed = self.shared.store.load_snapshot(professor_id).await?;
            self.shared.publish(seed)?;
        }

        let (current, rx, start_watcher) = {
            let mut channels = self.shared.lock()?;
            let channel = channels.get_mut(professor_id).ok_or_else(|| {
                AppError::Internal(format!("feed for professor {} vanished", professor_id))
            })?;
            let start_watcher = !channel.watching;
            channel.watching = true;
            (
                Arc::clone(&channel.latest),
                channel.sender.subscribe(),
                start_watcher,
            )
        };

        if start_watcher {
            tokio::spawn(watch_store(
                Arc::downgrade(&self.shared),
                professor_id.to_string(),
                self.shared.config.poll_interval,
            ));
        }

        Ok(QueueSubscription {
            professor_id: professor_id.to_string(),
            current,
            rx,
            store: Arc::clone(&self.shared.store),
        })
    }

    /// Reload committed state from the store and publish it
    ///
    /// Picks up writes made by other processes sharing the store.
    pub async fn refresh(&self, professor_id: &str) -> Result<Arc<QueueSnapshot>> {
        self.shared.refresh(professor_id).await
    }

    /// Latest published snapshot without subscribing
    pub fn latest(&self, professor_id: &str) -> Result<Option<Arc<QueueSnapshot>>> {
        self.shared.latest(professor_id)
    }

    /// Live subscriptions for a professor
    pub fn subscriber_count(&self, professor_id: &str) -> Result<usize> {
        Ok(self
            .shared
            .lock()?
            .get(professor_id)
            .map_or(0, |channel| channel.sender.receiver_count()))
    }
}

impl Shared {
    fn publish(&self, snapshot: QueueSnapshot) -> Result<bool> {
        let mut channels = self.lock()?;
        let professor_id = snapshot.professor_id.clone();
        let revision = snapshot.revision;

        match channels.get_mut(&professor_id) {
            Some(channel) => {
                if revision <= channel.latest.revision {
                    debug!(
                        professor_id = %professor_id,
                        revision = revision,
                        latest = channel.latest.revision,
                        "Dropped stale snapshot"
                    );
                    return Ok(false);
                }
                let snapshot = Arc::new(snapshot);
                channel.latest = Arc::clone(&snapshot);
                // Err only means nobody is subscribed right now
                let _ = channel.sender.send(snapshot);
            }
            None => {
                let (sender, _) = broadcast::channel(self.config.capacity);
                channels.insert(
                    professor_id,
                    Channel {
                        latest: Arc::new(snapshot),
                        sender,
                        watching: false,
                    },
                );
            }
        }
        Ok(true)
    }

    async fn refresh(&self, professor_id: &str) -> Result<Arc<QueueSnapshot>> {
        let snapshot = self.store.load_snapshot(professor_id).await?;
        self.publish(snapshot)?;
        self.latest(professor_id)?.ok_or_else(|| {
            AppError::Internal(format!("feed for professor {} vanished", professor_id))
        })
    }

    fn latest(&self, professor_id: &str) -> Result<Option<Arc<QueueSnapshot>>> {
        Ok(self
            .lock()?
            .get(professor_id)
            .map(|channel| Arc::clone(&channel.latest)))
    }

    /// Reload when the store is ahead of what was last published
    async fn catch_up(&self, professor_id: &str) -> Result<()> {
        let committed = self.store.latest_revision(professor_id).await?;
        let published = self.latest(professor_id)?.map_or(0, |s| s.revision);
        if committed > published {
            debug!(
                professor_id = %professor_id,
                published = published,
                committed = committed,
                "Store ahead of feed, reloading"
            );
            self.refresh(professor_id).await?;
        }
        Ok(())
    }

    /// Clears the watcher flag when nobody is subscribed. Returns whether
    /// the watcher should stop.
    fn release_if_unobserved(&self, professor_id: &str) -> Result<bool> {
        let mut channels = self.lock()?;
        match channels.get_mut(professor_id) {
            Some(channel) if channel.sender.receiver_count() > 0 => Ok(false),
            Some(channel) => {
                channel.watching = false;
                Ok(true)
            }
            None => Ok(true),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ProfessorId, Channel>>> {
        self.channels
            .lock()
            .map_err(|_| AppError::Internal("change feed lock poisoned".to_string()))
    }
}

async fn watch_store(feed: Weak<Shared>, professor_id: ProfessorId, period: Duration) {
    // First poll one period out: the subscriber was just handed fresh state
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(professor_id = %professor_id, "Store watcher started");

    loop {
        ticker.tick().await;
        let Some(shared) = feed.upgrade() else {
            break;
        };
        match shared.release_if_unobserved(&professor_id) {
            Ok(false) => {}
            Ok(true) => break,
            Err(e) => {
                warn!(professor_id = %professor_id, error = %e, "Store watcher stopped");
                break;
            }
        }
        if let Err(e) = shared.catch_up(&professor_id).await {
            warn!(professor_id = %professor_id, error = %e, "Store poll failed");
        }
    }

    debug!(professor_id = %professor_id, "Store watcher exited");
}

/// A cancellable handle on one professor's feed. Dropping it cancels.
pub struct QueueSubscription {
    professor_id: ProfessorId,
    current: Arc<QueueSnapshot>,
    rx: broadcast::Receiver<Arc<QueueSnapshot>>,
    store: Arc<dyn LedgerStore>,
}

impl QueueSubscription {
    pub fn professor_id(&self) -> &str {
        &self.professor_id
    }

    /// Last snapshot this subscription delivered (or started from)
    pub fn current(&self) -> Arc<QueueSnapshot> {
        Arc::clone(&self.current)
    }

    pub fn revision(&self) -> Revision {
        self.current.revision
    }

    /// Wait for the next committed snapshot newer than the last one seen.
    ///
    /// Returns `None` once the feed itself is gone.
    pub async fn next(&mut self) -> Option<Arc<QueueSnapshot>> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) if snapshot.revision > self.current.revision => {
                    self.current = Arc::clone(&snapshot);
                    return Some(snapshot);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        professor_id = %self.professor_id,
                        skipped = skipped,
                        "Subscriber lagged, resynchronizing from store"
                    );
                    if let Some(snapshot) = self.resync().await {
                        return Some(snapshot);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn resync(&mut self) -> Option<Arc<QueueSnapshot>> {
        match self.store.load_snapshot(&self.professor_id).await {
            Ok(snapshot) if snapshot.revision > self.current.revision => {
                let snapshot = Arc::new(snapshot);
                self.current = Arc::clone(&snapshot);
                Some(snapshot)
            }
            Ok(_) => None,
            Err(e) => {
                // Buffered snapshots still arrive; keep receiving
                warn!(professor_id = %self.professor_id, error = %e, "Resync failed");
                None
            }
        }
    }

    /// Stream that yields the current snapshot first, then every change
    pub fn into_stream(self) -> BoxStream<'static, Arc<QueueSnapshot>> {
        let first = self.current();
        stream::once(async move { first })
            .chain(stream::unfold(self, |mut sub| async move {
                let snapshot = sub.next().await?;
                Some((snapshot, sub))
            }))
            .boxed()
    }

    /// Stop delivery
    pub fn cancel(self) {}
}
