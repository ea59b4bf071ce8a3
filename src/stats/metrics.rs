//! Statistics and metrics for the broker

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Publish counter with a per-interval rate
///
/// Publishers increment `current`; a single roller calls [`roll`](Self::roll)
/// once per interval, which moves the interval's count into `last_interval`
/// with one atomic swap so no increment is lost or counted twice.
#[derive(Debug, Default)]
pub struct PublishCounter {
    current: AtomicU64,
    last_interval: AtomicU64,
    total: AtomicU64,
}

impl PublishCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one accepted publish
    pub fn record(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the current interval and return its count
    pub fn roll(&self) -> u64 {
        let count = self.current.swap(0, Ordering::AcqRel);
        self.last_interval.store(count, Ordering::Release);
        count
    }

    /// Publishes counted in the last completed interval
    pub fn rate(&self) -> u64 {
        self.last_interval.load(Ordering::Acquire)
    }

    /// Publishes since startup
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Process-wide broker statistics
///
/// Shared as `Arc<BrokerStats>` between the listener, every session and
/// every channel actor.
#[derive(Debug)]
pub struct BrokerStats {
    publishes: PublishCounter,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    evicted_subscribers: AtomicU64,
    channels: AtomicU64,
    started_at: Instant,
}

impl BrokerStats {
    pub fn new() -> Self {
        Self {
            publishes: PublishCounter::new(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            evicted_subscribers: AtomicU64::new(0),
            channels: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_publish(&self) {
        self.publishes.record();
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// A subscriber was dropped because its outbound queue was full
    pub fn record_eviction(&self) {
        self.evicted_subscribers.fetch_add(1, Ordering::Relaxed);
    }

    /// A channel actor was started
    pub fn record_channel(&self) {
        self.channels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            publish_rate: self.publishes.rate(),
            published_total: self.publishes.total(),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            evicted_subscribers: self.evicted_subscribers.load(Ordering::Relaxed),
            channels: self.channels.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }

    /// Spawn the task that closes a publish-rate interval every `interval`
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_roller(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let stats = Arc::clone(self);

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                let count = stats.publishes.roll();
                tracing::trace!(publishes = count, "Publish interval rolled");
            }
        })
    }
}

impl Default for BrokerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`BrokerStats`]
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    /// Publishes during the last completed interval
    pub publish_rate: u64,
    /// Publishes since startup
    pub published_total: u64,
    /// Connections ever accepted
    pub total_connections: u64,
    /// Currently open connections
    pub active_connections: u64,
    /// Subscribers evicted for overflowing their queue
    pub evicted_subscribers: u64,
    /// Channels created
    pub channels: u64,
    /// Time since the stats were created
    pub uptime: Duration,
}
