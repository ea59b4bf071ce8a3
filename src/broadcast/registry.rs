//! Channel registry
//!
//! Maps channel names to running channel actors. Channels are created lazily
//! on first use and live until the registry is shut down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use super::actor::ChannelHandle;
use crate::stats::BrokerStats;

/// Central registry of all channels
///
/// Shared as `Arc<ChannelRegistry>` by every session. The lock is only held
/// for a map lookup or insert, never across an await point.
pub struct ChannelRegistry {
    channels: Mutex<HashMap<Bytes, ChannelHandle>>,
    stats: Arc<BrokerStats>,
}

impl ChannelRegistry {
    pub fn new(stats: Arc<BrokerStats>) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            stats,
        }
    }

    /// Look up a channel, starting its actor if it does not exist yet
    ///
    /// Concurrent callers with the same name always get handles to the same
    /// actor. Must be called from within a tokio runtime.
    pub fn get_or_create(&self, name: &[u8]) -> ChannelHandle {
        let mut channels = self.lock();

        if let Some(handle) = channels.get(name) {
            return handle.clone();
        }

        let name = Bytes::copy_from_slice(name);
        let handle = ChannelHandle::spawn(name.clone(), Arc::clone(&self.stats));
        channels.insert(name, handle.clone());

        tracing::debug!(
            channel = %String::from_utf8_lossy(handle.name()),
            channels = channels.len(),
            "Channel created"
        );

        handle
    }

    /// Look up an existing channel
    pub fn get(&self, name: &[u8]) -> Option<ChannelHandle> {
        self.lock().get(name).cloned()
    }

    /// Sorted snapshot of all channel names
    pub fn channel_names(&self) -> Vec<Bytes> {
        let mut names: Vec<Bytes> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stop every channel actor and forget all channels
    pub fn close_all(&self) {
        let channels: Vec<ChannelHandle> = self.lock().drain().map(|(_, h)| h).collect();
        for handle in &channels {
            handle.close();
        }
        if !channels.is_empty() {
            tracing::info!(channels = channels.len(), "Closed all channels");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Bytes, ChannelHandle>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (ChannelRegistry, Arc<BrokerStats>) {
        let stats = Arc::new(BrokerStats::new());
        (ChannelRegistry::new(Arc::clone(&stats)), stats)
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_channel() {
        let (registry, stats) = registry();

        let a = registry.get_or_create(b"news");
        let b = registry.get_or_create(b"news");
        let c = registry.get_or_create(b"sport");

        assert!(a.same_channel(&b));
        assert!(!a.same_channel(&c));
        assert_eq!(registry.len(), 2);
        assert_eq!(stats.snapshot().channels, 2);
        assert!(registry.get(b"news").unwrap().same_channel(&a));
        assert!(registry.get(b"weather").is_none());
    }

    #[tokio::test]
    async fn test_channel_names_sorted() {
        let (registry, _) = registry();
        assert!(registry.is_empty());

        for name in [&b"zeta"[..], b"alpha", b"mid"] {
            registry.get_or_create(name);
        }

        assert_eq!(
            registry.channel_names(),
            vec![
                Bytes::from_static(b"alpha"),
                Bytes::from_static(b"mid"),
                Bytes::from_static(b"zeta"),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_creates_once() {
        let (registry, stats) = registry();
        let registry = Arc::new(registry);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_or_create(b"shared") })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert!(handles.iter().all(|h| h.same_channel(&handles[0])));
        assert_eq!(registry.len(), 1);
        assert_eq!(stats.snapshot().channels, 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let (registry, _) = registry();
        let news = registry.get_or_create(b"news");
        registry.get_or_create(b"sport");

        registry.close_all();

        assert!(registry.is_empty());
        assert!(news.is_closed());
        assert!(news.publish(crate::broadcast::Message::encode(b"news", b"x")).is_err());
    }
}
