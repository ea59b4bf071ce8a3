//! One-shot session teardown signal
//!
//! A session can be torn down from several places at once: its own read loop
//! (QUIT, EOF, I/O error), its outbound pump (write failure) and any channel
//! actor that finds its queue full. Only the first trigger takes effect; later
//! ones are no-ops, so racing paths never fault.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Why a session was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// Peer quit or disconnected, or the session ended on its own
    SessionClosed,
    /// Outbound queue was full during a fan-out
    Overflow,
    /// Writing to the peer failed
    WriteFailed,
    /// The server is shutting down
    Shutdown,
}

struct Inner {
    fired: AtomicBool,
    tx: watch::Sender<Option<TeardownReason>>,
}

/// Cloneable, idempotent "signal once" handle
#[derive(Clone)]
pub struct Teardown {
    inner: Arc<Inner>,
}

impl Teardown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                tx,
            }),
        }
    }

    /// Fire the signal
    ///
    /// Returns `true` only for the call that actually fired it.
    pub fn trigger(&self, reason: TeardownReason) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.tx.send_replace(Some(reason));
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Reason of the effective trigger, if fired
    pub fn reason(&self) -> Option<TeardownReason> {
        *self.inner.tx.borrow()
    }

    /// Wait until the signal fires
    ///
    /// Resolves immediately if it already has. Cancel safe.
    pub async fn wait(&self) -> TeardownReason {
        let mut rx = self.inner.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // The sender lives in `self`, so this cannot fail while we wait
            if rx.changed().await.is_err() {
                return TeardownReason::SessionClosed;
            }
        }
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_only_first_trigger_counts() {
        let teardown = Teardown::new();
        assert!(!teardown.is_triggered());

        assert!(teardown.trigger(TeardownReason::Overflow));
        assert!(!teardown.trigger(TeardownReason::WriteFailed));
        assert!(!teardown.clone().trigger(TeardownReason::SessionClosed));

        assert!(teardown.is_triggered());
        assert_eq!(teardown.reason(), Some(TeardownReason::Overflow));
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns_immediately() {
        let teardown = Teardown::new();
        teardown.trigger(TeardownReason::Shutdown);
        assert_eq!(teardown.wait().await, TeardownReason::Shutdown);
    }

    #[tokio::test]
    async fn test_wait_wakes_all_waiters() {
        let teardown = Teardown::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let teardown = teardown.clone();
                tokio::spawn(async move { teardown.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        teardown.trigger(TeardownReason::WriteFailed);

        for waiter in waiters {
            let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reason, TeardownReason::WriteFailed);
        }
    }

    #[tokio::test]
    async fn test_concurrent_triggers_fire_once() {
        let teardown = Teardown::new();
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let teardown = teardown.clone();
                tokio::spawn(async move {
                    let reason = if i % 2 == 0 {
                        TeardownReason::Overflow
                    } else {
                        TeardownReason::WriteFailed
                    };
                    teardown.trigger(reason)
                })
            })
            .collect();

        let mut fired = 0;
        for task in tasks {
            if task.await.unwrap() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }
}
