//! Per-channel broadcaster actor
//!
//! Every channel runs one task that owns the channel's subscriber set. All
//! membership changes and publishes are funnelled through a single unbounded
//! queue and applied one at a time, so the set is never shared and publish
//! order is total per channel.
//!
//! ```text
//!  subscribe() ──┐
//!  unsubscribe() ├──► mpsc::unbounded ──► ChannelActor ──try_send──► subscriber queues
//!  publish() ────┘                         (one task)
//! ```
//!
//! The inbound queue is unbounded on purpose: publishers must never be slowed
//! down by a slow subscriber. Backpressure is applied on the outbound side
//! instead, by evicting any subscriber whose queue is full.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use super::message::Message;
use super::subscriber::{Delivery, SessionId, Subscriber};
use crate::error::{Error, Result};
use crate::stats::BrokerStats;

/// Operations processed by a channel actor
#[derive(Debug)]
pub(crate) enum ChannelOp {
    Subscribe(Subscriber),
    Unsubscribe(SessionId),
    Publish(Message),
    SubscriberCount(oneshot::Sender<usize>),
    Close,
}

struct Shared {
    name: Bytes,
    tx: mpsc::UnboundedSender<ChannelOp>,
    closed: AtomicBool,
}

/// Handle to a running channel actor
///
/// Cheap to clone; all clones talk to the same actor.
///
/// Once [`close`](Self::close) has been called, every submission fails with
/// [`Error::ChannelClosed`]. Operations that were already queued ahead of the
/// close are still applied; anything that slipped in behind it is discarded.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
}

impl ChannelHandle {
    /// Start the actor task for `name`
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(name: Bytes, stats: Arc<BrokerStats>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = ChannelActor::new(name.clone(), stats);

        tokio::spawn(actor.run(rx));

        Self {
            shared: Arc::new(Shared {
                name,
                tx,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &Bytes {
        &self.shared.name
    }

    /// Add a subscriber (idempotent per session id)
    pub fn subscribe(&self, subscriber: Subscriber) -> Result<()> {
        self.submit(ChannelOp::Subscribe(subscriber))
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn unsubscribe(&self, id: SessionId) -> Result<()> {
        self.submit(ChannelOp::Unsubscribe(id))
    }

    /// Fan a message out to every current subscriber
    pub fn publish(&self, message: Message) -> Result<()> {
        self.submit(ChannelOp::Publish(message))
    }

    /// Number of subscribers once every earlier operation has been applied
    pub async fn subscriber_count(&self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(ChannelOp::SubscriberCount(reply_tx))?;
        reply_rx.await.map_err(|_| self.closed_error())
    }

    /// Stop the actor; later submissions are rejected
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            let _ = self.shared.tx.send(ChannelOp::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same actor
    pub fn same_channel(&self, other: &ChannelHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn submit(&self, op: ChannelOp) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.shared.tx.send(op).map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> Error {
        Error::ChannelClosed(String::from_utf8_lossy(&self.shared.name).into_owned())
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("name", &self.shared.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The actor state: one channel's subscriber set
pub(crate) struct ChannelActor {
    name: Bytes,
    subscribers: HashMap<SessionId, Subscriber>,
    stats: Arc<BrokerStats>,
}

impl ChannelActor {
    pub(crate) fn new(name: Bytes, stats: Arc<BrokerStats>) -> Self {
        stats.record_channel();
        Self {
            name,
            subscribers: HashMap::new(),
            stats,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ChannelOp>) {
        while let Some(op) = rx.recv().await {
            if !self.apply(op) {
                break;
            }
        }

        rx.close();
        let mut discarded = 0usize;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }

        tracing::debug!(
            channel = %String::from_utf8_lossy(&self.name),
            subscribers = self.subscribers.len(),
            discarded = discarded,
            "Channel actor stopped"
        );
    }

    /// Apply one operation; returns `false` once the actor should stop
    pub(crate) fn apply(&mut self, op: ChannelOp) -> bool {
        match op {
            ChannelOp::Subscribe(subscriber) => {
                self.subscribers.insert(subscriber.id(), subscriber);
            }
            ChannelOp::Unsubscribe(id) => {
                self.subscribers.remove(&id);
            }
            ChannelOp::Publish(message) => self.fan_out(&message),
            ChannelOp::SubscriberCount(reply) => {
                let _ = reply.send(self.subscribers.len());
            }
            ChannelOp::Close => return false,
        }
        true
    }

    /// Offer `message` to every subscriber without waiting on any of them
    ///
    /// A subscriber whose queue is full is removed in the same pass and its
    /// session is told to disconnect.
    fn fan_out(&mut self, message: &Message) {
        let name = &self.name;
        let stats = &self.stats;

        self.subscribers
            .retain(|&id, subscriber| match subscriber.try_deliver(message) {
                Delivery::Queued => true,
                Delivery::Full => {
                    tracing::warn!(
                        channel = %String::from_utf8_lossy(name),
                        session_id = id,
                        queued = subscriber.queued(),
                        "Subscriber overflowed, evicting"
                    );
                    subscriber.overflow();
                    stats.record_eviction();
                    false
                }
                Delivery::Closed => {
                    tracing::debug!(
                        channel = %String::from_utf8_lossy(name),
                        session_id = id,
                        "Subscriber queue closed, removing"
                    );
                    false
                }
            });
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn contains(&self, id: SessionId) -> bool {
        self.subscribers.contains_key(&id)
    }
}
