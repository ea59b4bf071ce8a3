//! Subscriber handles held by channel actors

use tokio::sync::mpsc::{self, error::TrySendError};

use super::message::Message;
use crate::session::teardown::{Teardown, TeardownReason};

/// Unique session identifier, used as subscriber identity
pub type SessionId = u64;

/// Result of a non-blocking delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Message queued
    Queued,
    /// Queue at capacity; the subscriber must be evicted
    Full,
    /// The session's pump is gone
    Closed,
}

/// The sending side of one session's outbound queue
///
/// Cloned into every channel the session subscribes to. The channel actor
/// only ever calls [`try_deliver`](Self::try_deliver), which never waits.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SessionId,
    queue: mpsc::Sender<Message>,
    teardown: Teardown,
}

impl Subscriber {
    pub fn new(id: SessionId, queue: mpsc::Sender<Message>, teardown: Teardown) -> Self {
        Self {
            id,
            queue,
            teardown,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Enqueue without waiting
    pub fn try_deliver(&self, message: &Message) -> Delivery {
        match self.queue.try_send(message.clone()) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Force the session down after its queue overflowed
    ///
    /// Only trips the session's teardown signal; the session's own tasks do
    /// the actual disconnect, so this never blocks the caller.
    pub fn overflow(&self) -> bool {
        self.teardown.trigger(TeardownReason::Overflow)
    }

    /// Messages currently waiting in the queue
    pub fn queued(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }
}
