//! Channel fan-out
//!
//! The registry maps channel names to channel actors. Each actor owns its
//! subscriber set and delivers published messages to the subscribers'
//! bounded outbound queues without ever waiting on them.
//!
//! # Architecture
//!
//! ```text
//!                     Arc<ChannelRegistry>
//!               ┌──────────────────────────────┐
//!               │ channels: HashMap<Name,      │
//!               │   ChannelHandle ──► actor >  │
//!               └──────────────┬───────────────┘
//!                              │
//!         ┌────────────────────┼────────────────────┐
//!         ▼                    ▼                    ▼
//!   ChannelActor "a"     ChannelActor "b"     ChannelActor "c"
//!   HashMap<SessionId,   ...                  ...
//!     Subscriber>
//!         │ try_send
//!         ▼
//!   session outbound queues (bounded)
//! ```
//!
//! # Zero-Copy Design
//!
//! A published payload is encoded into its `message` frame once. Every
//! subscriber queue receives a clone of the same `Bytes`, which only bumps a
//! reference count.

pub mod actor;
pub mod message;
pub mod registry;
pub mod subscriber;

pub use actor::ChannelHandle;
pub use message::Message;
pub use registry::ChannelRegistry;
pub use subscriber::{Delivery, SessionId, Subscriber};
