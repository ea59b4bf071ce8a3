//! redcast: a publish/subscribe broker speaking the Redis wire protocol
//!
//! Clients `SUBSCRIBE` to named channels and `PUBLISH` byte payloads that are
//! fanned out to every current subscriber of that channel.
//!
//! # Architecture
//!
//! ```text
//!   [Connection A]            [Connection B]
//!   SUBSCRIBE news            PUBLISH news hello
//!        │                          │
//!        ▼                          ▼
//!   ChannelRegistry::get_or_create("news")  (one actor per channel)
//!        │                          │
//!        └──► Subscribe(A) ──► ChannelActor ◄── Publish(frame)
//!                                   │
//!                       try_send (never blocks)
//!                                   │
//!                                   ▼
//!                      A's bounded outbound queue
//!                                   │
//!                             OutboundPump ──► TCP
//! ```
//!
//! A subscriber whose queue is full when a message is fanned out is evicted
//! from the channel and disconnected. Delivery is best-effort, at-most-once.

pub mod broadcast;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stats;

pub use broadcast::{ChannelHandle, ChannelRegistry};
pub use error::{Error, Result};
pub use server::{FlushPolicy, Server, ServerConfig};
pub use stats::BrokerStats;
