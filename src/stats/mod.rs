//! Broker statistics

pub mod metrics;

pub use metrics::{BrokerStats, PublishCounter, StatsSnapshot};
