//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default outbound queue capacity per session
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 50_000;

/// Default flush interval for [`FlushPolicy::Interval`]
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// When the outbound pump pushes buffered messages to the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Flush after every message
    Eager,
    /// Buffer and flush on a fixed ticker
    Interval(Duration),
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::Interval(DEFAULT_FLUSH_INTERVAL)
    }
}

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Outbound queue capacity per session; a full queue evicts the subscriber
    pub outbound_capacity: usize,

    /// Flush policy of the outbound pump
    pub flush_policy: FlushPolicy,

    /// Publish rate interval
    pub stats_interval: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Application-level read buffer size
    pub read_buffer_size: usize,

    /// Application-level write buffer size
    pub write_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 6380)),
            max_connections: 0, // Unlimited
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            flush_policy: FlushPolicy::default(),
            stats_interval: Duration::from_secs(1),
            tcp_nodelay: true,
            read_buffer_size: 16 * 1024,
            write_buffer_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-session outbound queue capacity (at least 1)
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the flush policy
    pub fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// Flush on a ticker of `interval`; zero means flush eagerly
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_policy = if interval.is_zero() {
            FlushPolicy::Eager
        } else {
            FlushPolicy::Interval(interval)
        };
        self
    }

    /// Set the publish rate interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 6380);
        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert_eq!(
            config.flush_policy,
            FlushPolicy::Interval(Duration::from_millis(200))
        );
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 7000);
    }

    #[test]
    fn test_builder_outbound_capacity_clamped() {
        let config = ServerConfig::default().outbound_capacity(0);

        assert_eq!(config.outbound_capacity, 1);
    }

    #[test]
    fn test_builder_flush_interval() {
        let config = ServerConfig::default().flush_interval(Duration::ZERO);
        assert_eq!(config.flush_policy, FlushPolicy::Eager);

        let config = ServerConfig::default().flush_interval(Duration::from_millis(5));
        assert_eq!(
            config.flush_policy,
            FlushPolicy::Interval(Duration::from_millis(5))
        );
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "0.0.0.0:6379".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .outbound_capacity(16)
            .flush_policy(FlushPolicy::Eager)
            .stats_interval(Duration::from_millis(500))
            .tcp_nodelay(false);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.outbound_capacity, 16);
        assert_eq!(config.flush_policy, FlushPolicy::Eager);
        assert_eq!(config.stats_interval, Duration::from_millis(500));
        assert!(!config.tcp_nodelay);
    }
}
