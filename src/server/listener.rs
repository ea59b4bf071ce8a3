//! Broker listener
//!
//! Handles the TCP accept loop and spawns one session per connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::broadcast::ChannelRegistry;
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::session::{Teardown, TeardownReason};
use crate::stats::BrokerStats;

/// Pub/sub broker server
pub struct Server {
    config: ServerConfig,
    registry: Arc<ChannelRegistry>,
    stats: Arc<BrokerStats>,
    shutdown: Teardown,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let stats = Arc::new(BrokerStats::new());

        Self {
            config,
            registry: Arc::new(ChannelRegistry::new(Arc::clone(&stats))),
            stats,
            shutdown: Teardown::new(),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the channel registry
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<BrokerStats> {
        &self.stats
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every session is torn down and every channel closed.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            queue_size = self.config.outbound_capacity,
            flush = ?self.config.flush_policy,
            "Broker listening"
        );

        let roller = self.stats.spawn_roller(self.config.stats_interval);

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        self.shutdown.trigger(TeardownReason::Shutdown);
        roller.abort();
        self.registry.close_all();

        tracing::info!(addr = %addr, "Broker stopped");
        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::warn!(session_id = session_id, error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);
        let stats = Arc::clone(&self.stats);
        let shutdown = self.shutdown.clone();

        stats.connection_opened();

        tokio::spawn(async move {
            // Held for the lifetime of the session
            let _permit = permit;

            let mut connection = Connection::new(
                session_id,
                socket,
                peer_addr,
                config,
                registry,
                Arc::clone(&stats),
                shutdown,
            );

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            stats.connection_closed();
            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}
