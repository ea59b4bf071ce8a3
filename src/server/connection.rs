//! Client session
//!
//! One `Connection` per accepted socket. It reads requests, answers them, and
//! when the client subscribes, starts the outbound pump that delivers the
//! channel's messages.
//!
//! ```text
//!           ┌────────── read half ──────────┐
//!   TCP ────┤                               ├──► CommandReader ──► dispatch()
//!           └── write half ◄── SharedWriter ◄┬── replies
//!                                            └── OutboundPump ◄── outbound queue
//! ```
//!
//! The session ends on QUIT, EOF, a fatal I/O error, or when its teardown
//! signal fires (queue overflow, pump write failure, server shutdown). In
//! every case it leaves its channel and waits for the pump to stop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::broadcast::{ChannelHandle, ChannelRegistry, Message, Subscriber};
use crate::error::Result;
use crate::protocol::constants::SUBSCRIBE_KIND;
use crate::protocol::{Command, CommandKind, CommandReader, RespValue, RespWriter};
use crate::server::config::ServerConfig;
use crate::session::{
    OutboundPump, PumpExit, SessionPhase, SessionState, SharedWriter, Teardown, TeardownReason,
};
use crate::stats::BrokerStats;

const EMPTY_CHANNEL: &str = "Channel name cannot empty";
const EMPTY_DATA: &str = "Empty data";

/// What the read loop does after a command
enum Flow {
    Continue,
    Quit,
}

/// A single client session
pub struct Connection {
    state: SessionState,
    reader: CommandReader<OwnedReadHalf>,
    writer: SharedWriter<OwnedWriteHalf>,
    config: ServerConfig,
    registry: Arc<ChannelRegistry>,
    stats: Arc<BrokerStats>,

    /// This session's teardown
    teardown: Teardown,
    /// Server-wide shutdown
    shutdown: Teardown,

    /// Sending side of the outbound queue, created with the pump
    subscriber: Option<Subscriber>,
    /// Channel currently subscribed to
    channel: Option<ChannelHandle>,
    pump: Option<JoinHandle<PumpExit>>,
}

impl Connection {
    pub fn new(
        session_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<ChannelRegistry>,
        stats: Arc<BrokerStats>,
        shutdown: Teardown,
    ) -> Self {
        let (read_half, write_half) = socket.into_split();

        Self {
            state: SessionState::new(session_id, peer_addr),
            reader: CommandReader::with_capacity(config.read_buffer_size, read_half),
            writer: Arc::new(Mutex::new(RespWriter::with_capacity(
                config.write_buffer_size,
                write_half,
            ))),
            config,
            registry,
            stats,
            teardown: Teardown::new(),
            shutdown,
            subscriber: None,
            channel: None,
            pump: None,
        }
    }

    /// Serve the client until the session ends
    pub async fn run(&mut self) -> Result<()> {
        let teardown = self.teardown.clone();
        let shutdown = self.shutdown.clone();

        let result = loop {
            let read = tokio::select! {
                biased;
                _ = stopped(&teardown, &shutdown) => break Ok(()),
                read = self.reader.read_command() => read,
            };

            let command = match read {
                Ok(Some(command)) => command,
                Ok(None) => break Ok(()),
                Err(e) if e.is_recoverable() => {
                    let message = e.to_string();
                    tracing::debug!(
                        session_id = self.state.id,
                        error = %message,
                        "Malformed request"
                    );
                    let replied = tokio::select! {
                        biased;
                        _ = stopped(&teardown, &shutdown) => break Ok(()),
                        replied = self.reply_error(&message) => replied,
                    };
                    if let Err(e) = replied {
                        break Err(e);
                    }
                    continue;
                }
                Err(e) => break Err(e),
            };

            self.state.commands_processed += 1;

            let flow = tokio::select! {
                biased;
                _ = stopped(&teardown, &shutdown) => break Ok(()),
                flow = self.dispatch(command) => flow,
            };

            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.close().await;
        result
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow> {
        if command.is_empty() {
            return Ok(Flow::Continue);
        }

        match command.kind() {
            CommandKind::Subscribe => self.handle_subscribe(&command).await?,
            CommandKind::Publish => self.handle_publish(&command).await?,
            CommandKind::Ping => {
                let mut writer = self.writer.lock().await;
                writer.write_simple_string("PONG").await?;
                writer.flush().await?;
            }
            CommandKind::Info => self.handle_info().await?,
            CommandKind::Quit => return Ok(Flow::Quit),
            CommandKind::Unknown(name) => {
                self.reply_error(&format!("Command not support [{}]", name))
                    .await?
            }
        }

        Ok(Flow::Continue)
    }

    async fn handle_subscribe(&mut self, command: &Command) -> Result<()> {
        let name = command.arg_bytes(1);
        if name.is_empty() {
            return self.reply_error(EMPTY_CHANNEL).await;
        }

        let channel = self.registry.get_or_create(&name);
        let subscriber = self.ensure_pump();

        // The ack must be buffered before the actor can deliver anything
        let mut writer = self.writer.lock().await;

        if let Some(previous) = self.channel.take() {
            if !previous.same_channel(&channel) {
                let _ = previous.unsubscribe(self.state.id);
            }
        }

        if let Err(e) = channel.subscribe(subscriber) {
            self.state.phase = SessionPhase::Idle;
            writer.write_error(&e.to_string()).await?;
            return writer.flush().await;
        }

        writer
            .write_values(vec![
                RespValue::bulk(SUBSCRIBE_KIND),
                RespValue::Bulk(name.clone()),
                RespValue::Integer(1),
            ])
            .await?;
        writer.flush().await?;
        drop(writer);

        tracing::debug!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            channel = %String::from_utf8_lossy(&name),
            "Subscribed"
        );

        self.state.subscribe(name);
        self.channel = Some(channel);
        Ok(())
    }

    async fn handle_publish(&mut self, command: &Command) -> Result<()> {
        let name = command.arg(1);
        let payload = command.arg(2);

        if name.is_empty() {
            return self.reply_error(EMPTY_CHANNEL).await;
        }
        if payload.is_empty() {
            return self.reply_error(EMPTY_DATA).await;
        }

        let message = Message::encode(name, payload);
        let channel = self.registry.get_or_create(name);

        if let Err(e) = channel.publish(message) {
            return self.reply_error(&e.to_string()).await;
        }
        self.stats.record_publish();

        let mut writer = self.writer.lock().await;
        writer.write_int(1).await?;
        writer.flush().await
    }

    async fn handle_info(&mut self) -> Result<()> {
        let mut names = Vec::new();
        let mut counts = Vec::new();
        for name in self.registry.channel_names() {
            let label = String::from_utf8_lossy(&name).into_owned();
            // A channel closed in the meantime is left out of the counts
            if let Some(channel) = self.registry.get(&name) {
                if let Ok(count) = channel.subscriber_count().await {
                    counts.push(format!("{}:{}", label, count));
                }
            }
            names.push(label);
        }
        let stats = self.stats.snapshot();

        let info = format!(
            "channels: [{}]\n\
             subscribers: [{}]\n\
             publish_rate: {}\n\
             published_total: {}\n\
             connected_clients: {}\n\
             total_connections: {}\n\
             evicted_subscribers: {}\n\
             uptime_secs: {}\n",
            names.join(" "),
            counts.join(" "),
            stats.publish_rate,
            stats.published_total,
            stats.active_connections,
            stats.total_connections,
            stats.evicted_subscribers,
            stats.uptime.as_secs(),
        );

        let mut writer = self.writer.lock().await;
        writer.write_bulk(info.as_bytes()).await?;
        writer.flush().await
    }

    async fn reply_error(&self, message: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_error(message).await?;
        writer.flush().await
    }

    /// The session's subscriber handle, starting the pump on first use
    fn ensure_pump(&mut self) -> Subscriber {
        if let Some(subscriber) = &self.subscriber {
            return subscriber.clone();
        }

        let (tx, rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let subscriber = Subscriber::new(self.state.id, tx, self.teardown.clone());

        let pump = OutboundPump::new(
            self.state.id,
            rx,
            Arc::clone(&self.writer),
            self.teardown.clone(),
            self.config.flush_policy,
        );
        self.pump = Some(pump.spawn());
        self.subscriber = Some(subscriber.clone());

        subscriber
    }

    async fn close(&mut self) {
        self.teardown.trigger(TeardownReason::SessionClosed);

        if let Some(channel) = self.channel.take() {
            let _ = channel.unsubscribe(self.state.id);
        }
        self.state.close();
        self.subscriber = None;

        if let Some(pump) = self.pump.take() {
            match pump.await {
                Ok(exit) => tracing::trace!(session_id = self.state.id, exit = ?exit, "Pump joined"),
                Err(e) => tracing::debug!(session_id = self.state.id, error = %e, "Pump task failed"),
            }
        }

        tracing::debug!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            reason = ?self.teardown.reason(),
            commands = self.state.commands_processed,
            duration_ms = self.state.duration().as_millis() as u64,
            "Session closed"
        );
    }
}

/// Resolves once the session must stop, either on its own or with the server
async fn stopped(teardown: &Teardown, shutdown: &Teardown) {
    tokio::select! {
        _ = teardown.wait() => {}
        _ = shutdown.wait() => {
            teardown.trigger(TeardownReason::Shutdown);
        }
    }
}
