//! Outbound delivery pump
//!
//! Drains a session's bounded message queue into the connection's buffered
//! writer. The writer is shared with the session's reply path, so replies and
//! fanned-out messages never interleave mid-frame.
//!
//! ```text
//!  channel actors ──try_send──► mpsc::channel(N) ──► OutboundPump ──► BufWriter ──► TCP
//!                                                        ▲
//!                                     teardown ──────────┘ (stops it, even mid-write)
//! ```

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Interval, MissedTickBehavior};

use crate::broadcast::{Message, SessionId};
use crate::error::Result;
use crate::protocol::RespWriter;
use crate::server::FlushPolicy;

use super::teardown::{Teardown, TeardownReason};

/// Writer shared by a session's reply path and its pump
pub type SharedWriter<W> = Arc<Mutex<RespWriter<W>>>;

/// Why the pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The session's teardown signal fired
    Teardown,
    /// Writing to the peer failed (the pump tripped the teardown itself)
    WriteFailed,
    /// Every sender of the queue is gone
    QueueClosed,
}

/// Background task moving queued messages onto the wire
pub struct OutboundPump<W: AsyncWrite> {
    session_id: SessionId,
    queue: mpsc::Receiver<Message>,
    writer: SharedWriter<W>,
    teardown: Teardown,
    policy: FlushPolicy,
}

impl<W> OutboundPump<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        session_id: SessionId,
        queue: mpsc::Receiver<Message>,
        writer: SharedWriter<W>,
        teardown: Teardown,
        policy: FlushPolicy,
    ) -> Self {
        Self {
            session_id,
            queue,
            writer,
            teardown,
            policy,
        }
    }

    /// Run the pump on its own task
    pub fn spawn(self) -> tokio::task::JoinHandle<PumpExit> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> PumpExit {
        let OutboundPump {
            session_id,
            mut queue,
            writer,
            teardown,
            policy,
        } = self;

        let eager = policy == FlushPolicy::Eager;
        let mut ticker = match policy {
            FlushPolicy::Interval(period) => {
                let mut ticker =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(ticker)
            }
            FlushPolicy::Eager => None,
        };
        let mut unflushed = false;

        let exit = loop {
            tokio::select! {
                biased;

                _ = teardown.wait() => break PumpExit::Teardown,

                // Ahead of the queue so a busy channel cannot starve the flush
                _ = tick(&mut ticker), if unflushed => {
                    let flushed = tokio::select! {
                        biased;
                        _ = teardown.wait() => break PumpExit::Teardown,
                        result = async { writer.lock().await.flush().await } => result,
                    };

                    match flushed {
                        Ok(()) => unflushed = false,
                        Err(e) => break write_failed(session_id, &teardown, e),
                    }
                }

                message = queue.recv() => {
                    let Some(message) = message else {
                        // Best effort: push out what is still buffered
                        if unflushed {
                            let _ = writer.lock().await.flush().await;
                        }
                        break PumpExit::QueueClosed;
                    };

                    let written = tokio::select! {
                        biased;
                        _ = teardown.wait() => break PumpExit::Teardown,
                        result = write_batch(&writer, &mut queue, message, eager) => result,
                    };

                    match written {
                        Ok(()) => unflushed = !eager,
                        Err(e) => break write_failed(session_id, &teardown, e),
                    }
                }
            }
        };

        tracing::debug!(
            session_id = session_id,
            exit = ?exit,
            "Outbound pump stopped"
        );

        exit
    }
}

/// Write `first` plus whatever else is already queued, under one lock
async fn write_batch<W>(
    writer: &SharedWriter<W>,
    queue: &mut mpsc::Receiver<Message>,
    first: Message,
    flush: bool,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = writer.lock().await;

    writer.write_raw(first.frame()).await?;
    while let Ok(message) = queue.try_recv() {
        writer.write_raw(message.frame()).await?;
    }

    if flush {
        writer.flush().await?;
    }
    Ok(())
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn write_failed(session_id: SessionId, teardown: &Teardown, error: crate::error::Error) -> PumpExit {
    tracing::debug!(session_id = session_id, error = %error, "Outbound write failed");
    teardown.trigger(TeardownReason::WriteFailed);
    PumpExit::WriteFailed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn pump(
        policy: FlushPolicy,
        capacity: usize,
    ) -> (
        mpsc::Sender<Message>,
        Teardown,
        DuplexStream,
        tokio::task::JoinHandle<PumpExit>,
    ) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let (tx, rx) = mpsc::channel(capacity);
        let teardown = Teardown::new();
        let writer = Arc::new(Mutex::new(RespWriter::new(local)));

        let handle = OutboundPump::new(1, rx, writer, teardown.clone(), policy).spawn();
        (tx, teardown, remote, handle)
    }

    async fn read_exact(remote: &mut DuplexStream, len: usize, within: Duration) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(within, remote.read_exact(&mut buf))
            .await
            .expect("timed out waiting for data")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_eager_flushes_each_message() {
        let (tx, teardown, mut remote, handle) = pump(FlushPolicy::Eager, 8);
        let message = Message::encode(b"news", b"hello");

        tx.send(message.clone()).await.unwrap();
        let received = read_exact(&mut remote, message.len(), Duration::from_secs(1)).await;
        assert_eq!(received, message.frame().as_ref());

        teardown.trigger(TeardownReason::SessionClosed);
        assert_eq!(handle.await.unwrap(), PumpExit::Teardown);
    }

    #[tokio::test]
    async fn test_interval_batches_until_tick() {
        let (tx, teardown, mut remote, handle) =
            pump(FlushPolicy::Interval(Duration::from_millis(200)), 8);
        let first = Message::encode(b"news", b"one");
        let second = Message::encode(b"news", b"two");

        tx.send(first.clone()).await.unwrap();
        tx.send(second.clone()).await.unwrap();

        // Still buffered well before the first tick
        let mut peek = [0u8; 1];
        let early = tokio::time::timeout(Duration::from_millis(50), remote.read(&mut peek)).await;
        assert!(early.is_err());

        let total = first.len() + second.len();
        let received = read_exact(&mut remote, total, Duration::from_secs(2)).await;
        let mut expected = first.frame().to_vec();
        expected.extend_from_slice(second.frame());
        assert_eq!(received, expected);

        teardown.trigger(TeardownReason::SessionClosed);
        assert_eq!(handle.await.unwrap(), PumpExit::Teardown);
    }

    #[tokio::test]
    async fn test_interval_flushes_under_sustained_input() {
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let (tx, rx) = mpsc::channel(1024);
        let teardown = Teardown::new();
        // Large enough that the buffer never spills on its own
        let writer = Arc::new(Mutex::new(RespWriter::with_capacity(8 * 1024 * 1024, local)));
        let handle = OutboundPump::new(
            1,
            rx,
            writer,
            teardown.clone(),
            FlushPolicy::Interval(Duration::from_millis(20)),
        )
        .spawn();

        let feeder = tokio::spawn(async move {
            let message = Message::encode(b"news", b"tick");
            loop {
                if tx.send(message.clone()).await.is_err() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        });

        let mut first = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_millis(500), remote.read(&mut first)).await;
        assert!(matches!(read, Ok(Ok(1))), "no flush while the queue stayed busy");
        assert_eq!(first[0], b'*');

        teardown.trigger(TeardownReason::SessionClosed);
        assert_eq!(handle.await.unwrap(), PumpExit::Teardown);
        feeder.abort();
    }

    #[tokio::test]
    async fn test_write_failure_trips_teardown() {
        let (tx, teardown, remote, handle) = pump(FlushPolicy::Eager, 8);
        drop(remote);

        tx.send(Message::encode(b"news", b"lost")).await.unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, PumpExit::WriteFailed);
        assert_eq!(teardown.reason(), Some(TeardownReason::WriteFailed));
    }

    #[tokio::test]
    async fn test_teardown_unblocks_stalled_writer() {
        // Tiny pipe that nobody reads: the write of a large frame blocks
        let (local, _remote) = tokio::io::duplex(16);
        let (tx, rx) = mpsc::channel(8);
        let teardown = Teardown::new();
        let writer = Arc::new(Mutex::new(RespWriter::with_capacity(16, local)));
        let handle =
            OutboundPump::new(1, rx, writer, teardown.clone(), FlushPolicy::Eager).spawn();

        tx.send(Message::encode(b"news", &[b'x'; 4096])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        teardown.trigger(TeardownReason::Overflow);
        let exit = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, PumpExit::Teardown);
    }

    #[tokio::test]
    async fn test_queue_closed_stops_pump() {
        let (tx, _teardown, mut remote, handle) =
            pump(FlushPolicy::Interval(Duration::from_secs(60)), 8);
        let message = Message::encode(b"news", b"last");

        tx.send(message.clone()).await.unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), PumpExit::QueueClosed);
        // Buffered data is flushed on the way out
        let received = read_exact(&mut remote, message.len(), Duration::from_secs(1)).await;
        assert_eq!(received, message.frame().as_ref());
    }
}
