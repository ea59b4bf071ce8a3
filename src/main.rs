//! redcast broker binary

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use redcast::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "redcast", version, about = "Pub/sub broker speaking the Redis protocol")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    listen: SocketAddr,

    /// Outbound queue length before a subscriber gets kicked out
    #[arg(short = 's', long, default_value_t = 50_000)]
    queue_size: usize,

    /// Subscriber flush interval in milliseconds (0 flushes every message)
    #[arg(long, default_value_t = 200)]
    flush_interval_ms: u64,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Log directory, or `stdout`
    #[arg(short = 'd', long, default_value = "stdout")]
    log_dir: String,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Rotated log files kept next to the live one
const MAX_LOG_FILES: usize = 30;

/// Daily-rotated `applog.<date>.log` files under `dir`
fn file_appender(dir: &Path) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix("applog")
        .filename_suffix("log")
        .build(dir)?;

    Ok(appender)
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop, so it must live as
/// long as the process logs.
fn init_logging(
    log_dir: &str,
    level: &str,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    if log_dir == "stdout" {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    }

    let (writer, guard) = tracing_appender::non_blocking(file_appender(Path::new(log_dir))?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .init();

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let _log_guard = init_logging(&args.log_dir, &args.log_level)?;

    let config = ServerConfig::with_addr(args.listen)
        .outbound_capacity(args.queue_size)
        .flush_interval(Duration::from_millis(args.flush_interval_ms))
        .max_connections(args.max_connections);

    let server = Server::new(config);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["redcast"]);

        assert_eq!(args.listen, "127.0.0.1:6380".parse().unwrap());
        assert_eq!(args.queue_size, 50_000);
        assert_eq!(args.flush_interval_ms, 200);
        assert_eq!(args.max_connections, 0);
        assert_eq!(args.log_dir, "stdout");
    }

    #[test]
    fn test_short_flags() {
        let args = Args::parse_from(["redcast", "-l", "0.0.0.0:7000", "-s", "10", "-d", "/tmp/logs"]);

        assert_eq!(args.listen.port(), 7000);
        assert_eq!(args.queue_size, 10);
        assert_eq!(args.log_dir, "/tmp/logs");
    }

    #[test]
    fn test_file_appender_creates_log_dir() {
        let dir = std::env::temp_dir().join(format!("redcast-logs-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let appender = file_appender(&dir.join("nested"));

        assert!(appender.is_ok());
        assert!(dir.join("nested").is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
