//! Pipepool Server - echo service on a local IPC channel.
//!
//! Runs an acceptor pool on the given channel until Ctrl-C, echoing every
//! byte each client sends.

mod echo;

use anyhow::{Context, Result};
use clap::Parser;
use pipepool_core::{platform, AcceptorPool, ChannelName, PoolConfig, PoolOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pipepool-server")]
#[command(about = "Echo server on a named pipe / Unix socket channel")]
struct Args {
    /// Channel name (a path on Unix, or a bare name)
    channel: String,

    /// Number of listening endpoints
    #[arg(long, default_value_t = PoolConfig::POOL_SIZE)]
    pool_size: usize,

    /// Only allow the current user to connect
    #[arg(long)]
    current_user_only: bool,

    /// JSON file with pool options (overrides --current-user-only)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn pool_options(&self) -> Result<PoolOptions> {
        match &self.config {
            Some(path) => PoolOptions::from_json_file(path)
                .with_context(|| format!("loading pool options from {}", path.display())),
            None if self.current_user_only => Ok(PoolOptions::current_user_only()),
            None => Ok(PoolOptions::default()),
        }
    }
}

fn init_logging(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.json_logs);

    let options = args.pool_options()?;
    let channel = ChannelName::new(&args.channel)?;

    let pool = AcceptorPool::builder(channel.as_str())
        .options(options)
        .pool_size(args.pool_size)
        .build(Arc::new(echo::EchoHandler))?;
    pool.start();

    info!(
        channel = %channel,
        address = ?platform::channel_address(&channel),
        "Echo server running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping acceptor pool");

    pool.shutdown().await;
    info!(in_flight = pool.active_connections(), "Acceptor pool stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["pipepool-server", "demo"]);
        assert_eq!(args.channel, "demo");
        assert_eq!(args.pool_size, PoolConfig::POOL_SIZE);
        assert_eq!(args.pool_options().unwrap(), PoolOptions::default());
    }

    #[test]
    fn test_args_current_user_only() {
        let args = Args::parse_from(["pipepool-server", "demo", "--current-user-only"]);
        assert_eq!(args.pool_options().unwrap(), PoolOptions::current_user_only());
    }

    #[test]
    fn test_args_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"restrict_to_current_user": true}"#).unwrap();

        let args = Args::parse_from([
            "pipepool-server",
            "demo",
            "--config",
            path.to_str().unwrap(),
        ]);
        assert_eq!(args.pool_options().unwrap(), PoolOptions::current_user_only());
    }
}
