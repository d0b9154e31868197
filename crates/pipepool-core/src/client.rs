//! Client-side connect for pool channels.
//!
//! The pool itself only accepts; this is the matching connect used by
//! callers and tests to reach a channel.

use crate::channel::ChannelName;
use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::platform::{self, ClientConnection};
use std::time::Duration;
use tracing::debug;

/// Connect to a channel with the default timeout.
pub async fn connect(channel: &ChannelName) -> Result<ClientConnection> {
    connect_with_timeout(channel, PoolConfig::CLIENT_CONNECT_TIMEOUT).await
}

/// Connect to a channel, giving up after `timeout`.
///
/// A missing channel fails immediately; only "all instances busy" is waited on.
pub async fn connect_with_timeout(
    channel: &ChannelName,
    timeout: Duration,
) -> Result<ClientConnection> {
    let connection = tokio::time::timeout(timeout, platform::connect(channel))
        .await
        .map_err(|_| PoolError::ConnectTimeout {
            channel: channel.to_string(),
            timeout,
        })?
        .map_err(|source| PoolError::Connect {
            channel: channel.to_string(),
            source,
        })?;

    debug!(channel = %channel, "Client connected");
    Ok(connection)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_missing_channel_fails_fast() {
        let dir = tempfile::TempDir::new().unwrap();
        let channel =
            ChannelName::new(dir.path().join("missing.sock").to_string_lossy()).unwrap();

        let result = connect_with_timeout(&channel, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(PoolError::Connect { .. })));
    }
}
