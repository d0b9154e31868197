//! Echo handler: writes every received chunk back until the client hangs up.

use pipepool_core::{Connection, ConnectionHandler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

const BUFFER_SIZE: usize = 64 * 1024;

pub struct EchoHandler;

#[async_trait::async_trait]
impl ConnectionHandler for EchoHandler {
    async fn handle(&self, connection: &mut Connection) -> anyhow::Result<()> {
        let mut buf = vec![0u8; BUFFER_SIZE];
        let mut total = 0usize;

        loop {
            let n = connection.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            connection.write_all(&buf[..n]).await?;
            total += n;
        }

        connection.flush().await?;
        debug!(bytes = total, "Echo session finished");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pipepool_core::{client, AcceptorPool, ChannelName, PoolOptions};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_echo_until_client_closes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("echo.sock");
        let pool = AcceptorPool::new(
            path.to_string_lossy(),
            PoolOptions::default(),
            Arc::new(EchoHandler),
        )
        .unwrap();
        pool.start();
        while pool.listening_endpoints() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let channel = ChannelName::new(path.to_string_lossy()).unwrap();
        let mut stream = client::connect_with_timeout(&channel, Duration::from_secs(5))
            .await
            .unwrap();

        stream.write_all(b"first ").await.unwrap();
        stream.write_all(b"second").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"first second");

        pool.shutdown().await;
    }
}
