//! Pipepool Core - fixed-size acceptor pool for local duplex IPC channels.
//!
//! The pool keeps a constant number of endpoints listening on a channel
//! name (a named pipe on Windows, a Unix domain socket elsewhere). Each
//! accepted connection goes to a caller-supplied [`ConnectionHandler`] on
//! its own task while the slot immediately re-arms a fresh endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use pipepool_core::{AcceptorPool, Connection, ConnectionHandler, PoolOptions};
//! use std::sync::Arc;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ConnectionHandler for Echo {
//!     async fn handle(&self, connection: &mut Connection) -> anyhow::Result<()> {
//!         let mut buf = [0u8; 1024];
//!         let n = connection.read(&mut buf).await?;
//!         connection.write_all(&buf[..n]).await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> pipepool_core::Result<()> {
//!     let pool = AcceptorPool::new("my-service", PoolOptions::current_user_only(), Arc::new(Echo))?;
//!     pool.start();
//!     tokio::signal::ctrl_c().await.ok();
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod channel;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handler;
pub mod platform;
pub mod pool;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use channel::ChannelName;
pub use config::{AccessControl, PoolConfig, PoolOptions, SlotFailurePolicy};
pub use diagnostics::{DiagnosticHook, TracingDiagnostics};
pub use error::{PoolError, Result};
pub use handler::{ConnectionHandler, HandlerFailure};
pub use platform::{ClientConnection, Connection};
pub use pool::tracker::ConnectionId;
pub use pool::{AcceptorPool, AcceptorPoolBuilder, PoolState};
