//! Unix domain socket endpoints.

use crate::channel::ChannelName;
use crate::config::{AccessControl, PoolConfig, PoolOptions};
use crate::error::{PoolError, Result};
use fs2::FileExt;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

/// Server side of an accepted connection.
pub type Connection = UnixStream;
/// Client side of a connection.
pub type ClientConnection = UnixStream;

/// Resolve the socket path for a channel.
///
/// Names containing `/` are used verbatim. Bare names live in the user's
/// runtime directory, falling back to the temp dir.
pub fn channel_address(channel: &ChannelName) -> PathBuf {
    let name = channel.as_str();
    if name.contains('/') {
        return PathBuf::from(name);
    }
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(format!("{}{}", name, PoolConfig::SOCKET_FILE_SUFFIX))
}

/// Connect to a channel as a client.
pub async fn connect(channel: &ChannelName) -> io::Result<ClientConnection> {
    UnixStream::connect(channel_address(channel)).await
}

/// Orderly disconnect of a handled connection.
pub async fn disconnect(connection: &mut Connection) -> io::Result<()> {
    connection.shutdown().await
}

/// Longest socket path `bind(2)` accepts (`sun_path` minus the NUL).
#[cfg(any(target_os = "linux", target_os = "android"))]
const MAX_SOCKET_PATH: usize = 107;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const MAX_SOCKET_PATH: usize = 103;

const LOCK_FILE_SUFFIX: &str = ".lock";

struct FactoryState {
    listener: Option<Arc<UnixListener>>,
    owner_lock: Option<File>,
    closed: bool,
}

/// Creates endpoints for one channel.
///
/// The socket is bound by the first `create()` and shared by every endpoint
/// after that. `close()` unlinks it so no new client can reach the channel.
///
/// Ownership of the channel is an exclusive lock on `<socket>.lock`, held for
/// as long as the socket is bound. A factory that cannot take the lock gets
/// `ChannelInUse` without touching the socket, so a live pool never sees a
/// connection from a competing pool.
pub struct EndpointFactory {
    channel: ChannelName,
    options: PoolOptions,
    path: PathBuf,
    lock_path: PathBuf,
    bind_gate: tokio::sync::Mutex<()>,
    state: Mutex<FactoryState>,
}

impl EndpointFactory {
    pub fn new(channel: ChannelName, options: PoolOptions) -> Result<Self> {
        options.validate()?;
        let path = channel_address(&channel);
        if path.as_os_str().len() > MAX_SOCKET_PATH {
            return Err(PoolError::InvalidChannelName {
                name: channel.to_string(),
                reason: format!(
                    "socket path {} is longer than {} bytes",
                    path.display(),
                    MAX_SOCKET_PATH
                ),
            });
        }

        let mut lock_path = path.clone().into_os_string();
        lock_path.push(LOCK_FILE_SUFFIX);

        Ok(Self {
            channel,
            options,
            path,
            lock_path: PathBuf::from(lock_path),
            bind_gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(FactoryState {
                listener: None,
                owner_lock: None,
                closed: false,
            }),
        })
    }

    /// Filesystem path of the channel socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create one endpoint in the created state.
    pub async fn create(&self) -> Result<Endpoint> {
        if let Some(endpoint) = self.shared_endpoint()? {
            return Ok(endpoint);
        }

        // Slots of one pool bind one at a time; the rest reuse the listener.
        let _gate = self.bind_gate.lock().await;
        if let Some(endpoint) = self.shared_endpoint()? {
            return Ok(endpoint);
        }

        let owner_lock = self.acquire_ownership()?;
        self.clear_stale_socket().await?;
        let listener = Arc::new(self.bind()?);

        let mut state = self.lock_state();
        if state.closed {
            drop(state);
            self.remove_socket();
            return Err(self.closed_error());
        }
        state.listener = Some(Arc::clone(&listener));
        state.owner_lock = Some(owner_lock);

        Ok(Endpoint {
            listener,
            channel: self.channel.clone(),
        })
    }

    /// Stop creating endpoints and remove the socket file.
    ///
    /// Endpoints already waiting keep the listener open until they are
    /// dropped, but the path is gone so no new client can connect.
    pub fn close(&self) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        state.closed = true;

        if state.listener.take().is_some() {
            self.remove_socket();
        }
        // Released after the unlink so a successor binds a fresh path.
        drop(state.owner_lock.take());
    }

    fn lock_state(&self) -> MutexGuard<'_, FactoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn closed_error(&self) -> PoolError {
        PoolError::FactoryClosed {
            channel: self.channel.to_string(),
        }
    }

    fn shared_endpoint(&self) -> Result<Option<Endpoint>> {
        let state = self.lock_state();
        if state.closed {
            return Err(self.closed_error());
        }
        Ok(state.listener.as_ref().map(|listener| Endpoint {
            listener: Arc::clone(listener),
            channel: self.channel.clone(),
        }))
    }

    /// Take the channel's owner lock, or report the channel as served.
    fn acquire_ownership(&self) -> Result<File> {
        use std::os::unix::fs::OpenOptionsExt;

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(PoolConfig::OWNER_ONLY_MODE)
            .open(&self.lock_path)
            .map_err(|e| PoolError::endpoint(self.channel.as_str(), e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(file),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(PoolError::ChannelInUse {
                    channel: self.channel.to_string(),
                })
            }
            Err(e) => Err(PoolError::endpoint(self.channel.as_str(), e)),
        }
    }

    fn bind(&self) -> Result<UnixListener> {
        let listener = UnixListener::bind(&self.path)
            .map_err(|e| PoolError::endpoint(self.channel.as_str(), e))?;

        if let Some(mode) = self.socket_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(mode))
                .map_err(|e| PoolError::endpoint(self.channel.as_str(), e))?;
        }

        info!(
            channel = %self.channel,
            path = %self.path.display(),
            "Channel socket bound"
        );
        Ok(listener)
    }

    fn socket_mode(&self) -> Option<u32> {
        match &self.options.access_control {
            Some(AccessControl::Mode(mode)) => Some(*mode),
            // Rejected by `PoolOptions::validate` on Unix.
            Some(AccessControl::Sddl(_)) => None,
            None if self.options.restrict_to_current_user => Some(PoolConfig::OWNER_ONLY_MODE),
            None => None,
        }
    }

    /// Remove a socket file left behind by a dead server.
    ///
    /// Called with the owner lock held, so no pool is serving the path. Only
    /// a socket whose connect is refused is unlinked; anything else at the
    /// path is left alone and reported. A live server that does not use the
    /// owner lock sees one connection from this check.
    async fn clear_stale_socket(&self) -> Result<()> {
        let metadata = match std::fs::symlink_metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(PoolError::endpoint(self.channel.as_str(), e)),
        };

        if !metadata.file_type().is_socket() {
            return Err(PoolError::EndpointCreation {
                channel: self.channel.to_string(),
                message: format!("{} exists and is not a socket", self.path.display()),
                source: None,
            });
        }

        match UnixStream::connect(&self.path).await {
            Ok(_) => Err(PoolError::ChannelInUse {
                channel: self.channel.to_string(),
            }),
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                debug!(path = %self.path.display(), "Removing stale channel socket");
                match std::fs::remove_file(&self.path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(PoolError::endpoint(self.channel.as_str(), e)),
                }
            }
            Err(e) => Err(PoolError::endpoint(self.channel.as_str(), e)),
        }
    }

    fn remove_socket(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed channel socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove channel socket"
            ),
        }
    }
}

impl Drop for EndpointFactory {
    fn drop(&mut self) {
        self.close();
    }
}

/// One listening slot on the channel.
pub struct Endpoint {
    listener: Arc<UnixListener>,
    channel: ChannelName,
}

impl Endpoint {
    /// Wait for a peer and return the connected stream.
    pub async fn wait_for_connection(self) -> Result<Connection> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(|source| PoolError::Accept {
                channel: self.channel.to_string(),
                source,
            })?;
        Ok(stream)
    }
}
