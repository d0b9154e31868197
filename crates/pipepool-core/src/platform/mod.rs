//! Platform layer: endpoint creation, accept and disconnect.
//!
//! All `#[cfg]` blocks for OS-specific transport behavior live here. The rest
//! of the crate only sees the types re-exported below.
//!
//! # Platform Behavior
//!
//! - **Windows**: each endpoint is a `NamedPipeServer` instance on
//!   `\\.\pipe\<channel>` in message mode. Any number of instances coexist.
//! - **Unix**: the channel is a Unix domain socket. One listener is bound
//!   lazily and shared; each endpoint is one pending accept on it.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::{
    channel_address, connect, disconnect, ClientConnection, Connection, Endpoint,
    EndpointFactory,
};
#[cfg(windows)]
pub use windows::{
    channel_address, connect, disconnect, ClientConnection, Connection, Endpoint,
    EndpointFactory,
};

/// Returns the transport used for channels on this platform.
pub fn transport_name() -> &'static str {
    #[cfg(windows)]
    {
        "named-pipe"
    }
    #[cfg(unix)]
    {
        "unix-socket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_name() {
        assert!(["named-pipe", "unix-socket"].contains(&transport_name()));
    }
}
