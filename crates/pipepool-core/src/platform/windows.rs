//! Windows named pipe endpoints.
//!
//! Security descriptors are applied through raw `SECURITY_ATTRIBUTES`, which
//! is the only FFI boundary in the crate.
#![allow(unsafe_code)]

use crate::channel::ChannelName;
use crate::config::{AccessControl, PoolConfig, PoolOptions};
use crate::error::{PoolError, Result};
use std::ffi::c_void;
use std::io;
use tokio::net::windows::named_pipe::{
    ClientOptions, NamedPipeClient, NamedPipeServer, PipeMode, ServerOptions,
};
use tracing::{debug, trace};
use windows_sys::core::PWSTR;
use windows_sys::Win32::Foundation::{CloseHandle, LocalFree, ERROR_PIPE_BUSY, HANDLE};
use windows_sys::Win32::Security::Authorization::{
    ConvertSidToStringSidW, ConvertStringSecurityDescriptorToSecurityDescriptorW, SDDL_REVISION_1,
};
use windows_sys::Win32::Security::{
    GetTokenInformation, TokenUser, PSECURITY_DESCRIPTOR, SECURITY_ATTRIBUTES, TOKEN_QUERY,
    TOKEN_USER,
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

/// Server side of an accepted connection.
pub type Connection = NamedPipeServer;
/// Client side of a connection.
pub type ClientConnection = NamedPipeClient;


/// Full pipe path for a channel.
pub fn channel_address(channel: &ChannelName) -> String {
    format!(r"\\.\pipe\{}", channel)
}

/// Connect to a channel as a client.
///
/// Retries while every server instance is busy. Callers bound the wait with
/// a timeout.
pub async fn connect(channel: &ChannelName) -> io::Result<ClientConnection> {
    let path = channel_address(channel);
    loop {
        match ClientOptions::new().pipe_mode(PipeMode::Message).open(&path) {
            Ok(client) => return Ok(client),
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {
                trace!(path = %path, "All pipe instances busy, retrying");
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(PoolConfig::PIPE_BUSY_RETRY_DELAY).await;
    }
}

/// Orderly disconnect of a handled connection.
pub async fn disconnect(connection: &mut Connection) -> io::Result<()> {
    connection.disconnect()
}

/// Process token handle, closed on drop.
struct TokenHandle(HANDLE);

impl Drop for TokenHandle {
    fn drop(&mut self) {
        // SAFETY: the handle was opened by `OpenProcessToken` and is closed once.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// String form (`S-1-5-...`) of the user SID in the process token.
fn current_user_sid() -> io::Result<String> {
    let mut token: HANDLE = std::ptr::null_mut();
    // SAFETY: the pseudo handle from `GetCurrentProcess` needs no closing and
    // `token` is a valid out-pointer.
    if unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) } == 0 {
        return Err(io::Error::last_os_error());
    }
    let token = TokenHandle(token);

    let mut len = 0u32;
    // SAFETY: a null buffer with length 0 only queries the required size.
    unsafe {
        GetTokenInformation(token.0, TokenUser, std::ptr::null_mut(), 0, &mut len);
    }
    if len == 0 {
        return Err(io::Error::last_os_error());
    }

    // u64 storage keeps TOKEN_USER's pointer field aligned.
    let mut buffer = vec![0u64; (len as usize).div_ceil(8)];
    // SAFETY: `buffer` holds at least `len` writable bytes.
    let ok = unsafe {
        GetTokenInformation(
            token.0,
            TokenUser,
            buffer.as_mut_ptr() as *mut c_void,
            len,
            &mut len,
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: on success the buffer starts with a TOKEN_USER whose SID points
    // into the same buffer, which stays alive until the end of this function.
    let sid = unsafe { (*(buffer.as_ptr() as *const TOKEN_USER)).User.Sid };
    let mut wide: PWSTR = std::ptr::null_mut();
    // SAFETY: `sid` is valid (see above) and `wide` is a valid out-pointer.
    if unsafe { ConvertSidToStringSidW(sid, &mut wide) } == 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: the converter returns a NUL-terminated string allocated with
    // `LocalAlloc`; it is read up to the NUL and then freed once.
    let text = unsafe {
        let len = (0..).take_while(|&i| *wide.add(i) != 0).count();
        let text = String::from_utf16_lossy(std::slice::from_raw_parts(wide, len));
        LocalFree(wide as _);
        text
    };
    Ok(text)
}

/// Protected DACL granting full access to the current user's SID only.
fn current_user_sddl() -> io::Result<String> {
    Ok(format!("D:P(A;;GA;;;{})", current_user_sid()?))
}

/// Self-relative security descriptor allocated by the SDDL converter.
struct SecurityDescriptor(PSECURITY_DESCRIPTOR);

// SAFETY: the descriptor is never mutated after conversion and is only read
// by `CreateNamedPipeW`, which copies it into the new kernel object.
unsafe impl Send for SecurityDescriptor {}
// SAFETY: see `Send`; shared reads of an immutable descriptor are sound.
unsafe impl Sync for SecurityDescriptor {}

impl SecurityDescriptor {
    fn from_sddl(sddl: &str) -> io::Result<Self> {
        let wide: Vec<u16> = sddl.encode_utf16().chain(std::iter::once(0)).collect();
        let mut descriptor: PSECURITY_DESCRIPTOR = std::ptr::null_mut();

        // SAFETY: `wide` is NUL-terminated and outlives the call; `descriptor`
        // is a valid out-pointer. The size out-parameter is optional.
        let ok = unsafe {
            ConvertStringSecurityDescriptorToSecurityDescriptorW(
                wide.as_ptr(),
                SDDL_REVISION_1,
                &mut descriptor,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self(descriptor))
    }
}

impl Drop for SecurityDescriptor {
    fn drop(&mut self) {
        // SAFETY: the pointer came from the SDDL converter, which documents
        // `LocalFree` as its deallocator, and is freed exactly once.
        unsafe {
            LocalFree(self.0 as _);
        }
    }
}

/// Creates named pipe server instances for one channel.
pub struct EndpointFactory {
    channel: ChannelName,
    path: String,
    descriptor: Option<SecurityDescriptor>,
    closed: std::sync::atomic::AtomicBool,
}

impl EndpointFactory {
    pub fn new(channel: ChannelName, options: PoolOptions) -> Result<Self> {
        options.validate()?;

        let sddl = match &options.access_control {
            Some(AccessControl::Sddl(sddl)) => Some(sddl.clone()),
            // Rejected by `PoolOptions::validate` on Windows.
            Some(AccessControl::Mode(_)) => None,
            None if options.restrict_to_current_user => Some(
                current_user_sddl()
                    .map_err(|e| PoolError::endpoint(channel.as_str(), e))?,
            ),
            None => None,
        };
        let descriptor = sddl
            .as_deref()
            .map(SecurityDescriptor::from_sddl)
            .transpose()
            .map_err(|e| PoolError::InvalidOptions {
                message: format!("Invalid security descriptor: {}", e),
            })?;

        let path = channel_address(&channel);
        Ok(Self {
            channel,
            path,
            descriptor,
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Create one duplex, message-mode pipe instance.
    pub async fn create(&self) -> Result<Endpoint> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PoolError::FactoryClosed {
                channel: self.channel.to_string(),
            });
        }

        let mut options = ServerOptions::new();
        options
            .access_inbound(true)
            .access_outbound(true)
            .pipe_mode(PipeMode::Message)
            .reject_remote_clients(true);

        let server = match &self.descriptor {
            Some(descriptor) => {
                let mut attributes = SECURITY_ATTRIBUTES {
                    nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
                    lpSecurityDescriptor: descriptor.0,
                    bInheritHandle: 0,
                };
                // SAFETY: `attributes` points at a live SECURITY_ATTRIBUTES whose
                // descriptor is owned by `self` for the duration of the call.
                unsafe {
                    options.create_with_security_attributes_raw(
                        &self.path,
                        &mut attributes as *mut SECURITY_ATTRIBUTES as *mut c_void,
                    )
                }
            }
            None => options.create(&self.path),
        }
        .map_err(|e| PoolError::endpoint(self.channel.as_str(), e))?;

        debug!(path = %self.path, "Pipe instance created");
        Ok(Endpoint {
            server,
            channel: self.channel.clone(),
        })
    }

    /// Stop creating endpoints. Existing instances close as slots drop them.
    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

/// One listening pipe instance.
pub struct Endpoint {
    server: NamedPipeServer,
    channel: ChannelName,
}

impl Endpoint {
    /// Wait for a client to attach to this instance.
    pub async fn wait_for_connection(self) -> Result<Connection> {
        self.server
            .connect()
            .await
            .map_err(|source| PoolError::Accept {
                channel: self.channel.to_string(),
                source,
            })?;
        Ok(self.server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_path() {
        let channel = ChannelName::new("pipepool-test").unwrap();
        assert_eq!(channel_address(&channel), r"\\.\pipe\pipepool-test");
    }

    #[test]
    fn test_current_user_descriptor_names_user_sid() {
        let sddl = current_user_sddl().unwrap();
        assert!(sddl.starts_with("D:P(A;;GA;;;S-1-"), "{sddl}");
        assert!(!sddl.contains(";OW)"));
        assert!(SecurityDescriptor::from_sddl(&sddl).is_ok());
        assert!(SecurityDescriptor::from_sddl("not sddl").is_err());
    }

    #[tokio::test]
    async fn test_instances_coexist_and_accept() {
        let channel = ChannelName::new(format!("pipepool-unit-{}", std::process::id())).unwrap();
        let factory =
            EndpointFactory::new(channel.clone(), PoolOptions::current_user_only()).unwrap();

        let first = factory.create().await.unwrap();
        let _second = factory.create().await.unwrap();

        let accept = tokio::spawn(first.wait_for_connection());
        let _client = connect(&channel).await.unwrap();
        let mut server = accept.await.unwrap().unwrap();
        disconnect(&mut server).await.unwrap();
    }
}
