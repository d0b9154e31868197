//! Centralized configuration for the acceptor pool.
//!
//! `PoolConfig` holds fixed constants. `PoolOptions` is the per-pool value
//! object passed through unmodified to every endpoint the factory creates.

use crate::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Pool-wide constants.
pub struct PoolConfig;

impl PoolConfig {
    /// Number of listener loops (and listening endpoints) per pool.
    pub const POOL_SIZE: usize = 4;

    // Client side
    pub const CLIENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const PIPE_BUSY_RETRY_DELAY: Duration = Duration::from_millis(50);

    // Unix socket placement
    pub const SOCKET_FILE_SUFFIX: &'static str = ".sock";
    pub const OWNER_ONLY_MODE: u32 = 0o600;

    /// Delay used by `SlotFailurePolicy::restart()`.
    pub const SLOT_RESTART_DELAY: Duration = Duration::from_secs(1);
}

/// Platform access-control descriptor applied to each endpoint.
///
/// Opaque to the pool: it is validated for the current platform and then
/// handed to the endpoint factory untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AccessControl {
    /// Windows security descriptor in SDDL form, e.g. `D:P(A;;GA;;;SY)`.
    Sddl(String),
    /// Unix permission bits for the socket file, e.g. `0o660`.
    Mode(u32),
}

/// Accept options shared by every endpoint in a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Only allow the current user to connect.
    pub restrict_to_current_user: bool,
    /// Explicit descriptor, used instead of `restrict_to_current_user`.
    pub access_control: Option<AccessControl>,
}

impl PoolOptions {
    /// Options restricting the channel to the current user.
    pub fn current_user_only() -> Self {
        Self {
            restrict_to_current_user: true,
            access_control: None,
        }
    }

    /// Options applying an explicit access-control descriptor.
    pub fn with_access_control(access_control: AccessControl) -> Self {
        Self {
            restrict_to_current_user: false,
            access_control: Some(access_control),
        }
    }

    /// Load options from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PoolError::io_with_path(e, path))?;
        let options: PoolOptions = serde_json::from_str(&content)?;
        options.validate()?;
        Ok(options)
    }

    /// Check option consistency for the current platform.
    pub fn validate(&self) -> Result<()> {
        let Some(access_control) = &self.access_control else {
            return Ok(());
        };

        if self.restrict_to_current_user {
            return Err(PoolError::InvalidOptions {
                message: "restrict_to_current_user and access_control are mutually exclusive"
                    .to_string(),
            });
        }

        match access_control {
            AccessControl::Sddl(sddl) => {
                if !cfg!(windows) {
                    return Err(PoolError::InvalidOptions {
                        message: "SDDL access control is only supported on Windows".to_string(),
                    });
                }
                if sddl.trim().is_empty() {
                    return Err(PoolError::InvalidOptions {
                        message: "SDDL descriptor must not be empty".to_string(),
                    });
                }
            }
            AccessControl::Mode(mode) => {
                if !cfg!(unix) {
                    return Err(PoolError::InvalidOptions {
                        message: "Mode access control is only supported on Unix".to_string(),
                    });
                }
                if *mode > 0o777 {
                    return Err(PoolError::InvalidOptions {
                        message: format!("Mode {:#o} has bits outside 0o777", mode),
                    });
                }
            }
        }

        Ok(())
    }
}

/// What a listener loop does after an unexpected endpoint or accept error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotFailurePolicy {
    /// The slot ends for the rest of the pool's life. Capacity drops by one.
    #[default]
    Retire,
    /// The slot waits `delay` (cancellable) and re-enters its loop.
    Restart { delay: Duration },
}

impl SlotFailurePolicy {
    /// Restart policy with the default delay.
    pub fn restart() -> Self {
        SlotFailurePolicy::Restart {
            delay: PoolConfig::SLOT_RESTART_DELAY,
        }
    }
}
