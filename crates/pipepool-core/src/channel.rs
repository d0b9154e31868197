//! Channel names: the rendezvous identifier shared by every endpoint.

use crate::error::{PoolError, Result};
use std::fmt;
use std::sync::Arc;

/// Longest name Windows accepts after the `\\.\pipe\` prefix.
const MAX_NAME_LEN: usize = 256;

/// Immutable, validated channel name. Cheap to clone across slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(Arc<str>);

impl ChannelName {
    /// Validate and wrap a channel name.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        let invalid = |reason: &str| PoolError::InvalidChannelName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("must not be empty"));
        }
        if name.contains('\0') {
            return Err(invalid("must not contain NUL"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(invalid("longer than 256 bytes"));
        }
        #[cfg(windows)]
        {
            if name.contains('\\') {
                return Err(invalid("must not contain a backslash"));
            }
        }

        Ok(Self(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ChannelName {
    type Error = PoolError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for ChannelName {
    type Error = PoolError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_name() {
        let name = ChannelName::new("pipepool-demo").unwrap();
        assert_eq!(name.as_str(), "pipepool-demo");
        assert_eq!(name.to_string(), "pipepool-demo");
    }

    #[test]
    fn test_rejects_empty_and_blank() {
        assert!(ChannelName::new("").is_err());
        assert!(ChannelName::new("   ").is_err());
    }

    #[test]
    fn test_rejects_nul_and_overlong() {
        assert!(ChannelName::new("a\0b").is_err());
        assert!(ChannelName::new("x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_clones_share_storage() {
        let a = ChannelName::try_from("shared").unwrap();
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }
}
