//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::{Error, Result};

/// Supervisor service name, used as a per-service cgroup directory name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(String);

impl ServiceName {
    /// Maximum length for service names (one path component)
    pub const MAX_LENGTH: usize = 255;

    /// Create a new `ServiceName` with validation
    ///
    /// # Errors
    /// Returns error if the name is empty, too long, `.`/`..`, or contains
    /// characters outside `[A-Za-z0-9._@-]`
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Service name cannot be empty".to_string(),
            });
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(Error::InvalidConfig {
                message: format!("Service name too long (max {} chars)", Self::MAX_LENGTH),
            });
        }

        if name == "." || name == ".." {
            return Err(Error::InvalidConfig {
                message: format!("Service name cannot be {name:?}"),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        {
            return Err(Error::InvalidConfig {
                message: format!(
                    "Service name {name:?} can only contain alphanumeric, dash, underscore, dot and @"
                ),
            });
        }

        Ok(())
    }

    /// Get the service name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ServiceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ServiceName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ServiceName> for String {
    fn from(name: ServiceName) -> Self {
        name.0
    }
}

impl AsRef<Path> for ServiceName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Relative cgroup path, e.g. `machine.slice/machine-app.scope/system.slice`
///
/// Leading and trailing slashes are dropped so the path can always be joined
/// below a mount point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct Subcgroup(String);

impl Subcgroup {
    /// Create a new `Subcgroup` with validation
    ///
    /// # Errors
    /// Returns error if the path is empty or has `.`, `..` or empty components
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let trimmed = path.trim_matches('/');

        if trimmed.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Subcgroup path cannot be empty".to_string(),
            });
        }

        if trimmed.contains('\0') {
            return Err(Error::InvalidConfig {
                message: "Subcgroup path cannot contain NUL".to_string(),
            });
        }

        if trimmed
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..")
        {
            return Err(Error::InvalidConfig {
                message: format!("Subcgroup path {path:?} has an empty, . or .. component"),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Get the subcgroup path as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subcgroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Subcgroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Subcgroup {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Subcgroup> for String {
    fn from(path: Subcgroup) -> Self {
        path.0
    }
}

impl AsRef<Path> for Subcgroup {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID
    #[must_use]
    pub fn current() -> Self {
        Self::from(nix::unistd::getpid())
    }

    /// Convert to `nix::unistd::Pid`
    #[must_use]
    pub const fn as_nix_pid(self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0)
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl From<ProcessId> for nix::unistd::Pid {
    fn from(pid: ProcessId) -> Self {
        Self::from_raw(pid.0)
    }
}
