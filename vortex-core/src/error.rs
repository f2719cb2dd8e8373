//! Error types for Vortex

use std::path::PathBuf;
use thiserror::Error;

/// Vortex error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Reading or inspecting a kernel-exposed file failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File or directory that was accessed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// A `/proc` or `/sys` file had unexpected contents
    #[error("Failed to parse {}: {message}", .path.display())]
    Parse {
        /// File that was parsed
        path: PathBuf,
        /// What was wrong with it
        message: String,
    },

    /// A mount, remount, mkdir or symlink step failed
    #[error("Failed to {operation} {}: {source}", .path.display())]
    Mount {
        /// Step that failed, e.g. "mount" or "remount read-only"
        operation: &'static str,
        /// Path the step was applied to
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The requested controller is not part of the process' cgroup membership
    #[error("Controller {controller:?} not found in {}", .path.display())]
    NotFound {
        /// Controller that was looked up
        controller: String,
        /// File that was scanned
        path: PathBuf,
    },

    /// A resource limit cannot be represented
    #[error("{kind} limit out of range: {quantity}")]
    LimitOutOfRange {
        /// Isolator kind the limit was meant for
        kind: &'static str,
        /// The offending quantity
        quantity: String,
    },

    /// A quantity string could not be parsed
    #[error("Invalid quantity {input:?}: {reason}")]
    InvalidQuantity {
        /// Text that was parsed
        input: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Moving the calling process into a subcgroup failed
    #[error("Failed to join subcgroup at {}: {source}", .path.display())]
    Join {
        /// Subcgroup directory or `cgroup.procs` file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

impl Error {
    /// Build an [`Error::Io`] for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build an [`Error::Mount`] for `path`
    pub fn mount(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: impl Into<std::io::Error>,
    ) -> Self {
        Self::Mount {
            operation,
            path: path.into(),
            source: source.into(),
        }
    }

    /// Build an [`Error::Parse`] for `path`
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for Vortex operations
pub type Result<T> = std::result::Result<T, Error>;
