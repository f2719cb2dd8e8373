//! Vortex Core - Foundation types and utilities
//!
//! This crate provides the error type, validated identifiers and resource
//! value objects shared by the cgroup crate and the CLI.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod resources;
pub mod types;

pub use error::{Error, Result};
pub use resources::{Quantity, ResourceLimits};
pub use types::{ProcessId, ServiceName, Subcgroup};
