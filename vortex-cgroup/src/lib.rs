//! Cgroup hierarchy construction and lockdown with pluggable backends
//!
//! This crate discovers the host's cgroup controllers, mounts a legacy (v1)
//! or unified (v2) cgroup tree below a container root, locks it down to
//! read-only except for the knobs a process supervisor needs, and
//! translates resource limits into supervisor unit options. All host access
//! goes through [`MountBackend`] so every sequence can run against
//! [`MockBackend`].

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backend;
pub mod config;
pub mod hierarchy;
pub mod inventory;
pub mod isolator;
pub mod join;
pub mod lockdown;
pub mod manager;
pub mod namespace;
pub mod path;

pub use backend::{HostBackend, MockBackend, MockOp, MountBackend};
pub use config::HostPaths;
pub use hierarchy::CgroupMode;
pub use inventory::HierarchyGroups;
pub use isolator::{serialize_unit_options, Isolator, IsolatorKind, UnitOption};
pub use manager::CgroupManager;
pub use namespace::unshare_mount_namespace;

// Re-export commonly used types
pub use vortex_core::{Error, Quantity, ResourceLimits, Result, ServiceName, Subcgroup};
