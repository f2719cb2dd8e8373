//! Cgroup manager
//!
//! [`CgroupManager`] ties a [`MountBackend`] to a [`HostPaths`]
//! configuration. Each component lives in its own module as an `impl` block:
//! - [`inventory`](crate::inventory) - which controllers the kernel offers
//! - [`isolator`](crate::isolator) - resource limits to supervisor options
//! - [`hierarchy`](crate::hierarchy) - mounting the cgroup tree
//! - [`lockdown`](crate::lockdown) - making the tree read-only
//! - [`path`](crate::path) - where a process sits in the tree
//! - [`join`](crate::join) - moving ourselves into a subcgroup

use crate::backend::{HostBackend, MountBackend};
use crate::config::HostPaths;

/// Entry point for all cgroup operations
#[derive(Debug, Clone)]
pub struct CgroupManager<B: MountBackend = HostBackend> {
    pub(crate) backend: B,
    pub(crate) paths: HostPaths,
}

impl CgroupManager<HostBackend> {
    /// Manager for the real host with default paths
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(HostBackend, HostPaths::default())
    }

    /// Manager for the real host with custom paths
    #[must_use]
    pub fn with_paths(paths: HostPaths) -> Self {
        Self::with_backend(HostBackend, paths)
    }
}

impl Default for CgroupManager<HostBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: MountBackend> CgroupManager<B> {
    /// Manager over an arbitrary backend
    #[must_use]
    pub const fn with_backend(backend: B, paths: HostPaths) -> Self {
        Self { backend, paths }
    }

    /// The backend in use
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The host path configuration
    #[must_use]
    pub const fn paths(&self) -> &HostPaths {
        &self.paths
    }
}
