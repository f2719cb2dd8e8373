//! Host path configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vortex_core::ProcessId;

/// Default procfs mount point
pub const DEFAULT_PROC_DIR: &str = "/proc";

/// Default cgroup mount point on the host
pub const DEFAULT_CGROUP_DIR: &str = "/sys/fs/cgroup";

/// Where the host exposes kernel cgroup metadata
///
/// Inventory, path resolution and subcgroup joining read through these
/// paths; hierarchy construction and lockdown always work below an explicit
/// container root instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPaths {
    /// procfs mount point
    pub proc_dir: PathBuf,

    /// cgroup filesystem mount point
    pub cgroup_dir: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            proc_dir: PathBuf::from(DEFAULT_PROC_DIR),
            cgroup_dir: PathBuf::from(DEFAULT_CGROUP_DIR),
        }
    }
}

impl HostPaths {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different procfs mount point
    #[must_use]
    pub fn with_proc_dir(mut self, proc_dir: impl Into<PathBuf>) -> Self {
        self.proc_dir = proc_dir.into();
        self
    }

    /// Use a different cgroup mount point
    #[must_use]
    pub fn with_cgroup_dir(mut self, cgroup_dir: impl Into<PathBuf>) -> Self {
        self.cgroup_dir = cgroup_dir.into();
        self
    }

    /// `/proc/cgroups`
    #[must_use]
    pub fn proc_cgroups(&self) -> PathBuf {
        self.proc_dir.join("cgroups")
    }

    /// `/proc/<pid>/cgroup`, or `/proc/self/cgroup` when `pid` is `None`
    #[must_use]
    pub fn proc_cgroup(&self, pid: Option<ProcessId>) -> PathBuf {
        match pid {
            Some(pid) => self.proc_dir.join(pid.to_string()).join("cgroup"),
            None => self.proc_dir.join("self").join("cgroup"),
        }
    }

    /// `cgroup.controllers` at the root of the unified hierarchy
    #[must_use]
    pub fn unified_controllers(&self) -> PathBuf {
        self.cgroup_dir.join("cgroup.controllers")
    }

    /// The cgroup mount point
    #[must_use]
    pub fn cgroup_dir(&self) -> &Path {
        &self.cgroup_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let paths = HostPaths::default();
        assert_eq!(paths.proc_cgroups(), Path::new("/proc/cgroups"));
        assert_eq!(paths.proc_cgroup(None), Path::new("/proc/self/cgroup"));
        assert_eq!(
            paths.proc_cgroup(Some(ProcessId::from_raw(42))),
            Path::new("/proc/42/cgroup")
        );
        assert_eq!(
            paths.unified_controllers(),
            Path::new("/sys/fs/cgroup/cgroup.controllers")
        );
    }

    #[test]
    fn test_builder_and_serde() {
        let paths = HostPaths::new()
            .with_proc_dir("/fixtures/proc")
            .with_cgroup_dir("/fixtures/cgroup");
        assert_eq!(paths.proc_cgroups(), Path::new("/fixtures/proc/cgroups"));

        let json = serde_json::to_string(&paths).unwrap();
        let back: HostPaths = serde_json::from_str(&json).unwrap();
        assert_eq!(paths, back);
    }
}
