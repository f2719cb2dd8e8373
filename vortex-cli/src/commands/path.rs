//! Path command implementation

use anyhow::{Context, Result};
use vortex_cgroup::{CgroupManager, HostPaths};
use vortex_core::ProcessId;

pub fn execute(paths: HostPaths, pid: Option<i32>, controller: Option<&str>) -> Result<()> {
    let manager = CgroupManager::with_paths(paths);
    let pid = pid.map(ProcessId::from_raw);

    let path = match (pid, controller) {
        (None, None) => manager.own_cgroup_path(),
        (Some(pid), None) => manager.cgroup_path_by_pid(pid),
        (None, Some(controller)) => manager.own_legacy_cgroup_path(controller),
        (Some(pid), Some(controller)) => manager.legacy_cgroup_path_by_pid(pid, controller),
    }
    .context("Failed to resolve cgroup path")?;

    println!("{path}");
    Ok(())
}
