//! Cgroup lockdown
//!
//! After the hierarchy is built, everything under `<root>/sys` goes
//! read-only except the knobs the supervisor needs to apply isolators to its
//! services. Each such file is bind-mounted onto itself first: a bind mount
//! keeps its own writability when its parent mount is remounted read-only.
//! The read-only remounts therefore always come last.

use std::path::Path;
use tracing::{debug, info};
use vortex_core::{Result, ServiceName, Subcgroup};

use crate::backend::MountBackend;
use crate::hierarchy::{cgroup_dir, sys_dir, CgroupMode};
use crate::inventory::{legacy_controller_dirs, HierarchyGroups};
use crate::manager::CgroupManager;

/// Per-controller files that stay writable on legacy hierarchies
static LEGACY_RW_FILES: [(&str, &[&str]); 3] = [
    ("memory", &["memory.limit_in_bytes"]),
    ("cpu", &["cpu.cfs_quota_us"]),
    ("devices", &["devices.allow", "devices.deny"]),
];

/// Core files that stay writable on the unified hierarchy
const UNIFIED_CORE_RW_FILES: [&str; 4] = [
    "cgroup.procs",
    "cgroup.controllers",
    "cgroup.subtree_control",
    "cgroup.events",
];

/// Memory knobs that stay writable on the unified hierarchy
const UNIFIED_MEMORY_RW_FILES: [&str; 4] = ["memory.low", "memory.high", "memory.max", "memory.swap.max"];

/// Knobs of a fresh cpuset cgroup that must be seeded from the parent
const CPUSET_KNOBS: [&str; 2] = ["cpuset.mems", "cpuset.cpus"];

/// Files to keep writable in a legacy controller mount such as `cpu,cpuacct`
///
/// `cgroup.procs` is always included so the supervisor can move processes.
#[must_use]
pub fn legacy_controller_rw_files(controller_dir: &str) -> Vec<&'static str> {
    let mut files: Vec<&'static str> = Vec::new();
    for part in controller_dir.split(',') {
        let Some((_, known)) = LEGACY_RW_FILES.iter().find(|(c, _)| *c == part) else {
            continue;
        };
        for file in *known {
            if !files.contains(file) {
                files.push(*file);
            }
        }
    }
    files.push("cgroup.procs");
    files
}

/// Files to keep writable in each service cgroup on the unified hierarchy
#[must_use]
pub fn unified_rw_files() -> Vec<&'static str> {
    UNIFIED_CORE_RW_FILES
        .iter()
        .chain(UNIFIED_MEMORY_RW_FILES.iter())
        .copied()
        .collect()
}

impl<B: MountBackend> CgroupManager<B> {
    /// Lock down the hierarchy built for `mode`
    pub fn lockdown(
        &self,
        root: &Path,
        mode: &CgroupMode,
        subcgroup: &Subcgroup,
        services: &[ServiceName],
    ) -> Result<()> {
        match mode {
            CgroupMode::Legacy(groups) => self.lockdown_legacy(root, groups, subcgroup, services),
            CgroupMode::Unified => self.lockdown_unified(root, subcgroup, services),
        }
    }

    /// Bind-mount a knob onto itself if the kernel provides it
    fn keep_writable(&self, file: &Path) -> Result<()> {
        if !self.backend.exists(file) {
            debug!(path = %file.display(), "Knob not present, skipping");
            return Ok(());
        }
        self.bind_self(file)
    }

    /// Seed `cpuset.mems`/`cpuset.cpus` of `<cpuset>/system.slice`
    ///
    /// A new cpuset cgroup starts with empty knobs and refuses tasks until
    /// they are set. Each value is written twice: older kernels can drop the
    /// first write to a fresh cpuset (fixed upstream in 24ee3cf89bef). This is
    /// best effort; failures are logged and never returned.
    fn fix_cpuset_knobs(&self, cpuset_path: &Path) {
        let slice = cpuset_path.join("system.slice");
        if let Err(e) = self.backend.create_dir_all(&slice, 0o755) {
            debug!(path = %slice.display(), error = %e, "cpuset workaround: cannot create slice");
        }

        for knob in CPUSET_KNOBS {
            let child = slice.join(knob);
            let Ok(current) = self.backend.read_to_string(&child) else {
                continue;
            };
            if !current.trim().is_empty() {
                continue;
            }
            let Ok(value) = self.backend.read_to_string(&cpuset_path.join(knob)) else {
                continue;
            };

            for attempt in 1..=2 {
                if let Err(e) = self.backend.write(&child, value.as_bytes()) {
                    debug!(path = %child.display(), attempt, error = %e, "cpuset workaround: write failed");
                }
            }
        }
    }

    /// Lock down a legacy hierarchy
    ///
    /// For every controller mount, creates
    /// `<controller>/<subcgroup>/system.slice/<service>` for each service,
    /// keeps that controller's knobs writable there, then remounts the
    /// controller read-only. `<root>/sys` is remounted read-only last.
    pub fn lockdown_legacy(
        &self,
        root: &Path,
        groups: &HierarchyGroups,
        subcgroup: &Subcgroup,
        services: &[ServiceName],
    ) -> Result<()> {
        info!(root = %root.display(), %subcgroup, services = services.len(), "Locking down legacy cgroups");

        let cgroup_tmpfs = cgroup_dir(root);

        for controller in legacy_controller_dirs(groups) {
            let controller_path = cgroup_tmpfs.join(&controller);
            let slice = controller_path.join(subcgroup).join("system.slice");

            if controller == "cpuset" {
                self.fix_cpuset_knobs(&controller_path);
            }

            let rw_files = legacy_controller_rw_files(&controller);
            for service in services {
                let service_cgroup = slice.join(service);
                self.make_dir(&service_cgroup, 0o755)?;
                for file in &rw_files {
                    self.keep_writable(&service_cgroup.join(file))?;
                }
            }

            self.mount_read_only(&controller_path)?;
        }

        self.mount_read_only(&sys_dir(root))?;

        info!(root = %root.display(), "Legacy cgroups locked down");
        Ok(())
    }

    /// Lock down a unified hierarchy
    ///
    /// The subcgroup's machine directory (the subcgroup without a trailing
    /// `system.slice`) is bind-mounted to stay writable, each service cgroup
    /// keeps the fixed knob list writable, then the cgroup mount and
    /// `<root>/sys` are remounted read-only.
    pub fn lockdown_unified(
        &self,
        root: &Path,
        subcgroup: &Subcgroup,
        services: &[ServiceName],
    ) -> Result<()> {
        info!(root = %root.display(), %subcgroup, services = services.len(), "Locking down unified cgroups");

        let cgroup_fs = cgroup_dir(root);
        let subcgroup_path = cgroup_fs.join(subcgroup);
        self.make_dir(&subcgroup_path, 0o700)?;

        let machine_dir = match subcgroup_path.parent() {
            Some(parent) if subcgroup_path.ends_with("system.slice") && parent != cgroup_fs => {
                parent.to_path_buf()
            }
            _ => subcgroup_path.clone(),
        };
        self.bind_self(&machine_dir)?;

        let rw_files = unified_rw_files();
        for service in services {
            let service_cgroup = subcgroup_path.join(service);
            self.make_dir(&service_cgroup, 0o755)?;
            for file in &rw_files {
                self.keep_writable(&service_cgroup.join(file))?;
            }
        }

        self.mount_read_only(&cgroup_fs)?;
        self.mount_read_only(&sys_dir(root))?;

        info!(root = %root.display(), "Unified cgroups locked down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockOp};
    use crate::config::HostPaths;
    use nix::errno::Errno;
    use std::path::PathBuf;

    const ROOT: &str = "/rootfs";

    fn groups() -> HierarchyGroups {
        let mut groups = HierarchyGroups::new();
        groups.insert(2, vec!["cpuset".to_string()]);
        groups.insert(3, vec!["cpu".to_string(), "cpuacct".to_string()]);
        groups.insert(5, vec!["memory".to_string()]);
        groups
    }

    fn legacy_backend() -> MockBackend {
        MockBackend::new()
            .with_cgroup_files(
                "memory",
                &[("cgroup.procs", ""), ("memory.limit_in_bytes", "max"), ("memory.usage_in_bytes", "0")],
            )
            .with_cgroup_files("cpu,cpuacct", &[("cgroup.procs", ""), ("cpu.cfs_quota_us", "-1")])
            .with_cgroup_files(
                "cpuset",
                &[("cgroup.procs", ""), ("cpuset.cpus", "0-3\n"), ("cpuset.mems", "0\n")],
            )
    }

    fn built_legacy(backend: MockBackend) -> CgroupManager<MockBackend> {
        let m = CgroupManager::with_backend(backend, HostPaths::default());
        m.build_legacy(Path::new(ROOT), &groups(), None).unwrap();
        m
    }

    fn subcgroup() -> Subcgroup {
        "machine-rkt-1.scope".parse().unwrap()
    }

    fn services() -> Vec<ServiceName> {
        vec!["app1.service".parse().unwrap(), "app2.service".parse().unwrap()]
    }

    fn index_of(ops: &[MockOp], pred: impl Fn(&MockOp) -> bool) -> usize {
        ops.iter().position(pred).unwrap()
    }

    #[test]
    fn test_legacy_binds_precede_read_only_remount() {
        let m = built_legacy(legacy_backend());
        let start = m.backend().ops().len();
        m.lockdown_legacy(Path::new(ROOT), &groups(), &subcgroup(), &services())
            .unwrap();

        let ops = m.backend().ops()[start..].to_vec();
        for controller in ["cpuset", "cpu,cpuacct", "memory"] {
            let controller_path = PathBuf::from(ROOT).join("sys/fs/cgroup").join(controller);
            let remount = index_of(&ops, |op| {
                op.is_read_only_remount() && op.path() == controller_path
            });
            let binds: Vec<usize> = ops
                .iter()
                .enumerate()
                .filter(|(_, op)| op.is_bind() && op.path().starts_with(&controller_path))
                .map(|(i, _)| i)
                .collect();

            assert!(!binds.is_empty(), "no binds for {controller}");
            assert!(binds.iter().all(|&b| b < remount), "{controller} bound after remount");
        }

        let last = ops.last().unwrap();
        assert!(last.is_read_only_remount());
        assert_eq!(last.path(), Path::new("/rootfs/sys"));
    }

    #[test]
    fn test_legacy_only_whitelisted_knobs_stay_writable() {
        let m = built_legacy(legacy_backend());
        m.lockdown_legacy(Path::new(ROOT), &groups(), &subcgroup(), &services())
            .unwrap();

        let b = m.backend();
        let app = "/rootfs/sys/fs/cgroup/memory/machine-rkt-1.scope/system.slice/app1.service";
        assert!(b.is_dir(app));
        assert!(b.is_writable(format!("{app}/memory.limit_in_bytes")));
        assert!(b.is_writable(format!("{app}/cgroup.procs")));
        assert!(!b.is_writable(format!("{app}/memory.usage_in_bytes")));
        assert!(!b.is_writable("/rootfs/sys/fs/cgroup/memory/memory.limit_in_bytes"));

        let cpu = "/rootfs/sys/fs/cgroup/cpu,cpuacct/machine-rkt-1.scope/system.slice/app2.service";
        assert!(b.is_writable(format!("{cpu}/cpu.cfs_quota_us")));
        assert!(!b.is_writable(format!("{cpu}/cgroup.clone_children")));

        assert!(!b.is_writable("/rootfs/sys/kernel"));
    }

    #[test]
    fn test_legacy_missing_knobs_are_skipped() {
        // default template: controllers expose only cgroup.procs
        let m = built_legacy(MockBackend::new());
        m.lockdown_legacy(Path::new(ROOT), &groups(), &subcgroup(), &services())
            .unwrap();

        let binds: Vec<MockOp> = m.backend().ops().into_iter().filter(MockOp::is_bind).collect();
        assert_eq!(binds.len(), groups().len() * services().len());
        assert!(binds.iter().all(|op| op.path().ends_with("cgroup.procs")));
    }

    #[test]
    fn test_legacy_lockdown_is_idempotent() {
        let m = built_legacy(legacy_backend());
        for _ in 0..2 {
            m.lockdown_legacy(Path::new(ROOT), &groups(), &subcgroup(), &services())
                .unwrap();
        }

        let app = "/rootfs/sys/fs/cgroup/memory/machine-rkt-1.scope/system.slice/app1.service";
        assert!(m.backend().is_writable(format!("{app}/memory.limit_in_bytes")));
        assert!(!m.backend().is_writable("/rootfs/sys/fs/cgroup/memory/other"));
    }

    #[test]
    fn test_cpuset_knobs_written_twice() {
        let m = built_legacy(legacy_backend());
        m.lockdown_legacy(Path::new(ROOT), &groups(), &subcgroup(), &services())
            .unwrap();

        let slice = Path::new("/rootfs/sys/fs/cgroup/cpuset/system.slice");
        let writes: Vec<MockOp> = m
            .backend()
            .ops()
            .into_iter()
            .filter(|op| matches!(op, MockOp::Write { .. }))
            .collect();

        let mems = writes.iter().filter(|op| op.path() == slice.join("cpuset.mems")).count();
        let cpus = writes.iter().filter(|op| op.path() == slice.join("cpuset.cpus")).count();
        assert_eq!((mems, cpus), (2, 2));
        assert_eq!(m.backend().file(slice.join("cpuset.cpus")).as_deref(), Some("0-3\n"));
    }

    #[test]
    fn test_cpuset_already_configured_is_left_alone() {
        let m = built_legacy(legacy_backend());
        let slice = Path::new("/rootfs/sys/fs/cgroup/cpuset/system.slice");
        m.backend().create_dir_all(slice, 0o755).unwrap();
        m.backend().write(&slice.join("cpuset.cpus"), b"1").unwrap();
        m.backend().write(&slice.join("cpuset.mems"), b"0").unwrap();
        let start = m.backend().ops().len();

        m.lockdown_legacy(Path::new(ROOT), &groups(), &subcgroup(), &services())
            .unwrap();

        let ops = m.backend().ops();
        assert!(ops[start..].iter().all(|op| !matches!(op, MockOp::Write { .. })));
        assert_eq!(m.backend().file(slice.join("cpuset.cpus")).as_deref(), Some("1"));
    }

    #[test]
    fn test_cpuset_failures_do_not_propagate() {
        let slice = "/rootfs/sys/fs/cgroup/cpuset/system.slice";
        let m = built_legacy(
            legacy_backend()
                .with_write_failure(format!("{slice}/cpuset.mems"))
                .with_write_failure(format!("{slice}/cpuset.cpus")),
        );

        assert!(m
            .lockdown_legacy(Path::new(ROOT), &groups(), &subcgroup(), &services())
            .is_ok());
        let attempts = m
            .backend()
            .ops()
            .iter()
            .filter(|op| matches!(op, MockOp::Write { .. }))
            .count();
        assert_eq!(attempts, 4);
    }

    #[test]
    fn test_legacy_remount_failure_is_returned() {
        let m = built_legacy(legacy_backend());
        // shares state with the built tree; only later mounts see the failure
        let failing = m.backend().clone().with_mount_failure("/rootfs/sys", Errno::EPERM);
        let err = CgroupManager::with_backend(failing, HostPaths::default())
            .lockdown_legacy(Path::new(ROOT), &groups(), &subcgroup(), &services())
            .unwrap_err();

        assert!(matches!(err, vortex_core::Error::Mount { operation: "remount read-only", .. }));
    }

    #[test]
    fn test_legacy_rw_files() {
        assert_eq!(
            legacy_controller_rw_files("memory"),
            vec!["memory.limit_in_bytes", "cgroup.procs"]
        );
        assert_eq!(
            legacy_controller_rw_files("cpu,cpuacct"),
            vec!["cpu.cfs_quota_us", "cgroup.procs"]
        );
        assert_eq!(
            legacy_controller_rw_files("devices"),
            vec!["devices.allow", "devices.deny", "cgroup.procs"]
        );
        assert_eq!(legacy_controller_rw_files("pids"), vec!["cgroup.procs"]);
    }

    #[test]
    fn test_unified_rw_files() {
        let files = unified_rw_files();
        assert_eq!(files.len(), 8);
        assert_eq!(files[0], "cgroup.procs");
        assert!(files.contains(&"memory.max"));
        assert!(files.contains(&"cgroup.subtree_control"));
    }

    #[test]
    fn test_unified_lockdown() {
        let backend = MockBackend::new().with_cgroup_files(
            "",
            &[("cgroup.procs", ""), ("cgroup.controllers", "cpu memory"), ("memory.max", "max"), ("memory.stat", "")],
        );
        let m = CgroupManager::with_backend(backend, HostPaths::default());
        let root = Path::new(ROOT);
        m.build_unified(root).unwrap();
        let start = m.backend().ops().len();

        let subcgroup: Subcgroup = "machine.slice/machine-rkt-1.scope/system.slice".parse().unwrap();
        m.lockdown_unified(root, &subcgroup, &services()).unwrap();

        let ops = m.backend().ops()[start..].to_vec();
        let machine = Path::new("/rootfs/sys/fs/cgroup/machine.slice/machine-rkt-1.scope");
        let first_bind = index_of(&ops, MockOp::is_bind);
        assert_eq!(ops[first_bind].path(), machine);

        let cgroup_remount = index_of(&ops, |op| {
            op.is_read_only_remount() && op.path() == Path::new("/rootfs/sys/fs/cgroup")
        });
        assert!(ops.iter().enumerate().filter(|(_, op)| op.is_bind()).all(|(i, _)| i < cgroup_remount));
        let last = ops.last().unwrap();
        assert!(last.is_read_only_remount());
        assert_eq!(last.path(), Path::new("/rootfs/sys"));

        let b = m.backend();
        let app = machine.join("system.slice/app1.service");
        assert!(b.is_writable(app.join("memory.max")));
        assert!(b.is_writable(app.join("cgroup.procs")));
        assert!(!b.is_writable("/rootfs/sys/fs/cgroup/memory.max"));
        assert!(!b.is_writable("/rootfs/sys/fs/cgroup/other.slice"));
    }

    #[test]
    fn test_unified_plain_subcgroup_binds_itself() {
        let m = CgroupManager::with_backend(MockBackend::new(), HostPaths::default());
        let root = Path::new(ROOT);
        m.build_unified(root).unwrap();

        let subcgroup: Subcgroup = "machine.slice/app".parse().unwrap();
        m.lockdown(root, &CgroupMode::Unified, &subcgroup, &[]).unwrap();

        let binds: Vec<MockOp> = m.backend().ops().into_iter().filter(MockOp::is_bind).collect();
        assert_eq!(binds.len(), 1);
        assert_eq!(binds[0].path(), Path::new("/rootfs/sys/fs/cgroup/machine.slice/app"));
    }
}
