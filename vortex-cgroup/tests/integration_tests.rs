use std::path::Path;
use vortex_cgroup::*;
use vortex_core::ProcessId;

const PROC_CGROUPS: &str = "\
#subsys_name\thierarchy\tnum_cgroups\tenabled
cpuset\t2\t1\t1
cpu\t3\t64\t1
cpuacct\t3\t64\t1
memory\t5\t100\t1
devices\t6\t64\t1
pids\t11\t70\t1
";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("vortex_cgroup=debug")
        .with_test_writer()
        .try_init();
}

/// Host as seen by the supervisor: legacy hierarchy with the usual knobs
fn legacy_host() -> MockBackend {
    MockBackend::new()
        .with_file("/proc/cgroups", PROC_CGROUPS)
        .with_fs_type("/sys/fs/cgroup", nix::sys::statfs::TMPFS_MAGIC)
        .with_cgroup_files("cpuset", &[("cgroup.procs", ""), ("cpuset.cpus", "0-7"), ("cpuset.mems", "0")])
        .with_cgroup_files("cpu,cpuacct", &[("cgroup.procs", ""), ("cpu.cfs_quota_us", "-1"), ("cpu.shares", "1024")])
        .with_cgroup_files("memory", &[("cgroup.procs", ""), ("memory.limit_in_bytes", "max")])
        .with_cgroup_files("devices", &[("cgroup.procs", ""), ("devices.allow", ""), ("devices.deny", "")])
}

#[test]
fn test_legacy_setup_end_to_end() {
    init_tracing();

    let manager = CgroupManager::with_backend(legacy_host(), HostPaths::default());
    let root = Path::new("/var/lib/containers/abc/rootfs");
    let subcgroup: Subcgroup = "machine-abc.scope".parse().unwrap();
    let services: Vec<ServiceName> = vec!["web.service".parse().unwrap()];

    let mode = manager.detect_mode().unwrap();
    assert_eq!(mode.name(), "legacy");

    manager.build(root, &mode, None).unwrap();
    manager.lockdown(root, &mode, &subcgroup, &services).unwrap();

    let backend = manager.backend();
    let cgroup = root.join("sys/fs/cgroup");
    let web = |controller: &str| {
        cgroup
            .join(controller)
            .join("machine-abc.scope/system.slice/web.service")
    };

    // writable knobs, one per controller
    assert!(backend.is_writable(web("memory").join("memory.limit_in_bytes")));
    assert!(backend.is_writable(web("cpu,cpuacct").join("cpu.cfs_quota_us")));
    assert!(backend.is_writable(web("devices").join("devices.deny")));
    assert!(backend.is_writable(web("pids").join("cgroup.procs")));

    // everything else is read-only
    assert!(!backend.is_writable(web("cpu,cpuacct").join("cpu.shares")));
    assert!(!backend.is_writable(cgroup.join("memory/memory.limit_in_bytes")));
    assert!(!backend.is_writable(cgroup.join("evil")));
    assert!(!backend.is_writable(root.join("sys/kernel/uevent_helper")));

    // co-mounted controllers reachable through their symlinks
    assert_eq!(
        backend.symlink_target(cgroup.join("cpuacct")).as_deref(),
        Some(Path::new("cpu,cpuacct"))
    );

    // no bind mount was made once anything above it had gone read-only
    let ops = backend.ops();
    for (i, op) in ops.iter().enumerate().filter(|(_, op)| op.is_bind()) {
        assert!(
            !ops[..i]
                .iter()
                .any(|prev| prev.is_read_only_remount() && op.path().starts_with(prev.path()) && prev.path() != cgroup),
            "{} bound after its parent went read-only",
            op.path().display()
        );
    }
}

#[test]
fn test_unified_setup_end_to_end() {
    init_tracing();

    let backend = MockBackend::new()
        .with_fs_type("/sys/fs/cgroup", nix::sys::statfs::CGROUP2_SUPER_MAGIC)
        .with_cgroup_files(
            "",
            &[
                ("cgroup.procs", ""),
                ("cgroup.controllers", "cpu memory pids"),
                ("cgroup.subtree_control", ""),
                ("memory.max", "max"),
                ("memory.high", "max"),
                ("cpu.max", "max 100000"),
            ],
        );
    let manager = CgroupManager::with_backend(backend, HostPaths::default());
    let root = Path::new("/rootfs");
    let subcgroup: Subcgroup = "machine.slice/machine-abc.scope/system.slice".parse().unwrap();
    let services: Vec<ServiceName> = vec!["a.service".parse().unwrap(), "b.service".parse().unwrap()];

    let mode = manager.detect_mode().unwrap();
    assert_eq!(mode, CgroupMode::Unified);

    manager.build(root, &mode, Some("ignored")).unwrap();
    manager.lockdown(root, &mode, &subcgroup, &services).unwrap();

    let backend = manager.backend();
    let scope = root.join("sys/fs/cgroup/machine.slice/machine-abc.scope");
    assert!(backend.is_writable(scope.join("system.slice/b.service/memory.high")));
    assert!(backend.is_writable(scope.join("system.slice/a.service/cgroup.subtree_control")));
    assert!(!backend.is_writable(root.join("sys/fs/cgroup/machine.slice/other.scope")));
    assert!(!backend.is_writable(root.join("sys/fs/cgroup/cpu.max")));

    let last = backend.ops().pop().unwrap();
    assert!(last.is_read_only_remount());
    assert_eq!(last.path(), root.join("sys"));
}

#[test]
fn test_isolators_follow_kernel_support() {
    let backend = MockBackend::new().with_file("/proc/cgroups", "#h\nmemory 5 1 1\ncpu 3 1 0\n");
    let manager = CgroupManager::with_backend(backend, HostPaths::default());

    let mut limits = ResourceLimits::default();
    limits
        .set_cpu(Quantity::parse("250m").unwrap())
        .set_memory(Quantity::parse("512Mi").unwrap());

    // cpu is listed but disabled: skipped with a warning
    let opts = manager.isolator_options(&limits).unwrap();
    assert_eq!(opts, vec![UnitOption::service("MemoryLimit", "536870912")]);
    assert_eq!(serialize_unit_options(&opts), "[Service]\nMemoryLimit=536870912\n");
}

#[test]
fn test_path_and_join_against_fixture_tree() {
    let backend = MockBackend::new().with_file("/fixture/proc/self/cgroup", "0::/user.slice/session-1.scope\n");
    let paths = HostPaths::new()
        .with_proc_dir("/fixture/proc")
        .with_cgroup_dir("/fixture/cgroup");
    let manager = CgroupManager::with_backend(backend, paths);

    assert_eq!(manager.own_cgroup_path().unwrap(), "/user.slice/session-1.scope");

    let sub: Subcgroup = "machine.slice/probe".parse().unwrap();
    let dir = manager.join_subcgroup(&sub).unwrap();
    assert_eq!(
        manager.backend().file(dir.join("cgroup.procs")),
        Some(ProcessId::current().to_string())
    );
}

#[test]
fn test_host_inventory() {
    // Read-only queries against the real host; skipped where /proc is unusual
    let manager = CgroupManager::new();

    let mode = match manager.detect_mode() {
        Ok(mode) => mode,
        Err(e) => {
            println!("⚠️  Skipping test (no usable cgroup mount): {e}");
            return;
        }
    };

    match mode {
        CgroupMode::Unified => {
            if let Ok(path) = manager.own_cgroup_path() {
                assert!(path.starts_with('/'));
            }
        }
        CgroupMode::Legacy(groups) => {
            assert!(groups.values().all(|controllers| !controllers.is_empty()));
        }
    }
}
