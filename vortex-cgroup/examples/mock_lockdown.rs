//! Build and lock down a legacy cgroup tree against the mock backend

use std::path::Path;
use vortex_cgroup::{CgroupManager, HostPaths, MockBackend, MockOp};
use vortex_core::{ServiceName, Subcgroup};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("🧪 Locking down a cgroup tree with MockBackend (no mounts required)\n");

    let backend = MockBackend::new()
        .with_file("/proc/cgroups", "#subsys_name\thierarchy\tnum_cgroups\tenabled\ncpu\t3\t1\t1\ncpuacct\t3\t1\t1\nmemory\t5\t1\t1\n")
        .with_cgroup_files("memory", &[("cgroup.procs", ""), ("memory.limit_in_bytes", "max")])
        .with_cgroup_files("cpu,cpuacct", &[("cgroup.procs", ""), ("cpu.cfs_quota_us", "-1")]);
    let manager = CgroupManager::with_backend(backend, HostPaths::default());

    let root = Path::new("/demo/rootfs");
    let subcgroup: Subcgroup = "machine-demo.scope".parse()?;
    let services: Vec<ServiceName> = vec!["app.service".parse()?];

    let groups = manager.enabled_legacy_controllers()?;
    manager.build_legacy(root, &groups, None)?;
    manager.lockdown_legacy(root, &groups, &subcgroup, &services)?;

    println!("📋 Mount sequence:");
    for op in manager.backend().ops() {
        if let MockOp::Mount { target, fstype, flags, .. } = &op {
            let kind = if op.is_bind() {
                "bind".to_string()
            } else if op.is_read_only_remount() {
                "ro-remount".to_string()
            } else {
                fstype.clone().unwrap_or_default()
            };
            println!("   {kind:<11} {} ({flags:?})", target.display());
        }
    }

    let knob = root.join("sys/fs/cgroup/memory/machine-demo.scope/system.slice/app.service/memory.limit_in_bytes");
    println!("\n🔍 {} writable? {}", knob.display(), manager.backend().is_writable(&knob));

    Ok(())
}
