//! Inspect the host's cgroup setup (read-only, no root required)

use vortex_cgroup::{CgroupManager, CgroupMode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let manager = CgroupManager::new();

    let mode = manager.detect_mode()?;
    println!("📦 Cgroup mode: {}", mode.name());

    match &mode {
        CgroupMode::Unified => {
            println!("   Controllers: {}", manager.enabled_controllers()?.join(" "));
            println!("   Own cgroup:  {}", manager.own_cgroup_path()?);
        }
        CgroupMode::Legacy(groups) => {
            for (id, controllers) in groups {
                println!("   [{id}] {}", controllers.join(","));
            }
            println!("   Own memory cgroup: {}", manager.own_legacy_cgroup_path("memory")?);
        }
    }

    for isolator in ["cpu", "memory"] {
        println!("   {isolator} isolator supported: {}", manager.is_isolator_supported(isolator)?);
    }

    Ok(())
}
