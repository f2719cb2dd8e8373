//! Isolators command implementation

use anyhow::{Context, Result};
use vortex_cgroup::{serialize_unit_options, CgroupManager, HostPaths};
use vortex_core::{Quantity, ResourceLimits};

pub fn execute(paths: HostPaths, cpu: Option<&str>, memory: Option<&str>, unit: bool) -> Result<()> {
    let mut limits = ResourceLimits::new();
    if let Some(cpu) = cpu {
        limits.set_cpu(Quantity::parse(cpu).context("Invalid CPU limit")?);
    }
    if let Some(memory) = memory {
        limits.set_memory(Quantity::parse(memory).context("Invalid memory limit")?);
    }

    if limits.is_empty() {
        anyhow::bail!("No limits given. Try: vortex isolators --cpu 500m --memory 512Mi");
    }

    let manager = CgroupManager::with_paths(paths);
    let opts = manager
        .isolator_options(&limits)
        .context("Failed to translate isolators")?;

    if unit {
        print!("{}", serialize_unit_options(&opts));
    } else {
        for opt in &opts {
            println!("{opt}");
        }
    }

    Ok(())
}
