//! Setup command implementation

use anyhow::{Context, Result};
use std::process::Command;
use tracing::{info, warn};
use vortex_cgroup::{unshare_mount_namespace, CgroupManager, HostPaths};
use vortex_core::{ServiceName, Subcgroup};

use crate::cli::SetupArgs;

pub fn execute(paths: HostPaths, args: SetupArgs) -> Result<()> {
    // Validate we're running as root
    if !nix::unistd::geteuid().is_root() {
        anyhow::bail!("Must run as root. Try: sudo vortex setup --root ...");
    }

    let subcgroup: Subcgroup = args.subcgroup.parse().context("Invalid subcgroup")?;
    let services = args
        .services
        .iter()
        .map(|s| s.parse::<ServiceName>())
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid service name")?;

    if !args.root.is_dir() {
        anyhow::bail!("Root {} is not a directory", args.root.display());
    }

    let manager = CgroupManager::with_paths(paths);
    let mode = manager
        .detect_mode()
        .context("Failed to detect cgroup mode")?;
    info!(mode = mode.name(), root = %args.root.display(), "🔧 Preparing cgroups");

    unshare_mount_namespace().context("Failed to enter a private mount namespace")?;

    manager
        .build(&args.root, &mode, args.mount_context.as_deref())
        .context("Failed to build cgroup hierarchy")?;

    if args.no_lockdown {
        warn!("⚠️  Lockdown skipped, cgroup tree stays writable");
    } else {
        manager
            .lockdown(&args.root, &mode, &subcgroup, &services)
            .context("Failed to lock down cgroup hierarchy")?;
        info!(services = services.len(), "🔒 Cgroup tree locked down");
    }

    let Some((program, program_args)) = args.command.split_first() else {
        return Ok(());
    };

    info!(command = %program, "🚀 Running command in prepared namespace");
    let status = Command::new(program)
        .args(program_args)
        .status()
        .with_context(|| format!("Failed to run {program}"))?;

    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
