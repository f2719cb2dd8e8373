//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vortex_cgroup::config::{DEFAULT_CGROUP_DIR, DEFAULT_PROC_DIR};
use vortex_cgroup::HostPaths;

#[derive(Parser)]
#[command(name = "vortex")]
#[command(about = "Cgroup hierarchy setup and lockdown for containers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// procfs mount point to read kernel metadata from
    #[arg(long, global = true, default_value = DEFAULT_PROC_DIR)]
    pub proc_dir: PathBuf,

    /// Host cgroup mount point
    #[arg(long, global = true, default_value = DEFAULT_CGROUP_DIR)]
    pub cgroup_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn host_paths(&self) -> HostPaths {
        HostPaths::new()
            .with_proc_dir(&self.proc_dir)
            .with_cgroup_dir(&self.cgroup_dir)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the controllers the kernel offers
    Controllers {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the cgroup path of a process
    Path {
        /// Process ID (default: current process)
        #[arg(short, long)]
        pid: Option<i32>,

        /// Legacy controller to look up (unified path if omitted)
        #[arg(short, long)]
        controller: Option<String>,
    },

    /// Translate resource limits into supervisor unit options
    Isolators {
        /// CPU limit, e.g. 500m or 2
        #[arg(long)]
        cpu: Option<String>,

        /// Memory limit, e.g. 512Mi or 1G
        #[arg(long)]
        memory: Option<String>,

        /// Print unit-file text instead of one option per line
        #[arg(long)]
        unit: bool,
    },

    /// Mount and lock down the cgroup tree of a container root
    Setup(SetupArgs),

    /// Show version information
    Version,
}

#[derive(Args)]
pub struct SetupArgs {
    /// Container root directory
    #[arg(long)]
    pub root: PathBuf,

    /// Subcgroup the container's services live in
    #[arg(long, default_value = "machine.slice")]
    pub subcgroup: String,

    /// Service whose knobs stay writable (repeatable)
    #[arg(long = "service")]
    pub services: Vec<String>,

    /// SELinux context for the legacy cgroup tmpfs
    #[arg(long)]
    pub mount_context: Option<String>,

    /// Build the hierarchy but leave it writable
    #[arg(long)]
    pub no_lockdown: bool,

    /// Command to run inside the prepared mount namespace
    #[arg(last = true)]
    pub command: Vec<String>,
}
