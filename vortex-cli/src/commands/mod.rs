use crate::cli::Commands;
use anyhow::Result;
use vortex_cgroup::HostPaths;

pub mod controllers;
pub mod isolators;
pub mod path;
pub mod setup;

/// Dispatch command to appropriate handler
pub fn dispatch(command: Commands, paths: HostPaths) -> Result<()> {
    match command {
        Commands::Controllers { json } => controllers::execute(paths, json),

        Commands::Path { pid, controller } => path::execute(paths, pid, controller.as_deref()),

        Commands::Isolators { cpu, memory, unit } => {
            isolators::execute(paths, cpu.as_deref(), memory.as_deref(), unit)
        }

        Commands::Setup(args) => setup::execute(paths, args),

        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn print_version() {
    println!("🦀 Vortex cgroup tools");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Edition: Rust 2024");
    println!();
    println!("Features:");
    println!("  • Legacy (v1) and unified (v2) hierarchies");
    println!("  • Read-only lockdown with writable isolator knobs");
    println!("  • CPU and memory isolator translation");
}
