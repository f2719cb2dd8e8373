//! Controllers command implementation

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use vortex_cgroup::inventory::legacy_controller_symlinks;
use vortex_cgroup::{CgroupManager, CgroupMode, HostPaths};

/// What `controllers --json` prints
#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
enum Inventory {
    Legacy {
        hierarchies: BTreeMap<u32, Vec<String>>,
        symlinks: BTreeMap<String, String>,
    },
    Unified {
        controllers: Vec<String>,
    },
}

pub fn execute(paths: HostPaths, json: bool) -> Result<()> {
    let manager = CgroupManager::with_paths(paths);

    let mode = manager
        .detect_mode()
        .context("Failed to detect cgroup mode")?;

    let inventory = match mode {
        CgroupMode::Legacy(groups) => Inventory::Legacy {
            symlinks: legacy_controller_symlinks(&groups),
            hierarchies: groups,
        },
        CgroupMode::Unified => Inventory::Unified {
            controllers: manager
                .enabled_controllers()
                .context("Failed to read unified controllers")?,
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&inventory)?);
        return Ok(());
    }

    match &inventory {
        Inventory::Legacy {
            hierarchies,
            symlinks,
        } => {
            println!("\n📦 Legacy cgroup hierarchy");
            println!("{:-<60}", "");
            for (id, controllers) in hierarchies {
                println!("  [{id:>2}] {}", controllers.join(","));
            }
            if !symlinks.is_empty() {
                println!("\n🔗 Symlinks:");
                for (link, target) in symlinks {
                    println!("  {link} -> {target}");
                }
            }
        }
        Inventory::Unified { controllers } => {
            println!("\n📦 Unified cgroup hierarchy");
            println!("{:-<60}", "");
            println!("  {}", controllers.join(" "));
        }
    }

    Ok(())
}
