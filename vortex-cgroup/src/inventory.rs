//! Controller inventory
//!
//! Reads which cgroup controllers the running kernel offers: `/proc/cgroups`
//! for the legacy hierarchy (controllers grouped by hierarchy id) and
//! `cgroup.controllers` for the unified one.

use nix::sys::statfs::CGROUP2_SUPER_MAGIC;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;
use vortex_core::{Error, Result};

use crate::backend::MountBackend;
use crate::manager::CgroupManager;

/// Enabled legacy controllers keyed by kernel hierarchy id
///
/// Controllers sharing an id are co-mounted; within a group they keep the
/// order `/proc/cgroups` lists them in.
pub type HierarchyGroups = BTreeMap<u32, Vec<String>>;

/// Rows of `/proc/cgroups` that carry data (no header, comments or blanks)
fn data_rows(contents: &str) -> impl Iterator<Item = (usize, &str)> {
    contents
        .lines()
        .enumerate()
        .skip(1)
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse `/proc/cgroups`
///
/// Only rows whose `enabled` column is 1 are kept. `source` is used for
/// error messages.
///
/// # Errors
/// Returns [`Error::Parse`] for rows with missing or non-numeric columns and
/// for controllers listed more than once
pub fn parse_legacy_controllers(contents: &str, source: &Path) -> Result<HierarchyGroups> {
    let mut groups = HierarchyGroups::new();
    let mut seen = BTreeSet::new();

    for (line_no, line) in data_rows(contents) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, hierarchy, num_cgroups, enabled, ..] = fields[..] else {
            return Err(Error::parse(
                source,
                format!("line {line_no}: expected 4 columns, got {}", fields.len()),
            ));
        };

        let numeric = |field: &str, column: &str| {
            field.parse::<u32>().map_err(|_| {
                Error::parse(source, format!("line {line_no}: bad {column} {field:?}"))
            })
        };
        let hierarchy = numeric(hierarchy, "hierarchy id")?;
        numeric(num_cgroups, "cgroup count")?;
        let enabled = numeric(enabled, "enabled flag")?;

        if !seen.insert(name.to_string()) {
            return Err(Error::parse(
                source,
                format!("line {line_no}: controller {name:?} listed twice"),
            ));
        }

        if enabled == 1 {
            groups.entry(hierarchy).or_default().push(name.to_string());
        }
    }

    Ok(groups)
}

/// Parse a unified `cgroup.controllers` file (one space separated line)
#[must_use]
pub fn parse_unified_controllers(contents: &str) -> Vec<String> {
    contents
        .lines()
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Whether `/proc/cgroups` lists an enabled controller whose name starts
/// with `isolator`
#[must_use]
pub fn is_isolator_listed(contents: &str, isolator: &str) -> bool {
    data_rows(contents).any(|(_, line)| {
        let mut fields = line.split_whitespace();
        let name_matches = fields.next().is_some_and(|name| name.starts_with(isolator));
        name_matches && fields.nth(2) == Some("1")
    })
}

/// Mount directory names under `/sys/fs/cgroup`, one per hierarchy
///
/// Co-mounted controllers are joined with commas (`cpu,cpuacct`).
#[must_use]
pub fn legacy_controller_dirs(groups: &HierarchyGroups) -> Vec<String> {
    groups.values().map(|cs| cs.join(",")).collect()
}

/// Symlinks to create for co-mounted controllers: link name to target
///
/// Every member of a multi-controller group gets a link to the combined
/// directory (`cpu -> cpu,cpuacct`); single-controller groups need none.
#[must_use]
pub fn legacy_controller_symlinks(groups: &HierarchyGroups) -> BTreeMap<String, String> {
    groups
        .values()
        .filter(|cs| cs.len() > 1)
        .flat_map(|cs| {
            let target = cs.join(",");
            cs.iter().map(move |c| (c.clone(), target.clone()))
        })
        .collect()
}

impl<B: MountBackend> CgroupManager<B> {
    fn read_host_file(&self, path: &Path) -> Result<String> {
        self.backend
            .read_to_string(path)
            .map_err(|e| Error::io(path, e))
    }

    /// Enabled legacy controllers grouped by hierarchy
    pub fn enabled_legacy_controllers(&self) -> Result<HierarchyGroups> {
        let path = self.paths.proc_cgroups();
        let contents = self.read_host_file(&path)?;
        let groups = parse_legacy_controllers(&contents, &path)?;

        debug!(hierarchies = groups.len(), "Read legacy controller inventory");
        Ok(groups)
    }

    /// Controllers available in the unified hierarchy
    pub fn enabled_controllers(&self) -> Result<Vec<String>> {
        let path = self.paths.unified_controllers();
        let contents = self.read_host_file(&path)?;
        Ok(parse_unified_controllers(&contents))
    }

    /// Whether the kernel has an enabled controller for `isolator`
    pub fn is_isolator_supported(&self, isolator: &str) -> Result<bool> {
        let contents = self.read_host_file(&self.paths.proc_cgroups())?;
        Ok(is_isolator_listed(&contents, isolator))
    }

    /// Whether `<root>/sys/fs/cgroup` is a cgroup2 (unified) mount
    pub fn is_unified_hierarchy(&self, root: &Path) -> Result<bool> {
        self.is_cgroup2(&root.join("sys/fs/cgroup"))
    }

    pub(crate) fn is_cgroup2(&self, path: &Path) -> Result<bool> {
        let fs_type = self
            .backend
            .fs_type(path)
            .map_err(|errno| Error::io(path, errno.into()))?;
        Ok(fs_type == CGROUP2_SUPER_MAGIC)
    }

    /// Whether a legacy controller is mounted on the host, judged by its
    /// `cgroup.procs` being reachable
    pub fn is_legacy_controller_mounted(&self, controller: &str) -> bool {
        self.backend
            .exists(&self.paths.cgroup_dir.join(controller).join("cgroup.procs"))
    }
}
