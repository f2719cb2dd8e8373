//! Cgroup hierarchy construction
//!
//! Mounts `/sys` and the cgroup tree below a container root. The caller must
//! already be in its own mount namespace; nothing here unwinds partial
//! mounts, because discarding the namespace does that.

use nix::errno::Errno;
use nix::mount::MsFlags;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vortex_core::{Error, Result};

use crate::backend::MountBackend;
use crate::inventory::{legacy_controller_dirs, legacy_controller_symlinks, HierarchyGroups};
use crate::manager::CgroupManager;

/// Flags every mount in the tree carries
pub(crate) const SECURE_FLAGS: MsFlags = MsFlags::MS_NOSUID
    .union(MsFlags::MS_NOEXEC)
    .union(MsFlags::MS_NODEV);

/// Which cgroup API the host runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CgroupMode {
    /// Legacy (v1): one mount per hierarchy group
    Legacy(HierarchyGroups),
    /// Unified (v2): a single cgroup2 mount
    Unified,
}

impl CgroupMode {
    /// Short name for logs and CLI output
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Legacy(_) => "legacy",
            Self::Unified => "unified",
        }
    }
}

/// `<root>/sys`
pub(crate) fn sys_dir(root: &Path) -> PathBuf {
    root.join("sys")
}

/// `<root>/sys/fs/cgroup`
pub(crate) fn cgroup_dir(root: &Path) -> PathBuf {
    root.join("sys/fs/cgroup")
}

impl<B: MountBackend> CgroupManager<B> {
    /// Detect the host's cgroup mode from the configured cgroup mount point
    pub fn detect_mode(&self) -> Result<CgroupMode> {
        if self.is_cgroup2(&self.paths.cgroup_dir)? {
            Ok(CgroupMode::Unified)
        } else {
            Ok(CgroupMode::Legacy(self.enabled_legacy_controllers()?))
        }
    }

    pub(crate) fn make_dir(&self, path: &Path, mode: u32) -> Result<()> {
        self.backend
            .create_dir_all(path, mode)
            .map_err(|e| Error::mount("create directory", path, e))
    }

    /// Bind-mount `path` onto itself
    pub(crate) fn bind_self(&self, path: &Path) -> Result<()> {
        self.backend
            .mount(path, path, None, MsFlags::MS_BIND, None)
            .map_err(|e| Error::mount("bind mount", path, e))
    }

    /// Remount an existing mount point read-only
    pub(crate) fn mount_read_only(&self, mount_point: &Path) -> Result<()> {
        let flags = MsFlags::MS_BIND | MsFlags::MS_REMOUNT | SECURE_FLAGS | MsFlags::MS_RDONLY;
        self.backend
            .mount(mount_point, mount_point, None, flags, None)
            .map_err(|e| Error::mount("remount read-only", mount_point, e))?;

        debug!(path = %mount_point.display(), "Remounted read-only");
        Ok(())
    }

    /// Mount sysfs at `<root>/sys`, accepting one that is already there
    fn mount_sysfs(&self, root: &Path) -> Result<()> {
        let sys = sys_dir(root);
        self.make_dir(&sys, 0o700)?;

        match self
            .backend
            .mount(Path::new("sysfs"), &sys, Some("sysfs"), SECURE_FLAGS, None)
        {
            Ok(()) => {
                debug!(path = %sys.display(), "Mounted sysfs");
                Ok(())
            }
            // Mounting the host's own /sys: already there
            Err(Errno::EBUSY) => {
                debug!(path = %sys.display(), "sysfs already mounted");
                Ok(())
            }
            Err(e) => Err(Error::mount("mount", &sys, e)),
        }
    }

    /// Build the hierarchy for `mode`
    pub fn build(&self, root: &Path, mode: &CgroupMode, mount_context: Option<&str>) -> Result<()> {
        match mode {
            CgroupMode::Legacy(groups) => self.build_legacy(root, groups, mount_context),
            CgroupMode::Unified => self.build_unified(root),
        }
    }

    /// Mount the legacy controller hierarchies under `<root>/sys/fs/cgroup`
    ///
    /// Each hierarchy group gets a `cgroup` mount named after its
    /// comma-joined controllers, co-mounted controllers get symlinks, and the
    /// tmpfs holding it all ends up read-only. `mount_context` is an SELinux
    /// context for the tmpfs.
    pub fn build_legacy(
        &self,
        root: &Path,
        groups: &HierarchyGroups,
        mount_context: Option<&str>,
    ) -> Result<()> {
        info!(root = %root.display(), hierarchies = groups.len(), "Building legacy cgroup hierarchy");

        self.mount_sysfs(root)?;

        let cgroup_tmpfs = cgroup_dir(root);
        self.make_dir(&cgroup_tmpfs, 0o700)?;

        let options = match mount_context {
            Some(context) if !context.is_empty() => format!("mode=755,context=\"{context}\""),
            _ => "mode=755".to_string(),
        };
        self.backend
            .mount(
                Path::new("tmpfs"),
                &cgroup_tmpfs,
                Some("tmpfs"),
                SECURE_FLAGS | MsFlags::MS_STRICTATIME,
                Some(&options),
            )
            .map_err(|e| Error::mount("mount", &cgroup_tmpfs, e))?;

        for controller in legacy_controller_dirs(groups) {
            let controller_path = cgroup_tmpfs.join(&controller);
            self.make_dir(&controller_path, 0o700)?;
            self.backend
                .mount(
                    Path::new("cgroup"),
                    &controller_path,
                    Some("cgroup"),
                    SECURE_FLAGS,
                    Some(&controller),
                )
                .map_err(|e| Error::mount("mount", &controller_path, e))?;

            debug!(controller = %controller, "Mounted controller");
        }

        for (link, target) in legacy_controller_symlinks(groups) {
            let link_path = cgroup_tmpfs.join(&link);
            self.backend
                .symlink(Path::new(&target), &link_path)
                .map_err(|e| Error::mount("create symlink", &link_path, e))?;
        }

        self.make_dir(&cgroup_tmpfs.join("systemd"), 0o700)?;

        self.mount_read_only(&cgroup_tmpfs)?;

        info!(root = %root.display(), "Legacy cgroup hierarchy ready");
        Ok(())
    }

    /// Mount the unified hierarchy at `<root>/sys/fs/cgroup`
    pub fn build_unified(&self, root: &Path) -> Result<()> {
        info!(root = %root.display(), "Building unified cgroup hierarchy");

        self.mount_sysfs(root)?;

        let cgroup_fs = cgroup_dir(root);
        self.make_dir(&cgroup_fs, 0o700)?;
        self.backend
            .mount(
                Path::new("cgroup2"),
                &cgroup_fs,
                Some("cgroup2"),
                SECURE_FLAGS | MsFlags::MS_STRICTATIME,
                None,
            )
            .map_err(|e| Error::mount("mount", &cgroup_fs, e))?;

        self.make_dir(&cgroup_fs.join("machine.slice"), 0o700)?;

        info!(root = %root.display(), "Unified cgroup hierarchy ready");
        Ok(())
    }
}
