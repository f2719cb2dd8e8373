//! Subcgroup joining

use std::path::{Path, PathBuf};
use tracing::info;
use vortex_core::{Error, ProcessId, Result, Subcgroup};

use crate::backend::MountBackend;
use crate::manager::CgroupManager;

impl<B: MountBackend> CgroupManager<B> {
    /// Move the calling process into `subcgroup` of the unified hierarchy
    ///
    /// The subcgroup is created (mode 0600) if needed.
    pub fn join_subcgroup(&self, subcgroup: &Subcgroup) -> Result<PathBuf> {
        let dir = self.paths.cgroup_dir.join(subcgroup);
        self.join(&dir)?;
        Ok(dir)
    }

    /// Move the calling process into `subcgroup` of a legacy controller
    pub fn join_legacy_subcgroup(&self, controller: &str, subcgroup: &Subcgroup) -> Result<PathBuf> {
        let dir = self.paths.cgroup_dir.join(controller).join(subcgroup);
        self.join(&dir)?;
        Ok(dir)
    }

    fn join(&self, dir: &Path) -> Result<()> {
        self.backend
            .create_dir_all(dir, 0o600)
            .map_err(|source| Error::Join {
                path: dir.to_path_buf(),
                source,
            })?;

        let pid = ProcessId::current();
        let procs = dir.join("cgroup.procs");
        self.backend
            .write(&procs, pid.to_string().as_bytes())
            .map_err(|source| Error::Join {
                path: procs.clone(),
                source,
            })?;

        info!(%pid, path = %dir.display(), "Joined subcgroup");
        Ok(())
    }
}
