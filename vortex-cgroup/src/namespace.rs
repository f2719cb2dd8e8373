//! Mount namespace entry
//!
//! Building the hierarchy mounts directly onto root-relative paths, so the
//! caller has to be in a private mount namespace first.

use nix::mount::{mount, MsFlags};
use nix::sched::{unshare, CloneFlags};
use std::path::Path;
use vortex_core::{Error, Result};

/// Move the calling process into a new mount namespace
///
/// `/` is then marked recursively private so nothing mounted afterwards
/// propagates back to the host.
///
/// # Errors
/// Returns [`Error::Mount`] if unshare(2) or the propagation change fails
/// (typically missing `CAP_SYS_ADMIN`)
pub fn unshare_mount_namespace() -> Result<()> {
    tracing::info!("Creating mount namespace");

    unshare(CloneFlags::CLONE_NEWNS).map_err(|e| {
        tracing::error!(error = %e, "Failed to create mount namespace");
        Error::mount("unshare mount namespace", Path::new("/"), e)
    })?;

    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| Error::mount("make private", Path::new("/"), e))?;

    tracing::debug!("Mount namespace ready");
    Ok(())
}
