//! Host access backend trait for pluggable implementations

use nix::errno::Errno;
use nix::mount::MsFlags;
use nix::sys::statfs::FsType;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Trait for everything the cgroup code does to the host
///
/// This allows for different implementations:
/// - [`HostBackend`] - Production, real syscalls
/// - [`MockBackend`] - Testing without touching mounts or `/proc`
///
/// # Thread Safety
/// All implementations must be `Send + Sync`.
pub trait MountBackend: Send + Sync {
    /// mount(2)
    ///
    /// # Errors
    /// Returns the errno reported by the kernel
    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> nix::Result<()>;

    /// Create a directory and all missing parents with the given mode
    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Create a symbolic link at `link` pointing to `target`
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Whether anything exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Read a whole file as UTF-8
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replace the contents of a file
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Filesystem magic number of the filesystem holding `path` (statfs(2))
    ///
    /// # Errors
    /// Returns the errno reported by the kernel
    fn fs_type(&self, path: &Path) -> nix::Result<FsType>;
}

/// Production backend issuing real syscalls
#[derive(Debug, Clone, Copy, Default)]
pub struct HostBackend;

impl MountBackend for HostBackend {
    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> nix::Result<()> {
        nix::mount::mount(Some(source), target, fstype, flags, data)
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::DirBuilder::new().recursive(true).mode(mode).create(path)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn fs_type(&self, path: &Path) -> nix::Result<FsType> {
        nix::sys::statfs::statfs(path).map(|st| st.filesystem_type())
    }
}

/// One call recorded by [`MockBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    /// `mount(2)`
    Mount {
        /// Source argument
        source: PathBuf,
        /// Mount point
        target: PathBuf,
        /// Filesystem type, if any
        fstype: Option<String>,
        /// Mount flags
        flags: MsFlags,
        /// Filesystem specific data
        data: Option<String>,
    },
    /// Recursive directory creation
    CreateDir {
        /// Directory created
        path: PathBuf,
        /// Requested mode
        mode: u32,
    },
    /// Symbolic link creation
    Symlink {
        /// Link contents
        target: PathBuf,
        /// Link location
        link: PathBuf,
    },
    /// File write
    Write {
        /// File written
        path: PathBuf,
        /// Data written
        contents: String,
    },
}

impl MockOp {
    /// Path the operation acted on (mount point, directory, link or file)
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Mount { target, .. } => target,
            Self::CreateDir { path, .. } | Self::Write { path, .. } => path,
            Self::Symlink { link, .. } => link,
        }
    }

    /// Whether this is a fresh bind mount (not a remount)
    #[must_use]
    pub fn is_bind(&self) -> bool {
        matches!(self, Self::Mount { flags, .. }
            if flags.contains(MsFlags::MS_BIND) && !flags.contains(MsFlags::MS_REMOUNT))
    }

    /// Whether this is a read-only remount
    #[must_use]
    pub fn is_read_only_remount(&self) -> bool {
        matches!(self, Self::Mount { flags, .. }
            if flags.contains(MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY))
    }
}

/// Mock backend for testing (in-memory filesystem and mount table)
///
/// The mount table follows the kernel rules the lockdown depends on:
/// - a path is writable iff the deepest mount covering it is read-write
/// - a bind mount inherits the state of the mount covering its source, and
///   binding from a read-only mount is refused with `EROFS`, so a read-write
///   exception can only be carved out before its parent goes read-only
/// - mounting `cgroup`/`cgroup2` creates the control files registered with
///   [`MockBackend::with_cgroup_files`] in the mount root and in every
///   directory later created below it
///
/// # Example
/// ```
/// use std::path::Path;
/// use vortex_cgroup::{MockBackend, MountBackend};
///
/// let backend = MockBackend::new().with_file("/proc/cgroups", "#subsys_name\n");
/// let contents = backend.read_to_string(Path::new("/proc/cgroups")).unwrap();
/// assert!(contents.starts_with("#subsys_name"));
/// ```
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, String>,
    symlinks: BTreeMap<PathBuf, PathBuf>,
    fs_types: BTreeMap<PathBuf, FsType>,
    mounts: Vec<MockMount>,
    busy: BTreeSet<PathBuf>,
    mount_failures: BTreeMap<PathBuf, Errno>,
    write_failures: BTreeSet<PathBuf>,
    cgroup_files: BTreeMap<String, Vec<(String, String)>>,
    ops: Vec<MockOp>,
}

#[derive(Clone)]
struct MockMount {
    target: PathBuf,
    fstype: String,
    read_only: bool,
    cgroup_files: Option<Vec<(String, String)>>,
}

impl MockState {
    fn exists(&self, path: &Path) -> bool {
        self.dirs.contains(path) || self.files.contains_key(path) || self.symlinks.contains_key(path)
    }

    /// Deepest mount covering `path`; later mounts win on the same target
    fn covering_mount(&self, path: &Path) -> Option<&MockMount> {
        self.mounts
            .iter()
            .enumerate()
            .filter(|(_, m)| path.starts_with(&m.target))
            .max_by_key(|(i, m)| (m.target.components().count(), *i))
            .map(|(_, m)| m)
    }

    fn is_writable(&self, path: &Path) -> bool {
        self.covering_mount(path).is_none_or(|m| !m.read_only)
    }

    fn populate_cgroup_dir(&mut self, dir: &Path, files: &[(String, String)], root: bool) {
        for (name, contents) in files {
            let contents = if root { contents.clone() } else { String::new() };
            self.files.insert(dir.join(name), contents);
        }
    }

    fn mount(
        &mut self,
        source: &Path,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> nix::Result<()> {
        if let Some(errno) = self.mount_failures.get(target) {
            return Err(*errno);
        }

        if flags.contains(MsFlags::MS_REMOUNT) {
            let entry = self
                .mounts
                .iter_mut()
                .rev()
                .find(|m| m.target == target)
                .ok_or(Errno::EINVAL)?;
            entry.read_only = flags.contains(MsFlags::MS_RDONLY);
            return Ok(());
        }

        if flags.contains(MsFlags::MS_BIND) {
            if !self.exists(source) || !self.exists(target) {
                return Err(Errno::ENOENT);
            }
            let (fstype, cgroup_files) = match self.covering_mount(source) {
                Some(m) if m.read_only => return Err(Errno::EROFS),
                Some(m) => (m.fstype.clone(), m.cgroup_files.clone()),
                None => ("rootfs".to_string(), None),
            };
            self.mounts.push(MockMount {
                target: target.to_path_buf(),
                fstype,
                read_only: false,
                cgroup_files,
            });
            return Ok(());
        }

        if !self.dirs.contains(target) {
            return Err(Errno::ENOENT);
        }
        if self.busy.contains(target) {
            return Err(Errno::EBUSY);
        }
        let fstype = fstype.ok_or(Errno::EINVAL)?;

        let cgroup_files = matches!(fstype, "cgroup" | "cgroup2").then(|| {
            self.cgroup_files
                .get(data.unwrap_or(""))
                .cloned()
                .unwrap_or_else(|| vec![("cgroup.procs".to_string(), String::new())])
        });
        if let Some(files) = &cgroup_files {
            self.populate_cgroup_dir(target, files, true);
        }

        self.mounts.push(MockMount {
            target: target.to_path_buf(),
            fstype: fstype.to_string(),
            read_only: flags.contains(MsFlags::MS_RDONLY),
            cgroup_files,
        });
        Ok(())
    }

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()> {
        let mut missing: Vec<&Path> = path
            .ancestors()
            .take_while(|p| !p.as_os_str().is_empty() && !self.dirs.contains(*p))
            .collect();
        missing.reverse();

        for dir in missing {
            if self.files.contains_key(dir) || self.symlinks.contains_key(dir) {
                return Err(io::Error::from(Errno::ENOTDIR));
            }
            if !self.is_writable(dir) {
                return Err(io::Error::from(Errno::EROFS));
            }
            let files = self.covering_mount(dir).and_then(|m| m.cgroup_files.clone());
            self.dirs.insert(dir.to_path_buf());
            if let Some(files) = files {
                self.populate_cgroup_dir(dir, &files, false);
            }
        }
        Ok(())
    }

    fn check_creatable(&self, path: &Path) -> io::Result<()> {
        let parent_exists = path.parent().is_some_and(|p| self.dirs.contains(p));
        if !parent_exists {
            return Err(io::Error::from(Errno::ENOENT));
        }
        if !self.is_writable(path) {
            return Err(io::Error::from(Errno::EROFS));
        }
        Ok(())
    }
}

impl MockBackend {
    /// Create a new mock backend containing only `/`
    #[must_use]
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.dirs.insert(PathBuf::from("/"));
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a directory (and its parents)
    #[must_use]
    pub fn with_dir(self, path: impl AsRef<Path>) -> Self {
        {
            let mut state = self.state();
            for dir in path.as_ref().ancestors().filter(|p| !p.as_os_str().is_empty()) {
                state.dirs.insert(dir.to_path_buf());
            }
        }
        self
    }

    /// Add a file, creating its parent directories
    #[must_use]
    pub fn with_file(self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        let path = path.as_ref();
        let this = match path.parent() {
            Some(parent) => self.with_dir(parent),
            None => self,
        };
        this.state()
            .files
            .insert(path.to_path_buf(), contents.into());
        this
    }

    /// Report `fs_type` as the statfs magic for `path`
    #[must_use]
    pub fn with_fs_type(self, path: impl AsRef<Path>, fs_type: FsType) -> Self {
        self.state()
            .fs_types
            .insert(path.as_ref().to_path_buf(), fs_type);
        self
    }

    /// Make non-bind mounts onto `path` fail with `EBUSY` (already mounted)
    #[must_use]
    pub fn with_busy_target(self, path: impl AsRef<Path>) -> Self {
        self.state().busy.insert(path.as_ref().to_path_buf());
        self
    }

    /// Make every mount onto `path` fail with `errno`
    #[must_use]
    pub fn with_mount_failure(self, path: impl AsRef<Path>, errno: Errno) -> Self {
        self.state()
            .mount_failures
            .insert(path.as_ref().to_path_buf(), errno);
        self
    }

    /// Make writes to `path` fail with `EINVAL`
    #[must_use]
    pub fn with_write_failure(self, path: impl AsRef<Path>) -> Self {
        self.state()
            .write_failures
            .insert(path.as_ref().to_path_buf());
        self
    }

    /// Control files the kernel exposes for a cgroup mount with the given
    /// data string (`"memory"`, `"cpu,cpuacct"`, or `""` for cgroup2)
    ///
    /// Contents apply to the mount root; new child cgroups get empty files.
    #[must_use]
    pub fn with_cgroup_files(self, data: &str, files: &[(&str, &str)]) -> Self {
        let files = files
            .iter()
            .map(|(name, contents)| ((*name).to_string(), (*contents).to_string()))
            .collect();
        self.state().cgroup_files.insert(data.to_string(), files);
        self
    }

    /// All recorded operations, in call order
    #[must_use]
    pub fn ops(&self) -> Vec<MockOp> {
        self.state().ops.clone()
    }

    /// Whether `path` is a directory
    #[must_use]
    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        self.state().dirs.contains(path.as_ref())
    }

    /// Contents of the file at `path`
    #[must_use]
    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state().files.get(path.as_ref()).cloned()
    }

    /// Target of the symlink at `path`
    #[must_use]
    pub fn symlink_target(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        self.state().symlinks.get(path.as_ref()).cloned()
    }

    /// Whether `path` can currently be written
    #[must_use]
    pub fn is_writable(&self, path: impl AsRef<Path>) -> bool {
        self.state().is_writable(path.as_ref())
    }

    /// Filesystem type of the mount covering `path`
    #[must_use]
    pub fn mounted_fs(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state()
            .covering_mount(path.as_ref())
            .map(|m| m.fstype.clone())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

impl MountBackend for MockBackend {
    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> nix::Result<()> {
        let mut state = self.state();
        state.ops.push(MockOp::Mount {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            fstype: fstype.map(str::to_string),
            flags,
            data: data.map(str::to_string),
        });

        tracing::trace!(path = %target.display(), ?flags, "Mock: mount");

        state.mount(source, target, fstype, flags, data)
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(MockOp::CreateDir {
            path: path.to_path_buf(),
            mode,
        });
        state.create_dir_all(path)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(MockOp::Symlink {
            target: target.to_path_buf(),
            link: link.to_path_buf(),
        });

        if state.exists(link) {
            return Err(io::Error::from(Errno::EEXIST));
        }
        state.check_creatable(link)?;
        state
            .symlinks
            .insert(link.to_path_buf(), target.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state().exists(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let state = self.state();
        match state.files.get(path) {
            Some(contents) => Ok(contents.clone()),
            None if state.dirs.contains(path) => Err(io::Error::from(Errno::EISDIR)),
            None => Err(io::Error::from(Errno::ENOENT)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        let contents = String::from_utf8_lossy(contents).into_owned();
        state.ops.push(MockOp::Write {
            path: path.to_path_buf(),
            contents: contents.clone(),
        });

        if state.write_failures.contains(path) {
            return Err(io::Error::from(Errno::EINVAL));
        }
        state.check_creatable(path)?;
        state.files.insert(path.to_path_buf(), contents);
        Ok(())
    }

    fn fs_type(&self, path: &Path) -> nix::Result<FsType> {
        self.state()
            .fs_types
            .get(path)
            .copied()
            .ok_or(Errno::ENOENT)
    }
}
