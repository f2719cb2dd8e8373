//! Process cgroup membership
//!
//! `/proc/<pid>/cgroup` has one `hierarchy-id:controllers:path` line per
//! hierarchy. On the unified hierarchy there is a single `0::/path` line.
//! Paths are read on every call; nothing is cached.

use std::path::Path;
use vortex_core::{Error, ProcessId, Result};

use crate::backend::MountBackend;
use crate::manager::CgroupManager;

/// Split one membership line into its three fields
fn split_line<'a>(line: &'a str, source: &Path) -> Result<[&'a str; 3]> {
    let mut fields = line.splitn(3, ':');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(id), Some(controllers), Some(path)) => Ok([id, controllers, path]),
        _ => Err(Error::parse(
            source,
            format!("expected 3 ':' separated fields in {line:?}"),
        )),
    }
}

/// Cgroup path from a unified `/proc/<pid>/cgroup` (first line, third field)
///
/// # Errors
/// Returns [`Error::Parse`] if the first line has fewer than three fields
pub fn parse_cgroup_path(contents: &str, source: &Path) -> Result<String> {
    let line = contents.lines().next().unwrap_or_default();
    let [_, _, path] = split_line(line, source)?;
    Ok(path.to_string())
}

/// Cgroup path of `controller` from a legacy `/proc/<pid>/cgroup`
///
/// The controller must match one entry of a line's comma separated
/// controller list exactly; the first matching line wins.
///
/// # Errors
/// Returns [`Error::Parse`] for a malformed line and [`Error::NotFound`] if
/// no line lists `controller`
pub fn parse_legacy_cgroup_path(contents: &str, controller: &str, source: &Path) -> Result<String> {
    for line in contents.lines().filter(|l| !l.is_empty()) {
        let [_, controllers, path] = split_line(line, source)?;
        if controllers.split(',').any(|c| c == controller) {
            return Ok(path.to_string());
        }
    }

    Err(Error::NotFound {
        controller: controller.to_string(),
        path: source.to_path_buf(),
    })
}

impl<B: MountBackend> CgroupManager<B> {
    fn read_proc_cgroup(&self, pid: Option<ProcessId>) -> Result<(String, std::path::PathBuf)> {
        let path = self.paths.proc_cgroup(pid);
        let contents = self
            .backend
            .read_to_string(&path)
            .map_err(|e| Error::io(&path, e))?;
        Ok((contents, path))
    }

    /// Unified cgroup path of the calling process
    pub fn own_cgroup_path(&self) -> Result<String> {
        let (contents, path) = self.read_proc_cgroup(None)?;
        parse_cgroup_path(&contents, &path)
    }

    /// Unified cgroup path of `pid`
    pub fn cgroup_path_by_pid(&self, pid: ProcessId) -> Result<String> {
        let (contents, path) = self.read_proc_cgroup(Some(pid))?;
        parse_cgroup_path(&contents, &path)
    }

    /// Legacy cgroup path of the calling process for `controller`
    pub fn own_legacy_cgroup_path(&self, controller: &str) -> Result<String> {
        let (contents, path) = self.read_proc_cgroup(None)?;
        parse_legacy_cgroup_path(&contents, controller, &path)
    }

    /// Legacy cgroup path of `pid` for `controller`
    pub fn legacy_cgroup_path_by_pid(&self, pid: ProcessId, controller: &str) -> Result<String> {
        let (contents, path) = self.read_proc_cgroup(Some(pid))?;
        parse_legacy_cgroup_path(&contents, controller, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::config::HostPaths;

    const LEGACY: &str = "\
11:pids:/user.slice/user-1000.slice
5:memory:/machine-slice/app1
3:cpu,cpuacct:/machine-slice/app1/cpu
1:name=systemd:/machine-slice/app1
";

    fn source() -> &'static Path {
        Path::new("/proc/self/cgroup")
    }

    #[test]
    fn test_unified_path() {
        assert_eq!(parse_cgroup_path("0::/machine.slice/app\n", source()).unwrap(), "/machine.slice/app");
        // the path itself may contain ':'
        assert_eq!(parse_cgroup_path("0::/a:b", source()).unwrap(), "/a:b");
    }

    #[test]
    fn test_unified_path_malformed() {
        assert!(matches!(parse_cgroup_path("0:/nope", source()), Err(Error::Parse { .. })));
        assert!(matches!(parse_cgroup_path("", source()), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_legacy_path_lookup() {
        assert_eq!(
            parse_legacy_cgroup_path(LEGACY, "memory", source()).unwrap(),
            "/machine-slice/app1"
        );
        assert_eq!(
            parse_legacy_cgroup_path(LEGACY, "cpuacct", source()).unwrap(),
            "/machine-slice/app1/cpu"
        );
    }

    #[test]
    fn test_legacy_path_requires_exact_match() {
        let contents = "4:memory:/machine-slice/app1\n";
        assert_eq!(
            parse_legacy_cgroup_path(contents, "memory", source()).unwrap(),
            "/machine-slice/app1"
        );

        let err = parse_legacy_cgroup_path(contents, "cpu", source()).unwrap_err();
        assert!(matches!(err, Error::NotFound { ref controller, .. } if controller == "cpu"));

        assert!(parse_legacy_cgroup_path(contents, "mem", source()).is_err());
    }

    #[test]
    fn test_legacy_path_malformed_line() {
        let contents = "4:memory\n";
        assert!(matches!(
            parse_legacy_cgroup_path(contents, "memory", source()),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_manager_reads_through_proc_dir() {
        let backend = MockBackend::new()
            .with_file("/fixtures/proc/self/cgroup", "0::/machine.slice/self\n")
            .with_file("/fixtures/proc/42/cgroup", LEGACY);
        let m = CgroupManager::with_backend(backend, HostPaths::new().with_proc_dir("/fixtures/proc"));

        assert_eq!(m.own_cgroup_path().unwrap(), "/machine.slice/self");
        assert_eq!(
            m.legacy_cgroup_path_by_pid(ProcessId::from_raw(42), "pids").unwrap(),
            "/user.slice/user-1000.slice"
        );
        assert!(matches!(
            m.cgroup_path_by_pid(ProcessId::from_raw(7)),
            Err(Error::Io { .. })
        ));
        assert!(m.own_legacy_cgroup_path("memory").is_err());
    }
}
