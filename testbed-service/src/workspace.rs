// Workspace Layout
// Required directories of a testbed checkout and workspace root discovery

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::CONFIG_FILE_NAME;

/// Firmware output directory
pub const FIRMWARE_DIR: &str = "firmware";

/// Coreboot configuration directory
pub const FIRMWARE_CONFIG_DIR: &str = "configs/coreboot";

/// File name of the firmware artifact
pub const ROM_FILE_NAME: &str = "coreboot.rom";

/// Every directory that must exist before a build step runs, in creation order
pub const REQUIRED_DIRS: [&str; 5] = [
    FIRMWARE_DIR,
    "logs/host",
    "logs/bmc",
    FIRMWARE_CONFIG_DIR,
    "configs/linux",
];

/// A required directory could not be created
#[derive(Debug, Error)]
#[error("failed to create {relative} directory: {source}")]
pub struct ProvisionError {
    /// Directory as named in the layout, e.g. `logs/bmc`
    pub relative: String,
    /// Absolute path that was attempted
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Directory layout of a testbed workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a layout-relative path against the workspace root
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn firmware_dir(&self) -> PathBuf {
        self.path(FIRMWARE_DIR)
    }

    /// Host-visible location of the firmware ROM
    pub fn firmware_artifact(&self) -> PathBuf {
        self.firmware_dir().join(ROM_FILE_NAME)
    }

    /// Absolute paths of every required directory
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        REQUIRED_DIRS.iter().map(|dir| self.path(dir)).collect()
    }

    /// Create one layout directory (and its parents). Existing directories are fine.
    pub fn ensure_dir(&self, relative: &str) -> Result<PathBuf, ProvisionError> {
        let path = self.path(relative);
        fs::create_dir_all(&path).map_err(|source| ProvisionError {
            relative: relative.to_string(),
            path: path.clone(),
            source,
        })?;
        debug!(dir = %path.display(), "directory ready");
        Ok(path)
    }

    /// Create every required directory, stopping at the first failure
    pub fn provision(&self) -> Result<Vec<PathBuf>, ProvisionError> {
        REQUIRED_DIRS
            .iter()
            .map(|relative| self.ensure_dir(relative))
            .collect()
    }
}

/// Find the workspace root by walking up from `start`.
///
/// The nearest ancestor holding a `testbed.yaml` wins; failing that, the
/// root of the enclosing git repository.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().ok()?;
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE_NAME).is_file())
        .or_else(|| start.ancestors().find(|dir| dir.join(".git").exists()))
        .map(Path::to_path_buf)
}

/// Workspace root for the current process, falling back to the current directory
pub fn resolve_workspace_root() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_workspace_root(&cwd).unwrap_or(cwd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_creates_all_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(temp.path());

        let created = layout.provision().unwrap();

        assert_eq!(created.len(), REQUIRED_DIRS.len());
        for dir in REQUIRED_DIRS {
            assert!(temp.path().join(dir).is_dir(), "{} missing", dir);
        }
    }

    #[test]
    fn test_provision_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(temp.path());

        layout.provision().unwrap();
        fs::write(layout.firmware_artifact(), b"rom").unwrap();
        layout.provision().unwrap();

        assert_eq!(fs::read(layout.firmware_artifact()).unwrap(), b"rom");
    }

    #[test]
    fn test_provision_names_failing_dir() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("logs")).unwrap();
        // A regular file where the directory should go
        fs::write(temp.path().join("logs/bmc"), b"").unwrap();
        let layout = WorkspaceLayout::new(temp.path());

        let err = layout.provision().unwrap_err();

        assert_eq!(err.relative, "logs/bmc");
        assert!(err.to_string().contains("logs/bmc"));
        // Directories before the failure were created, later ones were not
        assert!(temp.path().join("logs/host").is_dir());
        assert!(!temp.path().join("configs/coreboot").exists());
    }

    #[test]
    fn test_artifact_path() {
        let layout = WorkspaceLayout::new("/srv/testbed");

        assert_eq!(
            layout.firmware_artifact(),
            PathBuf::from("/srv/testbed/firmware/coreboot.rom")
        );
    }

    #[test]
    fn test_find_workspace_root_prefers_config_file() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir(root.join(".git")).unwrap();
        let project = root.join("testbed");
        fs::create_dir_all(project.join("configs/linux")).unwrap();
        fs::write(project.join(CONFIG_FILE_NAME), "").unwrap();

        let found = find_workspace_root(&project.join("configs/linux")).unwrap();

        assert_eq!(found, project.canonicalize().unwrap());
    }

    #[test]
    fn test_find_workspace_root_falls_back_to_git() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let nested = temp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let found = find_workspace_root(&nested).unwrap();

        assert_eq!(found, temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_find_workspace_root_nonexistent_path() {
        assert!(find_workspace_root(Path::new("/nonexistent/testbed/path")).is_none());
    }
}
