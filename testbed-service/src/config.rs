// Configuration
// Optional testbed.yaml overrides for firmware acquisition and the compose runtime

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name looked up in the workspace root when no explicit config is given
pub const CONFIG_FILE_NAME: &str = "testbed.yaml";

/// Prebuilt coreboot ROM for QEMU Q35
pub const DEFAULT_FIRMWARE_URL: &str = "https://www.coreboot.org/images/6/6b/Coreboot.rom";

pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:22.04";

pub const DEFAULT_BUILD_WORKDIR: &str = "/build";

/// 4 MiB of zeros stands in for the ROM when the download fails
pub const DEFAULT_PLACEHOLDER_SIZE: u64 = 4 * 1024 * 1024;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

/// Toolchain installed into the firmware build context
pub const DEFAULT_TOOLCHAIN_PACKAGES: &[&str] = &[
    "git",
    "build-essential",
    "gnat",
    "flex",
    "bison",
    "libncurses-dev",
    "wget",
    "zlib1g-dev",
    "python3",
    "python3-pip",
    "qemu-utils",
    "nasm",
    "uuid-dev",
    "iasl",
    "m4",
    "curl",
];

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid YAML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level testbed configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestbedConfig {
    pub firmware: FirmwareConfig,
    pub compose: ComposeConfig,
    /// Container CLI used for the firmware build context
    pub docker_program: String,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            firmware: FirmwareConfig::default(),
            compose: ComposeConfig::default(),
            docker_program: "docker".to_string(),
        }
    }
}

/// Firmware acquisition settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// Where the prebuilt ROM is downloaded from
    pub url: String,
    /// Base image of the build context
    pub base_image: String,
    /// Packages installed with apt-get into the build context
    pub packages: Vec<String>,
    /// Working directory inside the build context
    pub workdir: String,
    /// Size of the zero-filled fallback ROM in bytes
    pub placeholder_size: u64,
    /// Download timeout in seconds
    pub fetch_timeout_secs: u64,
    /// Shell commands run in the build context after the ROM is staged
    pub build_commands: Vec<String>,
}

impl FirmwareConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FIRMWARE_URL.to_string(),
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            packages: DEFAULT_TOOLCHAIN_PACKAGES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            workdir: DEFAULT_BUILD_WORKDIR.to_string(),
            placeholder_size: DEFAULT_PLACEHOLDER_SIZE,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            build_commands: Vec::new(),
        }
    }
}

/// Which compose front end to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComposeProgram {
    /// `docker-compose` if it is on PATH, otherwise `docker compose`
    #[default]
    Auto,
    /// The standalone `docker-compose` binary
    DockerCompose,
    /// The `docker compose` plugin
    Docker,
}

/// Compose runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    pub program: ComposeProgram,
    /// Compose file passed with `-f`, relative to the workspace root
    pub file: Option<PathBuf>,
    /// Project name passed with `-p`
    pub project: Option<String>,
}

impl TestbedConfig {
    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: TestbedConfig =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content, path)
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path must exist. Otherwise `testbed.yaml` in the workspace
    /// root is used when present, and the built-in defaults when it is not.
    pub fn discover(workspace_root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let candidate = workspace_root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::from_file(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.firmware.url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "firmware.url must start with http:// or https://, got: '{}'",
                self.firmware.url
            )));
        }
        if self.firmware.base_image.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "firmware.base_image must not be empty".to_string(),
            ));
        }
        if self.firmware.placeholder_size == 0 {
            return Err(ConfigError::Invalid(
                "firmware.placeholder_size must be greater than zero".to_string(),
            ));
        }
        if !self.firmware.workdir.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "firmware.workdir must be an absolute container path, got: '{}'",
                self.firmware.workdir
            )));
        }
        if self.docker_program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "docker_program must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
