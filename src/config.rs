//! On-disk configuration, loaded from `--config` and overlaid with a few
//! CLI flags at startup (spec §6.5).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::Arch;

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/regtreed/regtreed.sock")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/regtree")
}

fn default_save_interval_secs() -> u64 {
    30
}

/// A file this process should load at startup and keep saving back to
/// (spec §4.7). `path` is the mount point under the root; `file` is where
/// it lives on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct BranchConfig {
    pub path: String,
    pub file: PathBuf,
}

/// The architecture tag this prefix's files must declare (spec §6.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigArch {
    #[default]
    Win64,
    Win32,
}

impl From<ConfigArch> for Arch {
    fn from(value: ConfigArch) -> Self {
        match value {
            ConfigArch::Win64 => Arch::Win64,
            ConfigArch::Win32 => Arch::Win32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
    #[serde(default)]
    pub arch: ConfigArch,
    #[serde(default)]
    pub branches: Vec<BranchConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            data_dir: default_data_dir(),
            save_interval_secs: default_save_interval_secs(),
            arch: ConfigArch::default(),
            branches: Vec::new(),
        }
    }
}

impl Config {
    /// Reads and parses a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&text).map_err(ConfigError::Parse)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[source] std::io::Error),
    #[error("parsing config file: {0}")]
    Parse(#[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_field_when_the_file_is_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.socket_path, default_socket_path());
        assert_eq!(config.save_interval_secs, 30);
        assert_eq!(config.arch, ConfigArch::Win64);
        assert!(config.branches.is_empty());
    }

    #[test]
    fn parses_branch_list() {
        let text = r#"
            arch = "win32"

            [[branches]]
            path = "Machine\\SOFTWARE"
            file = "/var/lib/regtree/software.reg"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.arch, ConfigArch::Win32);
        assert_eq!(config.branches.len(), 1);
        assert_eq!(config.branches[0].path, "Machine\\SOFTWARE");
    }

    #[test]
    fn missing_file_is_reported_as_io_error() {
        let err = Config::load(Path::new("/nonexistent/regtreed.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
