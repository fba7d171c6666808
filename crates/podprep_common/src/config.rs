//! Configuration for the provisioning engine.
//!
//! Loads settings from a TOML file or uses defaults. A missing file is
//! normal (first run); an unparsable file logs a warning and falls back to
//! defaults rather than aborting.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Provisioning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Target distro image name.
    #[serde(default = "default_distro")]
    pub distro: String,

    /// Operating user created inside the distro.
    #[serde(default = "default_username")]
    pub username: String,

    /// Interval between distro-install completion checks, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum time to wait for the distro to appear after starting the
    /// install, in seconds. The install wait is bounded; exceeding this
    /// surfaces a timeout error.
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,

    /// Staging directory for the setup script, inside the distro,
    /// relative to the operating user's home.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Host path of the shipped setup script.
    #[serde(default = "default_setup_script")]
    pub setup_script: String,

    /// Override for the persistent flag store file.
    #[serde(default)]
    pub flag_path: Option<PathBuf>,
}

fn default_distro() -> String {
    "Ubuntu".to_string()
}

fn default_username() -> String {
    "podman".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_install_timeout() -> u64 {
    900
}

fn default_staging_dir() -> String {
    "~/podprep-setup".to_string()
}

fn default_setup_script() -> String {
    "./wslPodmanSetup.sh".to_string()
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            distro: default_distro(),
            username: default_username(),
            poll_interval_secs: default_poll_interval(),
            install_timeout_secs: default_install_timeout(),
            staging_dir: default_staging_dir(),
            setup_script: default_setup_script(),
            flag_path: None,
        }
    }
}

impl ProvisionConfig {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podprep")
            .join("config.toml")
    }

    /// Load configuration from `path`, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_when_file_missing() {
        let config = ProvisionConfig::load(Path::new("/nonexistent/podprep.toml"));
        assert_eq!(config.distro, "Ubuntu");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.install_timeout_secs, 900);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "distro = \"Debian\"").unwrap();
        writeln!(file, "poll_interval_secs = 2").unwrap();

        let config = ProvisionConfig::load(file.path());
        assert_eq!(config.distro, "Debian");
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.username, "podman");
        assert_eq!(config.setup_script, "./wslPodmanSetup.sh");
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[[").unwrap();

        let config = ProvisionConfig::load(file.path());
        assert_eq!(config.distro, "Ubuntu");
    }
}
