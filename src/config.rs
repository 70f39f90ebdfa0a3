//! Configuration management for vpnctl

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{ErrorCatalog, VpnError, VpnResult};

/// Main vpnctl configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VpnctlConfig {
    /// Configuration file paths
    #[serde(default)]
    pub paths: ConfigPaths,
    /// Connection state machine timing
    #[serde(default)]
    pub session: SessionSettings,
    /// Provisioning progress timing
    #[serde(default)]
    pub provisioning: ProvisioningSettings,
    /// Error code descriptions (`"code" = "message"`)
    #[serde(default)]
    pub errors: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigPaths {
    /// Persisted server list
    #[serde(default = "default_store_file")]
    pub store_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// How long connect stays disarmed after entering the error state
    #[serde(default = "default_error_cooldown_ms")]
    pub error_cooldown_ms: u64,
    /// Interval between disconnect checks during shutdown
    #[serde(default = "default_shutdown_poll_interval_ms")]
    pub shutdown_poll_interval_ms: u64,
    /// Number of disconnect checks before teardown is forced
    #[serde(default = "default_shutdown_poll_attempts")]
    pub shutdown_poll_attempts: u32,
    /// Connect to the default server on startup
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default = "default_auto_connect_delay_ms")]
    pub auto_connect_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Heartbeat period while a remote call is running
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// Step of the progress fast-forward after a successful call
    #[serde(default = "default_fast_forward_step_ms")]
    pub fast_forward_step_ms: u64,
}

fn default_store_file() -> PathBuf {
    PathBuf::from("/var/lib/vpnctl/servers.toml")
}

fn default_error_cooldown_ms() -> u64 {
    250
}

fn default_shutdown_poll_interval_ms() -> u64 {
    100
}

fn default_shutdown_poll_attempts() -> u32 {
    50
}

fn default_auto_connect_delay_ms() -> u64 {
    1000
}

fn default_heartbeat_ms() -> u64 {
    1000
}

fn default_fast_forward_step_ms() -> u64 {
    5
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            store_file: default_store_file(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            error_cooldown_ms: default_error_cooldown_ms(),
            shutdown_poll_interval_ms: default_shutdown_poll_interval_ms(),
            shutdown_poll_attempts: default_shutdown_poll_attempts(),
            auto_connect: false,
            auto_connect_delay_ms: default_auto_connect_delay_ms(),
        }
    }
}

impl SessionSettings {
    pub fn error_cooldown(&self) -> Duration {
        Duration::from_millis(self.error_cooldown_ms)
    }

    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_interval_ms)
    }

    pub fn auto_connect_delay(&self) -> Duration {
        Duration::from_millis(self.auto_connect_delay_ms)
    }
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            heartbeat_ms: default_heartbeat_ms(),
            fast_forward_step_ms: default_fast_forward_step_ms(),
        }
    }
}

impl ProvisioningSettings {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn fast_forward_step(&self) -> Duration {
        Duration::from_millis(self.fast_forward_step_ms)
    }
}

impl VpnctlConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> VpnResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| VpnError::ConfigError(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| VpnError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> VpnResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> VpnResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VpnError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| VpnError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Ensure the store directory exists
    pub fn ensure_directories(&self) -> VpnResult<()> {
        if let Some(dir) = self.paths.store_file.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| VpnError::ConfigError(format!("Failed to create directory {:?}: {}", dir, e)))?;
        }
        Ok(())
    }

    /// Error descriptions configured in the `[errors]` table
    pub fn error_catalog(&self) -> ErrorCatalog {
        ErrorCatalog::from_table(&self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, ErrorDescriber};

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: VpnctlConfig = toml::from_str("").unwrap();
        assert_eq!(config.session.shutdown_poll_attempts, 50);
        assert_eq!(config.session.shutdown_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.provisioning.heartbeat(), Duration::from_secs(1));
        assert!(!config.session.auto_connect);
    }

    #[test]
    fn test_partial_config_and_errors_table() {
        let text = r#"
            [paths]
            store_file = "/tmp/vpnctl/servers.toml"

            [session]
            auto_connect = true

            [errors]
            "5" = "Server check failed"
        "#;
        let config: VpnctlConfig = toml::from_str(text).unwrap();
        assert_eq!(config.paths.store_file, PathBuf::from("/tmp/vpnctl/servers.toml"));
        assert!(config.session.auto_connect);
        assert_eq!(config.session.error_cooldown_ms, 250);
        assert_eq!(config.error_catalog().describe(ErrorCode(5)), "Server check failed");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vpnctl.toml");

        let mut config = VpnctlConfig::default();
        config.provisioning.fast_forward_step_ms = 1;
        config.save(&path).unwrap();

        let loaded = VpnctlConfig::load(&path).unwrap();
        assert_eq!(loaded.provisioning.fast_forward_step_ms, 1);
        assert!(VpnctlConfig::load(dir.path().join("missing.toml")).is_err());
        assert!(VpnctlConfig::load_or_default(dir.path().join("missing.toml")).is_ok());
    }
}
