//! Connection configuration loading via `ortho-config`.
//!
//! Settings merge defaults, a discovered configuration file, and
//! `SHARDCHECK_*` environment variables. A file that fails to parse is fatal:
//! the run stops before any connection attempt is made.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default SSH port for the device under test.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default lifetime of the idle multiplexing master.
pub const DEFAULT_CONTROL_PERSIST: &str = "10m";

/// SSH connection settings for the device under test.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SHARDCHECK",
    discovery(
        app_name = "shardcheck",
        env_var = "SHARDCHECK_CONFIG_PATH",
        config_file_name = "shardcheck.toml",
        dotfile_name = ".shardcheck.toml",
        project_file_name = "shardcheck.toml"
    )
)]
pub struct ConnectionConfig {
    /// Hostname or address of the device running the database service.
    #[ortho_config(default = String::new())]
    pub host: String,
    /// SSH port on the device.
    #[ortho_config(default = DEFAULT_SSH_PORT)]
    pub port: u16,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub username: String,
    /// Path to the SSH private key. Supports tilde expansion
    /// (`~/.ssh/id_ed25519`). When absent, SSH uses its default key
    /// locations.
    pub identity_file: Option<String>,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Whether to force batch mode so SSH never prompts for a password.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking. Development devices are
    /// reflashed often, so this defaults to off.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null`.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// How long the multiplexing master lingers once idle (`ControlPersist`).
    #[ortho_config(default = DEFAULT_CONTROL_PERSIST.to_owned())]
    pub control_persist: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ConnectionConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to shardcheck.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("shardcheck")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the `user@host` destination understood by `ssh`.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// Performs semantic validation on required fields. Error messages name
    /// the environment variable and configuration key that supply the value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// or [`ConfigError::Invalid`] when the port is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.host,
            &FieldMetadata::new("device host", "SHARDCHECK_HOST", "host"),
        )?;
        Self::require_field(
            &self.username,
            &FieldMetadata::new("SSH user", "SHARDCHECK_USERNAME", "username"),
        )?;
        Self::require_field(
            &self.ssh_bin,
            &FieldMetadata::new("ssh executable", "SHARDCHECK_SSH_BIN", "ssh_bin"),
        )?;
        Self::require_field(
            &self.control_persist,
            &FieldMetadata::new(
                "control master lifetime",
                "SHARDCHECK_CONTROL_PERSIST",
                "control_persist",
            ),
        )?;
        if let Some(identity) = self.identity_file.as_deref() {
            Self::require_field(
                identity,
                &FieldMetadata::new(
                    "SSH identity file",
                    "SHARDCHECK_IDENTITY_FILE",
                    "identity_file",
                ),
            )?;
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid(String::from(
                "port must be between 1 and 65535",
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field is present but holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
