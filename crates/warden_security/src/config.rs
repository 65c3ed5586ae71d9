//! Configuration for the Warden trust boundary.
//!
//! Configuration is layered:
//! - Bundled defaults (include_str! from warden.toml)
//! - User overrides (~/.config/warden/warden.toml, then ./warden.toml)
//!
//! Later layers win key by key, so an override file only needs the values it
//! changes. Command policies merge per command name.

use crate::{AdmissionConfig, CommandPolicies, EnrollmentConfig};
use config::{Config, File, FileFormat};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use warden_error::{ConfigError, WardenError, WardenResult};

/// Bundled default configuration.
const DEFAULT_CONFIG: &str = include_str!("../../../warden.toml");

/// Where the identity directory lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct DirectoryConfig {
    /// Path of the JSON identity file
    #[serde(default = "default_directory_path")]
    path: PathBuf,
}

fn default_directory_path() -> PathBuf {
    PathBuf::from("./data/users.json")
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: default_directory_path(),
        }
    }
}

impl DirectoryConfig {
    /// Directory stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Identity lookups issued by commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct LookupConfig {
    /// How long a lookup may stay unanswered
    #[serde(default = "default_lookup_timeout", with = "humantime_serde")]
    timeout: Duration,
}

fn default_lookup_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            timeout: default_lookup_timeout(),
        }
    }
}

impl LookupConfig {
    /// Lookups expiring after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct DispatchConfig {
    /// Command an owner may issue in any scope
    #[serde(default = "default_management_command")]
    management_command: String,
    /// How often idle admission state and stale lookups are swept
    #[serde(default = "default_housekeeping_interval", with = "humantime_serde")]
    housekeeping_interval: Duration,
}

fn default_management_command() -> String {
    "!managecmd".to_string()
}

fn default_housekeeping_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            management_command: default_management_command(),
            housekeeping_interval: default_housekeeping_interval(),
        }
    }
}

/// Complete Warden configuration.
///
/// # Example
///
/// ```toml
/// [directory]
/// path = "./data/users.json"
///
/// [admission]
/// per_identity_limit = 2
/// cooldown = "10s"
///
/// [commands."!weather"]
/// role = "Everyone"
/// scopes = ["#lobby"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters)]
pub struct WardenConfig {
    /// Identity directory location
    #[serde(default)]
    directory: DirectoryConfig,
    /// Admission limits
    #[serde(default)]
    admission: AdmissionConfig,
    /// Enrollment timing
    #[serde(default)]
    enrollment: EnrollmentConfig,
    /// Lookup timing
    #[serde(default)]
    lookup: LookupConfig,
    /// Dispatcher settings
    #[serde(default)]
    dispatch: DispatchConfig,
    /// Policy per command name
    #[serde(default)]
    commands: CommandPolicies,
}

impl WardenConfig {
    /// Load configuration from a specific TOML file only.
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> WardenResult<Self> {
        debug!("Loading configuration from file");
        let config = Self::build(
            Config::builder().add_source(File::from(path.as_ref()).format(FileFormat::Toml)),
        )?;
        info!(commands = config.commands.len(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from TOML text layered over nothing.
    pub fn from_toml_str(toml: &str) -> WardenResult<Self> {
        Self::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    /// Bundled defaults only.
    pub fn bundled() -> WardenResult<Self> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Load with precedence: current directory > home directory > bundled defaults.
    #[tracing::instrument]
    pub fn load() -> WardenResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("warden").join("warden.toml");
            builder = builder.add_source(File::from(user_config).required(false));
        }

        builder = builder.add_source(File::with_name("warden").required(false));

        let config = Self::build(builder)?;
        info!(commands = config.commands.len(), "Configuration loaded");
        Ok(config)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> WardenResult<Self> {
        builder
            .build()
            .map_err(|e| {
                WardenError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                WardenError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }

    /// Replace the directory location.
    pub fn with_directory(mut self, directory: DirectoryConfig) -> Self {
        self.directory = directory;
        self
    }

    /// Replace the admission limits.
    pub fn with_admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = admission;
        self
    }

    /// Replace the enrollment timing.
    pub fn with_enrollment(mut self, enrollment: EnrollmentConfig) -> Self {
        self.enrollment = enrollment;
        self
    }

    /// Replace the lookup timing.
    pub fn with_lookup(mut self, lookup: LookupConfig) -> Self {
        self.lookup = lookup;
        self
    }

    /// Replace the command policy table.
    pub fn with_commands(mut self, commands: CommandPolicies) -> Self {
        self.commands = commands;
        self
    }
}
