//! Server configuration.
//!
//! Values come from an optional TOML file (`nvsflash.toml` in the working
//! directory, or a path given on the command line) and are overridden by
//! `NVSFLASH_` environment variables, with `__` between nested keys:
//!
//! ```text
//! NVSFLASH_SERVER__PORT=9000
//! NVSFLASH_NVS__PARTITION_SIZE=0x6000
//! ```

use std::path::{Path, PathBuf};

use nvsflash_core::nvs::{check_key, MIN_PARTITION_SIZE, PAGE_SIZE};
use nvsflash_core::{parse_size, GenerateOptions, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file, read when present.
pub const DEFAULT_CONFIG_FILE: &str = "nvsflash.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: HttpSettings,

    #[serde(default)]
    pub assets: AssetSettings,

    #[serde(default)]
    pub nvs: NvsSettings,

    #[serde(default)]
    pub tools: ToolSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetSettings {
    /// Holds `index.html`, `manifest.json` and the firmware images.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

/// Defaults for generated partitions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NvsSettings {
    /// Decimal or `0x` hex.
    #[serde(default = "default_partition_size")]
    pub partition_size: String,

    #[serde(default = "default_version")]
    pub version: u8,

    /// Namespace of the single-device partition.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Key the device ID is stored under.
    #[serde(default = "default_device_key")]
    pub device_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_probes")]
    pub probes: Vec<ToolProbe>,
}

/// An external command reported by the tool check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolProbe {
    pub name: String,
    pub command: Vec<String>,
}

impl Settings {
    /// Load from `path` (required to exist) or from [`DEFAULT_CONFIG_FILE`]
    /// when present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    builder = builder.add_source(config::File::from(default));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("NVSFLASH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.server.port == 0 {
            return Err(SettingsError::Invalid("server.port must not be 0".to_string()));
        }
        if self.server.max_body_bytes == 0 {
            return Err(SettingsError::Invalid(
                "server.max_body_bytes must not be 0".to_string(),
            ));
        }

        self.nvs.options()?;

        check_key(&self.nvs.namespace)
            .map_err(|e| SettingsError::Invalid(format!("nvs.namespace: {e}")))?;
        check_key(&self.nvs.device_key)
            .map_err(|e| SettingsError::Invalid(format!("nvs.device_key: {e}")))?;

        for probe in &self.tools.probes {
            if probe.command.is_empty() {
                return Err(SettingsError::Invalid(format!(
                    "tools.probes: `{}` has an empty command",
                    probe.name
                )));
            }
        }

        Ok(())
    }

    /// Path of a file in the static directory.
    pub fn static_file(&self, name: &str) -> PathBuf {
        self.assets.static_dir.join(name)
    }
}

impl NvsSettings {
    /// Partition parameters for generated images.
    pub fn options(&self) -> Result<GenerateOptions, SettingsError> {
        let size = parse_size(&self.partition_size)
            .map_err(|e| SettingsError::Invalid(format!("nvs.partition_size: {e}")))?;
        if size % PAGE_SIZE != 0 || size < MIN_PARTITION_SIZE {
            return Err(SettingsError::Invalid(format!(
                "nvs.partition_size: {size:#x} must be a multiple of {PAGE_SIZE:#x} \
                 and at least {MIN_PARTITION_SIZE:#x}"
            )));
        }

        let version = Version::from_number(self.version).ok_or_else(|| {
            SettingsError::Invalid(format!("nvs.version: unknown version {}", self.version))
        })?;

        Ok(GenerateOptions { size, version })
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
        }
    }
}

impl Default for NvsSettings {
    fn default() -> Self {
        Self {
            partition_size: default_partition_size(),
            version: default_version(),
            namespace: default_namespace(),
            device_key: default_device_key(),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            probes: default_probes(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_partition_size() -> String {
    "0x4000".to_string()
}

fn default_version() -> u8 {
    2
}

fn default_namespace() -> String {
    "bonicbot".to_string()
}

fn default_device_key() -> String {
    "device_id".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_probes() -> Vec<ToolProbe> {
    vec![
        ToolProbe {
            name: "esptool".to_string(),
            command: vec!["esptool.py".to_string(), "--help".to_string()],
        },
        ToolProbe {
            name: "esptool_bin".to_string(),
            command: vec!["esptool".to_string(), "--help".to_string()],
        },
    ]
}
