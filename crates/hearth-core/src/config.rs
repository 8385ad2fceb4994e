//! TOML configuration for the bus, its transports and the CLI.
//!
//! Every section is optional; missing keys fall back to defaults.
//!
//! ```toml
//! [bus]
//! failure_policy = "abort"      # or "continue"
//!
//! [transport]
//! max_frame_bytes = 1048576
//! queue_capacity = 1024         # omit for an unbounded queue
//!
//! [sandbox]
//! memory_limit_bytes = 8388608
//!
//! [logging]
//! level = "info"
//! bridge = false
//!
//! [metadata]
//! MACHINE = ["qemux86-64"]
//! __EVENT_HANDLERS = ["log('info', e.kind)"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metadata::MetadataStore;
use crate::wire::{DEFAULT_MAX_FRAME_BYTES, FRAME_BYTES_CEILING};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What a dispatcher does when a handler fails during fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the failing handler and return its error from `fire`
    #[default]
    Abort,
    /// Log the failure and keep delivering to the remaining handlers
    Continue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Largest encoded record the pipe transport will write or read
    pub max_frame_bytes: usize,
    /// Queue bound; `None` builds an unbounded queue
    pub queue_capacity: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            queue_capacity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Per-handler Lua heap limit; `None` leaves the state unbounded
    pub memory_limit_bytes: Option<usize>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: Some(8 * 1024 * 1024),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Route `tracing` output onto the bus as `LogRecord` events
    pub bridge: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            bridge: false,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HearthConfig {
    pub bus: BusConfig,
    pub transport: TransportConfig,
    pub sandbox: SandboxConfig,
    pub logging: LoggingConfig,
    /// Build metadata handed to metadata-scoped dispatchers
    pub metadata: MetadataStore,
}

impl HearthConfig {
    /// Default location: `~/.config/hearth/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hearth").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, else the default path if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        match Self::default_path() {
            Some(default) if default.exists() => {
                tracing::debug!(path = %default.display(), "Loading default config");
                Self::load_from_file(default)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid(
                "transport.max_frame_bytes must be greater than 0".to_string(),
            ));
        }
        if self.transport.max_frame_bytes > FRAME_BYTES_CEILING {
            return Err(ConfigError::Invalid(format!(
                "transport.max_frame_bytes must not exceed {}",
                FRAME_BYTES_CEILING
            )));
        }
        if self.transport.queue_capacity == Some(0) {
            return Err(ConfigError::Invalid(
                "transport.queue_capacity must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}
