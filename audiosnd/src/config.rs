//! Configuration for the audiosnd command-line tool
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (`--lib`, `--log`)
//! 2. Environment variables (`AUDIOSND_CONFIG`, `AUDIOSND_LOG`)
//! 3. TOML tool file (`[logging]`, `[engine]`)
//! 4. The engine preference store (`native-lib`, `buffer-size`, `plyer-threads-size`)
//! 5. Built-in defaults

use crate::error::{Error, Result};
use serde::Deserialize;
use snd_common::{EngineConfig, PreferencesStore};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tool configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineSection,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Where the engine preferences live and which namespace to read
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineSection {
    /// Preference store path; the platform config dir when absent
    #[serde(default)]
    pub preferences: Option<PathBuf>,

    /// Namespace inside the store; `AudioSND` when absent
    #[serde(default)]
    pub namespace: Option<String>,

    /// Overrides the stored native library
    #[serde(default)]
    pub native_lib: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ToolConfig {
    /// Read the tool file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No tool config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: ToolConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded tool config from {}", path.display());
        Ok(config)
    }

    /// Tracing filter directive for the configured level
    pub fn log_filter(&self) -> String {
        format!("audiosnd={}", self.logging.level)
    }

    pub fn preferences_store(&self) -> Result<PreferencesStore> {
        match &self.engine.preferences {
            Some(path) => Ok(PreferencesStore::new(path.clone())),
            None => Ok(PreferencesStore::default_location()?),
        }
    }

    /// Engine configuration from the preference store plus tool overrides
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let store = self.preferences_store()?;
        let mut config = match &self.engine.namespace {
            Some(ns) => EngineConfig::load_namespace(&store, ns)?,
            None => EngineConfig::load(&store)?,
        };
        if let Some(lib) = &self.engine.native_lib {
            config.set_native_lib(lib.clone())?;
        }
        Ok(config)
    }
}
