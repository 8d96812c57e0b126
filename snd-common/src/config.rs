//! Engine configuration and the persisted preference store
//!
//! Settings live under a namespace table (default `AudioSND`) inside a TOML
//! preference file. The key names are kept byte-for-byte compatible with
//! stores written by earlier releases, including `plyer-threads-size`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default namespace for persisted engine settings
pub const DEFAULT_NAMESPACE: &str = "AudioSND";

/// Key holding the backend library name
pub const KEY_NATIVE_LIB: &str = "native-lib";

/// Key holding the device buffer size in bytes
pub const KEY_BUFFER_SIZE: &str = "buffer-size";

/// Key holding the buffer count (historic spelling preserved)
pub const KEY_BUFFER_COUNT: &str = "plyer-threads-size";

const DEFAULT_BUFFER_SIZE: usize = 4096;
const DEFAULT_BUFFER_COUNT: usize = 20;

/// Known backend libraries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeLib {
    /// System audio through the platform host (`audio-snd`)
    Default,
    /// In-memory devices without hardware access (`null`)
    Null,
}

impl NativeLib {
    /// Library name as written in the preference store
    pub fn lib_name(&self) -> &'static str {
        match self {
            NativeLib::Default => "audio-snd",
            NativeLib::Null => "null",
        }
    }

    /// Resolve a stored library name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "audio-snd" => Some(NativeLib::Default),
            "null" => Some(NativeLib::Null),
            _ => None,
        }
    }
}

impl std::fmt::Display for NativeLib {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lib_name())
    }
}

/// Engine configuration
///
/// All numeric settings are strictly positive; setters enforce this and
/// leave the previous value untouched on rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    namespace: String,
    native_lib: String,
    buffer_size: usize,
    buffer_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            native_lib: NativeLib::Default.lib_name().to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            buffer_count: DEFAULT_BUFFER_COUNT,
        }
    }
}

impl EngineConfig {
    /// Configuration with defaults under the default namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with defaults under a custom namespace
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn native_lib(&self) -> &str {
        &self.native_lib
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Set the backend library name. Empty names are rejected.
    pub fn set_native_lib(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "native library name must not be empty".to_string(),
            ));
        }
        self.native_lib = name;
        Ok(())
    }

    /// Set the device buffer size in bytes
    pub fn set_buffer_size(&mut self, size: i64) -> Result<()> {
        self.buffer_size = positive(KEY_BUFFER_SIZE, size)?;
        Ok(())
    }

    /// Set the number of device buffers
    pub fn set_buffer_count(&mut self, count: i64) -> Result<()> {
        self.buffer_count = positive(KEY_BUFFER_COUNT, count)?;
        Ok(())
    }

    /// Resolve the configured backend, if it is a known one
    pub fn backend(&self) -> Option<NativeLib> {
        NativeLib::from_name(&self.native_lib)
    }

    /// Load the default namespace from a preference store.
    ///
    /// Missing files, tables or keys fall back to defaults; present but
    /// invalid values fail with `InvalidConfig`.
    pub fn load(store: &PreferencesStore) -> Result<Self> {
        Self::load_namespace(store, DEFAULT_NAMESPACE)
    }

    /// Load a specific namespace from a preference store
    pub fn load_namespace(store: &PreferencesStore, namespace: &str) -> Result<Self> {
        let mut config = Self::with_namespace(namespace);

        let Some(table) = store.read_table(namespace)? else {
            debug!("No stored settings for namespace '{}', using defaults", namespace);
            return Ok(config);
        };

        if let Some(value) = table.get(KEY_NATIVE_LIB) {
            let name = value.as_str().ok_or_else(|| {
                Error::InvalidConfig(format!("{} must be a string", KEY_NATIVE_LIB))
            })?;
            config.set_native_lib(name)?;
        }
        if let Some(value) = table.get(KEY_BUFFER_SIZE) {
            config.set_buffer_size(integer_setting(KEY_BUFFER_SIZE, value)?)?;
        }
        if let Some(value) = table.get(KEY_BUFFER_COUNT) {
            config.set_buffer_count(integer_setting(KEY_BUFFER_COUNT, value)?)?;
        }

        info!(
            "Loaded engine settings from {}: lib={}, buffer-size={}, buffers={}",
            store.path().display(),
            config.native_lib,
            config.buffer_size,
            config.buffer_count
        );
        Ok(config)
    }

    /// Persist this configuration under its namespace.
    ///
    /// Other namespaces in the same store are preserved.
    pub fn save(&self, store: &PreferencesStore) -> Result<()> {
        let mut table = toml::Table::new();
        table.insert(
            KEY_NATIVE_LIB.to_string(),
            toml::Value::String(self.native_lib.clone()),
        );
        table.insert(
            KEY_BUFFER_SIZE.to_string(),
            toml::Value::Integer(self.buffer_size as i64),
        );
        table.insert(
            KEY_BUFFER_COUNT.to_string(),
            toml::Value::Integer(self.buffer_count as i64),
        );
        store.write_table(&self.namespace, table)
    }
}

fn positive(key: &str, value: i64) -> Result<usize> {
    if value < 1 {
        return Err(Error::InvalidConfig(format!(
            "{} must be positive, got {}",
            key, value
        )));
    }
    usize::try_from(value)
        .map_err(|_| Error::InvalidConfig(format!("{} out of range: {}", key, value)))
}

/// Older stores saved every value as a string; accept both forms.
fn integer_setting(key: &str, value: &toml::Value) -> Result<i64> {
    match value {
        toml::Value::Integer(n) => Ok(*n),
        toml::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::InvalidConfig(format!("{} is not a number: {:?}", key, s))),
        other => Err(Error::InvalidConfig(format!(
            "{} has unexpected type: {}",
            key,
            other.type_str()
        ))),
    }
}

/// TOML file holding one table per settings namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferencesStore {
    path: PathBuf,
}

impl PreferencesStore {
    /// Store backed by an explicit file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform configuration directory
    /// (`~/.config/audiosnd/preferences.toml` on Linux)
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        Ok(Self::new(dir.join("audiosnd").join("preferences.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one namespace table. A missing file or table yields `None`.
    pub fn read_table(&self, namespace: &str) -> Result<Option<toml::Table>> {
        let Some(document) = self.read_document()? else {
            return Ok(None);
        };

        match document.get(namespace) {
            Some(toml::Value::Table(table)) => Ok(Some(table.clone())),
            Some(other) => Err(Error::Config(format!(
                "Namespace '{}' is a {}, expected a table",
                namespace,
                other.type_str()
            ))),
            None => Ok(None),
        }
    }

    /// Replace one namespace table, creating the file if needed
    pub fn write_table(&self, namespace: &str, table: toml::Table) -> Result<()> {
        let mut document = self.read_document()?.unwrap_or_default();
        document.insert(namespace.to_string(), toml::Value::Table(table));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, toml::to_string_pretty(&document)?)?;
        debug!("Wrote namespace '{}' to {}", namespace, self.path.display());
        Ok(())
    }

    fn read_document(&self) -> Result<Option<toml::Table>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!("Failed to read preferences {}: {}", self.path.display(), e);
                return Err(e.into());
            }
        };
        Ok(Some(content.parse::<toml::Table>()?))
    }
}
