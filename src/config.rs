use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toml::Value;

use crate::identity::IdentitySettings;
use crate::logging::LogConfig;
use crate::models::LactateProtocol;

/// Keys that may be absent from the file and still be set
const OPTIONAL_KEYS: &[&str] = &["identity.user_id", "identity.guest_id", "logging.file_path"];

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// General application settings
    pub settings: AppSettings,

    /// Protocol used for new tests
    pub protocol: LactateProtocol,

    /// Acting user
    pub identity: IdentitySettings,

    /// Data import preferences
    pub import: ImportSettings,

    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Data directory path
    pub data_dir: PathBuf,

    /// SQLite file name inside the data directory
    pub database_file: String,
}

/// Import preferences
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Reject the whole paste when any row has errors
    pub strict: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            settings: AppSettings::default(),
            protocol: LactateProtocol::default(),
            identity: IdentitySettings::default(),
            import: ImportSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            data_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".lactrs"),
            database_file: "lactrs.db".to_string(),
        }
    }
}

impl AppSettings {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        tracing::debug!(path = %path.as_ref().display(), "Saved configuration");
        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lactrs")
            .join("config.toml")
    }

    /// Load configuration from `path`, or defaults when the file does not exist.
    ///
    /// A file that exists but does not parse is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!(path = %path.as_ref().display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Read a value by dotted key, e.g. `protocol.num_stages`.
    ///
    /// Returns `None` for optional keys that are not set.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let root = Value::try_from(self).context("Failed to serialize configuration")?;

        let mut current = &root;
        for part in key.split('.') {
            match current.get(part) {
                Some(next) => current = next,
                None if OPTIONAL_KEYS.contains(&key) => return Ok(None),
                None => bail!("Unknown config key: {}", key),
            }
        }

        match current {
            Value::Table(_) => bail!("{} is a section, not a value", key),
            value => Ok(Some(render_value(value))),
        }
    }

    /// Set a value by dotted key, keeping the type of the current value.
    ///
    /// An empty value clears an optional key.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
        let (section, leaf) = key
            .rsplit_once('.')
            .ok_or_else(|| anyhow!("Config keys look like section.name, got: {}", key))?;

        let mut root = Value::try_from(&*self).context("Failed to serialize configuration")?;

        let mut table = root
            .as_table_mut()
            .ok_or_else(|| anyhow!("Configuration root is not a table"))?;
        for part in section.split('.') {
            table = table
                .get_mut(part)
                .and_then(Value::as_table_mut)
                .ok_or_else(|| anyhow!("Unknown config section: {}", section))?;
        }

        let raw = raw.trim();
        let optional = OPTIONAL_KEYS.contains(&key);
        if optional && raw.is_empty() {
            table.remove(leaf);
        } else {
            let value = match table.get(leaf) {
                Some(Value::Integer(_)) => Value::Integer(
                    raw.parse()
                        .with_context(|| format!("{} expects a whole number", key))?,
                ),
                Some(Value::Float(_)) => Value::Float(
                    raw.parse()
                        .with_context(|| format!("{} expects a number", key))?,
                ),
                Some(Value::Boolean(_)) => Value::Boolean(
                    raw.parse()
                        .with_context(|| format!("{} expects true or false", key))?,
                ),
                Some(Value::Table(_)) => bail!("{} is a section, not a value", key),
                Some(_) => Value::String(raw.to_string()),
                None if optional => Value::String(raw.to_string()),
                None => bail!("Unknown config key: {}", key),
            };
            table.insert(leaf.to_string(), value);
        }

        *self = root
            .try_into()
            .with_context(|| format!("Invalid value for {}: {}", key, raw))?;
        Ok(())
    }

    /// All set values as `(dotted key, value)` pairs
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let root = Value::try_from(self).context("Failed to serialize configuration")?;
        let mut entries = Vec::new();
        flatten("", &root, &mut entries);
        Ok(entries)
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Table(table) => {
            for (key, child) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&path, child, out);
            }
        }
        leaf => out.push((prefix.to_string(), render_value(leaf))),
    }
}
