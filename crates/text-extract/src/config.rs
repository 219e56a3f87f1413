//! Declarative strategy configuration and runtime settings.
//!
//! A strategies file maps logical strategy names to an implementation `class`
//! plus arbitrary keys that are handed to the strategy as its config:
//!
//! ```yaml
//! strategies:
//!   gpu-ocr:
//!     class: text_extract::strategies::GpuOcrStrategy
//!     batch_size: 8
//! ```
//!
//! YAML, TOML and JSON files are accepted. Entry order follows the file.
use crate::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Environment variable naming the strategies file.
pub const OCR_CONFIG_PATH_ENV: &str = "OCR_CONFIG_PATH";
/// Strategies file used when `OCR_CONFIG_PATH` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/strategies.yaml";
/// Environment variable forcing acceleration on or off.
pub const USE_GPU_ENV: &str = "USE_GPU";
/// Environment variable overriding the accelerated batch size.
pub const GPU_BATCH_SIZE_ENV: &str = "GPU_BATCH_SIZE";
/// Batch size used when neither config nor environment sets one.
pub const DEFAULT_BATCH_SIZE: usize = 4;

const CLASS_KEY: &str = "class";

/// Per-strategy configuration mapping.
///
/// Values are kept as raw JSON so strategies can carry keys this crate knows
/// nothing about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyConfig(Map<String, Value>);

impl StrategyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Read a boolean. Accepts JSON booleans, `0`/`1` and the flag strings
    /// understood by [`parse_flag`].
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_u64().and_then(|n| match n {
                0 => Some(false),
                1 => Some(true),
                _ => None,
            }),
            Value::String(s) => parse_flag(s),
            _ => None,
        }
    }

    /// Read a non-negative integer. Numeric strings are accepted.
    pub fn get_usize(&self, key: &str) -> Option<usize> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder form of [`StrategyConfig::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for StrategyConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One entry of the `strategies` mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyEntry {
    /// Logical name as written in the file (not yet normalized).
    pub name: String,
    /// Implementation path looked up in the strategy catalog.
    pub class: String,
    /// Every key of the entry except `class`.
    pub config: StrategyConfig,
}

#[derive(Deserialize)]
struct RawEntry {
    class: Option<String>,
    #[serde(flatten)]
    config: StrategyConfig,
}

/// Parsed strategies file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategiesFile {
    pub path: Option<PathBuf>,
    pub entries: Vec<StrategyEntry>,
}

impl StrategiesFile {
    /// Build from an already-parsed document. `origin` is used in error messages.
    pub fn from_value(document: Value, origin: &str) -> Result<Self> {
        let strategies = match document {
            Value::Object(mut root) => root.remove("strategies"),
            _ => None,
        };

        let strategies = match strategies {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ExtractError::config(format!(
                    "'strategies' in {} must be a mapping of strategy names to entries",
                    origin
                )));
            }
            None => {
                return Err(ExtractError::config(format!(
                    "Missing 'strategies' section in {}",
                    origin
                )));
            }
        };

        let mut entries = Vec::with_capacity(strategies.len());
        for (name, value) in strategies {
            if !value.is_object() {
                return Err(ExtractError::config(format!(
                    "Strategy '{}' in {} is missing required '{}' key",
                    name, origin, CLASS_KEY
                )));
            }

            let raw: RawEntry = serde_json::from_value(value).map_err(|e| {
                ExtractError::config_with_source(format!("Invalid entry for strategy '{}' in {}", name, origin), e)
            })?;

            let class = match raw.class {
                Some(class) if !class.trim().is_empty() => class.trim().to_string(),
                _ => {
                    return Err(ExtractError::config(format!(
                        "Strategy '{}' in {} is missing required '{}' key",
                        name, origin, CLASS_KEY
                    )));
                }
            };

            entries.push(StrategyEntry {
                name,
                class,
                config: raw.config,
            });
        }

        Ok(Self { path: None, entries })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::parse_yaml(content, "<yaml>")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::parse_toml(content, "<toml>")
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::parse_json(content, "<json>")
    }

    /// Load a strategies file from YAML.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = read_config_file(path)?;
        Self::parse_yaml(&content, &path.display().to_string()).map(|file| file.with_path(path))
    }

    /// Load a strategies file from TOML.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = read_config_file(path)?;
        Self::parse_toml(&content, &path.display().to_string()).map(|file| file.with_path(path))
    }

    /// Load a strategies file from JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = read_config_file(path)?;
        Self::parse_json(&content, &path.display().to_string()).map(|file| file.with_path(path))
    }

    /// Load a strategies file, choosing the format from the extension.
    ///
    /// Unknown or missing extensions are read as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|ext| ext.to_str()).map(|s| s.to_lowercase());

        match extension.as_deref() {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }

    /// Discover a strategies file in parent directories.
    ///
    /// Searches for `config/strategies.yaml` in the current directory and
    /// every parent.
    ///
    /// # Returns
    ///
    /// - `Some(file)` if found
    /// - `None` if no strategies file exists up the tree
    pub fn discover() -> Result<Option<Self>> {
        let mut current = std::env::current_dir().map_err(ExtractError::Io)?;

        loop {
            let candidate = current.join(DEFAULT_CONFIG_PATH);
            if candidate.is_file() {
                return Ok(Some(Self::from_yaml_file(candidate)?));
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }

        Ok(None)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    fn parse_yaml(content: &str, origin: &str) -> Result<Self> {
        let document: Value = serde_yaml_ng::from_str(content)
            .map_err(|e| ExtractError::config_with_source(format!("Invalid YAML in {}", origin), e))?;
        Self::from_value(document, origin)
    }

    fn parse_toml(content: &str, origin: &str) -> Result<Self> {
        let document: Value = toml::from_str(content)
            .map_err(|e| ExtractError::config_with_source(format!("Invalid TOML in {}", origin), e))?;
        Self::from_value(document, origin)
    }

    fn parse_json(content: &str, origin: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(content)
            .map_err(|e| ExtractError::config_with_source(format!("Invalid JSON in {}", origin), e))?;
        Self::from_value(document, origin)
    }
}

fn read_config_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExtractError::config_with_source(format!("Config file not found at {}", path.display()), e)
        } else {
            ExtractError::config_with_source(format!("Failed to read config file {}", path.display()), e)
        }
    })
}

/// Parse a boolean flag as written in environment variables.
///
/// `true`/`1`/`yes` and `false`/`0`/`no`, case-insensitive. Anything else is `None`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Process-level settings read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// `USE_GPU`, when set to a recognised flag.
    pub use_gpu: Option<bool>,
    /// `GPU_BATCH_SIZE`, when set to a positive integer.
    pub gpu_batch_size: Option<usize>,
    /// `OCR_CONFIG_PATH`, when set and not blank.
    pub config_path: Option<PathBuf>,
}

impl RuntimeSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let use_gpu = lookup(USE_GPU_ENV).and_then(|raw| {
            let parsed = parse_flag(&raw);
            if parsed.is_none() && !raw.trim().is_empty() {
                tracing::warn!("Ignoring unrecognised {} value '{}'", USE_GPU_ENV, raw);
            }
            parsed
        });

        let gpu_batch_size = lookup(GPU_BATCH_SIZE_ENV).and_then(|raw| match raw.trim().parse::<usize>() {
            Ok(size) if size > 0 => Some(size),
            _ => {
                tracing::warn!("Ignoring invalid {} value '{}'", GPU_BATCH_SIZE_ENV, raw);
                None
            }
        });

        let config_path = lookup(OCR_CONFIG_PATH_ENV)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Self {
            use_gpu,
            gpu_batch_size,
            config_path,
        }
    }

    pub fn with_use_gpu(mut self, use_gpu: Option<bool>) -> Self {
        self.use_gpu = use_gpu;
        self
    }

    pub fn with_gpu_batch_size(mut self, size: Option<usize>) -> Self {
        self.gpu_batch_size = size;
        self
    }

    /// The strategies file to read: `OCR_CONFIG_PATH`, else `config/strategies.yaml`.
    pub fn strategies_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}
