use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::core::constants::{BASE_URL_ENV, DEFAULT_BASE_URL, DEFAULT_GREETING, DEFAULT_MODEL};
use crate::utils::url::validate_base_url;

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Model id sent with every request
    pub model: Option<String>,
    /// Base URL of an OpenAI-compatible API
    pub base_url: Option<String>,
    /// Replaces the built-in greeting shown at the top of each conversation
    pub greeting: Option<String>,
}

/// Keys accepted by `gramfix set` / `gramfix unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Model,
    BaseUrl,
    Greeting,
}

impl ConfigKey {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "model" => Some(ConfigKey::Model),
            "base-url" => Some(ConfigKey::BaseUrl),
            "greeting" => Some(ConfigKey::Greeting),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Model => "model",
            ConfigKey::BaseUrl => "base-url",
            ConfigKey::Greeting => "greeting",
        }
    }
}

/// Effective settings after applying CLI flags, environment, and config.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub model: String,
    pub base_url: String,
    pub greeting: String,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn StdError>> {
        match Self::config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, Box<dyn StdError>> {
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), Box<dyn StdError>> {
        let path = Self::config_path().ok_or("Failed to determine config directory")?;
        self.save_to_path(&path)
    }

    /// Write atomically: a temp file in the same directory is persisted over the target.
    pub fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn StdError>> {
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(config_path)
            .map_err(|err| -> Box<dyn StdError> { Box::new(err) })?;
        Ok(())
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("org", "gramfix", "gramfix")
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Default location of the diagnostic log written while the TUI runs.
    pub fn diagnostics_log_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_local_dir().join("gramfix.log"))
    }

    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<(), String> {
        let value = value.trim();
        if value.is_empty() {
            return Err(format!("{} cannot be empty", key.as_str()));
        }
        match key {
            ConfigKey::Model => self.model = Some(value.to_string()),
            ConfigKey::BaseUrl => self.base_url = Some(validate_base_url(value)?),
            ConfigKey::Greeting => self.greeting = Some(value.to_string()),
        }
        Ok(())
    }

    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::Model => self.model = None,
            ConfigKey::BaseUrl => self.base_url = None,
            ConfigKey::Greeting => self.greeting = None,
        }
    }

    /// Merge CLI overrides, `GRAMFIX_BASE_URL`, and this config over the defaults.
    pub fn resolve(
        &self,
        model_override: Option<&str>,
        base_url_override: Option<&str>,
        env_lookup: impl Fn(&str) -> Option<String>,
    ) -> ResolvedSettings {
        let model = model_override
            .map(str::to_string)
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = base_url_override
            .map(str::to_string)
            .or_else(|| env_lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()))
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let greeting = self
            .greeting
            .clone()
            .unwrap_or_else(|| DEFAULT_GREETING.to_string());

        ResolvedSettings {
            model,
            base_url,
            greeting,
        }
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "(unset)".to_string());
        println!("  model: {}", show(&self.model));
        println!("  base-url: {}", show(&self.base_url));
        println!("  greeting: {}", show(&self.greeting));
    }
}
