use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    audio::types::{KeyConfig, TempoConfig},
    error::{ConfigError, Result},
    source::classify::DEFAULT_MUSIC_KEYWORDS,
};

/// Main configuration for the BPM detector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP service settings
    pub server: ServerConfig,

    /// Media download and classification settings
    pub source: SourceConfig,

    /// Beat tracking settings
    pub tempo: TempoConfig,

    /// Key estimation settings
    pub key: KeyConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            tracing::debug!("TOML error in {}: {}", path.display(), e);
            ConfigError::ParseFailed { path: path.display().to_string() }
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.source.validate()?;

        self.tempo.validate().map_err(|reason| ConfigError::InvalidValue {
            key: "tempo".to_string(),
            value: reason,
        })?;
        self.key.validate().map_err(|reason| ConfigError::InvalidValue {
            key: "key".to_string(),
            value: reason,
        })?;

        Ok(())
    }
}

/// HTTP service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,

    /// Upper bound on analyses running at the same time
    pub max_concurrent_analyses: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            max_concurrent_analyses: num_cpus::get(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "server.bind".to_string(),
                value: self.bind.clone()
            }.into());
        }

        if self.max_concurrent_analyses == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.max_concurrent_analyses".to_string(),
                value: self.max_concurrent_analyses.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Media source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Path or name of the yt-dlp executable
    pub ytdlp_path: PathBuf,

    /// Directory for per-request downloads
    pub scratch_dir: PathBuf,

    /// yt-dlp format selector
    pub format: String,

    /// Audio quality passed to the extractor
    pub audio_quality: String,

    /// Title/description keywords that mark a link as music
    pub music_keywords: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            scratch_dir: PathBuf::from("./tmp"),
            format: "bestaudio/best".to_string(),
            audio_quality: "192K".to_string(),
            music_keywords: DEFAULT_MUSIC_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        if self.ytdlp_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "source.ytdlp_path".to_string(),
                value: String::new()
            }.into());
        }

        if self.scratch_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "source.scratch_dir".to_string(),
                value: String::new()
            }.into());
        }

        if self.format.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "source.format".to_string(),
                value: self.format.clone()
            }.into());
        }

        Ok(())
    }
}
