//! TOML configuration file loading
//!
//! Supports `~/.config/hearth/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HearthConfigFile {
    /// Data directory override (history, logs, cached audio)
    pub data_dir: Option<String>,

    /// Azure speech services configuration
    #[serde(default)]
    pub azure: AzureFileConfig,

    /// Chat backend configuration
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Weather API configuration
    #[serde(default)]
    pub weather: WeatherFileConfig,

    /// Wake source configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Music playback configuration
    #[serde(default)]
    pub music: MusicFileConfig,

    /// Device control configuration
    #[serde(default)]
    pub devices: DevicesFileConfig,

    /// Dashboard server configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Azure speech services (STT + TTS share one subscription key)
#[derive(Debug, Default, Deserialize)]
pub struct AzureFileConfig {
    /// Subscription key
    pub key: Option<String>,

    /// Service region (e.g. "eastasia")
    pub region: Option<String>,

    /// Recognition language (e.g. "zh-CN")
    pub language: Option<String>,

    /// Synthesis voice (e.g. "zh-CN-XiaoxiaoNeural")
    pub voice: Option<String>,
}

/// Chat completion backend
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Completions endpoint URL
    pub api_url: Option<String>,

    /// Bearer token
    pub api_key: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Stream tokens into TTS as they arrive (batch synthesis when false)
    pub streaming: Option<bool>,

    /// Max tokens per completion
    pub max_tokens: Option<u32>,

    /// History eviction threshold (reported total tokens)
    pub token_threshold: Option<u32>,

    /// System prompt override
    pub system_prompt: Option<String>,
}

/// Weather lookups (QWeather-compatible API)
#[derive(Debug, Default, Deserialize)]
pub struct WeatherFileConfig {
    /// API key
    pub key: Option<String>,

    /// API host (e.g. "devapi.qweather.com")
    pub host: Option<String>,

    /// Default city when none is spoken
    pub default_city: Option<String>,
}

/// Wake sources
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Enable the always-listening hotword detector
    pub hotword: Option<bool>,

    /// Wake phrases the detector matches against
    pub wake_words: Option<Vec<String>>,

    /// Enable GPIO edge wake sources
    pub gpio: Option<bool>,

    /// Automatically start a follow-up turn after each reply
    pub continuous_dialog: Option<bool>,
}

/// Music playback via a local music API service
#[derive(Debug, Default, Deserialize)]
pub struct MusicFileConfig {
    /// Enable the music intent handler
    pub enabled: Option<bool>,

    /// Music API base URL (e.g. "http://127.0.0.1:3300")
    pub api_url: Option<String>,
}

/// Device control (LED, buzzer, climate sensor)
#[derive(Debug, Default, Deserialize)]
pub struct DevicesFileConfig {
    /// Enable the device-control intent handler
    pub enabled: Option<bool>,
}

/// Dashboard server
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Port to listen on
    pub port: Option<u16>,

    /// Static dashboard files directory
    pub static_dir: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HearthConfigFile::default()` if the file doesn't exist or can't
/// be parsed.
#[must_use]
pub fn load_config_file() -> HearthConfigFile {
    let Some(path) = config_file_path() else {
        return HearthConfigFile::default();
    };

    if !path.exists() {
        return HearthConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HearthConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HearthConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/hearth/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("hearth").join("config.toml"))
}
