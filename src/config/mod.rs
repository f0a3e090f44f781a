//! Configuration management for the hearth daemon
//!
//! Startup configuration: TOML file overlaid with environment variables.
//! Runtime signaling state lives in [`crate::store::ConfigStore`] instead.

pub mod file;

use std::path::PathBuf;

use crate::{Error, Result};

/// Default system prompt: the assistant's companion persona
const DEFAULT_SYSTEM_PROMPT: &str = "你不只是一个 AI，你是用户的朋友，能够陪他们聊天、分享趣事、倾听烦恼，并给予温暖的回应。\
你的语气应该自然、有情感，像一个真正的朋友那样，时而幽默，时而共情，时而给出真诚的建议。\
你不会使用生硬的机器人语言，而是像人一样表达，让对话更生动。\
要求回复简单口语化，不要出现表情符号和括号来表达语气。请记住你的名字永远叫蛋卷，不要忘记";

/// Resolved daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory (history, audit log, cached audio)
    pub data_dir: PathBuf,

    /// Cached/cue audio directory (under `data_dir`)
    pub sound_dir: PathBuf,

    /// Azure speech services
    pub azure: AzureConfig,

    /// Chat completion backend
    pub chat: ChatConfig,

    /// Weather API
    pub weather: WeatherConfig,

    /// Wake sources
    pub wake: WakeConfig,

    /// Music playback
    pub music: MusicConfig,

    /// Enable the device-control intent handler
    pub devices_enabled: bool,

    /// Dashboard server
    pub server: ServerConfig,
}

/// Azure speech services configuration
#[derive(Debug, Clone)]
pub struct AzureConfig {
    /// Subscription key (empty disables cloud STT/TTS)
    pub key: String,

    /// Service region
    pub region: String,

    /// Recognition language
    pub language: String,

    /// Synthesis voice
    pub voice: String,
}

/// Chat completion backend configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Completions endpoint URL
    pub api_url: String,

    /// Bearer token
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Stream tokens into TTS as they arrive
    pub streaming: bool,

    /// Max tokens per completion
    pub max_tokens: u32,

    /// History eviction threshold (reported total tokens)
    pub token_threshold: u32,

    /// System prompt
    pub system_prompt: String,
}

/// Weather API configuration
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    /// API key (empty disables weather lookups)
    pub key: String,

    /// API host
    pub host: String,

    /// Default city when none is spoken
    pub default_city: String,
}

/// Wake source configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Enable the always-listening hotword detector
    pub hotword: bool,

    /// Wake phrases
    pub wake_words: Vec<String>,

    /// Enable GPIO edge wake sources
    pub gpio: bool,

    /// Automatically start a follow-up turn after each reply
    pub continuous_dialog: bool,
}

/// Music configuration
#[derive(Debug, Clone)]
pub struct MusicConfig {
    /// Enable the music intent handler
    pub enabled: bool,

    /// Music API base URL
    pub api_url: String,
}

/// Dashboard server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Static dashboard files directory
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration: defaults < config file < environment
    ///
    /// # Errors
    ///
    /// Returns error if no data directory can be resolved or created.
    pub fn load() -> Result<Self> {
        let file = file::load_config_file();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| {
                directories::BaseDirs::new().map(|d| d.data_dir().join("hearth"))
            })
            .ok_or_else(|| Error::Config("cannot resolve data directory".to_string()))?;
        let sound_dir = data_dir.join("sound");
        std::fs::create_dir_all(&sound_dir)?;

        let azure = AzureConfig {
            key: env_or("HEARTH_AZURE_KEY", file.azure.key),
            region: file.azure.region.unwrap_or_else(|| "eastasia".to_string()),
            language: file.azure.language.unwrap_or_else(|| "zh-CN".to_string()),
            voice: file
                .azure
                .voice
                .unwrap_or_else(|| "zh-CN-XiaoxiaoNeural".to_string()),
        };

        let chat = ChatConfig {
            api_url: file
                .chat
                .api_url
                .unwrap_or_else(|| "https://api.siliconflow.cn/v1/chat/completions".to_string()),
            api_key: env_or("HEARTH_CHAT_KEY", file.chat.api_key),
            model: file
                .chat
                .model
                .unwrap_or_else(|| "deepseek-ai/DeepSeek-V3".to_string()),
            streaming: file.chat.streaming.unwrap_or(true),
            max_tokens: file.chat.max_tokens.unwrap_or(1024),
            token_threshold: file.chat.token_threshold.unwrap_or(1200),
            system_prompt: file
                .chat
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        };

        let weather = WeatherConfig {
            key: env_or("HEARTH_WEATHER_KEY", file.weather.key),
            host: file
                .weather
                .host
                .unwrap_or_else(|| "devapi.qweather.com".to_string()),
            default_city: file.weather.default_city.unwrap_or_else(|| "北京".to_string()),
        };

        let wake = WakeConfig {
            hotword: file.wake.hotword.unwrap_or(false),
            wake_words: file
                .wake
                .wake_words
                .unwrap_or_else(|| vec!["小小".to_string(), "晓晓".to_string()]),
            gpio: file.wake.gpio.unwrap_or(false),
            continuous_dialog: file.wake.continuous_dialog.unwrap_or(true),
        };

        let music = MusicConfig {
            enabled: file.music.enabled.unwrap_or(false),
            api_url: file
                .music
                .api_url
                .unwrap_or_else(|| "http://127.0.0.1:3300".to_string()),
        };

        let server = ServerConfig {
            port: std::env::var("HEARTH_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .or(file.server.port)
                .unwrap_or(5000),
            static_dir: file.server.static_dir.map(PathBuf::from),
        };

        Ok(Self {
            data_dir,
            sound_dir,
            azure,
            chat,
            weather,
            wake,
            music,
            devices_enabled: file.devices.enabled.unwrap_or(true),
            server,
        })
    }

    /// Path of the persisted chat history
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("message.data")
    }

    /// Path of the tracked-config audit log
    #[must_use]
    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join("config_state.log")
    }
}

/// Env var override falling back to the file value, then empty
fn env_or(var: &str, file_value: Option<String>) -> String {
    std::env::var(var).ok().or(file_value).unwrap_or_default()
}
