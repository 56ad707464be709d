//! Configuration management for Alfred
//!
//! Layers, lowest to highest precedence: built-in defaults, the TOML file
//! (see [`file`]), then environment variables (a `.env` file is loaded first).

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};
use file::AlfredConfigFile;

/// Default wake token
pub const DEFAULT_WAKE_WORD: &str = "alfred";

/// Default OpenAI-compatible API base
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Default streaming synthesis endpoint
const DEFAULT_SYNTHESIS_BASE: &str = "wss://api.elevenlabs.io";

/// Alfred configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake token that must prefix every command
    pub wake_word: String,

    /// Name used in the persona prompt
    pub assistant_name: String,

    /// System prompt override (persona prompt is built otherwise)
    pub system_prompt: Option<String>,

    /// Language model configuration
    pub llm: LlmConfig,

    /// Speech-to-text configuration
    pub stt: SttConfig,

    /// Streaming synthesis configuration
    pub synthesis: SynthesisConfig,

    /// Capability configuration
    pub tools: ToolsConfig,
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL including `/v1`
    pub base_url: String,

    /// API key (`OPENAI_API_KEY`)
    pub api_key: Option<SecretString>,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum Act steps per turn before the fallback answer is used
    pub max_tool_steps: u32,
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// OpenAI-compatible base URL including `/v1`
    pub base_url: String,

    /// API key (`OPENAI_API_KEY` unless overridden by `ALFRED_STT_API_KEY`)
    pub api_key: Option<SecretString>,

    /// Transcription model
    pub model: String,

    /// Spoken language hint
    pub language: Option<String>,

    /// Delay before retrying after a recognition error
    pub retry_delay: Duration,
}

/// Streaming synthesis configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Websocket base URL
    pub base_url: String,

    /// API key (`ELEVENLABS_API_KEY`)
    pub api_key: Option<SecretString>,

    /// Voice identifier
    pub voice_id: String,

    /// Synthesis model identifier
    pub model_id: String,

    /// Output PCM sample rate (16-bit mono)
    pub sample_rate: u32,

    pub stability: f32,
    pub similarity_boost: f32,
    pub speed: f32,

    /// Fixed wait between reconnect attempts
    pub reconnect_backoff: Duration,

    /// How long to wait for remaining audio once an utterance is flushed
    pub drain_timeout: Duration,

    /// Server-side idle timeout requested on connect
    pub inactivity_timeout: Duration,
}

/// Capability configuration
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Brave Search API key (`BRAVE_API_KEY`)
    pub brave_api_key: Option<SecretString>,

    /// Google Maps API key (`MAPS_API_KEY`)
    pub maps_api_key: Option<SecretString>,

    /// Google OAuth access token (`GOOGLE_ACCESS_TOKEN`)
    pub google_access_token: Option<SecretString>,

    /// JSON token file with an `access_token` field
    pub google_token_path: Option<PathBuf>,

    /// Time zone for created calendar events
    pub calendar_time_zone: String,

    /// Answer for `get_current_location`
    pub location: String,

    /// Launch the shared browser at startup
    pub browser_enabled: bool,

    /// Run the browser headless
    pub browser_headless: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake_word: DEFAULT_WAKE_WORD.to_string(),
            assistant_name: "Alfred".to_string(),
            system_prompt: None,
            llm: LlmConfig {
                base_url: DEFAULT_OPENAI_BASE.to_string(),
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                temperature: 0.6,
                max_tool_steps: 8,
            },
            stt: SttConfig {
                base_url: DEFAULT_OPENAI_BASE.to_string(),
                api_key: None,
                model: "whisper-1".to_string(),
                language: Some("en".to_string()),
                retry_delay: Duration::from_millis(500),
            },
            synthesis: SynthesisConfig {
                base_url: DEFAULT_SYNTHESIS_BASE.to_string(),
                api_key: None,
                voice_id: "nct9BC7xtGbUtQlT3ptu".to_string(),
                model_id: "eleven_flash_v2_5".to_string(),
                sample_rate: 24_000,
                stability: 0.4,
                similarity_boost: 0.8,
                speed: 1.1,
                reconnect_backoff: Duration::from_secs(5),
                drain_timeout: Duration::from_secs(5),
                inactivity_timeout: Duration::from_secs(180),
            },
            tools: ToolsConfig {
                brave_api_key: None,
                maps_api_key: None,
                google_access_token: None,
                google_token_path: None,
                calendar_time_zone: "America/Toronto".to_string(),
                location: "Montreal, Quebec, Canada.".to_string(),
                browser_enabled: true,
                browser_headless: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the config file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    #[allow(clippy::too_many_lines)]
    pub fn from_sources<F>(fc: AlfredConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secret = |value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };
        let parse_env = |key: &str| -> Option<u64> { env(key).and_then(|v| v.parse().ok()) };

        let wake_word = env("ALFRED_WAKE_WORD")
            .or(fc.wake_word)
            .unwrap_or(defaults.wake_word)
            .trim()
            .to_string();
        if wake_word.is_empty() {
            return Err(Error::Config("wake word must not be empty".to_string()));
        }

        let openai_key = env("OPENAI_API_KEY");

        let llm = LlmConfig {
            base_url: env("ALFRED_LLM_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or(defaults.llm.base_url),
            api_key: secret(openai_key.clone().or(fc.llm.api_key)),
            model: env("ALFRED_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or(defaults.llm.model),
            temperature: fc
                .llm
                .temperature
                .unwrap_or(defaults.llm.temperature)
                .clamp(0.0, 2.0),
            max_tool_steps: parse_env("ALFRED_MAX_TOOL_STEPS")
                .and_then(|v| u32::try_from(v).ok())
                .or(fc.llm.max_tool_steps)
                .unwrap_or(defaults.llm.max_tool_steps)
                .max(1),
        };

        let stt = SttConfig {
            base_url: env("ALFRED_STT_BASE_URL")
                .or(fc.stt.base_url)
                .unwrap_or(defaults.stt.base_url),
            api_key: secret(env("ALFRED_STT_API_KEY").or(openai_key).or(fc.stt.api_key)),
            model: env("ALFRED_STT_MODEL")
                .or(fc.stt.model)
                .unwrap_or(defaults.stt.model),
            language: fc.stt.language.or(defaults.stt.language),
            retry_delay: defaults.stt.retry_delay,
        };

        let fs = fc.synthesis;
        let synthesis = SynthesisConfig {
            base_url: env("ALFRED_SYNTHESIS_URL")
                .or(fs.base_url)
                .unwrap_or(defaults.synthesis.base_url),
            api_key: secret(env("ELEVENLABS_API_KEY").or(fs.api_key)),
            voice_id: env("ALFRED_VOICE_ID")
                .or(fs.voice_id)
                .unwrap_or(defaults.synthesis.voice_id),
            model_id: fs.model_id.unwrap_or(defaults.synthesis.model_id),
            sample_rate: defaults.synthesis.sample_rate,
            stability: fs.stability.unwrap_or(defaults.synthesis.stability),
            similarity_boost: fs
                .similarity_boost
                .unwrap_or(defaults.synthesis.similarity_boost),
            speed: fs.speed.unwrap_or(defaults.synthesis.speed),
            reconnect_backoff: fs
                .reconnect_backoff_secs
                .map_or(defaults.synthesis.reconnect_backoff, Duration::from_secs),
            drain_timeout: fs
                .drain_timeout_secs
                .map_or(defaults.synthesis.drain_timeout, Duration::from_secs),
            inactivity_timeout: fs
                .inactivity_timeout_secs
                .map_or(defaults.synthesis.inactivity_timeout, Duration::from_secs),
        };

        let ft = fc.tools;
        let tools = ToolsConfig {
            brave_api_key: secret(env("BRAVE_API_KEY").or(ft.brave_api_key)),
            maps_api_key: secret(env("MAPS_API_KEY").or(ft.maps_api_key)),
            google_access_token: secret(env("GOOGLE_ACCESS_TOKEN").or(ft.google_access_token)),
            google_token_path: env("GOOGLE_TOKEN_PATH")
                .or(ft.google_token_path)
                .map(PathBuf::from),
            calendar_time_zone: ft
                .calendar_time_zone
                .unwrap_or(defaults.tools.calendar_time_zone),
            location: env("ALFRED_LOCATION")
                .or(ft.location)
                .unwrap_or(defaults.tools.location),
            browser_enabled: env("ALFRED_DISABLE_BROWSER").map_or_else(
                || ft.browser_enabled.unwrap_or(defaults.tools.browser_enabled),
                |v| !matches!(v.as_str(), "1" | "true"),
            ),
            browser_headless: ft
                .browser_headless
                .unwrap_or(defaults.tools.browser_headless),
        };

        Ok(Self {
            wake_word,
            assistant_name: fc.assistant_name.unwrap_or(defaults.assistant_name),
            system_prompt: fc.system_prompt,
            llm,
            stt,
            synthesis,
            tools,
        })
    }

    /// Log a warning for every capability whose credentials are missing
    pub fn warn_missing_credentials(&self) {
        if self.llm.api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set - the agent cannot answer");
        }
        if self.stt.api_key.is_none() {
            tracing::warn!("no STT API key set - transcription will fail");
        }
        if self.synthesis.api_key.is_none() {
            tracing::warn!("ELEVENLABS_API_KEY not set - speech synthesis will fail");
        }
        if self.tools.brave_api_key.is_none() {
            tracing::warn!("BRAVE_API_KEY not set - web search will not be available");
        }
        if self.tools.maps_api_key.is_none() {
            tracing::warn!("MAPS_API_KEY not set - travel duration will not be available");
        }
    }
}
