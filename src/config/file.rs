//! TOML configuration file loading
//!
//! Supports `~/.config/alfred/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AlfredConfigFile {
    /// Wake token that must prefix every command (e.g. "alfred")
    #[serde(default)]
    pub wake_word: Option<String>,

    /// Name the assistant answers to in its persona prompt
    #[serde(default)]
    pub assistant_name: Option<String>,

    /// Full system prompt override
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Streaming speech synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// Capability configuration
    #[serde(default)]
    pub tools: ToolsFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// OpenAI-compatible base URL (e.g. `https://api.openai.com/v1`)
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// Maximum tool-call rounds per turn
    pub max_tool_steps: Option<u32>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Transcription model (e.g. "whisper-1")
    pub model: Option<String>,
    pub language: Option<String>,
}

/// Streaming synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    /// Websocket base URL (e.g. `wss://api.elevenlabs.io`)
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub stability: Option<f32>,
    pub similarity_boost: Option<f32>,
    pub speed: Option<f32>,
    /// Seconds to wait between reconnect attempts
    pub reconnect_backoff_secs: Option<u64>,
    /// Seconds to wait for remaining audio after end-of-utterance
    pub drain_timeout_secs: Option<u64>,
    /// Server-side idle timeout requested on connect
    pub inactivity_timeout_secs: Option<u64>,
}

/// Capability configuration
#[derive(Debug, Default, Deserialize)]
pub struct ToolsFileConfig {
    pub brave_api_key: Option<String>,
    pub maps_api_key: Option<String>,
    /// Google OAuth access token (acquired externally)
    pub google_access_token: Option<String>,
    /// JSON file holding an `access_token` field
    pub google_token_path: Option<String>,
    /// Time zone attached to created calendar events
    pub calendar_time_zone: Option<String>,
    /// Answer for `get_current_location`
    pub location: Option<String>,
    /// Launch the shared browser session at startup
    pub browser_enabled: Option<bool>,
    pub browser_headless: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AlfredConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AlfredConfigFile {
    let Some(path) = config_file_path() else {
        return AlfredConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_config_file_from(path: &Path) -> AlfredConfigFile {
    if !path.exists() {
        return AlfredConfigFile::default();
    }

    match std::fs::read_to_string(path) {
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
                AlfredConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AlfredConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/alfred/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("alfred").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let fc = load_config_file_from(Path::new("/definitely/not/here.toml"));
        assert!(fc.wake_word.is_none());
        assert!(fc.llm.model.is_none());
    }

    #[test]
    fn partial_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "wake_word = \"jarvis\"\n[llm]\nmodel = \"gpt-4o\"\n[synthesis]\ndrain_timeout_secs = 2\n",
        )
        .unwrap();

        let fc = load_config_file_from(&path);
        assert_eq!(fc.wake_word.as_deref(), Some("jarvis"));
        assert_eq!(fc.llm.model.as_deref(), Some("gpt-4o"));
        assert_eq!(fc.synthesis.drain_timeout_secs, Some(2));
        assert!(fc.tools.location.is_none());
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "wake_word = [").unwrap();

        let fc = load_config_file_from(&path);
        assert!(fc.wake_word.is_none());
    }
}
