//! Streaming text-to-speech protocol
//!
//! Frame types for the ElevenLabs `stream-input` websocket. The connection
//! handling itself lives in the synthesis stage.

use base64::Engine as _;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::SynthesisConfig;
use crate::{Error, Result};

/// Voice tuning sent with the configuration frame
#[derive(Debug, Clone, Copy, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    speed: f32,
}

/// Client frames
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ClientFrame<'a> {
    /// First frame on every connection. `text` must be a single space.
    Configure {
        text: &'static str,
        voice_settings: VoiceSettings,
        xi_api_key: &'a str,
    },
    /// Text to speak, or the empty string to end the utterance
    Text { text: &'a str },
}

/// Raw server frame
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerFrame {
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    is_final: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Decoded server event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Raw PCM bytes
    Audio(Vec<u8>),
    /// The backend finished the current utterance
    Final,
    /// The backend reported an error
    Failure(String),
    /// Anything else (alignment-only frames, keepalives)
    Other,
}

/// Build the websocket URL for a synthesis configuration
#[must_use]
pub fn stream_url(config: &SynthesisConfig) -> String {
    format!(
        "{}/v1/text-to-speech/{}/stream-input?model_id={}&output_format=pcm_{}&inactivity_timeout={}",
        config.base_url.trim_end_matches('/'),
        urlencoding::encode(&config.voice_id),
        urlencoding::encode(&config.model_id),
        config.sample_rate,
        config.inactivity_timeout.as_secs()
    )
}

/// The configuration frame opening every connection
///
/// # Errors
///
/// Returns error if no API key is configured
pub fn config_frame(config: &SynthesisConfig) -> Result<String> {
    let api_key = config
        .api_key
        .as_ref()
        .ok_or(Error::Unavailable("synthesis API key"))?;

    let frame = ClientFrame::Configure {
        text: " ",
        voice_settings: VoiceSettings {
            stability: config.stability,
            similarity_boost: config.similarity_boost,
            speed: config.speed,
        },
        xi_api_key: api_key.expose_secret(),
    };
    Ok(serde_json::to_string(&frame)?)
}

/// A text frame for one increment
///
/// The increment is trimmed and a single trailing space appended so
/// consecutive increments don't run together. Whitespace-only increments
/// produce no frame.
#[must_use]
pub fn text_frame(increment: &str) -> Option<String> {
    let trimmed = increment.trim();
    if trimmed.is_empty() {
        return None;
    }
    let text = format!("{trimmed} ");
    serde_json::to_string(&ClientFrame::Text { text: &text }).ok()
}

/// The end-of-utterance frame (`{"text":""}`)
#[must_use]
pub fn end_of_utterance_frame() -> String {
    r#"{"text":""}"#.to_string()
}

/// Decode a server text frame
///
/// # Errors
///
/// Returns error if the frame is not valid JSON or carries invalid base64
pub fn parse_server_frame(text: &str) -> Result<ServerEvent> {
    let frame: ServerFrame = serde_json::from_str(text)?;

    if let Some(error) = frame.error {
        let detail = frame.message.map_or(error.clone(), |m| format!("{error}: {m}"));
        return Ok(ServerEvent::Failure(detail));
    }

    if let Some(audio) = frame.audio.filter(|a| !a.is_empty()) {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(audio)
            .map_err(|e| Error::Synthesis(format!("invalid audio payload: {e}")))?;
        return Ok(ServerEvent::Audio(bytes));
    }

    if frame.is_final == Some(true) {
        return Ok(ServerEvent::Final);
    }

    Ok(ServerEvent::Other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn synthesis_config() -> SynthesisConfig {
        let mut config = Config::default().synthesis;
        config.api_key = Some("xi-test".to_string().into());
        config
    }

    #[test]
    fn url_carries_voice_and_format() {
        let url = stream_url(&synthesis_config());
        assert_eq!(
            url,
            "wss://api.elevenlabs.io/v1/text-to-speech/nct9BC7xtGbUtQlT3ptu/stream-input\
             ?model_id=eleven_flash_v2_5&output_format=pcm_24000&inactivity_timeout=180"
        );
    }

    #[test]
    fn config_frame_shape() {
        let frame = config_frame(&synthesis_config()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["text"], " ");
        assert_eq!(value["xi_api_key"], "xi-test");
        assert!(value["voice_settings"]["stability"].is_number());
    }

    #[test]
    fn config_frame_requires_key() {
        let config = Config::default().synthesis;
        assert!(matches!(
            config_frame(&config),
            Err(Error::Unavailable(_))
        ));
    }

    #[test]
    fn text_frames_are_trimmed_with_trailing_space() {
        assert_eq!(text_frame("Hello").as_deref(), Some(r#"{"text":"Hello "}"#));
        assert_eq!(text_frame(" there").as_deref(), Some(r#"{"text":"there "}"#));
        assert_eq!(text_frame("   \n"), None);
        assert_eq!(end_of_utterance_frame(), r#"{"text":""}"#);
    }

    #[test]
    fn server_frames() {
        assert_eq!(
            parse_server_frame(r#"{"audio":"AAE=","isFinal":false}"#).unwrap(),
            ServerEvent::Audio(vec![0x00, 0x01])
        );
        assert_eq!(
            parse_server_frame(r#"{"audio":null,"isFinal":true}"#).unwrap(),
            ServerEvent::Final
        );
        assert_eq!(
            parse_server_frame(r#"{"alignment":{}}"#).unwrap(),
            ServerEvent::Other
        );
        assert!(matches!(
            parse_server_frame(r#"{"error":"quota","message":"exceeded"}"#).unwrap(),
            ServerEvent::Failure(ref m) if m == "quota: exceeded"
        ));
        assert!(parse_server_frame("not json").is_err());
        assert!(parse_server_frame(r#"{"audio":"@@@"}"#).is_err());
    }
}
