//! Wake word gating
//!
//! Every command must start with the wake token. Anything else the
//! microphone picks up is ignored.

/// Outcome of gating a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Wake token followed by a command (token and separators stripped)
    Command(String),
    /// Wake token with nothing after it
    WakeOnly,
    /// Transcript does not start with the wake token
    Ignored,
}

/// Case-insensitive wake token matcher
#[derive(Debug, Clone)]
pub struct WakeWord {
    token: String,
}

impl WakeWord {
    /// Create a matcher for `token` (e.g. "alfred")
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            token: token.trim().to_lowercase(),
        }
    }

    /// The normalized wake token
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Gate a transcript on the wake token
    ///
    /// The transcript must begin with the token (after trimming, ignoring
    /// case) and the token must end at a word boundary. Punctuation the
    /// recognizer attaches to the token ("Alfred, ...") is stripped along
    /// with the surrounding whitespace.
    #[must_use]
    pub fn gate(&self, transcript: &str) -> Gate {
        let trimmed = transcript.trim();

        let Some(prefix) = trimmed.get(..self.token.len()) else {
            return Gate::Ignored;
        };
        if self.token.is_empty() || prefix.to_lowercase() != self.token {
            return Gate::Ignored;
        }

        let rest = &trimmed[self.token.len()..];
        if rest.chars().next().is_some_and(char::is_alphanumeric) {
            return Gate::Ignored;
        }

        let command = rest.trim_start_matches(is_separator).trim_end();

        if command.is_empty() {
            Gate::WakeOnly
        } else {
            Gate::Command(command.to_string())
        }
    }
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?' | ':' | ';' | '-')
}
