//! Gmail and Google Calendar over REST
//!
//! Uses an OAuth access token acquired outside this process, from
//! `GOOGLE_ACCESS_TOKEN` or a JSON token file with an `access_token` field.

use std::path::Path;

use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ToolsConfig;
use crate::{Error, Result};

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com";
const CALENDAR_BASE_URL: &str = "https://www.googleapis.com";

#[derive(Debug, Deserialize)]
struct TokenFile {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageMetadata {
    payload: MessagePayload,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(default)]
    summary: Option<String>,
    start: EventTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    #[serde(default)]
    date_time: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewEvent<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    start: NewEventTime<'a>,
    end: NewEventTime<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewEventTime<'a> {
    date_time: &'a str,
    time_zone: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedEvent {
    #[serde(default)]
    html_link: Option<String>,
}

/// Fields of a calendar event to create
#[derive(Debug, Clone)]
pub struct EventDraft<'a> {
    pub summary: &'a str,
    /// ISO 8601 with offset, e.g. `2025-07-15T10:00:00-04:00`
    pub start_time: &'a str,
    pub end_time: &'a str,
    pub location: Option<&'a str>,
    pub description: Option<&'a str>,
}

/// Resolve the Google access token from configuration
///
/// The explicit token wins over the token file. Returns `None` when neither
/// yields a token.
pub fn load_access_token(config: &ToolsConfig) -> Option<SecretString> {
    if let Some(token) = &config.google_access_token {
        return Some(token.clone());
    }

    let path = config.google_token_path.as_deref()?;
    match read_token_file(path) {
        Ok(token) => Some(token),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read Google token file");
            None
        }
    }
}

fn read_token_file(path: &Path) -> Result<SecretString> {
    let content = std::fs::read_to_string(path)?;
    let file: TokenFile = serde_json::from_str(&content)?;
    if file.access_token.trim().is_empty() {
        return Err(Error::Config("token file has an empty access_token".to_string()));
    }
    Ok(SecretString::from(file.access_token))
}

/// Gmail and Calendar client for the signed-in account
#[derive(Debug, Clone)]
pub struct GoogleClient {
    client: reqwest::Client,
    token: SecretString,
    gmail_base: String,
    calendar_base: String,
    time_zone: String,
}

impl GoogleClient {
    #[must_use]
    pub fn new(token: SecretString, time_zone: &str) -> Self {
        Self::with_base_urls(token, time_zone, GMAIL_BASE_URL, CALENDAR_BASE_URL)
    }

    #[must_use]
    pub fn with_base_urls(
        token: SecretString,
        time_zone: &str,
        gmail_base: &str,
        calendar_base: &str,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            gmail_base: gmail_base.trim_end_matches('/').to_string(),
            calendar_base: calendar_base.trim_end_matches('/').to_string(),
            time_zone: time_zone.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .query(query)
            .send()
            .await?;
        Self::check(response).await?.json().await.map_err(Error::Http)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let hint = if status == reqwest::StatusCode::UNAUTHORIZED {
            " (the access token may have expired)"
        } else {
            ""
        };
        Err(Error::Tool(format!("Google API error {status}{hint}: {body}")))
    }

    /// Sender and subject of up to `max_results` unread inbox messages
    ///
    /// # Errors
    ///
    /// Returns error if the Gmail API fails
    pub async fn list_unread(&self, max_results: u32) -> Result<Vec<String>> {
        let base = format!("{}/gmail/v1/users/me/messages", self.gmail_base);
        let list: MessageList = self
            .get_json(
                &base,
                &[
                    ("labelIds", "INBOX".to_string()),
                    ("labelIds", "UNREAD".to_string()),
                    ("q", "is:unread".to_string()),
                    ("maxResults", max_results.max(1).to_string()),
                ],
            )
            .await?;

        if list.messages.is_empty() {
            return Ok(vec!["No unread messages found.".to_string()]);
        }

        let mut lines = Vec::with_capacity(list.messages.len());
        for message in list.messages {
            let metadata: MessageMetadata = self
                .get_json(
                    &format!("{base}/{}", message.id),
                    &[
                        ("format", "metadata".to_string()),
                        ("metadataHeaders", "Subject".to_string()),
                        ("metadataHeaders", "From".to_string()),
                    ],
                )
                .await?;

            let header = |name: &str| {
                metadata
                    .payload
                    .headers
                    .iter()
                    .find(|h| h.name.eq_ignore_ascii_case(name))
                    .map_or("(unknown)", |h| h.value.as_str())
                    .to_string()
            };
            lines.push(format!("From: {} - Subject: {}", header("From"), header("Subject")));
        }

        Ok(lines)
    }

    /// Send a plain-text email
    ///
    /// # Errors
    ///
    /// Returns error if the Gmail API rejects the message
    pub async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<String> {
        if to.contains(['\r', '\n']) || subject.contains(['\r', '\n']) {
            return Err(Error::Tool("recipient and subject must be single lines".to_string()));
        }

        let raw = base64::engine::general_purpose::URL_SAFE
            .encode(format!("To: {to}\r\nSubject: {subject}\r\n\r\n{body}"));

        let response = self
            .client
            .post(format!("{}/gmail/v1/users/me/messages/send", self.gmail_base))
            .bearer_auth(self.token.expose_secret())
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await?;
        let sent: SentMessage = Self::check(response).await?.json().await?;

        tracing::info!(to, message_id = %sent.id, "email sent");
        Ok(format!("Email sent successfully to {to}. Message ID: {}", sent.id))
    }

    /// Upcoming events on the primary calendar
    ///
    /// # Errors
    ///
    /// Returns error if the Calendar API fails
    pub async fn list_events(&self, max_results: u32) -> Result<String> {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let events: EventList = self
            .get_json(
                &format!("{}/calendar/v3/calendars/primary/events", self.calendar_base),
                &[
                    ("timeMin", now),
                    ("maxResults", max_results.max(1).to_string()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                ],
            )
            .await?;

        if events.items.is_empty() {
            return Ok("No upcoming events found.".to_string());
        }

        let lines: Vec<String> = events
            .items
            .iter()
            .map(|event| {
                let start = event
                    .start
                    .date_time
                    .as_deref()
                    .or(event.start.date.as_deref())
                    .unwrap_or("unknown time");
                let summary = event.summary.as_deref().unwrap_or("(no title)");
                format!("- {summary} (Starts: {start})")
            })
            .collect();

        Ok(lines.join("\n"))
    }

    /// Create an event on the primary calendar
    ///
    /// # Errors
    ///
    /// Returns error if the times are not RFC 3339 or the API rejects the event
    pub async fn create_event(&self, draft: &EventDraft<'_>) -> Result<String> {
        for time in [draft.start_time, draft.end_time] {
            chrono::DateTime::parse_from_rfc3339(time).map_err(|e| {
                Error::Tool(format!("'{time}' is not an ISO 8601 time with offset: {e}"))
            })?;
        }

        let event = NewEvent {
            summary: draft.summary,
            location: draft.location,
            description: draft.description,
            start: NewEventTime {
                date_time: draft.start_time,
                time_zone: &self.time_zone,
            },
            end: NewEventTime {
                date_time: draft.end_time,
                time_zone: &self.time_zone,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/calendar/v3/calendars/primary/events",
                self.calendar_base
            ))
            .bearer_auth(self.token.expose_secret())
            .json(&event)
            .send()
            .await?;
        let created: CreatedEvent = Self::check(response).await?.json().await?;

        tracing::info!(summary = draft.summary, "calendar event created");
        Ok(format!(
            "Event created successfully: {}",
            created.html_link.unwrap_or_default()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn explicit_token_wins() {
        let mut tools = Config::default().tools;
        tools.google_access_token = Some(SecretString::from("ya29.token".to_string()));
        tools.google_token_path = Some("/nonexistent.json".into());
        let token = load_access_token(&tools).unwrap();
        assert_eq!(token.expose_secret(), "ya29.token");
    }

    #[test]
    fn token_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token":"from-file","expires_in":3599}"#).unwrap();

        let mut tools = Config::default().tools;
        tools.google_token_path = Some(path);
        let token = load_access_token(&tools).unwrap();
        assert_eq!(token.expose_secret(), "from-file");
    }

    #[test]
    fn missing_token_is_none() {
        let tools = Config::default().tools;
        assert!(load_access_token(&tools).is_none());

        let mut tools = Config::default().tools;
        tools.google_token_path = Some("/definitely/missing.json".into());
        assert!(load_access_token(&tools).is_none());
    }
}
