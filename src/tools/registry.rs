//! The closed set of capabilities offered to the model

use std::fmt;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::browser::BrowserHandle;
use super::executor::{ToolExecutor, ToolOutput, ToolSchema};
use super::google::{EventDraft, GoogleClient};
use super::maps::DirectionsClient;
use super::weather::WeatherClient;
use super::web::{BraveSearch, visible_text};
use crate::config::ToolsConfig;
use crate::{Error, Result};

/// Every capability the assistant knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    CurrentLocation,
    Weather,
    TravelDuration,
    ListUnreadMessages,
    SendEmail,
    BraveSearch,
    NavigateToUrl,
    ExtractPageText,
    ListCalendarEvents,
    CreateCalendarEvent,
}

impl Tool {
    pub const ALL: [Self; 10] = [
        Self::CurrentLocation,
        Self::Weather,
        Self::TravelDuration,
        Self::ListUnreadMessages,
        Self::SendEmail,
        Self::BraveSearch,
        Self::NavigateToUrl,
        Self::ExtractPageText,
        Self::ListCalendarEvents,
        Self::CreateCalendarEvent,
    ];

    /// Name the model uses to call this tool
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CurrentLocation => "get_current_location",
            Self::Weather => "get_weather",
            Self::TravelDuration => "get_travel_duration",
            Self::ListUnreadMessages => "list_unread_messages",
            Self::SendEmail => "send_email",
            Self::BraveSearch => "brave_search",
            Self::NavigateToUrl => "navigate_to_url",
            Self::ExtractPageText => "extract_page_text",
            Self::ListCalendarEvents => "list_calendar_events",
            Self::CreateCalendarEvent => "create_calendar_event",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::CurrentLocation => {
                "Returns the user's current physical location. Use when the user asks where they are or for their current city."
            }
            Self::Weather => {
                "Gets the current weather (temperature, conditions, precipitation) for a city and state or country, e.g. 'Vinings, GA' or 'London, UK'."
            }
            Self::TravelDuration => {
                "Estimated travel duration between an origin and a destination using Google Maps. Considers current traffic when driving. Mode is 'driving', 'walking', 'bicycling' or 'transit'."
            }
            Self::ListUnreadMessages => {
                "Lists sender and subject of up to max_results unread emails in the user's Gmail inbox."
            }
            Self::SendEmail => {
                "Sends an email from the user's Gmail account. Requires the recipient address, a subject line and the body."
            }
            Self::BraveSearch => {
                "Searches the web with Brave Search and returns the top results. Use for recent or current information."
            }
            Self::NavigateToUrl => {
                "Navigates the shared browser to a URL. Use after finding a URL with the search tool."
            }
            Self::ExtractPageText => {
                "Returns the visible text of the page currently open in the shared browser. Use after navigating to read a page."
            }
            Self::ListCalendarEvents => {
                "Lists upcoming events from the user's primary Google Calendar."
            }
            Self::CreateCalendarEvent => {
                "Creates an event on the user's primary Google Calendar. start_time and end_time must be ISO 8601 with a UTC offset, e.g. '2025-07-15T10:00:00-04:00'."
            }
        }
    }

    /// JSON schema of the arguments object
    #[must_use]
    pub fn parameters(self) -> Value {
        let string = |description: &str| json!({ "type": "string", "description": description });
        let (properties, required): (Value, Vec<&str>) = match self {
            Self::CurrentLocation | Self::ExtractPageText => (json!({}), vec![]),
            Self::Weather => (
                json!({ "location": string("City and state or country") }),
                vec!["location"],
            ),
            Self::TravelDuration => (
                json!({
                    "origin": string("Starting point"),
                    "destination": string("Destination"),
                    "mode": {
                        "type": "string",
                        "enum": ["driving", "walking", "bicycling", "transit"],
                        "default": "driving"
                    }
                }),
                vec!["origin", "destination"],
            ),
            Self::ListUnreadMessages => (
                json!({ "max_results": { "type": "integer", "default": 5, "minimum": 1 } }),
                vec![],
            ),
            Self::SendEmail => (
                json!({
                    "to": string("Recipient email address"),
                    "subject": string("Subject line"),
                    "body": string("Plain text body")
                }),
                vec!["to", "subject", "body"],
            ),
            Self::BraveSearch => (json!({ "query": string("Search query") }), vec!["query"]),
            Self::NavigateToUrl => (json!({ "url": string("Absolute URL") }), vec!["url"]),
            Self::ListCalendarEvents => (
                json!({ "max_results": { "type": "integer", "default": 10, "minimum": 1 } }),
                vec![],
            ),
            Self::CreateCalendarEvent => (
                json!({
                    "summary": string("Event title"),
                    "start_time": string("ISO 8601 start with offset"),
                    "end_time": string("ISO 8601 end with offset"),
                    "location": string("Optional location"),
                    "description": string("Optional description")
                }),
                vec!["summary", "start_time", "end_time"],
            ),
        };

        json!({ "type": "object", "properties": properties, "required": required })
    }

    #[must_use]
    pub fn schema(self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn default_mode() -> String {
    "driving".to_string()
}

const fn default_unread() -> u32 {
    5
}

const fn default_events() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherArgs {
    pub location: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TravelArgs {
    pub origin: String,
    pub destination: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnreadArgs {
    #[serde(default = "default_unread")]
    pub max_results: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailArgs {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchArgs {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavigateArgs {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsArgs {
    #[serde(default = "default_events")]
    pub max_results: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEventArgs {
    pub summary: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A decoded tool call with typed arguments
#[derive(Debug, Clone)]
pub enum ToolInvocation {
    CurrentLocation,
    Weather(WeatherArgs),
    TravelDuration(TravelArgs),
    ListUnreadMessages(UnreadArgs),
    SendEmail(EmailArgs),
    BraveSearch(SearchArgs),
    NavigateToUrl(NavigateArgs),
    ExtractPageText,
    ListCalendarEvents(EventsArgs),
    CreateCalendarEvent(NewEventArgs),
}

impl ToolInvocation {
    /// Decode a call from its name and raw JSON arguments
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownTool` for an unknown name and `Error::Tool` for
    /// arguments that don't match the schema
    pub fn parse(name: &str, arguments: &str) -> Result<Self> {
        let tool = Tool::from_name(name).ok_or_else(|| Error::UnknownTool(name.to_string()))?;

        let args: Value = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| Error::Tool(format!("arguments are not valid JSON: {e}")))?
        };

        Ok(match tool {
            Tool::CurrentLocation => Self::CurrentLocation,
            Tool::Weather => Self::Weather(decode(args)?),
            Tool::TravelDuration => Self::TravelDuration(decode(args)?),
            Tool::ListUnreadMessages => Self::ListUnreadMessages(decode(args)?),
            Tool::SendEmail => Self::SendEmail(decode(args)?),
            Tool::BraveSearch => Self::BraveSearch(decode(args)?),
            Tool::NavigateToUrl => Self::NavigateToUrl(decode(args)?),
            Tool::ExtractPageText => Self::ExtractPageText,
            Tool::ListCalendarEvents => Self::ListCalendarEvents(decode(args)?),
            Tool::CreateCalendarEvent => Self::CreateCalendarEvent(decode(args)?),
        })
    }
}

fn decode<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| Error::Tool(format!("invalid arguments: {e}")))
}

/// Normalize a URL the model produced; bare hosts get `https://`
fn normalize_url(url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::Tool("url must not be empty".to_string()));
    }
    if url.starts_with("http://") || url.starts_with("https://") || url == "about:blank" {
        return Ok(url.to_string());
    }
    if url.contains("://") {
        return Err(Error::Tool(format!("unsupported URL scheme: {url}")));
    }
    Ok(format!("https://{url}"))
}

/// Capability clients for this process
///
/// Built once at startup and shared read-only. Capabilities whose client is
/// missing fail every call with `Error::Unavailable`.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    location: String,
    weather: WeatherClient,
    directions: Option<DirectionsClient>,
    google: Option<GoogleClient>,
    search: Option<BraveSearch>,
    browser: Option<BrowserHandle>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Build clients for every capability that has credentials
    #[must_use]
    pub fn from_config(
        config: &ToolsConfig,
        google_token: Option<SecretString>,
        browser: Option<BrowserHandle>,
    ) -> Self {
        Self::new(config.location.clone())
            .with_directions(config.maps_api_key.clone().map(DirectionsClient::new))
            .with_search(config.brave_api_key.clone().map(BraveSearch::new))
            .with_google(
                google_token.map(|token| GoogleClient::new(token, &config.calendar_time_zone)),
            )
            .with_browser(browser)
    }

    #[must_use]
    pub fn with_weather(mut self, weather: WeatherClient) -> Self {
        self.weather = weather;
        self
    }

    #[must_use]
    pub fn with_directions(mut self, directions: Option<DirectionsClient>) -> Self {
        self.directions = directions;
        self
    }

    #[must_use]
    pub fn with_google(mut self, google: Option<GoogleClient>) -> Self {
        self.google = google;
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: Option<BraveSearch>) -> Self {
        self.search = search;
        self
    }

    #[must_use]
    pub fn with_browser(mut self, browser: Option<BrowserHandle>) -> Self {
        self.browser = browser;
        self
    }

    fn google(&self) -> Result<&GoogleClient> {
        self.google
            .as_ref()
            .ok_or(Error::Unavailable("Google account access"))
    }

    fn browser(&self) -> Result<&BrowserHandle> {
        self.browser
            .as_ref()
            .ok_or(Error::Unavailable("the shared browser"))
    }

    /// Run a decoded invocation
    ///
    /// # Errors
    ///
    /// Returns error if the capability is unavailable or fails
    pub async fn invoke(&self, invocation: ToolInvocation) -> Result<ToolOutput> {
        match invocation {
            ToolInvocation::CurrentLocation => Ok(ToolOutput::Text(self.location.clone())),
            ToolInvocation::Weather(args) => {
                self.weather.current(&args.location).await.map(Into::into)
            }
            ToolInvocation::TravelDuration(args) => self
                .directions
                .as_ref()
                .ok_or(Error::Unavailable("Google Maps API key"))?
                .travel_duration(&args.origin, &args.destination, &args.mode)
                .await
                .map(Into::into),
            ToolInvocation::ListUnreadMessages(args) => self
                .google()?
                .list_unread(args.max_results)
                .await
                .map(ToolOutput::Lines),
            ToolInvocation::SendEmail(args) => self
                .google()?
                .send_email(&args.to, &args.subject, &args.body)
                .await
                .map(Into::into),
            ToolInvocation::BraveSearch(args) => self
                .search
                .as_ref()
                .ok_or(Error::Unavailable("Brave Search API key"))?
                .search_formatted(&args.query)
                .await
                .map(Into::into),
            ToolInvocation::NavigateToUrl(args) => {
                let url = normalize_url(&args.url)?;
                let title = self.browser()?.navigate(&url).await?;
                Ok(ToolOutput::Text(format!(
                    "Successfully navigated to {url}. The page title is '{title}'."
                )))
            }
            ToolInvocation::ExtractPageText => {
                let html = self.browser()?.page_html().await?;
                let text = visible_text(&html);
                if text.is_empty() {
                    Ok(ToolOutput::Text("The page has no visible text.".to_string()))
                } else {
                    Ok(ToolOutput::Text(text))
                }
            }
            ToolInvocation::ListCalendarEvents(args) => self
                .google()?
                .list_events(args.max_results)
                .await
                .map(Into::into),
            ToolInvocation::CreateCalendarEvent(args) => {
                let draft = EventDraft {
                    summary: &args.summary,
                    start_time: &args.start_time,
                    end_time: &args.end_time,
                    location: args.location.as_deref(),
                    description: args.description.as_deref(),
                };
                self.google()?.create_event(&draft).await.map(Into::into)
            }
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn schemas(&self) -> Vec<ToolSchema> {
        Tool::ALL.into_iter().map(Tool::schema).collect()
    }

    async fn execute(&self, name: &str, arguments: &str) -> Result<ToolOutput> {
        let invocation = ToolInvocation::parse(name, arguments)?;
        self.invoke(invocation).await
    }
}
