//! Capabilities the agent can call

mod browser;
mod executor;
mod google;
mod maps;
mod registry;
mod weather;
mod web;

pub use browser::{BrowserHandle, BrowserSessionConfig, launch as launch_browser};
pub use executor::{ToolExecutor, ToolOutput, ToolSchema};
pub use google::{EventDraft, GoogleClient, load_access_token};
pub use maps::DirectionsClient;
pub use registry::{Tool, ToolInvocation, ToolRegistry};
pub use weather::WeatherClient;
pub use web::{BraveSearch, MAX_PAGE_TEXT_CHARS, SearchResult, format_results, visible_text};
