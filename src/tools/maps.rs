//! Travel duration via the Google Directions API

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

/// Transport modes understood by the Directions API
const MODES: [&str; 4] = ["driving", "walking", "bicycling", "transit"];

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
struct Leg {
    #[serde(default)]
    duration: Option<TextValue>,
    #[serde(default)]
    duration_in_traffic: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
}

/// Directions client
#[derive(Debug, Clone)]
pub struct DirectionsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl DirectionsClient {
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(api_key: SecretString, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Estimated travel time, traffic-aware for driving
    ///
    /// # Errors
    ///
    /// Returns error for an unsupported mode or an API failure
    pub async fn travel_duration(
        &self,
        origin: &str,
        destination: &str,
        mode: &str,
    ) -> Result<String> {
        let mode = mode.trim().to_lowercase();
        if !MODES.contains(&mode.as_str()) {
            return Err(Error::Tool(format!(
                "unsupported travel mode '{mode}' (expected one of {})",
                MODES.join(", ")
            )));
        }

        tracing::debug!(origin, destination, mode, "requesting directions");

        let response = self
            .client
            .get(format!("{}/maps/api/directions/json", self.base_url))
            .query(&[
                ("origin", origin),
                ("destination", destination),
                ("mode", mode.as_str()),
                ("departure_time", "now"),
                ("key", self.api_key.expose_secret()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: DirectionsResponse = response.json().await?;

        match body.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" | "NOT_FOUND" => {
                return Ok(format!(
                    "Could not find a route from {origin} to {destination} via {mode}."
                ));
            }
            status => {
                let detail = body.error_message.unwrap_or_default();
                return Err(Error::Tool(format!("Google Maps error {status}: {detail}")));
            }
        }

        let Some(leg) = body.routes.first().and_then(|r| r.legs.first()) else {
            return Ok(format!(
                "Could not find a route from {origin} to {destination} via {mode}."
            ));
        };

        let prefix = format!("Estimated travel duration from {origin} to {destination} by {mode}");
        if mode == "driving"
            && let Some(traffic) = &leg.duration_in_traffic
        {
            return Ok(format!("{prefix} (with current traffic): {}.", traffic.text));
        }

        leg.duration.as_ref().map_or_else(
            || Ok("Duration information not found in the response.".to_string()),
            |d| Ok(format!("{prefix}: {}.", d.text)),
        )
    }
}
