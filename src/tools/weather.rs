//! Current weather via wttr.in

use serde::Deserialize;

use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://wttr.in";

#[derive(Debug, Deserialize)]
struct WttrResponse {
    #[serde(default)]
    current_condition: Vec<CurrentCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentCondition {
    #[serde(rename = "temp_F")]
    temp_f: String,
    #[serde(default)]
    weather_desc: Vec<DescValue>,
    #[serde(default)]
    precip_inches: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescValue {
    value: String,
}

/// Weather lookup client (no key required)
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for WeatherClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Describe current conditions at `location`
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable or has no data for the location
    pub async fn current(&self, location: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(location));

        let response = self
            .client
            .get(&url)
            .query(&[("format", "j1")])
            .send()
            .await?
            .error_for_status()?;

        let body: WttrResponse = response.json().await?;
        let condition = body
            .current_condition
            .into_iter()
            .next()
            .ok_or_else(|| Error::Tool(format!("no weather data for {location}")))?;

        let description = condition
            .weather_desc
            .first()
            .map_or("unknown conditions", |d| d.value.trim())
            .to_lowercase();
        let precipitation = condition
            .precip_inches
            .map_or_else(|| "unknown".to_string(), |p| format!("{p} inches"));

        Ok(format!(
            "The current weather in {location} is {}°F with {description}. Precipitation is {precipitation}.",
            condition.temp_f
        ))
    }
}
