//! Current weather from OpenWeatherMap.
//!
//! The key comes from the execution's `weather_api_key` credential and is
//! sent as the `appid` query parameter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value, json};
use toolgate_core::{
    LocalNode, NodeCategory, NodeContext, NodeDefinition, NodeError, NodeErrorCode,
    NodeExecutionError, NodeInput, NodeInputType, NodeOutput, NodeValidationError,
};

pub const NAME: &str = "weather_api";
pub const CREDENTIAL_TYPE: &str = "weather_api_key";
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

const UNITS: [&str; 3] = ["metric", "imperial", "kelvin"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn definition() -> NodeDefinition {
    NodeDefinition::new(
        NAME,
        "Weather API",
        "Get current weather data for a location",
        NodeCategory::Api,
    )
    .with_credential_type(CREDENTIAL_TYPE)
    .with_input(
        NodeInput::new("location", NodeInputType::String)
            .describe("City name (e.g., 'London' or 'London,UK')"),
    )
    .with_input(
        NodeInput::new("units", NodeInputType::String)
            .describe("Temperature units")
            .with_default(json!("metric"))
            .with_options(UNITS),
    )
    .with_output(NodeOutput::new("location", NodeInputType::String))
    .with_output(NodeOutput::new("temperature", NodeInputType::Number))
    .with_output(NodeOutput::new("description", NodeInputType::String))
    .with_output(NodeOutput::new("raw_data", NodeInputType::Json))
    .with_tags(["weather", "api", "data"])
}

/// Weather lookup node.
#[derive(Debug, Clone)]
pub struct WeatherApi {
    client: reqwest::Client,
    base_url: String,
}

impl Default for WeatherApi {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl WeatherApi {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the node at another API root (a proxy or a test server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch(&self, location: &str, units: &str, api_key: &str) -> Result<Value, NodeExecutionError> {
        let url = format!("{}/weather", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .query(&[("q", location), ("appid", api_key), ("units", units)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| failure(NodeErrorCode::NetworkError, format!("Request failed: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(failure(
                    NodeErrorCode::NotFound,
                    format!("Location not found: {location}"),
                ));
            }
            StatusCode::UNAUTHORIZED => {
                return Err(failure(NodeErrorCode::AuthError, "Invalid weather API key"));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(failure(
                    NodeErrorCode::ApiError,
                    format!("Weather API error: {body}"),
                ));
            }
            _ => {}
        }

        response.json().await.map_err(|e| {
            failure(
                NodeErrorCode::ApiError,
                format!("Invalid weather API response: {e}"),
            )
        })
    }
}

#[async_trait]
impl LocalNode for WeatherApi {
    async fn execute(
        &self,
        input: Map<String, Value>,
        ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let (location, units) = validate(&input)?;

        let api_key = ctx
            .credential(CREDENTIAL_TYPE)
            .and_then(|c| c.field("api_key"))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                failure(
                    NodeErrorCode::MissingCredential,
                    "Weather API key not found in credentials",
                )
            })?;

        tracing::debug!(location, units, "Fetching current weather");
        let data = self.fetch(location, units, api_key).await?;
        Ok(summarize(data)?)
    }
}

fn failure(code: NodeErrorCode, message: impl Into<String>) -> NodeExecutionError {
    NodeExecutionError::new(NAME, code, message)
}

fn validate(input: &Map<String, Value>) -> Result<(&str, &str), NodeValidationError> {
    let location = match input.get("location") {
        None | Some(Value::Null) => {
            return Err(NodeValidationError::for_field("location", "Location is required"));
        }
        Some(Value::String(s)) if s.is_empty() => {
            return Err(NodeValidationError::for_field("location", "Location is required"));
        }
        Some(Value::String(s)) => s.as_str(),
        Some(_) => {
            return Err(NodeValidationError::for_field("location", "Location must be a string"));
        }
    };

    let units = match input.get("units") {
        None | Some(Value::Null) => "metric",
        Some(Value::String(u)) if UNITS.contains(&u.as_str()) => u.as_str(),
        Some(other) => {
            let shown = other.as_str().map_or_else(|| other.to_string(), str::to_string);
            return Err(NodeValidationError::for_field(
                "units",
                format!("Invalid units: {shown}. Must be metric, imperial, or kelvin"),
            ));
        }
    };

    Ok((location, units))
}

/// Pick the headline fields out of a current-weather response.
fn summarize(data: Value) -> Result<Value, NodeExecutionError> {
    let field = |pointer: &str| {
        data.pointer(pointer).cloned().ok_or_else(|| {
            failure(
                NodeErrorCode::ApiError,
                format!("Weather API response is missing '{pointer}'"),
            )
        })
    };

    Ok(json!({
        "location": field("/name")?,
        "country": field("/sys/country")?,
        "temperature": field("/main/temp")?,
        "feels_like": field("/main/feels_like")?,
        "humidity": field("/main/humidity")?,
        "description": field("/weather/0/description")?,
        "wind_speed": field("/wind/speed")?,
        "raw_data": data,
    }))
}
