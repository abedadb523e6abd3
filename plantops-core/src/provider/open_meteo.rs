use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::OpenMeteoConfig;
use crate::model::{Coordinates, ForecastProperties, HourlySample};

use super::WeatherProvider;

const HOURLY_FIELDS: [&str; 4] = [
    "temperature_2m",
    "precipitation",
    "wind_speed_10m",
    "wind_direction_10m",
];
const DAILY_FIELDS: [&str; 1] = ["precipitation_sum"];

/// Client for the Open-Meteo forecast and elevation APIs.
///
/// Full documentation can be found at https://open-meteo.com/en/docs.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    api_url: String,
    http: Client,
}

impl OpenMeteoClient {
    pub fn new(config: &OpenMeteoConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build the Open-Meteo HTTP client")?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.api_url, path);

        let res = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Open-Meteo ({path})"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read Open-Meteo response body ({path})"))?;

        if !status.is_success() {
            // Open-Meteo reports failures as an {error, reason} body; fall
            // back to the raw body when it is anything else.
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(parsed) if parsed.error => anyhow!(
                    "Open-Meteo request failed with status {status}, reason: {}",
                    parsed.reason,
                ),
                _ => anyhow!(
                    "Open-Meteo request failed with status {status}: {}",
                    truncate_body(&body),
                ),
            });
        }

        serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse Open-Meteo JSON ({path})"))
    }
}

fn coordinate_params(coordinates: &[Coordinates]) -> Vec<(&'static str, String)> {
    let mut query = Vec::with_capacity(coordinates.len() * 2);
    for c in coordinates {
        query.push(("latitude", c.latitude.to_string()));
    }
    for c in coordinates {
        query.push(("longitude", c.longitude.to_string()));
    }
    query
}

fn forecast_query(coordinates: &[Coordinates], forecast_days: i32) -> Vec<(&'static str, String)> {
    let mut query = vec![("forecast_days", forecast_days.to_string())];
    query.extend(coordinate_params(coordinates));
    for field in HOURLY_FIELDS {
        query.push(("hourly", field.to_string()));
    }
    for field in DAILY_FIELDS {
        query.push(("daily", field.to_string()));
    }
    query
}

/// Generic response from the Open-Meteo API in case of an error.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: String,
}

/// Response of the Weather Forecast API. A single-coordinate request yields
/// one object; a multi-coordinate request yields an array of these.
///
/// Docs: https://open-meteo.com/en/docs
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: HourlyData,
    daily: DailyData,
}

#[derive(Debug, Default, Deserialize)]
struct HourlyData {
    time: Vec<String>,
    #[serde(rename = "temperature_2m")]
    temperature: Vec<f64>,
    precipitation: Vec<f64>,
    #[serde(rename = "wind_speed_10m")]
    wind_speed: Vec<f64>,
    #[serde(rename = "wind_direction_10m")]
    wind_direction: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct DailyData {
    time: Vec<String>,
    precipitation_sum: Vec<f64>,
}

/// Response of the Elevation API.
///
/// Docs: https://open-meteo.com/en/docs/elevation-api
#[derive(Debug, Deserialize)]
struct ElevationResponse {
    elevation: Vec<f64>,
}

impl ForecastResponse {
    fn into_properties(self) -> Result<ForecastProperties> {
        let has_precipitation_today = self.daily.has_precipitation_today()?;
        let hourly = self.hourly.into_samples()?;

        Ok(ForecastProperties {
            has_precipitation_today,
            hourly,
        })
    }
}

impl HourlyData {
    fn into_samples(self) -> Result<Vec<HourlySample>> {
        let count = self.time.len();
        if self.temperature.len() != count
            || self.precipitation.len() != count
            || self.wind_speed.len() != count
            || self.wind_direction.len() != count
        {
            return Err(anyhow!(
                "invalid hourly data length, time {}, temperature {}, precipitation {}, wind speed {}, wind direction {}",
                count,
                self.temperature.len(),
                self.precipitation.len(),
                self.wind_speed.len(),
                self.wind_direction.len(),
            ));
        }

        let samples = self
            .time
            .into_iter()
            .enumerate()
            .map(|(i, time)| HourlySample {
                time,
                temperature: self.temperature[i],
                precipitation: self.precipitation[i],
                wind_speed: self.wind_speed[i],
                wind_direction: self.wind_direction[i],
            })
            .collect();

        Ok(samples)
    }
}

impl DailyData {
    fn has_precipitation_today(&self) -> Result<bool> {
        if self.time.len() != self.precipitation_sum.len() || self.time.is_empty() {
            return Err(anyhow!(
                "invalid daily data length, time {}, precipitation {}",
                self.time.len(),
                self.precipitation_sum.len(),
            ));
        }

        // The first daily entry is always today.
        Ok(self.precipitation_sum[0] > 0.0)
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoClient {
    async fn forecast(
        &self,
        coordinates: Coordinates,
        forecast_days: i32,
    ) -> Result<ForecastProperties> {
        let query = forecast_query(&[coordinates], forecast_days);
        let parsed: ForecastResponse = self.get_json("/v1/forecast", &query).await?;
        parsed.into_properties()
    }

    async fn forecast_batch(
        &self,
        coordinates: &[Coordinates],
        forecast_days: i32,
    ) -> Result<Vec<ForecastProperties>> {
        let query = forecast_query(coordinates, forecast_days);
        let parsed: Vec<ForecastResponse> = self.get_json("/v1/forecast", &query).await?;

        parsed
            .into_iter()
            .map(ForecastResponse::into_properties)
            .collect()
    }

    async fn elevations(&self, coordinates: &[Coordinates]) -> Result<Vec<f64>> {
        let query = coordinate_params(coordinates);
        let parsed: ElevationResponse = self.get_json("/v1/elevation", &query).await?;
        Ok(parsed.elevation)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        format!("{}...", &body[..MAX])
    } else {
        body.to_string()
    }
}
