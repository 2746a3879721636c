// weather_collector - WeatherAPI.com observations published to Azure Event Hubs
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use reqwest::{Client, StatusCode, Url};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

const CURRENT_ENDPOINT: &str = "current.json";
const FORECAST_ENDPOINT: &str = "forecast.json";
const ALERTS_ENDPOINT: &str = "alerts.json";

/// Errors making a request to the weather API.
///
/// Responses with a non-200 status are not errors, see [`Section::Unavailable`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base URL {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("malformed {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// One response from the weather API: either the parsed body of a 200 response
/// or the status and body of any other response.
#[derive(Debug, Clone, PartialEq)]
pub enum Section<T> {
    Available(T),
    Unavailable { status: StatusCode, body: String },
}

impl<T> Section<T> {
    pub fn available(&self) -> Option<&T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Section<U> {
        match self {
            Self::Available(v) => Section::Available(f(v)),
            Self::Unavailable { status, body } => Section::Unavailable { status, body },
        }
    }
}

/// Client for the current, forecast, and alerts endpoints of WeatherAPI.com
pub struct WeatherApiClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for WeatherApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl WeatherApiClient {
    pub fn new<S: Into<String>>(client: Client, base_url: &str, api_key: S) -> Result<Self, ClientError> {
        let parsed = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_owned()));
        }

        Ok(WeatherApiClient {
            client,
            base_url: parsed,
            api_key: api_key.into(),
        })
    }

    /// Current conditions for a location, including air quality.
    pub async fn current(&self, location: &str) -> Result<Section<CurrentResponse>, ClientError> {
        self.fetch(CURRENT_ENDPOINT, location, &[("aqi", "yes")]).await
    }

    /// Daily forecast for a location covering `days` days, starting today.
    pub async fn forecast(&self, location: &str, days: u8) -> Result<Section<ForecastResponse>, ClientError> {
        let days = days.to_string();
        self.fetch(FORECAST_ENDPOINT, location, &[("days", days.as_str())]).await
    }

    /// Weather alerts currently active for a location.
    ///
    /// A 200 response whose body isn't an alerts object is treated as having no
    /// alerts rather than as an error.
    pub async fn alerts(&self, location: &str) -> Result<Section<AlertsResponse>, ClientError> {
        let section = self.request(ALERTS_ENDPOINT, location, &[("alerts", "yes")]).await?;
        Ok(section.map(|body| {
            serde_json::from_slice(&body).unwrap_or_else(|e| {
                tracing::warn!(
                    message = "malformed alerts response, assuming no alerts",
                    location = %location,
                    error = %e,
                );
                AlertsResponse::default()
            })
        }))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        location: &str,
        params: &[(&str, &str)],
    ) -> Result<Section<T>, ClientError> {
        match self.request(endpoint, location, params).await? {
            Section::Available(body) => serde_json::from_slice(&body)
                .map(Section::Available)
                .map_err(|source| ClientError::Decode { endpoint, source }),
            Section::Unavailable { status, body } => Ok(Section::Unavailable { status, body }),
        }
    }

    async fn request(
        &self,
        endpoint: &'static str,
        location: &str,
        params: &[(&str, &str)],
    ) -> Result<Section<Vec<u8>>, ClientError> {
        let url = self.endpoint_url(endpoint);
        tracing::debug!(message = "making weather API request", url = %url, location = %location);

        let res = self
            .client
            .get(url)
            .query(&[("key", self.api_key.as_str()), ("q", location)])
            .query(params)
            .send()
            .await?;

        let status = res.status();
        if status != StatusCode::OK {
            let body = res.text().await?;
            tracing::warn!(
                message = "unexpected status from weather API",
                endpoint = endpoint,
                location = %location,
                status = %status,
            );

            return Ok(Section::Unavailable { status, body });
        }

        Ok(Section::Available(res.bytes().await?.to_vec()))
    }

    fn endpoint_url(&self, endpoint: &str) -> Url {
        let mut url = self.base_url.clone();
        // Base URLs that can't have path segments are rejected in new()
        if let Ok(mut p) = url.path_segments_mut() {
            p.pop_if_empty().push(endpoint);
        }

        url
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct CurrentResponse {
    pub location: Option<ApiLocation>,
    pub current: Option<Current>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ApiLocation {
    pub name: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub localtime: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Current {
    pub temp_c: Option<f64>,
    pub temp_f: Option<f64>,
    pub is_day: Option<i64>,
    pub condition: Option<Condition>,
    pub wind_mph: Option<f64>,
    pub wind_kph: Option<f64>,
    pub wind_degree: Option<i64>,
    pub wind_dir: Option<String>,
    pub pressure_mb: Option<f64>,
    pub pressure_in: Option<f64>,
    pub precip_mm: Option<f64>,
    pub precip_in: Option<f64>,
    pub humidity: Option<i64>,
    pub cloud: Option<i64>,
    pub feelslike_c: Option<f64>,
    pub feelslike_f: Option<f64>,
    pub vis_km: Option<f64>,
    pub vis_miles: Option<f64>,
    pub uv: Option<f64>,
    pub air_quality: Option<AirQuality>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Condition {
    pub text: Option<String>,
    pub icon: Option<String>,
    pub code: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct AirQuality {
    pub co: Option<f64>,
    pub no2: Option<f64>,
    pub o3: Option<f64>,
    pub so2: Option<f64>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    #[serde(rename = "us-epa-index")]
    pub us_epa_index: Option<i64>,
    #[serde(rename = "gb-defra-index")]
    pub gb_defra_index: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ForecastResponse {
    pub forecast: Option<Forecast>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Forecast {
    pub forecastday: Option<Vec<ForecastDay>>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ForecastDay {
    pub date: Option<String>,
    pub date_epoch: Option<i64>,
    pub day: Option<Day>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Day {
    pub maxtemp_c: Option<f64>,
    pub mintemp_c: Option<f64>,
    pub condition: Option<Condition>,
}

/// Response from the alerts endpoint.
///
/// The `alerts` group is parsed leniently: if it has an unexpected shape it's
/// treated as absent instead of failing the entire response.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct AlertsResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub alerts: Option<Alerts>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Alerts {
    #[serde(default)]
    pub alert: Vec<Alert>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Alert {
    pub headline: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
