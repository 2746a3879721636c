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

use crate::client::{ClientError, Section, WeatherApiClient};
use crate::dispatch::{EventDispatcher, EventPublisher};
use crate::flatten::flatten;
use crate::locations::{self, Location};
use crate::metrics::{CollectorMetrics, Outcome};
use crate::secrets::{SecretError, SecretStore};
use reqwest::Client;
use std::sync::Arc;
use tracing::{Instrument, Level};

/// Number of days of forecast to fetch for each location, including today
pub const FORECAST_DAYS: u8 = 3;

pub const DEFAULT_API_URL: &str = "http://api.weatherapi.com/v1";
pub const DEFAULT_API_KEY_SECRET: &str = "weatherapikey";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unable to resolve weather API key: {0}")]
    Credential(#[from] SecretError),
    #[error("unable to create weather API client: {0}")]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub api_url: String,
    pub api_key_secret: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            api_url: DEFAULT_API_URL.to_owned(),
            api_key_secret: DEFAULT_API_KEY_SECRET.to_owned(),
        }
    }
}

/// Cities that were processed (a record was sent, successfully or not) and cities
/// that were skipped because of an error during a single run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

/// Fetches weather for every location and publishes a record for each.
///
/// The weather API key and the dispatcher only live for the duration of a
/// single call to `run()`. An error with one location is logged and the run
/// continues with the next location.
#[derive(Debug)]
pub struct PipelineRunner {
    config: PipelineConfig,
    client: Client,
    secrets: Arc<dyn SecretStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: CollectorMetrics,
    locations: &'static [Location],
}

impl PipelineRunner {
    pub fn new(
        config: PipelineConfig,
        client: Client,
        secrets: Arc<dyn SecretStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: CollectorMetrics,
    ) -> Self {
        PipelineRunner {
            config,
            client,
            secrets,
            publisher,
            metrics,
            locations: locations::all(),
        }
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let res = self.run_locations().await;
        self.metrics.run(res.is_ok());
        res
    }

    async fn run_locations(&self) -> Result<RunSummary, PipelineError> {
        let api_key = self.secrets.get_secret(&self.config.api_key_secret).await?;
        let source = WeatherApiClient::new(self.client.clone(), &self.config.api_url, api_key)?;
        let dispatcher = EventDispatcher::new(Arc::clone(&self.publisher), self.metrics.clone());
        let mut summary = RunSummary::default();

        for location in self.locations {
            let res = self
                .process(&source, &dispatcher, location)
                .instrument(tracing::span!(Level::DEBUG, "weather_location", location = %location))
                .await;

            match res {
                Ok(_) => {
                    self.metrics.location(location, Outcome::Processed);
                    summary.processed.push(location.city);
                }
                Err(e) => {
                    tracing::error!(
                        message = "failed to process location",
                        location = %location,
                        error = %e,
                    );

                    self.metrics.location(location, Outcome::Skipped);
                    summary.skipped.push(location.city);
                }
            }
        }

        Ok(summary)
    }

    async fn process(
        &self,
        source: &WeatherApiClient,
        dispatcher: &EventDispatcher,
        location: &Location,
    ) -> Result<(), ClientError> {
        let current = source.current(location.city).await?;
        let forecast = source.forecast(location.city, FORECAST_DAYS).await?;
        let alerts = source.alerts(location.city).await?;

        self.count_unavailable("current", &current);
        self.count_unavailable("forecast", &forecast);
        self.count_unavailable("alerts", &alerts);

        let record = flatten(&current, &forecast, &alerts).enrich(location);
        dispatcher.send(&record).await;
        Ok(())
    }

    fn count_unavailable<T>(&self, section: &str, res: &Section<T>) {
        if !res.is_available() {
            self.metrics.section_unavailable(section);
        }
    }
}

#[cfg(test)]
mod test {
    use super::{PipelineConfig, PipelineError, PipelineRunner, RunSummary};
    use crate::dispatch::test::RecordingPublisher;
    use crate::locations::{self, Location};
    use crate::metrics::CollectorMetrics;
    use crate::secrets::{SecretError, SecretStore};
    use async_trait::async_trait;
    use prometheus_client::registry::Registry;
    use reqwest::Client;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug)]
    struct StaticSecretStore(Option<&'static str>);

    #[async_trait]
    impl SecretStore for StaticSecretStore {
        async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
            self.0.map(String::from).ok_or_else(|| SecretError::Missing(name.to_owned()))
        }
    }

    fn location(city: &str) -> &'static Location {
        locations::all().iter().find(|l| l.city == city).unwrap()
    }

    fn runner(server: &MockServer, secrets: StaticSecretStore, publisher: Arc<RecordingPublisher>) -> PipelineRunner {
        let config = PipelineConfig {
            api_url: server.uri(),
            ..Default::default()
        };

        PipelineRunner::new(
            config,
            Client::new(),
            Arc::new(secrets),
            publisher,
            CollectorMetrics::new(&mut Registry::default()),
        )
    }

    /// Respond to every location with a minimal payload that echoes the city name.
    async fn mount_defaults(server: &MockServer) {
        for location in locations::all() {
            Mock::given(method("GET"))
                .and(path("/current.json"))
                .and(query_param("q", location.city))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "location": {"name": location.city, "country": "Brazil"},
                    "current": {"temp_c": 25.0, "condition": {"text": "Sunny"}}
                })))
                .mount(server)
                .await;
        }

        Mock::given(method("GET"))
            .and(path("/forecast.json"))
            .and(query_param("days", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "forecast": {"forecastday": [
                    {"date": "2024-05-01", "day": {"maxtemp_c": 30.0}},
                    {"date": "2024-05-02", "day": {"maxtemp_c": 31.0}},
                    {"date": "2024-05-03", "day": {"maxtemp_c": 29.0}}
                ]}
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/alerts.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"alerts": {"alert": []}})))
            .mount(server)
            .await;
    }

    fn cities() -> Vec<&'static str> {
        locations::all().iter().map(|l| l.city).collect()
    }

    #[tokio::test]
    async fn test_run_all_locations() {
        let server = MockServer::start().await;
        mount_defaults(&server).await;
        let publisher = Arc::new(RecordingPublisher::default());

        let summary = runner(&server, StaticSecretStore(Some("key")), publisher.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(
            RunSummary {
                processed: cities(),
                skipped: vec![],
            },
            summary
        );

        let events = publisher.events();
        assert_eq!(27, events.len());
        for (event, location) in events.iter().zip(locations::all()) {
            assert_eq!(json!(location.city), event["name"]);
            assert_eq!(json!(location.subdivision_code), event["subdivision_code"]);
            assert_eq!(json!(location.region_label), event["region_label"]);
            assert_eq!(3, event["forecast"].as_array().unwrap().len());
        }

        let batches = publisher.batches.lock().unwrap();
        assert!(batches.iter().all(|b| b.len() == 1));
    }

    #[tokio::test]
    async fn test_run_alerts_unavailable_still_sends() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alerts.json"))
            .and(query_param("q", "Manaus"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .with_priority(1)
            .mount(&server)
            .await;
        mount_defaults(&server).await;
        let publisher = Arc::new(RecordingPublisher::default());

        let summary = runner(&server, StaticSecretStore(Some("key")), publisher.clone())
            .run()
            .await
            .unwrap();

        assert!(summary.skipped.is_empty());

        let events = publisher.events();
        let manaus = events.iter().position(|e| e["name"] == json!("Manaus")).unwrap();
        assert_eq!(json!([]), events[manaus]["alerts"]);
        assert_eq!(json!(25.0), events[manaus]["temp_c"]);
        assert_eq!(json!("Salvador"), events[manaus + 1]["name"]);
    }

    #[tokio::test]
    async fn test_run_alerts_malformed_still_sends() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alerts.json"))
            .and(query_param("q", "Manaus"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .with_priority(1)
            .mount(&server)
            .await;
        mount_defaults(&server).await;
        let publisher = Arc::new(RecordingPublisher::default());

        let summary = runner(&server, StaticSecretStore(Some("key")), publisher.clone())
            .run()
            .await
            .unwrap();

        assert!(summary.skipped.is_empty());

        let events = publisher.events();
        assert_eq!(27, events.len());

        let manaus = events.iter().position(|e| e["name"] == json!("Manaus")).unwrap();
        assert_eq!(json!([]), events[manaus]["alerts"]);
        assert_eq!(json!("Sunny"), events[manaus]["condition_text"]);
        assert_eq!(3, events[manaus]["forecast"].as_array().unwrap().len());
    }

    #[tokio::test]
    async fn test_run_location_failure_isolated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/current.json"))
            .and(query_param("q", "Manaus"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .with_priority(1)
            .mount(&server)
            .await;
        mount_defaults(&server).await;
        let publisher = Arc::new(RecordingPublisher::default());

        let summary = runner(&server, StaticSecretStore(Some("key")), publisher.clone())
            .run()
            .await
            .unwrap();

        let expected: Vec<_> = cities().into_iter().filter(|c| *c != "Manaus").collect();
        assert_eq!(expected, summary.processed);
        assert_eq!(vec![location("Manaus").city], summary.skipped);

        let names: Vec<Value> = publisher.events().iter().map(|e| e["name"].clone()).collect();
        assert_eq!(26, names.len());
        assert!(!names.contains(&json!("Manaus")));
        assert!(names.contains(&json!("Salvador")));
        assert!(names.contains(&json!("Palmas")));
    }

    #[tokio::test]
    async fn test_run_publish_failures_do_not_skip() {
        let server = MockServer::start().await;
        mount_defaults(&server).await;
        let publisher = Arc::new(RecordingPublisher::failing());

        let summary = runner(&server, StaticSecretStore(Some("key")), publisher.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(27, summary.processed.len());
        assert_eq!(27, publisher.batches.lock().unwrap().len());
    }

    #[tokio::test]
    async fn test_run_missing_api_key() {
        let server = MockServer::start().await;
        let publisher = Arc::new(RecordingPublisher::default());

        let res = runner(&server, StaticSecretStore(None), publisher.clone()).run().await;

        assert!(matches!(res, Err(PipelineError::Credential(SecretError::Missing(_)))));
        assert!(publisher.batches.lock().unwrap().is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("key", "from-vault"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(27 * 3)
            .mount(&server)
            .await;
        let publisher = Arc::new(RecordingPublisher::default());

        runner(&server, StaticSecretStore(Some("from-vault")), publisher.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(27, publisher.events().len());
    }
}
