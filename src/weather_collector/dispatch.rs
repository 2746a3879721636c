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

use crate::credential::{CredentialError, ManagedIdentityCredential, EVENT_HUBS_RESOURCE};
use crate::flatten::FlatWeatherRecord;
use crate::metrics::CollectorMetrics;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Largest batch, in bytes, accepted by a standard tier Event Hub
pub const MAX_BATCH_BYTES: usize = 1024 * 1024;

const EVENT_HUBS_API_VERSION: &str = "2014-01";
const EVENT_HUBS_BATCH_CONTENT_TYPE: &str = "application/vnd.microsoft.servicebus.json";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unable to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("event of {size} bytes exceeds batch limit of {max} bytes")]
    BatchTooLarge { size: usize, max: usize },
    #[error("invalid event hub endpoint {0}")]
    InvalidEndpoint(String),
    #[error("unable to acquire token: {0}")]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("event rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

#[derive(Serialize)]
struct BatchMessage<'a> {
    #[serde(rename = "Body")]
    body: &'a str,
}

// Encoded size of an empty batch body, `[]`.
const EMPTY_BATCH_BYTES: usize = 2;

/// Serialized events to be published together, bounded by a maximum total size.
///
/// The size counted against the limit is that of the request body sent to the
/// Event Hub: each event wrapped as `{"Body": "..."}` and escaped as a JSON
/// string, inside a JSON array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch {
    events: Vec<String>,
    size: usize,
    max_size: usize,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::with_max_size(MAX_BATCH_BYTES)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        EventBatch {
            events: Vec::new(),
            size: EMPTY_BATCH_BYTES,
            max_size,
        }
    }

    /// Add an event to the batch, failing if it would exceed the maximum size.
    pub fn add(&mut self, event: String) -> Result<(), DispatchError> {
        let encoded = serde_json::to_vec(&BatchMessage { body: &event })?.len();
        let separator = if self.events.is_empty() { 0 } else { 1 };
        let size = self.size + encoded + separator;
        if size > self.max_size {
            return Err(DispatchError::BatchTooLarge {
                size,
                max: self.max_size,
            });
        }

        self.size = size;
        self.events.push(event);
        Ok(())
    }

    /// Size in bytes of the request body for this batch.
    pub fn size_in_bytes(&self) -> usize {
        self.size
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Destination for batches of events.
#[async_trait]
pub trait EventPublisher: fmt::Debug + Send + Sync {
    async fn publish(&self, batch: EventBatch) -> Result<(), DispatchError>;
}

/// Publisher for an Azure Event Hub using the REST API and a managed identity.
#[derive(Debug)]
pub struct EventHubPublisher {
    client: Client,
    url: Url,
    credential: Arc<ManagedIdentityCredential>,
}

impl EventHubPublisher {
    /// Create a publisher for the hub `name` in `namespace`.
    ///
    /// `namespace` is usually a host name like `example.servicebus.windows.net`, in
    /// which case HTTPS is used. A full URL may be given instead.
    pub fn new(
        client: Client,
        namespace: &str,
        name: &str,
        credential: Arc<ManagedIdentityCredential>,
    ) -> Result<Self, DispatchError> {
        let base = if namespace.contains("://") {
            namespace.to_owned()
        } else {
            format!("https://{}", namespace)
        };

        let mut url = Url::parse(&base).map_err(|e| DispatchError::InvalidEndpoint(format!("{}: {}", base, e)))?;
        url.path_segments_mut()
            .map(|mut p| {
                p.pop_if_empty().push(name).push("messages");
            })
            .map_err(|_| DispatchError::InvalidEndpoint(base.clone()))?;

        Ok(EventHubPublisher { client, url, credential })
    }
}

#[async_trait]
impl EventPublisher for EventHubPublisher {
    async fn publish(&self, batch: EventBatch) -> Result<(), DispatchError> {
        let token = self.credential.token(EVENT_HUBS_RESOURCE).await?;
        let messages: Vec<BatchMessage> = batch.events().iter().map(|e| BatchMessage { body: e }).collect();
        let body = serde_json::to_vec(&messages)?;

        let res = self
            .client
            .post(self.url.clone())
            .query(&[("api-version", EVENT_HUBS_API_VERSION)])
            .header(CONTENT_TYPE, EVENT_HUBS_BATCH_CONTENT_TYPE)
            .bearer_auth(token)
            .body(body)
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::CREATED || status == StatusCode::OK {
            Ok(())
        } else {
            let body = res.text().await.unwrap_or_default();
            Err(DispatchError::Rejected { status, body })
        }
    }
}

/// Sends each record as a single event, logging any failure instead of returning it.
#[derive(Debug)]
pub struct EventDispatcher {
    publisher: Arc<dyn EventPublisher>,
    metrics: CollectorMetrics,
}

impl EventDispatcher {
    pub fn new(publisher: Arc<dyn EventPublisher>, metrics: CollectorMetrics) -> Self {
        EventDispatcher { publisher, metrics }
    }

    pub async fn send(&self, record: &FlatWeatherRecord) {
        match self.try_send(record).await {
            Ok(_) => {
                self.metrics.event(true);
                tracing::info!(
                    message = "event sent",
                    name = ?record.name,
                    subdivision = ?record.subdivision_code,
                );
            }
            Err(e) => {
                self.metrics.event(false);
                tracing::error!(
                    message = "failed to send event",
                    name = ?record.name,
                    subdivision = ?record.subdivision_code,
                    error = %e,
                );
            }
        }
    }

    async fn try_send(&self, record: &FlatWeatherRecord) -> Result<(), DispatchError> {
        let mut batch = EventBatch::new();
        batch.add(serde_json::to_string(record)?)?;
        self.publisher.publish(batch).await
    }
}
