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

use reqwest::header::HeaderValue;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::env;
use std::fmt;

/// Resource to request tokens for when reading from Azure Key Vault
pub const VAULT_RESOURCE: &str = "https://vault.azure.net";

/// Resource to request tokens for when publishing to Azure Event Hubs
pub const EVENT_HUBS_RESOURCE: &str = "https://eventhubs.azure.net";

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const APP_SERVICE_HEADER: &str = "X-IDENTITY-HEADER";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid identity endpoint {0}")]
    InvalidEndpoint(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0} from identity endpoint")]
    Unexpected(StatusCode),
}

enum IdentityEndpoint {
    AppService { url: Url, header: HeaderValue },
    Instance { url: Url },
}

/// Fetch access tokens for Azure resources using the managed identity of the
/// host this process is running on.
///
/// App Service and Functions hosts expose an identity endpoint via the
/// `IDENTITY_ENDPOINT` and `IDENTITY_HEADER` environment variables. Other hosts
/// (VMs, containers) use the instance metadata service.
pub struct ManagedIdentityCredential {
    client: Client,
    endpoint: IdentityEndpoint,
}

impl fmt::Debug for ManagedIdentityCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = match &self.endpoint {
            IdentityEndpoint::AppService { url, .. } => url,
            IdentityEndpoint::Instance { url } => url,
        };

        f.debug_struct("ManagedIdentityCredential")
            .field("endpoint", &url.as_str())
            .finish()
    }
}

impl ManagedIdentityCredential {
    pub fn from_env(client: Client) -> Result<Self, CredentialError> {
        match (env::var("IDENTITY_ENDPOINT"), env::var("IDENTITY_HEADER")) {
            (Ok(endpoint), Ok(header)) => Self::app_service(client, &endpoint, &header),
            _ => Self::instance(client, IMDS_ENDPOINT),
        }
    }

    pub fn app_service(client: Client, endpoint: &str, header: &str) -> Result<Self, CredentialError> {
        let url = Url::parse(endpoint).map_err(|e| CredentialError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        let mut header = HeaderValue::from_str(header)
            .map_err(|_| CredentialError::InvalidEndpoint(format!("invalid {} value", APP_SERVICE_HEADER)))?;
        header.set_sensitive(true);

        Ok(ManagedIdentityCredential {
            client,
            endpoint: IdentityEndpoint::AppService { url, header },
        })
    }

    pub fn instance(client: Client, endpoint: &str) -> Result<Self, CredentialError> {
        let url = Url::parse(endpoint).map_err(|e| CredentialError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

        Ok(ManagedIdentityCredential {
            client,
            endpoint: IdentityEndpoint::Instance { url },
        })
    }

    /// Get a bearer token for the given resource, e.g. [`VAULT_RESOURCE`].
    pub async fn token(&self, resource: &str) -> Result<String, CredentialError> {
        let req = match &self.endpoint {
            IdentityEndpoint::AppService { url, header } => self
                .client
                .get(url.clone())
                .query(&[("resource", resource), ("api-version", APP_SERVICE_API_VERSION)])
                .header(APP_SERVICE_HEADER, header.clone()),
            IdentityEndpoint::Instance { url } => self
                .client
                .get(url.clone())
                .query(&[("resource", resource), ("api-version", IMDS_API_VERSION)])
                .header("Metadata", "true"),
        };

        tracing::debug!(message = "requesting managed identity token", resource = %resource);
        let res = req.send().await?;
        let status = res.status();
        if status != StatusCode::OK {
            return Err(CredentialError::Unexpected(status));
        }

        Ok(res.json::<TokenResponse>().await?.access_token)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[cfg(test)]
mod test {
    use super::{CredentialError, ManagedIdentityCredential, EVENT_HUBS_RESOURCE, VAULT_RESOURCE};
    use reqwest::{Client, StatusCode};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_app_service_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/msi/token"))
            .and(query_param("resource", VAULT_RESOURCE))
            .and(query_param("api-version", "2019-08-01"))
            .and(header("X-IDENTITY-HEADER", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "vault-token",
                "expires_on": "1714525200",
                "resource": VAULT_RESOURCE,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/msi/token", server.uri());
        let credential = ManagedIdentityCredential::app_service(Client::new(), &endpoint, "abc123").unwrap();

        assert_eq!("vault-token", credential.token(VAULT_RESOURCE).await.unwrap());
    }

    #[tokio::test]
    async fn test_instance_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(query_param("resource", EVENT_HUBS_RESOURCE))
            .and(query_param("api-version", "2018-02-01"))
            .and(header("Metadata", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "hub-token"})))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/metadata/identity/oauth2/token", server.uri());
        let credential = ManagedIdentityCredential::instance(Client::new(), &endpoint).unwrap();

        assert_eq!("hub-token", credential.token(EVENT_HUBS_RESOURCE).await.unwrap());
    }

    #[tokio::test]
    async fn test_token_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("identity not found"))
            .mount(&server)
            .await;

        let credential = ManagedIdentityCredential::instance(Client::new(), &server.uri()).unwrap();
        let res = credential.token(VAULT_RESOURCE).await;

        assert!(matches!(res, Err(CredentialError::Unexpected(StatusCode::BAD_REQUEST))));
    }

    #[test]
    fn test_invalid_endpoint() {
        let res = ManagedIdentityCredential::instance(Client::new(), "::not a url");
        assert!(matches!(res, Err(CredentialError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_debug_hides_header() {
        let credential = ManagedIdentityCredential::app_service(Client::new(), "http://localhost:8081/msi/token", "abc123").unwrap();
        let out = format!("{:?}", credential);

        assert!(!out.contains("abc123"));
        assert!(out.contains("localhost:8081"));
    }
}
