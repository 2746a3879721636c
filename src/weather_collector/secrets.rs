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

use crate::credential::{CredentialError, ManagedIdentityCredential, VAULT_RESOURCE};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::sync::Arc;

const KEY_VAULT_API_VERSION: &str = "7.4";

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret {0} not found")]
    Missing(String),
    #[error("invalid vault URL {0}")]
    InvalidUrl(String),
    #[error("unable to acquire token: {0}")]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0} from secret store")]
    Unexpected(StatusCode),
}

/// Source of secret values, looked up by name.
#[async_trait]
pub trait SecretStore: fmt::Debug + Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError>;
}

/// Secrets read from an Azure Key Vault using a managed identity.
#[derive(Debug)]
pub struct KeyVaultSecretStore {
    client: Client,
    vault_url: Url,
    credential: Arc<ManagedIdentityCredential>,
}

impl KeyVaultSecretStore {
    pub fn new(client: Client, vault_url: &str, credential: Arc<ManagedIdentityCredential>) -> Result<Self, SecretError> {
        let parsed = Url::parse(vault_url).map_err(|e| SecretError::InvalidUrl(format!("{}: {}", vault_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(SecretError::InvalidUrl(vault_url.to_owned()));
        }

        Ok(KeyVaultSecretStore {
            client,
            vault_url: parsed,
            credential,
        })
    }

    fn secret_url(&self, name: &str) -> Url {
        let mut url = self.vault_url.clone();
        if let Ok(mut p) = url.path_segments_mut() {
            p.pop_if_empty().push("secrets").push(name);
        }

        url
    }
}

#[async_trait]
impl SecretStore for KeyVaultSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        let token = self.credential.token(VAULT_RESOURCE).await?;
        let url = self.secret_url(name);
        tracing::debug!(message = "fetching secret from key vault", url = %url);

        let res = self
            .client
            .get(url)
            .query(&[("api-version", KEY_VAULT_API_VERSION)])
            .bearer_auth(token)
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SecretError::Missing(name.to_owned()));
        } else if status != StatusCode::OK {
            return Err(SecretError::Unexpected(status));
        }

        res.json::<SecretBundle>()
            .await?
            .value
            .ok_or_else(|| SecretError::Missing(name.to_owned()))
    }
}

#[derive(Deserialize)]
struct SecretBundle {
    value: Option<String>,
}

/// Secrets read from environment variables, for running outside of Azure.
///
/// The variable for a secret is its name in upper case with dashes replaced by
/// underscores, e.g. `weather-api-key` is read from `WEATHER_API_KEY`.
#[derive(Debug, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    fn var_name(name: &str) -> String {
        name.to_uppercase().replace('-', "_")
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        let var = Self::var_name(name);
        match env::var(&var) {
            Ok(v) if !v.is_empty() => Ok(v),
            _ => Err(SecretError::Missing(var)),
        }
    }
}
