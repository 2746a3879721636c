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

use clap::{Parser, ValueEnum};
use prometheus_client::registry::Registry;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Level};
use weather_collector::credential::ManagedIdentityCredential;
use weather_collector::dispatch::EventHubPublisher;
use weather_collector::http::RequestContext;
use weather_collector::metrics::CollectorMetrics;
use weather_collector::pipeline::{PipelineConfig, PipelineRunner, DEFAULT_API_KEY_SECRET, DEFAULT_API_URL};
use weather_collector::secrets::{EnvSecretStore, KeyVaultSecretStore, SecretStore};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9783);
const DEFAULT_REFRESH_SECS: u64 = 60;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_VAULT_URL: &str = "https://key-weather-project.vault.azure.net/";
const DEFAULT_EVENTHUB_NAMESPACE: &str = "hub-weather-project.servicebus.windows.net";
const DEFAULT_EVENTHUB_NAME: &str = "eventhubwheather";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SecretSource {
    /// Azure Key Vault, using the managed identity of the host
    KeyVault,
    /// Environment variables named after the secret
    Env,
}

#[derive(Debug, Parser)]
#[clap(name = "weather_collector", version = clap::crate_version!())]
struct WeatherCollectorApplication {
    /// Base URL for the WeatherAPI.com API
    #[clap(long, env = "WEATHER_API_URL", default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// Where to read the WeatherAPI.com key from
    #[clap(long, value_enum, default_value_t = SecretSource::KeyVault)]
    secret_store: SecretSource,

    /// URL of the Azure Key Vault holding the WeatherAPI.com key
    #[clap(long, env = "WEATHER_VAULT_URL", default_value_t = DEFAULT_VAULT_URL.into())]
    vault_url: String,

    /// Name of the secret holding the WeatherAPI.com key
    #[clap(long, env = "WEATHER_API_KEY_SECRET", default_value_t = DEFAULT_API_KEY_SECRET.into())]
    api_key_secret: String,

    /// Fully qualified Event Hubs namespace to publish to
    #[clap(long, env = "WEATHER_EVENTHUB_NAMESPACE", default_value_t = DEFAULT_EVENTHUB_NAMESPACE.into())]
    eventhub_namespace: String,

    /// Name of the Event Hub to publish to
    #[clap(long, env = "WEATHER_EVENTHUB_NAME", default_value_t = DEFAULT_EVENTHUB_NAME.into())]
    eventhub_name: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Fetch weather for all locations at this interval, in seconds.
    #[clap(long, default_value_t = DEFAULT_REFRESH_SECS)]
    refresh_secs: u64,

    /// Timeout for each HTTP request made, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Fetch and publish weather for all locations once, then exit
    #[clap(long)]
    once: bool,

    /// Address to bind to for exposing metrics. Not used with --once.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = WeatherCollectorApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let credential = ManagedIdentityCredential::from_env(http_client.clone())
        .map(Arc::new)
        .unwrap_or_else(|e| {
            tracing::error!(message = "unable to initialize managed identity", error = %e);
            process::exit(1)
        });

    let secrets: Arc<dyn SecretStore> = match opts.secret_store {
        SecretSource::Env => Arc::new(EnvSecretStore),
        SecretSource::KeyVault => Arc::new(
            KeyVaultSecretStore::new(http_client.clone(), &opts.vault_url, credential.clone()).unwrap_or_else(|e| {
                tracing::error!(message = "invalid key vault", vault_url = %opts.vault_url, error = %e);
                process::exit(1)
            }),
        ),
    };

    let publisher = EventHubPublisher::new(
        http_client.clone(),
        &opts.eventhub_namespace,
        &opts.eventhub_name,
        credential,
    )
    .unwrap_or_else(|e| {
        tracing::error!(message = "invalid event hub", namespace = %opts.eventhub_namespace, error = %e);
        process::exit(1)
    });

    let mut registry = Registry::default();
    let metrics = CollectorMetrics::new(&mut registry);
    let config = PipelineConfig {
        api_url: opts.api_url.clone(),
        api_key_secret: opts.api_key_secret.clone(),
    };
    let runner = PipelineRunner::new(config, http_client, secrets, Arc::new(publisher), metrics);

    if opts.once {
        run_once(&runner).await;
        return Ok(());
    }

    let mut interval = tokio::time::interval(Duration::from_secs(opts.refresh_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let api_url = opts.api_url.clone();
    let eventhub = opts.eventhub_name.clone();
    tokio::spawn(async move {
        tracing::info!(message = "weather collection started", api_url = %api_url, eventhub = %eventhub);

        loop {
            let _ = interval.tick().await;
            run_once(&runner).await;
        }
    });

    let context = Arc::new(RequestContext::new(registry));
    let handler = weather_collector::http::text_metrics(context);
    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "server started", address = %opts.bind);
    server
        .serve(handler.into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Process every location once, logging the outcome
async fn run_once(runner: &PipelineRunner) {
    match runner
        .run()
        .instrument(tracing::span!(Level::INFO, "weather_run"))
        .await
    {
        Ok(summary) => {
            tracing::info!(
                message = "weather collection finished",
                processed = summary.processed.len(),
                skipped = summary.skipped.len(),
            );
        }
        Err(e) => {
            tracing::error!(message = "weather collection failed", error = %e);
        }
    }
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
