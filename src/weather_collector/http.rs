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

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const TEXT_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// State shared by all requests to the metrics endpoint.
#[derive(Debug)]
pub struct RequestContext {
    registry: Registry,
}

impl RequestContext {
    pub fn new(registry: Registry) -> Self {
        RequestContext { registry }
    }
}

/// Router serving metrics from the registry in the context at `/metrics`
pub fn text_metrics(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn metrics_handler(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, TEXT_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod test {
    use super::{text_metrics, RequestContext};
    use crate::metrics::CollectorMetrics;
    use prometheus_client::registry::Registry;
    use reqwest::StatusCode;
    use std::net::SocketAddr;
    use std::sync::Arc;

    async fn serve(registry: Registry) -> SocketAddr {
        let context = Arc::new(RequestContext::new(registry));
        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
            .serve(text_metrics(context).into_make_service());
        let addr = server.local_addr();

        tokio::spawn(server);
        addr
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let mut registry = Registry::default();
        let metrics = CollectorMetrics::new(&mut registry);
        metrics.run(true);

        let addr = serve(registry).await;
        let res = reqwest::get(format!("http://{}/metrics", addr)).await.unwrap();

        assert_eq!(StatusCode::OK, res.status());
        assert!(res.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/openmetrics-text"));
        assert!(res
            .text()
            .await
            .unwrap()
            .contains(r#"weather_collector_runs_total{result="success"} 1"#));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let addr = serve(Registry::default()).await;
        let res = reqwest::get(format!("http://{}/other", addr)).await.unwrap();

        assert_eq!(StatusCode::NOT_FOUND, res.status());
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let addr = serve(Registry::default()).await;
        let res = reqwest::Client::new()
            .post(format!("http://{}/metrics", addr))
            .send()
            .await
            .unwrap();

        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, res.status());
    }
}
