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

//! Collect weather for Brazilian state capitals and publish it to Azure Event Hubs
//!
//! ## Features
//!
//! `weather_collector` fetches current conditions, a three day forecast, and active
//! alerts for the capital of each Brazilian state from the [WeatherAPI.com] API on
//! a fixed interval. The three responses for each city are combined into a single
//! flat JSON record, tagged with the state code and region of the city, and
//! published as a single event to an [Azure Event Hub].
//!
//! Each city is handled independently. If fetching weather for one city fails, the
//! error is logged and the collector moves on to the next city. If one of the three
//! API endpoints returns an error for a city, the fields from that endpoint are
//! `null` (or empty lists) in the published record.
//!
//! Every record has the same keys, whether or not the API returned a value for
//! them. An example record is below.
//!
//! ```json
//! {
//!   "name": "Curitiba", "region": "Parana", "country": "Brazil",
//!   "lat": -25.42, "lon": -49.25, "localtime": "2024-05-01 14:05",
//!   "temp_c": 18.0, "temp_f": 64.4, "is_day": 1,
//!   "condition_text": "Cloudy", "condition_icon": "//cdn.weatherapi.com/weather/64x64/day/119.png",
//!   "wind_mph": 6.9, "wind_kph": 11.2, "wind_degree": 90, "wind_dir": "E",
//!   "pressure_mb": 1019.0, "pressure_in": 30.09, "precip_mm": 0.0, "precip_in": 0.0,
//!   "humidity": 77, "cloud": 75, "feelslike_c": 18.0, "feelslike_f": 64.4,
//!   "vis_km": 10.0, "vis_miles": 6.0, "uv": 4.0,
//!   "air_quality": {
//!     "co": 300.4, "no2": 12.5, "o3": 41.2, "so2": 3.1, "pm2_5": 6.2, "pm10": 8.0,
//!     "us-epa-index": 1, "gb-defra-index": 1
//!   },
//!   "alerts": [],
//!   "forecast": [
//!     {"date": "2024-05-01", "date_epoch": 1714521600, "maxtemp_c": 21.3, "mintemp_c": 13.9, "condition": "Patchy rain nearby"}
//!   ],
//!   "subdivision_code": "PR",
//!   "region_label": "Sul"
//! }
//! ```
//!
//! The following metrics are exposed in Prometheus format.
//!
//! * `weather_collector_runs_total{result=$RESULT}` - Runs by result (`success` or `failure`).
//! * `weather_collector_locations_total{subdivision=$STATE, outcome=$OUTCOME}` - Cities by outcome
//!   (`processed` or `skipped`).
//! * `weather_collector_sections_unavailable_total{section=$SECTION}` - API responses with an error status.
//! * `weather_collector_events_total{result=$RESULT}` - Events published by result.
//!
//! [WeatherAPI.com]: https://www.weatherapi.com/docs/
//! [Azure Event Hub]: https://learn.microsoft.com/en-us/azure/event-hubs/
//!
//! ## Build
//!
//! `weather_collector` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Credentials
//!
//! The WeatherAPI.com key is read from an Azure Key Vault secret (`weatherapikey` by
//! default). Both Key Vault and Event Hubs are accessed using the managed identity of
//! the host, which must be granted the "Key Vault Secrets User" and "Azure Event Hubs
//! Data Sender" roles. When running somewhere without a managed identity, the key can be
//! read from the `WEATHERAPIKEY` environment variable instead.
//!
//! ```text
//! WEATHERAPIKEY=0123456789abcdef ./weather_collector --secret-store env --once
//! ```
//!
//! ### Run
//!
//! By default, `weather_collector` fetches weather every 60 seconds until it receives
//! SIGTERM or SIGINT.
//!
//! ```text
//! ./weather_collector \
//!     --vault-url https://key-weather-project.vault.azure.net/ \
//!     --eventhub-namespace hub-weather-project.servicebus.windows.net \
//!     --eventhub-name eventhubwheather
//! ```
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `9783` at `/metrics`.
//!

pub mod client;
pub mod credential;
pub mod dispatch;
pub mod flatten;
pub mod http;
pub mod locations;
pub mod metrics;
pub mod pipeline;
pub mod secrets;
