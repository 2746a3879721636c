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

use crate::client::{AirQuality, Alert, AlertsResponse, CurrentResponse, ForecastDay, ForecastResponse, Section};
use crate::locations::Location;
use serde::Serialize;

/// Current conditions, air quality, alerts, and forecast for a single location.
///
/// Every field is always serialized. Values missing from the weather API (or from
/// an endpoint that returned an error) are serialized as `null`.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct FlatWeatherRecord {
    pub name: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub localtime: Option<String>,
    pub temp_c: Option<f64>,
    pub temp_f: Option<f64>,
    pub is_day: Option<i64>,
    pub condition_text: Option<String>,
    pub condition_icon: Option<String>,
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
    pub air_quality: AirQualityRecord,
    pub alerts: Vec<AlertRecord>,
    pub forecast: Vec<ForecastDayRecord>,
    pub subdivision_code: Option<String>,
    pub region_label: Option<String>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct AirQualityRecord {
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

#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct AlertRecord {
    pub headline: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct ForecastDayRecord {
    pub date: Option<String>,
    pub date_epoch: Option<i64>,
    pub maxtemp_c: Option<f64>,
    pub mintemp_c: Option<f64>,
    pub condition: Option<String>,
}

impl FlatWeatherRecord {
    /// Attach metadata about the location this record was fetched for.
    pub fn enrich(mut self, location: &Location) -> Self {
        self.subdivision_code = Some(location.subdivision_code.to_owned());
        self.region_label = Some(location.region_label.to_owned());
        self
    }
}

impl From<&AirQuality> for AirQualityRecord {
    fn from(aq: &AirQuality) -> Self {
        AirQualityRecord {
            co: aq.co,
            no2: aq.no2,
            o3: aq.o3,
            so2: aq.so2,
            pm2_5: aq.pm2_5,
            pm10: aq.pm10,
            us_epa_index: aq.us_epa_index,
            gb_defra_index: aq.gb_defra_index,
        }
    }
}

impl From<&Alert> for AlertRecord {
    fn from(alert: &Alert) -> Self {
        AlertRecord {
            headline: alert.headline.clone(),
            severity: alert.severity.clone(),
            description: alert.description.clone(),
            instruction: alert.instruction.clone(),
        }
    }
}

impl From<&ForecastDay> for ForecastDayRecord {
    fn from(fd: &ForecastDay) -> Self {
        let day = fd.day.as_ref();
        ForecastDayRecord {
            date: fd.date.clone(),
            date_epoch: fd.date_epoch,
            maxtemp_c: day.and_then(|d| d.maxtemp_c),
            mintemp_c: day.and_then(|d| d.mintemp_c),
            condition: day.and_then(|d| d.condition.as_ref()).and_then(|c| c.text.clone()),
        }
    }
}

/// Combine responses from the current, forecast, and alerts endpoints into a
/// single record.
///
/// Any part of a response that is missing results in `None` for the matching
/// fields, an empty list of forecast days, or an empty list of alerts. An
/// unavailable section is treated as if every part of it were missing. Order
/// of forecast days and alerts is preserved.
pub fn flatten(
    current: &Section<CurrentResponse>,
    forecast: &Section<ForecastResponse>,
    alerts: &Section<AlertsResponse>,
) -> FlatWeatherRecord {
    let loc = current.available().and_then(|c| c.location.as_ref());
    let cur = current.available().and_then(|c| c.current.as_ref());
    let condition = cur.and_then(|c| c.condition.as_ref());

    let forecast = forecast
        .available()
        .and_then(|f| f.forecast.as_ref())
        .and_then(|f| f.forecastday.as_ref())
        .map(|days| days.iter().map(ForecastDayRecord::from).collect())
        .unwrap_or_default();

    let alerts = alerts
        .available()
        .and_then(|a| a.alerts.as_ref())
        .map(|a| a.alert.iter().map(AlertRecord::from).collect())
        .unwrap_or_default();

    FlatWeatherRecord {
        name: loc.and_then(|l| l.name.clone()),
        region: loc.and_then(|l| l.region.clone()),
        country: loc.and_then(|l| l.country.clone()),
        lat: loc.and_then(|l| l.lat),
        lon: loc.and_then(|l| l.lon),
        localtime: loc.and_then(|l| l.localtime.clone()),
        temp_c: cur.and_then(|c| c.temp_c),
        temp_f: cur.and_then(|c| c.temp_f),
        is_day: cur.and_then(|c| c.is_day),
        condition_text: condition.and_then(|c| c.text.clone()),
        condition_icon: condition.and_then(|c| c.icon.clone()),
        wind_mph: cur.and_then(|c| c.wind_mph),
        wind_kph: cur.and_then(|c| c.wind_kph),
        wind_degree: cur.and_then(|c| c.wind_degree),
        wind_dir: cur.and_then(|c| c.wind_dir.clone()),
        pressure_mb: cur.and_then(|c| c.pressure_mb),
        pressure_in: cur.and_then(|c| c.pressure_in),
        precip_mm: cur.and_then(|c| c.precip_mm),
        precip_in: cur.and_then(|c| c.precip_in),
        humidity: cur.and_then(|c| c.humidity),
        cloud: cur.and_then(|c| c.cloud),
        feelslike_c: cur.and_then(|c| c.feelslike_c),
        feelslike_f: cur.and_then(|c| c.feelslike_f),
        vis_km: cur.and_then(|c| c.vis_km),
        vis_miles: cur.and_then(|c| c.vis_miles),
        uv: cur.and_then(|c| c.uv),
        air_quality: cur
            .and_then(|c| c.air_quality.as_ref())
            .map(AirQualityRecord::from)
            .unwrap_or_default(),
        alerts,
        forecast,
        subdivision_code: None,
        region_label: None,
    }
}
