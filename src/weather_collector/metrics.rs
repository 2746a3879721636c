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

use crate::locations::Location;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    Skipped,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RunLabels {
    result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct LocationLabels {
    subdivision: String,
    outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SectionLabels {
    section: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct EventLabels {
    result: String,
}

/// Counters describing the outcome of each run of the pipeline.
///
/// All metrics are created and registered upon call to `CollectorMetrics::new()`
/// and share the prefix "weather_collector_". Clones share the same underlying
/// counters.
#[derive(Debug, Clone)]
pub struct CollectorMetrics {
    runs: Family<RunLabels, Counter>,
    locations: Family<LocationLabels, Counter>,
    unavailable: Family<SectionLabels, Counter>,
    events: Family<EventLabels, Counter>,
}

impl CollectorMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let runs = Family::<RunLabels, Counter>::default();
        let locations = Family::<LocationLabels, Counter>::default();
        let unavailable = Family::<SectionLabels, Counter>::default();
        let events = Family::<EventLabels, Counter>::default();

        reg.register("weather_collector_runs", "Pipeline runs by result", runs.clone());
        reg.register(
            "weather_collector_locations",
            "Locations by state and outcome",
            locations.clone(),
        );
        reg.register(
            "weather_collector_sections_unavailable",
            "Weather API responses with a non-200 status, by endpoint",
            unavailable.clone(),
        );
        reg.register("weather_collector_events", "Events published by result", events.clone());

        Self {
            runs,
            locations,
            unavailable,
            events,
        }
    }

    pub fn run(&self, ok: bool) {
        let result = if ok { "success" } else { "failure" };
        self.runs
            .get_or_create(&RunLabels {
                result: result.to_owned(),
            })
            .inc();
    }

    pub fn location(&self, location: &Location, outcome: Outcome) {
        self.locations
            .get_or_create(&LocationLabels {
                subdivision: location.subdivision_code.to_owned(),
                outcome: outcome.as_str().to_owned(),
            })
            .inc();
    }

    pub fn section_unavailable(&self, section: &str) {
        self.unavailable
            .get_or_create(&SectionLabels {
                section: section.to_owned(),
            })
            .inc();
    }

    pub fn event(&self, ok: bool) {
        let result = if ok { "success" } else { "failure" };
        self.events
            .get_or_create(&EventLabels {
                result: result.to_owned(),
            })
            .inc();
    }
}

#[cfg(test)]
mod test {
    use super::{CollectorMetrics, Outcome};
    use crate::locations;
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;

    #[test]
    fn test_counters_encoded() {
        let mut registry = Registry::default();
        let metrics = CollectorMetrics::new(&mut registry);
        let location = &locations::all()[0];

        metrics.run(true);
        metrics.location(location, Outcome::Processed);
        metrics.location(location, Outcome::Processed);
        metrics.location(location, Outcome::Skipped);
        metrics.section_unavailable("alerts");
        metrics.clone().event(false);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(buf.contains(r#"weather_collector_runs_total{result="success"} 1"#));
        assert!(buf.contains(r#"weather_collector_locations_total{subdivision="AC",outcome="processed"} 2"#));
        assert!(buf.contains(r#"weather_collector_locations_total{subdivision="AC",outcome="skipped"} 1"#));
        assert!(buf.contains(r#"weather_collector_sections_unavailable_total{section="alerts"} 1"#));
        assert!(buf.contains(r#"weather_collector_events_total{result="failure"} 1"#));
    }
}
