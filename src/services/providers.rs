// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route and weather providers.
//!
//! Real map/direction and weather APIs live outside this service; these
//! traits are the seam they plug into. The bundled implementations are
//! offline estimators good enough for quoting when no provider is wired up.

use crate::models::Location;
use chrono::{DateTime, FixedOffset, Timelike};
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// Average urban travel time used by the offline estimator.
const MINUTES_PER_KM: f64 = 2.0;
/// Haversine results shorter than this are rounded up.
const MIN_ROUTE_KM: f64 = 1.0;

const HEAVY_TRAFFIC_MULTIPLIER: f64 = 1.08;
const MODERATE_TRAFFIC_MULTIPLIER: f64 = 1.04;

/// Distance and durations for a pickup/drop pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    /// Free-flow duration
    pub eta_minutes: f64,
    /// Duration under expected congestion
    pub traffic_eta_minutes: f64,
}

/// Coarse weather condition as reported by a weather provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Rain,
    Drizzle,
    Thunderstorm,
    Snow,
    Mist,
    Fog,
    Haze,
    Extreme,
}

impl WeatherCondition {
    /// Parse a provider condition string ("Rain", "thunderstorm", ...).
    /// Unknown conditions are treated as clear.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "clouds" => Self::Clouds,
            "rain" => Self::Rain,
            "drizzle" => Self::Drizzle,
            "thunderstorm" => Self::Thunderstorm,
            "snow" => Self::Snow,
            "mist" => Self::Mist,
            "fog" => Self::Fog,
            "haze" => Self::Haze,
            "extreme" => Self::Extreme,
            _ => Self::Clear,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Clouds => "Cloudy",
            Self::Rain => "Rainy",
            Self::Drizzle => "Drizzly",
            Self::Thunderstorm => "Stormy",
            Self::Snow => "Snowy",
            Self::Mist => "Misty",
            Self::Fog => "Foggy",
            Self::Haze => "Hazy",
            Self::Extreme => "Extreme",
        }
    }
}

/// Weather at the pickup point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub condition: WeatherCondition,
    pub temperature_c: f64,
}

impl Default for WeatherReport {
    fn default() -> Self {
        Self {
            condition: WeatherCondition::Clear,
            temperature_c: 25.0,
        }
    }
}

impl WeatherReport {
    /// Map the report to an (uncapped) fare multiplier.
    ///
    /// Vehicle-specific caps are applied by the fare engine.
    pub fn multiplier(&self) -> f64 {
        match self.condition {
            WeatherCondition::Thunderstorm => 1.10,
            WeatherCondition::Rain | WeatherCondition::Drizzle => 1.08,
            WeatherCondition::Snow => 1.15,
            WeatherCondition::Mist | WeatherCondition::Fog | WeatherCondition::Haze => 1.05,
            WeatherCondition::Clouds => 1.02,
            WeatherCondition::Extreme => 1.12,
            WeatherCondition::Clear => {
                if self.temperature_c > 35.0 || self.temperature_c < 10.0 {
                    1.04
                } else {
                    1.0
                }
            }
        }
    }
}

/// Source of route estimates.
pub trait RouteProvider: Send + Sync {
    /// Estimate the route for a trip departing at `departure` (market local time).
    fn route(
        &self,
        pickup: &Location,
        drop: &Location,
        departure: DateTime<FixedOffset>,
    ) -> RouteEstimate;
}

/// Source of weather reports.
pub trait WeatherProvider: Send + Sync {
    fn weather(&self, location: &Location) -> WeatherReport;
}

/// Straight-line route estimator with hour-of-day congestion.
#[derive(Debug, Default, Clone, Copy)]
pub struct HaversineRoutes;

impl HaversineRoutes {
    fn traffic_multiplier(hour: u32) -> f64 {
        match hour {
            8..=9 | 17..=18 => HEAVY_TRAFFIC_MULTIPLIER,
            7..=10 | 16..=19 => MODERATE_TRAFFIC_MULTIPLIER,
            _ => 1.0,
        }
    }
}

impl RouteProvider for HaversineRoutes {
    fn route(
        &self,
        pickup: &Location,
        drop: &Location,
        departure: DateTime<FixedOffset>,
    ) -> RouteEstimate {
        let from = Point::new(pickup.lng, pickup.lat);
        let to = Point::new(drop.lng, drop.lat);
        let distance_km = (Haversine.distance(from, to) / 1000.0).max(MIN_ROUTE_KM);

        let eta_minutes = distance_km * MINUTES_PER_KM;
        let traffic_eta_minutes = eta_minutes * Self::traffic_multiplier(departure.hour());

        RouteEstimate {
            distance_km,
            eta_minutes,
            traffic_eta_minutes,
        }
    }
}

/// Weather provider that always reports the same conditions.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticWeather {
    report: WeatherReport,
}

impl StaticWeather {
    pub fn new(report: WeatherReport) -> Self {
        Self { report }
    }
}

impl WeatherProvider for StaticWeather {
    fn weather(&self, _location: &Location) -> WeatherReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn loc(lat: f64, lng: f64) -> Location {
        Location {
            label: "test".to_string(),
            lat,
            lng,
        }
    }

    fn at_hour(hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(6 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 4, hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_short_routes_round_up_to_one_km() {
        let route = HaversineRoutes.route(&loc(23.78, 90.41), &loc(23.78, 90.41), at_hour(12));
        assert_eq!(route.distance_km, 1.0);
        assert_eq!(route.eta_minutes, 2.0);
    }

    #[test]
    fn test_haversine_distance_is_plausible() {
        // Roughly 0.1 degree of latitude ~ 11.1 km
        let route = HaversineRoutes.route(&loc(23.70, 90.40), &loc(23.80, 90.40), at_hour(12));
        assert!((route.distance_km - 11.1).abs() < 0.2, "{}", route.distance_km);
        assert_eq!(route.traffic_eta_minutes, route.eta_minutes);
    }

    #[test]
    fn test_rush_hour_congestion() {
        let heavy = HaversineRoutes.route(&loc(23.70, 90.40), &loc(23.80, 90.40), at_hour(8));
        let moderate = HaversineRoutes.route(&loc(23.70, 90.40), &loc(23.80, 90.40), at_hour(7));
        assert!((heavy.traffic_eta_minutes / heavy.eta_minutes - 1.08).abs() < 1e-9);
        assert!((moderate.traffic_eta_minutes / moderate.eta_minutes - 1.04).abs() < 1e-9);
    }

    #[test]
    fn test_weather_multiplier_table() {
        let report = |condition, temperature_c| WeatherReport {
            condition,
            temperature_c,
        };
        assert_eq!(report(WeatherCondition::Thunderstorm, 25.0).multiplier(), 1.10);
        assert_eq!(report(WeatherCondition::Drizzle, 25.0).multiplier(), 1.08);
        assert_eq!(report(WeatherCondition::Snow, -2.0).multiplier(), 1.15);
        assert_eq!(report(WeatherCondition::Clear, 25.0).multiplier(), 1.0);
        assert_eq!(report(WeatherCondition::Clear, 38.0).multiplier(), 1.04);
        assert_eq!(report(WeatherCondition::Clear, 5.0).multiplier(), 1.04);
    }

    #[test]
    fn test_condition_parse_is_case_insensitive() {
        assert_eq!(WeatherCondition::parse("Rain"), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::parse(" HAZE "), WeatherCondition::Haze);
        assert_eq!(WeatherCondition::parse("sandstorm"), WeatherCondition::Clear);
    }
}
