// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fare fairness engine.
//!
//! Pure computation from trip parameters to a suggested fare, an acceptable
//! band around it, and a per-seat share. The engine never touches storage;
//! callers persist the returned [`FareQuote`].
//!
//! Rates follow the metered AC-taxi tariff: a flat fare for the first 2 km,
//! a per-km rate beyond, waiting charges for congestion and a booking fee.
//! Bikes are priced as a fixed fraction of the car fare.

use crate::models::{Fare, VehicleType};
use crate::services::providers::WeatherReport;
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Fares are rounded to the nearest multiple of this.
pub const DENOMINATION: f64 = 5.0;

const FLAT_DISTANCE_KM: f64 = 2.0;
const FLAT_FARE: f64 = 85.0;
const PER_KM_RATE: f64 = 34.0;
const MINIMUM_CHARGE: f64 = 85.0;
const SERVICE_FEE: f64 = 20.0;

/// Only this share of congestion delay counts as waiting time.
const WAITING_SHARE: f64 = 0.7;
const WAITING_FREE_MINUTES: f64 = 5.0;
const WAITING_BLOCK_MINUTES: f64 = 3.0;
const WAITING_BLOCK_CHARGE: f64 = 8.5;

/// Per-vehicle tuning of the adjustment factors and the band.
#[derive(Debug, Clone, Copy)]
struct VehicleRates {
    /// Fraction of the car base fare
    base_fraction: f64,
    weather_cap: f64,
    /// Congestion ratio above which the traffic factor applies
    traffic_threshold: f64,
    traffic_cap: f64,
    band_floor_abs: f64,
    band_pct: f64,
    hard_minimum: f64,
}

const CAR_RATES: VehicleRates = VehicleRates {
    base_fraction: 1.0,
    weather_cap: 1.06,
    traffic_threshold: 1.3,
    traffic_cap: 1.12,
    band_floor_abs: 40.0,
    band_pct: 0.10,
    hard_minimum: 105.0,
};

const BIKE_RATES: VehicleRates = VehicleRates {
    base_fraction: 0.45,
    weather_cap: 1.10,
    traffic_threshold: 1.6,
    traffic_cap: 1.05,
    band_floor_abs: 25.0,
    band_pct: 0.15,
    hard_minimum: 60.0,
};

impl VehicleRates {
    fn for_vehicle(vehicle: VehicleType) -> &'static VehicleRates {
        match vehicle {
            VehicleType::Car => &CAR_RATES,
            VehicleType::Bike => &BIKE_RATES,
        }
    }
}

/// Round to the nearest currency denomination.
pub fn round_to_denomination(amount: f64) -> f64 {
    (amount / DENOMINATION).round() * DENOMINATION
}

/// Inputs to a fare quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareRequest {
    pub distance_km: f64,
    /// Free-flow duration
    pub eta_minutes: f64,
    /// Duration under expected congestion
    pub traffic_eta_minutes: f64,
    pub departure_at: DateTime<Utc>,
    pub vehicle: VehicleType,
    /// Passengers carried (seats offered for a carpool)
    pub occupants: u32,
    pub weather: WeatherReport,
}

/// Which adjustment a factor represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    TimeOfDay,
    Weather,
    Occupancy,
    Traffic,
}

/// One multiplicative adjustment applied to the base fare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareFactor {
    pub kind: FactorKind,
    /// Human-readable cause ("Peak hours", "Rainy weather", ...)
    pub label: String,
    pub multiplier: f64,
}

impl FareFactor {
    fn percent(&self) -> f64 {
        (self.multiplier - 1.0) * 100.0
    }
}

/// Result of a quote: suggestion, band and the breakdown behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareQuote {
    pub vehicle: VehicleType,
    pub distance_km: f64,
    pub occupants: u32,
    /// Car tariff before vehicle fraction and factors (includes fee and waiting)
    pub metered_fare: f64,
    pub waiting_charge: f64,
    /// Factors that raised the fare, in application order
    pub factors: Vec<FareFactor>,
    pub time_of_day: String,
    pub suggested: f64,
    pub band_low: f64,
    pub band_high: f64,
    pub per_occupant: f64,
}

/// Direction of an unfair fare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FareVerdict {
    Fair,
    TooLow,
    TooHigh,
}

/// Classification of a caller-supplied asking fare against a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareAssessment {
    pub verdict: FareVerdict,
    pub asking: f64,
    /// Why the fare is (un)fair, built from the quote's breakdown
    pub reason: String,
    pub suggestion: Option<String>,
}

impl FareAssessment {
    pub fn is_fair(&self) -> bool {
        self.verdict == FareVerdict::Fair
    }
}

/// Fare engine input errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FareError {
    #[error("Invalid fare input: {0}")]
    InvalidInput(String),
}

/// Stateless fare calculator bound to the market's local time zone.
#[derive(Debug, Clone, Copy)]
pub struct FareEngine {
    local_offset: FixedOffset,
}

impl FareEngine {
    pub fn new(local_offset: FixedOffset) -> Self {
        Self { local_offset }
    }

    /// Market time zone used for time-of-day factors.
    pub fn local_offset(&self) -> FixedOffset {
        self.local_offset
    }

    /// Compute the suggested fare and acceptable band for a trip.
    pub fn quote(&self, request: &FareRequest) -> Result<FareQuote, FareError> {
        validate(request)?;

        let rates = VehicleRates::for_vehicle(request.vehicle);

        let (metered, waiting_charge) = metered_fare(request);
        let mut fare = metered * rates.base_fraction;

        let local = request.departure_at.with_timezone(&self.local_offset);
        let (time_label, time_factor) = time_of_day_factor(request.vehicle, &local);

        let mut factors = Vec::new();
        if time_factor > 1.0 {
            factors.push(FareFactor {
                kind: FactorKind::TimeOfDay,
                label: time_label.to_string(),
                multiplier: time_factor,
            });
        }

        let weather_factor = request.weather.multiplier().min(rates.weather_cap);
        if weather_factor > 1.0 {
            factors.push(FareFactor {
                kind: FactorKind::Weather,
                label: format!("{} weather", request.weather.condition.label()),
                multiplier: weather_factor,
            });
        }

        if request.vehicle == VehicleType::Car {
            let occupancy = occupancy_factor(request.occupants);
            if occupancy > 1.0 {
                factors.push(FareFactor {
                    kind: FactorKind::Occupancy,
                    label: format!("{} passengers", request.occupants),
                    multiplier: occupancy,
                });
            }
        }

        let congestion = (request.traffic_eta_minutes / request.eta_minutes.max(1.0)).max(1.0);
        if congestion > rates.traffic_threshold {
            factors.push(FareFactor {
                kind: FactorKind::Traffic,
                label: "Heavy traffic delay".to_string(),
                multiplier: congestion.min(rates.traffic_cap),
            });
        }

        for factor in &factors {
            fare *= factor.multiplier;
        }

        // Short bike trips would otherwise fall below the band's floor.
        let fare = fare.max(rates.hard_minimum);

        let spread = rates.band_floor_abs.max(fare * rates.band_pct);
        let band_low = (fare - spread).max(rates.hard_minimum);
        let band_high = fare + spread;

        let suggested = round_to_denomination(fare);

        Ok(FareQuote {
            vehicle: request.vehicle,
            distance_km: request.distance_km,
            occupants: request.occupants,
            metered_fare: metered,
            waiting_charge,
            factors,
            time_of_day: time_label.to_string(),
            suggested,
            band_low: round_to_denomination(band_low),
            band_high: round_to_denomination(band_high),
            per_occupant: round_to_denomination(suggested / f64::from(request.occupants)),
        })
    }

    /// Classify an asking fare against a quote.
    pub fn assess(&self, quote: &FareQuote, asking: f64) -> FareAssessment {
        if asking < quote.band_low {
            FareAssessment {
                verdict: FareVerdict::TooLow,
                asking,
                reason: format!(
                    "Your fare of Tk {:.0} is below the fair range (Tk {:.0} - Tk {:.0}) for:\n\
                     - Distance: {:.1} km\n\
                     - {} passengers\n\
                     - Time: {}{}",
                    asking,
                    quote.band_low,
                    quote.band_high,
                    quote.distance_km,
                    quote.occupants,
                    quote.time_of_day,
                    adjustment_lines(quote),
                ),
                suggestion: Some("Consider a higher fare to cover your costs".to_string()),
            }
        } else if asking > quote.band_high {
            FareAssessment {
                verdict: FareVerdict::TooHigh,
                asking,
                reason: format!(
                    "Your fare of Tk {:.0} is above what passengers typically expect \
                     (Tk {:.0} - Tk {:.0}) for:\n\
                     - Distance: {:.1} km\n\
                     - {} passengers\n\
                     - This might reduce interest",
                    asking,
                    quote.band_low,
                    quote.band_high,
                    quote.distance_km,
                    quote.occupants,
                ),
                suggestion: Some("Consider a lower fare to attract more passengers".to_string()),
            }
        } else {
            let per_occupant = round_to_denomination(asking / f64::from(quote.occupants));
            FareAssessment {
                verdict: FareVerdict::Fair,
                asking,
                reason: format!(
                    "Your fare is appropriate for:\n\
                     - {:.1} km distance\n\
                     - {} passengers\n\
                     - {}{}\n\n\
                     Total: Tk {:.0} | Per passenger: Tk {:.0}",
                    quote.distance_km,
                    quote.occupants,
                    quote.time_of_day,
                    adjustment_lines(quote),
                    asking,
                    per_occupant,
                ),
                suggestion: None,
            }
        }
    }

    /// Fare annotation persisted on a listing.
    ///
    /// `capacity` is the number of seats the total is split across.
    pub fn annotate(quote: &FareQuote, total: f64, capacity: u32) -> Fare {
        let per_occupant = if capacity > 1 {
            round_to_denomination(total / f64::from(capacity))
        } else {
            total
        };
        Fare {
            total,
            per_occupant,
            suggested: quote.suggested,
            band_low: quote.band_low,
            band_high: quote.band_high,
        }
    }
}

fn validate(request: &FareRequest) -> Result<(), FareError> {
    if !request.distance_km.is_finite() || request.distance_km < 0.0 {
        return Err(FareError::InvalidInput(format!(
            "distance must be a non-negative number, got {}",
            request.distance_km
        )));
    }
    if !request.eta_minutes.is_finite()
        || !request.traffic_eta_minutes.is_finite()
        || request.eta_minutes < 0.0
        || request.traffic_eta_minutes < 0.0
    {
        return Err(FareError::InvalidInput(
            "durations must be non-negative numbers".to_string(),
        ));
    }
    if request.occupants == 0 {
        return Err(FareError::InvalidInput(
            "at least one occupant is required".to_string(),
        ));
    }
    if request.vehicle == VehicleType::Bike && request.occupants > 1 {
        return Err(FareError::InvalidInput(
            "a bike carries a single passenger".to_string(),
        ));
    }
    Ok(())
}

/// Metered car fare (with waiting charges and the booking fee) and the
/// waiting component on its own.
fn metered_fare(request: &FareRequest) -> (f64, f64) {
    let distance_fare = if request.distance_km <= FLAT_DISTANCE_KM {
        FLAT_FARE
    } else {
        FLAT_FARE + (request.distance_km - FLAT_DISTANCE_KM) * PER_KM_RATE
    };
    let distance_fare = distance_fare.max(MINIMUM_CHARGE);

    let waiting_minutes =
        ((request.traffic_eta_minutes - request.eta_minutes) * WAITING_SHARE).max(0.0);
    let waiting_charge = if waiting_minutes > WAITING_FREE_MINUTES {
        (waiting_minutes / WAITING_BLOCK_MINUTES).ceil() * WAITING_BLOCK_CHARGE
    } else {
        0.0
    };

    (distance_fare + waiting_charge + SERVICE_FEE, waiting_charge)
}

fn is_peak(hour: u32) -> bool {
    matches!(hour, 8..=10 | 17..=19)
}

fn is_late_night(hour: u32) -> bool {
    hour >= 22 || hour <= 6
}

fn time_of_day_factor(vehicle: VehicleType, local: &DateTime<FixedOffset>) -> (&'static str, f64) {
    let hour = local.hour();
    match vehicle {
        VehicleType::Car => {
            if matches!(local.weekday(), Weekday::Fri | Weekday::Sat) {
                ("Weekend", 1.05)
            } else if is_peak(hour) {
                ("Peak hours", 1.08)
            } else if is_late_night(hour) {
                ("Late night", 1.10)
            } else {
                ("Normal hours", 1.0)
            }
        }
        VehicleType::Bike => {
            if is_late_night(hour) {
                ("Late night", 1.12)
            } else if is_peak(hour) {
                ("Peak hours", 1.08)
            } else {
                ("Normal hours", 1.0)
            }
        }
    }
}

fn occupancy_factor(occupants: u32) -> f64 {
    match occupants {
        0 | 1 => 1.0,
        2 => 1.05,
        3 => 1.08,
        4 => 1.10,
        5 => 1.12,
        _ => 1.15,
    }
}

fn adjustment_lines(quote: &FareQuote) -> String {
    quote
        .factors
        .iter()
        .map(|f| format!("\n- {} (+{:.0}%)", f.label, f.percent()))
        .collect()
}
