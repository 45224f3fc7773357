// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fare quote route.

use crate::error::{AppError, Result};
use crate::models::{Location, VehicleType};
use crate::services::fare::{FareAssessment, FareQuote};
use crate::services::providers::{RouteEstimate, WeatherReport};
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/fares/quote", post(quote_fare))
}

/// Trip to price, optionally with the fare the poster has in mind.
#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(nested)]
    pub pickup: Location,
    #[validate(nested)]
    pub drop: Location,
    pub departure_at: DateTime<Utc>,
    pub vehicle_type: VehicleType,
    #[serde(default = "default_occupants")]
    #[validate(range(min = 1, max = 6))]
    pub occupants: u32,
    pub asking_fare: Option<f64>,
}

fn default_occupants() -> u32 {
    1
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct QuoteResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "unknown"))]
    pub route: RouteEstimate,
    #[cfg_attr(feature = "binding-generation", ts(type = "unknown"))]
    pub weather: WeatherReport,
    #[cfg_attr(feature = "binding-generation", ts(type = "unknown"))]
    pub quote: FareQuote,
    /// Present when an asking fare was supplied
    #[cfg_attr(feature = "binding-generation", ts(type = "unknown"))]
    pub assessment: Option<FareAssessment>,
}

/// Price a trip without posting it.
async fn quote_fare(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let trip = state.lifecycle.quote_trip(
        &request.pickup,
        &request.drop,
        request.departure_at,
        request.vehicle_type,
        request.occupants,
    )?;

    let assessment = request
        .asking_fare
        .map(|asking| state.lifecycle.fares().assess(&trip.quote, asking));

    Ok(Json(QuoteResponse {
        route: trip.route,
        weather: trip.weather,
        quote: trip.quote,
        assessment,
    }))
}
