// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{FixedOffset, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use ridepool::models::{Location, VehicleType};
use ridepool::services::fare::FareRequest;
use ridepool::services::providers::{WeatherCondition, WeatherReport};
use ridepool::services::{FareEngine, HaversineRoutes, RouteProvider};
use std::hint::black_box;

fn benchmark_fare_quotes(c: &mut Criterion) {
    let engine = FareEngine::new(FixedOffset::east_opt(6 * 3600).unwrap());

    // Friday evening peak in rain, full carpool
    let carpool = FareRequest {
        distance_km: 12.4,
        eta_minutes: 31.0,
        traffic_eta_minutes: 52.0,
        departure_at: Utc.with_ymd_and_hms(2026, 3, 6, 12, 30, 0).unwrap(),
        vehicle: VehicleType::Car,
        occupants: 4,
        weather: WeatherReport {
            condition: WeatherCondition::Rain,
            temperature_c: 24.0,
        },
    };
    let bike = FareRequest {
        vehicle: VehicleType::Bike,
        occupants: 1,
        weather: WeatherReport::default(),
        ..carpool
    };

    let mut group = c.benchmark_group("fare_engine");

    group.bench_function("quote_car_carpool", |b| {
        b.iter(|| engine.quote(black_box(&carpool)))
    });

    group.bench_function("quote_bike", |b| b.iter(|| engine.quote(black_box(&bike))));

    let quote = engine.quote(&carpool).expect("Failed to quote");
    group.bench_function("assess_asking_fare", |b| {
        b.iter(|| engine.assess(black_box(&quote), black_box(900.0)))
    });

    group.finish();
}

fn benchmark_route_estimate(c: &mut Criterion) {
    let pickup = Location {
        label: "Uttara Sector 7".into(),
        lat: 23.8759,
        lng: 90.3795,
    };
    let drop = Location {
        label: "Motijheel".into(),
        lat: 23.7330,
        lng: 90.4172,
    };
    let departure = FixedOffset::east_opt(6 * 3600)
        .unwrap()
        .with_ymd_and_hms(2026, 3, 4, 8, 45, 0)
        .unwrap();

    c.bench_function("haversine_route", |b| {
        b.iter(|| HaversineRoutes.route(black_box(&pickup), black_box(&drop), departure))
    });
}

criterion_group!(benches, benchmark_fare_quotes, benchmark_route_estimate);
criterion_main!(benches);
