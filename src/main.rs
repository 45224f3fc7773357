// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ridepool API Server
//!
//! Posts and prices rides and carpools, allocates seats atomically and
//! notifies every affected party about each change.

use ridepool::{
    config::{ChangeFeedMode, Config, StoreBackend},
    db::{FirestoreDb, ListingStore, MarkerStore, MemoryStore},
    services::{
        ChangePublisher, ChannelPublisher, DeliveryChannel, ExpirySweeper, FareEngine,
        GoogleOidcVerifier, LifecycleManager, LogDelivery, NotificationCoordinator, PushGateway,
        RetryConfig, StaticWeather, TasksService,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Ridepool API");

    // Listings and notification markers share one backend
    let (listings, markers): (Arc<dyn ListingStore>, Arc<dyn MarkerStore>) =
        match config.store_backend {
            StoreBackend::Firestore => {
                let db = Arc::new(
                    FirestoreDb::new(&config.gcp_project_id)
                        .await
                        .expect("Failed to connect to Firestore"),
                );
                (db.clone() as Arc<dyn ListingStore>, db as Arc<dyn MarkerStore>)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; listings are lost on restart");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn ListingStore>, store as Arc<dyn MarkerStore>)
            }
        };

    let delivery: Arc<dyn DeliveryChannel> = match &config.push_gateway_url {
        Some(url) => {
            tracing::info!(url = %url, "Delivering notifications via push gateway");
            Arc::new(PushGateway::new(url.clone()).expect("Failed to build push gateway client"))
        }
        None => {
            tracing::info!("No push gateway configured, logging notifications only");
            Arc::new(LogDelivery)
        }
    };
    let coordinator = Arc::new(NotificationCoordinator::new(markers, delivery));

    // Change feed: in-process channel or Cloud Tasks callbacks
    let (publisher, coordinator_handle): (Arc<dyn ChangePublisher>, _) = match config.change_feed
    {
        ChangeFeedMode::Local => {
            let (publisher, changes) =
                ChannelPublisher::new(ridepool::services::changes::CHANGE_FEED_CAPACITY);
            let handle = coordinator.clone().spawn(changes);
            (Arc::new(publisher) as Arc<dyn ChangePublisher>, Some(handle))
        }
        ChangeFeedMode::Tasks => {
            let tasks_service = TasksService::new(
                &config.gcp_project_id,
                &config.gcp_region,
                &config.api_url,
            );
            tracing::info!(
                project = %config.gcp_project_id,
                "Cloud Tasks change feed initialized"
            );
            (Arc::new(tasks_service) as Arc<dyn ChangePublisher>, None)
        }
    };

    tracing::info!(
        condition = config.weather.condition.label(),
        temperature_c = config.weather.temperature_c,
        "Quoting with fixed weather"
    );
    let lifecycle = Arc::new(
        LifecycleManager::new(
            listings,
            publisher,
            FareEngine::new(config.fare_utc_offset),
        )
        .with_weather_provider(Arc::new(StaticWeather::new(config.weather)))
        .with_retry(RetryConfig::DEFAULT.with_max_retries(config.tx_max_retries)),
    );

    let sweeper = if config.sweep_interval.is_zero() {
        tracing::info!("Background expiry sweep disabled");
        None
    } else {
        Some(ExpirySweeper::new(lifecycle.clone(), config.sweep_interval).spawn())
    };

    let tasks_verifier =
        Arc::new(GoogleOidcVerifier::new(&config).expect("Failed to initialize OIDC verifier"));

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        lifecycle,
        coordinator,
        tasks_verifier,
    });

    // Build router
    let app = ridepool::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        let report = sweeper.stop().await;
        tracing::info!(expired = report.expired, "Expiry sweeper shut down");
    }
    if let Some(handle) = coordinator_handle {
        let report = handle.stop().await;
        tracing::info!(delivered = report.delivered, "Coordinator shut down");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ridepool=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
