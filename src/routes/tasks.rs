// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Task handler routes for Cloud Tasks and Cloud Scheduler callbacks.
//!
//! These endpoints are not called by users; `require_tasks_auth` guards
//! them in routes/mod.rs.

use crate::error::Result;
use crate::models::ListingChange;
use crate::services::lifecycle::SweepReport;
use crate::services::notifications::DispatchReport;
use crate::AppState;
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use std::sync::Arc;

/// Task handler routes (called by Cloud Tasks).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/listing-changed", post(listing_changed))
        .route("/tasks/expire-sweep", post(expire_sweep))
}

/// Dispatch notifications for a queued listing change.
///
/// Always 200: delivery failures are dropped, and a retry would only be
/// absorbed by the markers anyway.
async fn listing_changed(
    State(state): State<Arc<AppState>>,
    Json(change): Json<ListingChange>,
) -> Json<DispatchReport> {
    tracing::debug!(
        listing_id = %change.listing.id,
        status = %change.listing.status,
        filled = change.listing.filled,
        "Processing listing change from Cloud Task"
    );
    Json(state.coordinator.dispatch(&change).await)
}

/// Expire overdue listings (scheduled).
async fn expire_sweep(State(state): State<Arc<AppState>>) -> Result<Json<SweepReport>> {
    let report = state.lifecycle.sweep_expired(chrono::Utc::now()).await?;
    Ok(Json(report))
}
