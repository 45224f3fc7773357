// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Listing routes: post, browse and move listings through their lifecycle.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{Listing, ListingKind};
use crate::services::lifecycle::ListingDraft;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Listing routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/listings", post(create_listing).get(list_listings))
        .route("/api/listings/{id}", get(get_listing))
        .route("/api/listings/{id}/join", post(join_listing))
        .route("/api/listings/{id}/leave", post(leave_listing))
        .route("/api/listings/{id}/accept", post(accept_listing))
        .route("/api/listings/{id}/cancel", post(cancel_listing))
        .route("/api/listings/{id}/start", post(start_listing))
        .route("/api/listings/{id}/complete", post(complete_listing))
        .route("/api/listings/{id}/no-show", post(no_show_listing))
}

// ─── Posting & Browsing ──────────────────────────────────────

async fn create_listing(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(draft): Json<ListingDraft>,
) -> Result<(StatusCode, Json<Listing>)> {
    let listing = state.lifecycle.post(&user.as_occupant(), draft).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

#[derive(Debug, Deserialize)]
struct ListingsQuery {
    kind: Option<ListingKind>,
}

/// Open listings, soonest departure first.
async fn list_listings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListingsQuery>,
) -> Result<Json<Vec<Listing>>> {
    Ok(Json(state.lifecycle.list_open(params.kind).await?))
}

async fn get_listing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Listing>> {
    Ok(Json(state.lifecycle.get(&id).await?))
}

// ─── Transitions ─────────────────────────────────────────────

async fn join_listing(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Listing>> {
    Ok(Json(state.lifecycle.join(&id, &user.as_occupant()).await?))
}

async fn leave_listing(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Listing>> {
    Ok(Json(state.lifecycle.cancel_join(&id, &user.user_id).await?))
}

async fn accept_listing(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Listing>> {
    Ok(Json(state.lifecycle.accept(&id, &user.as_occupant()).await?))
}

async fn cancel_listing(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Listing>> {
    Ok(Json(state.lifecycle.cancel(&id, &user.actor()).await?))
}

async fn start_listing(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Listing>> {
    Ok(Json(state.lifecycle.start(&id, &user.actor()).await?))
}

async fn complete_listing(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Listing>> {
    Ok(Json(state.lifecycle.complete(&id, &user.actor()).await?))
}

async fn no_show_listing(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Listing>> {
    Ok(Json(state.lifecycle.mark_no_show(&id, &user.actor()).await?))
}
