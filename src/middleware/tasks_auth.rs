// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud Tasks authentication middleware.
//!
//! The queue header is cheap to check but any client can send it, so every
//! callback must also carry a Google-signed OIDC token for our invoker
//! service account.

use crate::services::OidcError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Require the listing-events queue header and a valid OIDC token for `/tasks/*`.
pub async fn require_tasks_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let queue_name_header = request.headers().get("x-cloudtasks-queuename");
    let is_valid_queue = queue_name_header
        .and_then(|h| h.to_str().ok())
        .map(|name| name == crate::config::LISTING_EVENTS_QUEUE_NAME)
        .unwrap_or(false);

    if !is_valid_queue {
        tracing::warn!(
            header = ?queue_name_header,
            path = %request.uri().path(),
            "Blocked tasks request with invalid queue header"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    let caller = state
        .tasks_verifier
        .verify(request.headers().get(header::AUTHORIZATION))
        .await
        .map_err(|err| match err {
            OidcError::Forbidden(reason) => {
                tracing::warn!(
                    reason = %reason,
                    path = %request.uri().path(),
                    "Blocked tasks request with invalid OIDC token"
                );
                StatusCode::FORBIDDEN
            }
            OidcError::Transient(reason) => {
                tracing::error!(reason = %reason, "Tasks OIDC verification unavailable");
                StatusCode::SERVICE_UNAVAILABLE
            }
        })?;

    tracing::debug!(email = %caller.email, subject = %caller.subject, "Tasks caller verified");

    Ok(next.run(request).await)
}
