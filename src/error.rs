// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::services::fare::{FareAssessment, FareError};
use crate::services::lifecycle::LifecycleError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A lifecycle guard rejected the request; `code` identifies which.
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("Fare outside the acceptable range")]
    UnfairFare(Box<FareAssessment>),

    #[error("Listing was modified concurrently")]
    Stale,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        let message = err.to_string();
        match err {
            LifecycleError::NotFound(_) => AppError::NotFound(message),
            LifecycleError::NotPermitted(_) => AppError::Forbidden(message),
            LifecycleError::InvalidListing(_) => AppError::BadRequest(message),
            LifecycleError::UnfairFare(assessment) => AppError::UnfairFare(assessment),
            LifecycleError::Stale => AppError::Stale,
            LifecycleError::Store(msg) => AppError::Database(msg),
            LifecycleError::InvalidTransition { .. } => AppError::Conflict {
                code: "invalid_transition",
                message,
            },
            LifecycleError::AlreadyFull => AppError::Conflict {
                code: "already_full",
                message,
            },
            LifecycleError::AlreadyJoined => AppError::Conflict {
                code: "already_joined",
                message,
            },
            LifecycleError::SelfJoin => AppError::Conflict {
                code: "self_join",
                message,
            },
            LifecycleError::NotJoined => AppError::Conflict {
                code: "not_joined",
                message,
            },
            LifecycleError::DeadlinePassed => AppError::Conflict {
                code: "deadline_passed",
                message,
            },
        }
    }
}

impl From<FareError> for AppError {
    fn from(err: FareError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut suggestion = None;
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::Conflict { code, message } => {
                (StatusCode::CONFLICT, *code, Some(message.clone()))
            }
            AppError::UnfairFare(assessment) => {
                suggestion = assessment.suggestion.clone();
                (
                    StatusCode::BAD_REQUEST,
                    "unfair_fare",
                    Some(assessment.reason.clone()),
                )
            }
            AppError::Stale => {
                tracing::warn!("Returning stale conflict to client");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "stale",
                    Some("The listing changed while we were updating it, please retry".into()),
                )
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            suggestion,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
