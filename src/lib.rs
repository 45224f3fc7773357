// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Ridepool: peer-to-peer ride and carpool marketplace backend
//!
//! This crate provides the fare fairness engine, the listing lifecycle
//! (seat allocation, trip progression, expiry) and the notification
//! coordinator that tells each party about changes exactly once.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::{GoogleOidcVerifier, LifecycleManager, NotificationCoordinator};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub lifecycle: Arc<LifecycleManager>,
    pub coordinator: Arc<NotificationCoordinator>,
    /// Checks Cloud Tasks callback tokens
    pub tasks_verifier: Arc<GoogleOidcVerifier>,
}
