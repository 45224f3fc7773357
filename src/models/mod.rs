// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod listing;
pub mod notification;

pub use listing::{
    Fare, Listing, ListingChange, ListingKind, Location, Occupant, Role, Status,
    TransitionSignature, VehicleType,
};
pub use notification::{DeepLink, MarkerKey, Notification, NotificationMarker};
