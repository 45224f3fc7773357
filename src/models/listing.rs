// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Listing model: a posted ride or carpool offer/request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// What kind of listing was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    /// A driver offers a seat to a single passenger.
    SoloRideOffer,
    /// A passenger asks for a driver.
    SoloRideRequest,
    /// A driver offers several seats that passengers join.
    CarpoolOffer,
}

impl ListingKind {
    /// Role of the poster for this kind of listing.
    pub fn owner_role(self) -> Role {
        match self {
            ListingKind::SoloRideOffer | ListingKind::CarpoolOffer => Role::Driver,
            ListingKind::SoloRideRequest => Role::Passenger,
        }
    }

    pub fn is_carpool(self) -> bool {
        matches!(self, ListingKind::CarpoolOffer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ListingKind::SoloRideOffer => "solo_ride_offer",
            ListingKind::SoloRideRequest => "solo_ride_request",
            ListingKind::CarpoolOffer => "carpool_offer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Bike,
}

impl VehicleType {
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Bike => "bike",
        }
    }
}

/// Which side of a ride a party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Driver,
    Passenger,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::Driver => Role::Passenger,
            Role::Passenger => Role::Driver,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Passenger => "passenger",
        }
    }
}

/// Lifecycle status of a listing.
///
/// `Completed`, `Cancelled`, `Expired` and `NoShow` are terminal: once a
/// listing reaches one of them it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Expired,
    NoShow,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        match self {
            Status::Completed | Status::Cancelled | Status::Expired | Status::NoShow => true,
            Status::Pending | Status::Accepted | Status::InProgress => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Accepted => "accepted",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Cancelled => "cancelled",
            Status::Expired => "expired",
            Status::NoShow => "no_show",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque location descriptor as supplied by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Location {
    /// Human-readable label ("Gulshan 2 Circle")
    #[validate(length(min = 1, max = 200))]
    pub label: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

/// A passenger who joined a carpool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Occupant {
    pub user_id: String,
    pub display_name: String,
}

/// Persisted fare annotation for a listing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Fare {
    /// Total fare the poster asked for
    pub total: f64,
    /// Share per seat (carpool) or the total (solo)
    pub per_occupant: f64,
    /// Engine-suggested total
    pub suggested: f64,
    pub band_low: f64,
    pub band_high: f64,
}

/// Stored listing record (also the change-feed snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Listing {
    /// Listing ID (also used as document ID)
    pub id: String,
    pub kind: ListingKind,
    pub vehicle_type: VehicleType,
    /// Poster
    pub owner_id: String,
    pub owner_name: String,
    pub owner_role: Role,
    pub pickup: Location,
    pub drop: Location,
    pub distance_km: f64,
    pub eta_minutes: f64,
    pub traffic_eta_minutes: f64,
    /// Deadline: still-Pending listings expire after this instant
    pub departure_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Max seats (1 for solo listings)
    pub capacity: u32,
    /// Current occupant count
    pub filled: u32,
    /// Carpool passengers in join order, unique by user ID
    #[serde(default)]
    pub occupants: Vec<Occupant>,
    /// The other principal party of a solo listing, once accepted
    pub counterparty_id: Option<String>,
    pub counterparty_name: Option<String>,
    pub fare: Fare,
    pub status: Status,
    /// Actor of the most recent status/occupancy change (`None` for system)
    pub last_mutated_by: Option<String>,
    /// Bumped on every committed write
    #[serde(default)]
    pub revision: u64,
}

impl Location {
    /// Same coordinates, ignoring the label.
    pub fn same_place(&self, other: &Location) -> bool {
        self.lat == other.lat && self.lng == other.lng
    }
}

impl Listing {
    pub fn is_occupant(&self, user_id: &str) -> bool {
        self.occupants.iter().any(|o| o.user_id == user_id)
    }

    /// Whether a still-Pending listing has passed its deadline.
    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status == Status::Pending && now > self.departure_at
    }

    /// Role `user_id` plays on this listing, if any.
    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        if self.owner_id == user_id {
            Some(self.owner_role)
        } else if self.counterparty_id.as_deref() == Some(user_id) {
            Some(self.owner_role.opposite())
        } else if self.is_occupant(user_id) {
            Some(Role::Passenger)
        } else {
            None
        }
    }

    /// Display name of the other side as seen by `role`.
    pub fn other_party_name(&self, role: Role) -> &str {
        if role == self.owner_role {
            self.counterparty_name
                .as_deref()
                .or_else(|| self.occupants.last().map(|o| o.display_name.as_str()))
                .unwrap_or("your rider")
        } else {
            &self.owner_name
        }
    }

    /// Signature identifying the lifecycle event this snapshot represents.
    pub fn signature(&self) -> TransitionSignature {
        TransitionSignature {
            status: self.status,
            filled: self.filled,
        }
    }
}

/// The (status, filled) pair that identifies a distinct lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionSignature {
    pub status: Status,
    pub filled: u32,
}

impl std::fmt::Display for TransitionSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.status, self.filled)
    }
}

/// A committed mutation as seen by change-feed observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingChange {
    /// Snapshot after the commit
    pub listing: Listing,
    /// Status before the commit (`None` for a newly created listing)
    pub previous_status: Option<Status>,
    pub previous_filled: u32,
}

impl ListingChange {
    pub fn created(listing: Listing) -> Self {
        Self {
            listing,
            previous_status: None,
            previous_filled: 0,
        }
    }

    pub fn status_changed(&self) -> bool {
        self.previous_status
            .is_some_and(|prev| prev != self.listing.status)
    }

    /// A carpool gained an occupant without leaving `Pending`.
    pub fn seat_filled(&self) -> bool {
        self.listing.kind.is_carpool()
            && self.listing.status == Status::Pending
            && self.previous_status == Some(Status::Pending)
            && self.listing.filled > self.previous_filled
    }
}
