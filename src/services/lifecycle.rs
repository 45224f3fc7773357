// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Listing lifecycle manager.
//!
//! Owns the listing state machine:
//!
//! ```text
//! Pending ──accept/join(last seat)──> Accepted ──start──> InProgress ──complete──> Completed
//!    │                                   │ │
//!    │                                   │ └──no-show──> NoShow
//!    ├──cancel───────────────────────────┴──cancel─────> Cancelled
//!    └──deadline passed──────────────────────────────────> Expired
//! ```
//!
//! Every mutation is a single read-modify-write transaction against the
//! store; there is no in-process lock. Lost races surface from the store as
//! `Stale` and are retried with backoff a bounded number of times.

use crate::db::{ListingStore, TxAction, TxOutcome};
use crate::models::{
    Fare, Listing, ListingChange, ListingKind, Location, Occupant, Status, VehicleType,
};
use crate::services::changes::ChangePublisher;
use crate::services::fare::{FareAssessment, FareEngine, FareError, FareQuote, FareRequest};
use crate::services::providers::{
    HaversineRoutes, RouteEstimate, RouteProvider, StaticWeather, WeatherProvider, WeatherReport,
};
use crate::services::retry::RetryConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Most seats a carpool may offer.
pub const MAX_CARPOOL_SEATS: u32 = 6;

/// Lifecycle errors. Everything except `Stale` and `Store` is a guard
/// violation the caller should surface, not retry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Listing {0} is no longer available")]
    NotFound(String),

    #[error("Cannot {action} a listing that is {from}")]
    InvalidTransition { from: Status, action: &'static str },

    #[error("This carpool is already full")]
    AlreadyFull,

    #[error("You have already joined this carpool")]
    AlreadyJoined,

    #[error("You cannot join or accept your own listing")]
    SelfJoin,

    #[error("You have not joined this carpool")]
    NotJoined,

    #[error("Not permitted: {0}")]
    NotPermitted(String),

    #[error("The departure time for this listing has passed")]
    DeadlinePassed,

    #[error("Unfair fare: {}", .0.reason)]
    UnfairFare(Box<FareAssessment>),

    #[error("Invalid listing: {0}")]
    InvalidListing(String),

    #[error("Listing was modified concurrently, please retry")]
    Stale,

    #[error("Storage error: {0}")]
    Store(String),
}

impl From<FareError> for LifecycleError {
    fn from(err: FareError) -> Self {
        LifecycleError::InvalidListing(err.to_string())
    }
}

/// Who is performing a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    User(String),
    /// Scheduled sweeps and other service-initiated transitions
    System,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Actor::User(id.into())
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Actor::User(id) => Some(id),
            Actor::System => None,
        }
    }
}

/// A listing as submitted by its poster.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListingDraft {
    pub kind: ListingKind,
    pub vehicle_type: VehicleType,
    #[validate(nested)]
    pub pickup: Location,
    #[validate(nested)]
    pub drop: Location,
    pub departure_at: DateTime<Utc>,
    /// Seats offered (carpool only; solo listings are always 1)
    #[serde(default = "default_capacity")]
    #[validate(range(min = 1, max = 6))]
    pub capacity: u32,
    /// Fare the poster asks for; defaults to the suggested fare
    #[validate(range(min = 0.0))]
    pub asking_fare: Option<f64>,
}

fn default_capacity() -> u32 {
    1
}

/// A priced trip: route, weather and the resulting quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripQuote {
    pub route: RouteEstimate,
    pub weather: WeatherReport,
    pub quote: FareQuote,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Pending listings past their deadline
    pub due: usize,
    pub expired: usize,
    /// Already expired, or moved on before we got to them
    pub skipped: usize,
}

pub struct LifecycleManager {
    store: Arc<dyn ListingStore>,
    publisher: Arc<dyn ChangePublisher>,
    fares: FareEngine,
    routes: Arc<dyn RouteProvider>,
    weather: Arc<dyn WeatherProvider>,
    retry: RetryConfig,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn ListingStore>,
        publisher: Arc<dyn ChangePublisher>,
        fares: FareEngine,
    ) -> Self {
        Self {
            store,
            publisher,
            fares,
            routes: Arc::new(HaversineRoutes),
            weather: Arc::new(StaticWeather::default()),
            retry: RetryConfig::DEFAULT,
        }
    }

    pub fn with_route_provider(mut self, routes: Arc<dyn RouteProvider>) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_weather_provider(mut self, weather: Arc<dyn WeatherProvider>) -> Self {
        self.weather = weather;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn fares(&self) -> &FareEngine {
        &self.fares
    }

    // ─── Pricing ─────────────────────────────────────────────────

    /// Resolve route and weather for a trip and quote it.
    pub fn quote_trip(
        &self,
        pickup: &Location,
        drop: &Location,
        departure_at: DateTime<Utc>,
        vehicle: VehicleType,
        occupants: u32,
    ) -> Result<TripQuote, FareError> {
        let local_departure = departure_at.with_timezone(&self.fares.local_offset());
        let route = self.routes.route(pickup, drop, local_departure);
        let weather = self.weather.weather(pickup);

        let quote = self.fares.quote(&FareRequest {
            distance_km: route.distance_km,
            eta_minutes: route.eta_minutes,
            traffic_eta_minutes: route.traffic_eta_minutes,
            departure_at,
            vehicle,
            occupants,
            weather,
        })?;

        Ok(TripQuote {
            route,
            weather,
            quote,
        })
    }

    // ─── Creation & Reads ────────────────────────────────────────

    /// Validate, price and store a new listing.
    pub async fn post(
        &self,
        owner: &Occupant,
        draft: ListingDraft,
    ) -> Result<Listing, LifecycleError> {
        draft
            .validate()
            .map_err(|e| LifecycleError::InvalidListing(e.to_string()))?;

        let now = Utc::now();
        let capacity = check_draft(&draft, now)?;

        let trip = self.quote_trip(
            &draft.pickup,
            &draft.drop,
            draft.departure_at,
            draft.vehicle_type,
            capacity,
        )?;

        let total = draft.asking_fare.unwrap_or(trip.quote.suggested);
        let assessment = self.fares.assess(&trip.quote, total);
        if !assessment.is_fair() {
            tracing::debug!(
                owner_id = %owner.user_id,
                asking = total,
                band_low = trip.quote.band_low,
                band_high = trip.quote.band_high,
                "Rejected listing with unfair fare"
            );
            return Err(LifecycleError::UnfairFare(Box::new(assessment)));
        }
        let fare: Fare = FareEngine::annotate(&trip.quote, total, capacity);

        let listing = Listing {
            id: uuid::Uuid::new_v4().to_string(),
            kind: draft.kind,
            vehicle_type: draft.vehicle_type,
            owner_id: owner.user_id.clone(),
            owner_name: owner.display_name.clone(),
            owner_role: draft.kind.owner_role(),
            pickup: draft.pickup,
            drop: draft.drop,
            distance_km: trip.route.distance_km,
            eta_minutes: trip.route.eta_minutes,
            traffic_eta_minutes: trip.route.traffic_eta_minutes,
            departure_at: draft.departure_at,
            created_at: now,
            updated_at: now,
            capacity,
            filled: 0,
            occupants: Vec::new(),
            counterparty_id: None,
            counterparty_name: None,
            fare,
            status: Status::Pending,
            last_mutated_by: Some(owner.user_id.clone()),
            revision: 0,
        };

        self.store.create_listing(&listing).await?;

        tracing::info!(
            listing_id = %listing.id,
            owner_id = %listing.owner_id,
            kind = listing.kind.as_str(),
            vehicle = listing.vehicle_type.as_str(),
            capacity,
            total = fare.total,
            "Listing posted"
        );

        self.announce(ListingChange::created(listing.clone())).await;
        Ok(listing)
    }

    /// Fetch a listing, expiring it first if its deadline has passed.
    pub async fn get(&self, id: &str) -> Result<Listing, LifecycleError> {
        let listing = self
            .store
            .get_listing(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;

        let now = Utc::now();
        if !listing.is_due_for_expiry(now) {
            return Ok(listing);
        }

        match self.expire(id, now).await {
            Ok(Some(expired)) => Ok(expired),
            // Someone else moved it on first; return what is stored now.
            Ok(None) | Err(LifecycleError::InvalidTransition { .. }) => self
                .store
                .get_listing(id)
                .await?
                .ok_or_else(|| LifecycleError::NotFound(id.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Pending listings that can still be taken, soonest departure first.
    pub async fn list_open(
        &self,
        kind: Option<ListingKind>,
    ) -> Result<Vec<Listing>, LifecycleError> {
        let now = Utc::now();
        let mut listings = self.store.query_by_status(Status::Pending, kind).await?;
        listings.retain(|l| !l.is_due_for_expiry(now));
        listings.sort_by(|a, b| a.departure_at.cmp(&b.departure_at));
        Ok(listings)
    }

    // ─── Seat Allocation ─────────────────────────────────────────

    /// Take a seat in a carpool. Filling the last seat accepts the listing.
    pub async fn join(&self, id: &str, user: &Occupant) -> Result<Listing, LifecycleError> {
        let outcome = self
            .transition(id, "join", |listing, now| {
                if !listing.kind.is_carpool() {
                    return Err(LifecycleError::NotPermitted(
                        "only carpool offers can be joined".into(),
                    ));
                }
                match listing.status {
                    Status::Pending => {}
                    Status::Accepted => return Err(LifecycleError::AlreadyFull),
                    from => {
                        return Err(LifecycleError::InvalidTransition {
                            from,
                            action: "join",
                        })
                    }
                }
                if listing.filled >= listing.capacity {
                    return Err(LifecycleError::AlreadyFull);
                }
                if listing.is_occupant(&user.user_id) {
                    return Err(LifecycleError::AlreadyJoined);
                }
                if listing.owner_id == user.user_id {
                    return Err(LifecycleError::SelfJoin);
                }
                if now > listing.departure_at {
                    return Err(LifecycleError::DeadlinePassed);
                }

                listing.occupants.push(user.clone());
                listing.filled += 1;
                listing.last_mutated_by = Some(user.user_id.clone());
                if listing.filled == listing.capacity {
                    listing.status = Status::Accepted;
                }
                Ok(TxAction::Commit)
            })
            .await?;

        Ok(outcome.listing)
    }

    /// Give up a carpool seat while the carpool is still filling.
    pub async fn cancel_join(&self, id: &str, user_id: &str) -> Result<Listing, LifecycleError> {
        let outcome = self
            .transition(id, "leave", |listing, _now| {
                if listing.status != Status::Pending {
                    return Err(LifecycleError::InvalidTransition {
                        from: listing.status,
                        action: "leave",
                    });
                }
                let Some(pos) = listing.occupants.iter().position(|o| o.user_id == user_id)
                else {
                    return Err(LifecycleError::NotJoined);
                };

                listing.occupants.remove(pos);
                listing.filled = listing.filled.saturating_sub(1);
                listing.last_mutated_by = Some(user_id.to_string());
                Ok(TxAction::Commit)
            })
            .await?;

        Ok(outcome.listing)
    }

    // ─── Status Transitions ──────────────────────────────────────

    /// Take a solo offer or request as the counterparty.
    pub async fn accept(&self, id: &str, user: &Occupant) -> Result<Listing, LifecycleError> {
        let outcome = self
            .transition(id, "accept", |listing, now| {
                if listing.kind.is_carpool() {
                    return Err(LifecycleError::NotPermitted(
                        "carpools are joined seat by seat".into(),
                    ));
                }
                if listing.status != Status::Pending {
                    return Err(LifecycleError::InvalidTransition {
                        from: listing.status,
                        action: "accept",
                    });
                }
                if listing.owner_id == user.user_id {
                    return Err(LifecycleError::SelfJoin);
                }
                if now > listing.departure_at {
                    return Err(LifecycleError::DeadlinePassed);
                }

                listing.counterparty_id = Some(user.user_id.clone());
                listing.counterparty_name = Some(user.display_name.clone());
                listing.filled = 1;
                listing.status = Status::Accepted;
                listing.last_mutated_by = Some(user.user_id.clone());
                Ok(TxAction::Commit)
            })
            .await?;

        Ok(outcome.listing)
    }

    /// Owner withdraws the listing.
    pub async fn cancel(&self, id: &str, actor: &Actor) -> Result<Listing, LifecycleError> {
        let outcome = self
            .transition(id, "cancel", |listing, _now| {
                ensure_owner(listing, actor)?;
                match listing.status {
                    Status::Pending | Status::Accepted => {}
                    from => {
                        return Err(LifecycleError::InvalidTransition {
                            from,
                            action: "cancel",
                        })
                    }
                }
                listing.status = Status::Cancelled;
                listing.last_mutated_by = actor.user_id().map(str::to_string);
                Ok(TxAction::Commit)
            })
            .await?;

        Ok(outcome.listing)
    }

    /// The ride gets under way.
    pub async fn start(&self, id: &str, actor: &Actor) -> Result<Listing, LifecycleError> {
        self.progress(id, actor, "start", Status::Accepted, Status::InProgress)
            .await
    }

    /// The ride finished.
    pub async fn complete(&self, id: &str, actor: &Actor) -> Result<Listing, LifecycleError> {
        self.progress(id, actor, "complete", Status::InProgress, Status::Completed)
            .await
    }

    /// A party failed to show up for an accepted ride.
    pub async fn mark_no_show(&self, id: &str, actor: &Actor) -> Result<Listing, LifecycleError> {
        self.progress(id, actor, "mark as no-show", Status::Accepted, Status::NoShow)
            .await
    }

    /// Move a Pending listing past its deadline to `Expired`.
    ///
    /// Returns `Ok(None)` if the listing is already expired or not yet due.
    pub async fn expire(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Listing>, LifecycleError> {
        let outcome = self
            .transition(id, "expire", |listing, _clock| match listing.status {
                Status::Expired => Ok(TxAction::Skip),
                Status::Pending if now > listing.departure_at => {
                    listing.status = Status::Expired;
                    listing.last_mutated_by = None;
                    Ok(TxAction::Commit)
                }
                Status::Pending => Ok(TxAction::Skip),
                from => Err(LifecycleError::InvalidTransition {
                    from,
                    action: "expire",
                }),
            })
            .await?;

        Ok(match outcome.action {
            TxAction::Commit => Some(outcome.listing),
            TxAction::Skip => None,
        })
    }

    /// Expire every Pending listing whose deadline is before `now`.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, LifecycleError> {
        let pending = self.store.query_by_status(Status::Pending, None).await?;

        let mut report = SweepReport::default();
        for listing in pending.iter().filter(|l| l.is_due_for_expiry(now)) {
            report.due += 1;
            match self.expire(&listing.id, now).await {
                Ok(Some(_)) => report.expired += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::debug!(listing_id = %listing.id, error = %e, "Sweep skipped listing");
                    report.skipped += 1;
                }
            }
        }

        if report.due > 0 {
            tracing::info!(
                due = report.due,
                expired = report.expired,
                skipped = report.skipped,
                "Expiry sweep finished"
            );
        }
        Ok(report)
    }

    // ─── Internals ───────────────────────────────────────────────

    async fn progress(
        &self,
        id: &str,
        actor: &Actor,
        action: &'static str,
        from: Status,
        to: Status,
    ) -> Result<Listing, LifecycleError> {
        let outcome = self
            .transition(id, action, |listing, _now| {
                ensure_principal(listing, actor)?;
                if listing.status != from {
                    return Err(LifecycleError::InvalidTransition {
                        from: listing.status,
                        action,
                    });
                }
                listing.status = to;
                listing.last_mutated_by = actor.user_id().map(str::to_string);
                Ok(TxAction::Commit)
            })
            .await?;

        Ok(outcome.listing)
    }

    /// Run `apply` as one store transaction, retrying lost races.
    ///
    /// `apply` may run several times and must derive everything from the
    /// listing it is handed. Committed changes are published to the feed.
    async fn transition<F>(
        &self,
        id: &str,
        action: &'static str,
        mut apply: F,
    ) -> Result<TxOutcome, LifecycleError>
    where
        F: FnMut(&mut Listing, DateTime<Utc>) -> Result<TxAction, LifecycleError> + Send,
    {
        let mut attempt = 0;
        loop {
            let now = Utc::now();
            let mut previous = None;
            let mut body = |listing: &mut Listing| -> Result<TxAction, LifecycleError> {
                previous = Some((listing.status, listing.filled));
                let tx_action = apply(listing, now)?;
                if tx_action == TxAction::Commit {
                    listing.updated_at = now;
                }
                Ok(tx_action)
            };

            match self.store.update_listing(id, &mut body).await {
                Ok(outcome) => {
                    if outcome.action == TxAction::Commit {
                        let (previous_status, previous_filled) =
                            previous.unwrap_or((outcome.listing.status, outcome.listing.filled));
                        tracing::info!(
                            listing_id = id,
                            action,
                            from = %previous_status,
                            to = %outcome.listing.status,
                            filled = outcome.listing.filled,
                            actor = outcome.listing.last_mutated_by.as_deref().unwrap_or("system"),
                            "Listing transition committed"
                        );
                        self.announce(ListingChange {
                            listing: outcome.listing.clone(),
                            previous_status: Some(previous_status),
                            previous_filled,
                        })
                        .await;
                    }
                    return Ok(outcome);
                }
                Err(LifecycleError::Stale) if attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::debug!(
                        listing_id = id,
                        action,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transaction conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(LifecycleError::Stale) => {
                    tracing::error!(
                        listing_id = id,
                        action,
                        attempts = attempt + 1,
                        "Transaction retries exhausted"
                    );
                    return Err(LifecycleError::Stale);
                }
                Err(e) => {
                    tracing::debug!(listing_id = id, action, error = %e, "Transition rejected");
                    return Err(e);
                }
            }
        }
    }

    async fn announce(&self, change: ListingChange) {
        if let Err(e) = self.publisher.publish(&change).await {
            tracing::warn!(
                listing_id = %change.listing.id,
                error = %e,
                "Failed to publish listing change"
            );
        }
    }
}

/// Check draft rules not expressible as field validators; returns the
/// seat count to price and store.
fn check_draft(draft: &ListingDraft, now: DateTime<Utc>) -> Result<u32, LifecycleError> {
    if draft.departure_at <= now {
        return Err(LifecycleError::InvalidListing(
            "departure must be in the future".into(),
        ));
    }
    if draft.pickup.same_place(&draft.drop) {
        return Err(LifecycleError::InvalidListing(
            "pickup and drop must differ".into(),
        ));
    }

    if !draft.kind.is_carpool() {
        if draft.capacity != 1 {
            return Err(LifecycleError::InvalidListing(
                "solo listings carry exactly one passenger".into(),
            ));
        }
        return Ok(1);
    }

    if draft.vehicle_type != VehicleType::Car {
        return Err(LifecycleError::InvalidListing(
            "carpools require a car".into(),
        ));
    }
    if !(1..=MAX_CARPOOL_SEATS).contains(&draft.capacity) {
        return Err(LifecycleError::InvalidListing(format!(
            "carpool capacity must be between 1 and {}",
            MAX_CARPOOL_SEATS
        )));
    }
    Ok(draft.capacity)
}

fn ensure_owner(listing: &Listing, actor: &Actor) -> Result<(), LifecycleError> {
    match actor {
        Actor::System => Ok(()),
        Actor::User(id) if *id == listing.owner_id => Ok(()),
        Actor::User(_) => Err(LifecycleError::NotPermitted(
            "only the poster can do this".into(),
        )),
    }
}

/// Owner or solo counterparty (or the system).
fn ensure_principal(listing: &Listing, actor: &Actor) -> Result<(), LifecycleError> {
    match actor {
        Actor::System => Ok(()),
        Actor::User(id)
            if *id == listing.owner_id || listing.counterparty_id.as_deref() == Some(id.as_str()) =>
        {
            Ok(())
        }
        Actor::User(_) => Err(LifecycleError::NotPermitted(
            "only the ride's driver or passenger can do this".into(),
        )),
    }
}
