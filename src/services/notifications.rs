// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Notification attribution and dedup.
//!
//! For each committed listing change the coordinator works out who has to
//! hear about it, drops the party who caused it, and delivers at most one
//! notification per (listing, transition signature, party). The marker is
//! claimed before delivery, so a failed delivery is lost rather than
//! repeated.

use crate::db::MarkerStore;
use crate::models::{
    DeepLink, Listing, ListingChange, MarkerKey, Notification, Role, Status,
};
use crate::services::delivery::DeliveryChannel;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Longest the coordinator waits on one delivery before counting it failed.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Counts from dispatching one or more changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Already notified for this transition
    pub duplicates: usize,
    /// Marker or delivery errors (logged and dropped)
    pub failed: usize,
}

impl DispatchReport {
    fn absorb(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
    }
}

/// Everyone with a stake in the listing except the party who last changed it.
pub fn interested_parties(listing: &Listing) -> Vec<String> {
    let mut parties: Vec<&str> = vec![listing.owner_id.as_str()];
    parties.extend(listing.occupants.iter().map(|o| o.user_id.as_str()));
    if let Some(counterparty) = listing.counterparty_id.as_deref() {
        parties.push(counterparty);
    }

    let actor = listing.last_mutated_by.as_deref();
    let mut out: Vec<String> = Vec::with_capacity(parties.len());
    for party in parties {
        if Some(party) != actor && !out.iter().any(|p| p == party) {
            out.push(party.to_string());
        }
    }
    out
}

/// Notifications a committed change calls for, before dedup.
pub fn plan_notifications(change: &ListingChange) -> Vec<Notification> {
    let listing = &change.listing;

    if change.seat_filled() {
        // Occupants don't hear about each other joining.
        return interested_parties(listing)
            .into_iter()
            .filter(|p| *p == listing.owner_id)
            .map(|owner| seat_filled(listing, owner))
            .collect();
    }

    if !change.status_changed() {
        return Vec::new();
    }

    interested_parties(listing)
        .into_iter()
        .filter_map(|party| {
            let role = listing.role_of(&party)?;
            let (title, body) = message_for(listing, &party, role)?;
            Some(Notification {
                deep_link: DeepLink {
                    listing_id: listing.id.clone(),
                    open_as: role,
                },
                party_id: party,
                title,
                body,
            })
        })
        .collect()
}

fn seat_filled(listing: &Listing, owner: String) -> Notification {
    let joiner = listing
        .occupants
        .last()
        .map(|o| o.display_name.as_str())
        .unwrap_or("A passenger");
    Notification {
        party_id: owner,
        title: "New passenger joined".to_string(),
        body: format!(
            "{} joined your carpool to {} ({}/{} seats filled)",
            joiner, listing.drop.label, listing.filled, listing.capacity
        ),
        deep_link: DeepLink {
            listing_id: listing.id.clone(),
            open_as: listing.owner_role,
        },
    }
}

/// Display name of whoever made the last change.
fn actor_name(listing: &Listing) -> &str {
    match listing.last_mutated_by.as_deref() {
        None => "RidePool",
        Some(id) if id == listing.owner_id => &listing.owner_name,
        Some(id) if listing.counterparty_id.as_deref() == Some(id) => listing
            .counterparty_name
            .as_deref()
            .unwrap_or("Your rider"),
        Some(id) => listing
            .occupants
            .iter()
            .find(|o| o.user_id == id)
            .map(|o| o.display_name.as_str())
            .unwrap_or("A participant"),
    }
}

fn message_for(listing: &Listing, party: &str, role: Role) -> Option<(String, String)> {
    let route = format!("{} to {}", listing.pickup.label, listing.drop.label);
    let is_owner = party == listing.owner_id;

    let message = match listing.status {
        Status::Accepted if listing.kind.is_carpool() => {
            if is_owner {
                (
                    "Carpool full".to_string(),
                    format!(
                        "All {} seats are filled for your carpool from {}",
                        listing.capacity, route
                    ),
                )
            } else {
                (
                    "Carpool confirmed".to_string(),
                    format!(
                        "Your carpool with {} from {} is full and confirmed",
                        listing.owner_name, route
                    ),
                )
            }
        }
        Status::Accepted => match role {
            Role::Passenger => (
                "Ride request accepted".to_string(),
                format!(
                    "{} accepted your ride request from {}",
                    listing.other_party_name(role),
                    route
                ),
            ),
            Role::Driver => (
                "Ride offer accepted".to_string(),
                format!(
                    "{} accepted your ride offer from {}",
                    listing.other_party_name(role),
                    route
                ),
            ),
        },
        Status::InProgress => (
            "Ride started".to_string(),
            format!("Your ride from {} has started", route),
        ),
        Status::Completed => match role {
            Role::Driver => (
                "Ride completed".to_string(),
                format!("Your ride from {} is complete", route),
            ),
            Role::Passenger => (
                "Ride completed".to_string(),
                format!(
                    "You have arrived. Fare: Tk {:.0}",
                    listing.fare.per_occupant
                ),
            ),
        },
        Status::Cancelled => (
            "Ride cancelled".to_string(),
            format!("{} cancelled the ride from {}", actor_name(listing), route),
        ),
        Status::NoShow => match role {
            Role::Driver => (
                "Passenger no-show".to_string(),
                format!("Your ride from {} was marked as a no-show", route),
            ),
            Role::Passenger => (
                "Marked as no-show".to_string(),
                format!(
                    "{} marked the ride from {} as a no-show",
                    actor_name(listing),
                    route
                ),
            ),
        },
        Status::Expired => {
            if is_owner {
                (
                    "Listing expired".to_string(),
                    format!(
                        "Your listing from {} expired before it was taken",
                        route
                    ),
                )
            } else {
                (
                    "Carpool expired".to_string(),
                    format!("The carpool from {} expired before filling up", route),
                )
            }
        }
        Status::Pending => return None,
    };
    Some(message)
}

/// Observes committed changes and delivers the resulting notifications.
pub struct NotificationCoordinator {
    markers: Arc<dyn MarkerStore>,
    delivery: Arc<dyn DeliveryChannel>,
    delivery_timeout: Duration,
}

impl NotificationCoordinator {
    pub fn new(markers: Arc<dyn MarkerStore>, delivery: Arc<dyn DeliveryChannel>) -> Self {
        Self {
            markers,
            delivery,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Handle one change. Safe to call repeatedly with the same change.
    pub async fn dispatch(&self, change: &ListingChange) -> DispatchReport {
        let mut report = DispatchReport::default();
        let signature = change.listing.signature();

        for notification in plan_notifications(change) {
            let key = MarkerKey::new(&change.listing.id, signature, &notification.party_id);

            match self.markers.claim(&key).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(
                        listing_id = %key.listing_id,
                        party_id = %key.party_id,
                        signature = %signature,
                        "Already notified, skipping"
                    );
                    report.duplicates += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        listing_id = %key.listing_id,
                        party_id = %key.party_id,
                        error = %e,
                        "Failed to claim notification marker"
                    );
                    report.failed += 1;
                    continue;
                }
            }

            let delivery =
                tokio::time::timeout(self.delivery_timeout, self.delivery.notify(&notification));
            match delivery.await {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(
                        listing_id = %key.listing_id,
                        party_id = %key.party_id,
                        error = %e,
                        "Notification delivery failed"
                    );
                    report.failed += 1;
                }
                Err(_) => {
                    tracing::warn!(
                        listing_id = %key.listing_id,
                        party_id = %key.party_id,
                        timeout_ms = self.delivery_timeout.as_millis() as u64,
                        "Notification delivery timed out"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Consume `changes` on a background task until stopped or the feed closes.
    pub fn spawn(self: Arc<Self>, mut changes: mpsc::Receiver<ListingChange>) -> CoordinatorHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut total = DispatchReport::default();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    change = changes.recv() => match change {
                        Some(change) => total.absorb(self.dispatch(&change).await),
                        None => break,
                    },
                }
            }
            tracing::info!(
                delivered = total.delivered,
                duplicates = total.duplicates,
                failed = total.failed,
                "Notification coordinator stopped"
            );
            total
        });

        CoordinatorHandle {
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Handle to a running coordinator task. Dropping it stops the task.
pub struct CoordinatorHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<DispatchReport>,
}

impl CoordinatorHandle {
    /// Stop consuming and return the totals.
    pub async fn stop(mut self) -> DispatchReport {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.task).await.unwrap_or_default()
    }

    /// Wait for the feed to close on its own.
    pub async fn join(mut self) -> DispatchReport {
        // Dropping the stop sender would end the task early.
        let _stop = self.stop.take();
        (&mut self.task).await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fare, ListingKind, Location, Occupant, VehicleType};
    use chrono::Utc;

    fn carpool(capacity: u32) -> Listing {
        let now = Utc::now();
        Listing {
            id: "pool".into(),
            kind: ListingKind::CarpoolOffer,
            vehicle_type: VehicleType::Car,
            owner_id: "driver".into(),
            owner_name: "Karim".into(),
            owner_role: Role::Driver,
            pickup: Location {
                label: "Banani".into(),
                lat: 23.79,
                lng: 90.40,
            },
            drop: Location {
                label: "Dhanmondi".into(),
                lat: 23.74,
                lng: 90.37,
            },
            distance_km: 7.0,
            eta_minutes: 14.0,
            traffic_eta_minutes: 14.0,
            departure_at: now + chrono::Duration::hours(1),
            created_at: now,
            updated_at: now,
            capacity,
            filled: 0,
            occupants: Vec::new(),
            counterparty_id: None,
            counterparty_name: None,
            fare: Fare {
                total: 300.0,
                per_occupant: 100.0,
                suggested: 300.0,
                band_low: 260.0,
                band_high: 340.0,
            },
            status: Status::Pending,
            last_mutated_by: Some("driver".into()),
            revision: 0,
        }
    }

    fn join(listing: &mut Listing, id: &str) {
        listing.occupants.push(Occupant {
            user_id: id.into(),
            display_name: format!("Rider {id}"),
        });
        listing.filled += 1;
        listing.last_mutated_by = Some(id.into());
        if listing.filled == listing.capacity {
            listing.status = Status::Accepted;
        }
    }

    #[test]
    fn test_interested_excludes_actor_and_dedups() {
        let mut listing = carpool(3);
        join(&mut listing, "p1");
        join(&mut listing, "p2");
        listing.counterparty_id = Some("driver".into());

        assert_eq!(interested_parties(&listing), vec!["driver", "p1"]);
    }

    #[test]
    fn test_seat_filled_goes_to_owner_only() {
        let mut listing = carpool(3);
        join(&mut listing, "p1");
        join(&mut listing, "p2");
        let change = ListingChange {
            listing,
            previous_status: Some(Status::Pending),
            previous_filled: 1,
        };

        let planned = plan_notifications(&change);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].party_id, "driver");
        assert_eq!(planned[0].title, "New passenger joined");
        assert!(planned[0].body.contains("Rider p2"));
        assert!(planned[0].body.contains("2/3"));
        assert_eq!(planned[0].deep_link.open_as, Role::Driver);
    }

    #[test]
    fn test_carpool_full_messages() {
        let mut listing = carpool(2);
        join(&mut listing, "p1");
        join(&mut listing, "p2");
        let change = ListingChange {
            listing,
            previous_status: Some(Status::Pending),
            previous_filled: 1,
        };

        let planned = plan_notifications(&change);
        let titles: Vec<(&str, &str)> = planned
            .iter()
            .map(|n| (n.party_id.as_str(), n.title.as_str()))
            .collect();
        assert_eq!(
            titles,
            vec![("driver", "Carpool full"), ("p1", "Carpool confirmed")]
        );
        assert_eq!(planned[1].deep_link.open_as, Role::Passenger);
    }

    #[test]
    fn test_solo_accept_wording_depends_on_role() {
        let mut offer = carpool(1);
        offer.kind = ListingKind::SoloRideOffer;
        offer.counterparty_id = Some("rider".into());
        offer.counterparty_name = Some("Nadia".into());
        offer.filled = 1;
        offer.status = Status::Accepted;
        offer.last_mutated_by = Some("rider".into());
        let planned = plan_notifications(&ListingChange {
            listing: offer.clone(),
            previous_status: Some(Status::Pending),
            previous_filled: 0,
        });
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].title, "Ride offer accepted");
        assert!(planned[0].body.starts_with("Nadia"));

        let mut request = offer;
        request.kind = ListingKind::SoloRideRequest;
        request.owner_id = "rider2".into();
        request.owner_name = "Tania".into();
        request.owner_role = Role::Passenger;
        request.counterparty_id = Some("driver".into());
        request.counterparty_name = Some("Karim".into());
        request.last_mutated_by = Some("driver".into());
        let planned = plan_notifications(&ListingChange {
            listing: request,
            previous_status: Some(Status::Pending),
            previous_filled: 0,
        });
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].party_id, "rider2");
        assert_eq!(planned[0].title, "Ride request accepted");
        assert!(planned[0].body.starts_with("Karim"));
        assert_eq!(planned[0].deep_link.open_as, Role::Passenger);
    }

    #[test]
    fn test_expiry_notifies_owner_and_occupants() {
        let mut listing = carpool(3);
        join(&mut listing, "p1");
        listing.status = Status::Expired;
        listing.last_mutated_by = None;
        let planned = plan_notifications(&ListingChange {
            listing,
            previous_status: Some(Status::Pending),
            previous_filled: 1,
        });
        let parties: Vec<&str> = planned.iter().map(|n| n.party_id.as_str()).collect();
        assert_eq!(parties, vec!["driver", "p1"]);
        assert_eq!(planned[0].title, "Listing expired");
        assert_eq!(planned[1].title, "Carpool expired");
    }

    #[test]
    fn test_creation_and_leave_are_silent() {
        let listing = carpool(3);
        assert!(plan_notifications(&ListingChange::created(listing.clone())).is_empty());

        let mut left = listing;
        left.last_mutated_by = Some("p1".into());
        assert!(plan_notifications(&ListingChange {
            listing: left,
            previous_status: Some(Status::Pending),
            previous_filled: 1,
        })
        .is_empty());
    }

    #[test]
    fn test_cancel_names_the_actor() {
        let mut listing = carpool(3);
        join(&mut listing, "p1");
        listing.status = Status::Cancelled;
        listing.last_mutated_by = Some("driver".into());
        let planned = plan_notifications(&ListingChange {
            listing,
            previous_status: Some(Status::Pending),
            previous_filled: 1,
        });
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].party_id, "p1");
        assert!(planned[0].body.starts_with("Karim cancelled"));
    }
}
