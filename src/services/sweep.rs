// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic expiry sweep.
//!
//! Runs `LifecycleManager::sweep_expired` on a fixed interval so deadlines
//! are enforced even when nobody reads the listing.

use crate::services::lifecycle::{LifecycleManager, SweepReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct ExpirySweeper {
    manager: Arc<LifecycleManager>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(manager: Arc<LifecycleManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Start sweeping in the background. The first sweep runs immediately.
    pub fn spawn(self) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            let mut total = SweepReport::default();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        match self.manager.sweep_expired(chrono::Utc::now()).await {
                            Ok(report) => {
                                total.due += report.due;
                                total.expired += report.expired;
                                total.skipped += report.skipped;
                            }
                            Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                        }
                    }
                }
            }
            tracing::info!(expired = total.expired, "Expiry sweeper stopped");
            total
        });

        SweeperHandle {
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Handle to a running sweeper. Dropping it stops the task.
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<SweepReport>,
}

impl SweeperHandle {
    /// Stop sweeping and return the totals.
    pub async fn stop(mut self) -> SweepReport {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.task).await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ListingStore, MemoryStore};
    use crate::models::{Fare, Listing, ListingKind, Location, Role, Status, VehicleType};
    use crate::services::changes::ChannelPublisher;
    use crate::services::fare::FareEngine;
    use chrono::{FixedOffset, Utc};

    #[tokio::test]
    async fn test_sweeper_expires_overdue_listing() {
        let store = Arc::new(MemoryStore::new());
        let (publisher, _changes) = ChannelPublisher::new(16);
        let manager = Arc::new(LifecycleManager::new(
            store.clone(),
            Arc::new(publisher),
            FareEngine::new(FixedOffset::east_opt(0).unwrap()),
        ));

        let past = Utc::now() - chrono::Duration::minutes(10);
        let here = Location {
            label: "A".into(),
            lat: 1.0,
            lng: 1.0,
        };
        let listing = Listing {
            id: "overdue".into(),
            kind: ListingKind::SoloRideOffer,
            vehicle_type: VehicleType::Car,
            owner_id: "d".into(),
            owner_name: "D".into(),
            owner_role: Role::Driver,
            pickup: here.clone(),
            drop: here,
            distance_km: 1.0,
            eta_minutes: 2.0,
            traffic_eta_minutes: 2.0,
            departure_at: past,
            created_at: past,
            updated_at: past,
            capacity: 1,
            filled: 0,
            occupants: Vec::new(),
            counterparty_id: None,
            counterparty_name: None,
            fare: Fare {
                total: 105.0,
                per_occupant: 105.0,
                suggested: 105.0,
                band_low: 105.0,
                band_high: 145.0,
            },
            status: Status::Pending,
            last_mutated_by: Some("d".into()),
            revision: 0,
        };
        store.create_listing(&listing).await.unwrap();

        let handle = ExpirySweeper::new(manager, Duration::from_secs(3600)).spawn();
        // The first tick fires immediately; give it a moment to run.
        for _ in 0..50 {
            let stored = store.get_listing("overdue").await.unwrap().unwrap();
            if stored.status == Status::Expired {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let report = handle.stop().await;

        assert_eq!(report.expired, 1);
        let stored = store.get_listing("overdue").await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Expired);
    }
}
