// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Run with FIRESTORE_EMULATOR_HOST pointing at a local emulator.
//!
//! The emulator provides a clean state for each test run.

use chrono::FixedOffset;
use ridepool::db::{ListingStore, MarkerStore};
use ridepool::models::{ListingKind, MarkerKey, Status};
use ridepool::services::{
    ChannelPublisher, FareEngine, LifecycleError, LifecycleManager, RetryConfig,
};
use std::sync::Arc;

mod common;
use common::{draft, person, test_db};

/// Generate a unique user ID for test isolation.
fn unique_user(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

async fn manager() -> (Arc<LifecycleManager>, Arc<ridepool::db::FirestoreDb>) {
    let db = Arc::new(test_db().await);
    let (publisher, _changes) = ChannelPublisher::new(256);
    let manager = LifecycleManager::new(
        db.clone(),
        Arc::new(publisher),
        FareEngine::new(FixedOffset::east_opt(6 * 3600).unwrap()),
    )
    .with_retry(RetryConfig::DEFAULT.with_max_retries(8));
    (Arc::new(manager), db)
}

// ═══════════════════════════════════════════════════════════════════════════
// LISTING TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_listing_roundtrip() {
    require_emulator!();

    let (manager, db) = manager().await;
    let owner = unique_user("driver");

    let listing = manager
        .post(&person(&owner), draft(ListingKind::CarpoolOffer, 3))
        .await
        .unwrap();

    let stored = db.get_listing(&listing.id).await.unwrap().unwrap();
    assert_eq!(stored.id, listing.id);
    assert_eq!(stored.owner_id, owner);
    assert_eq!(stored.capacity, 3);
    assert_eq!(stored.status, Status::Pending);
    assert_eq!(stored.fare.total, listing.fare.total);
    assert_eq!(stored.revision, 0);
}

#[tokio::test]
async fn test_transactional_join_bumps_revision() {
    require_emulator!();

    let (manager, db) = manager().await;
    let listing = manager
        .post(&person(&unique_user("driver")), draft(ListingKind::CarpoolOffer, 2))
        .await
        .unwrap();

    manager
        .join(&listing.id, &person(&unique_user("rider")))
        .await
        .unwrap();
    let stored = db.get_listing(&listing.id).await.unwrap().unwrap();
    assert_eq!(stored.filled, 1);
    assert_eq!(stored.revision, 1);
}

#[tokio::test]
async fn test_rejected_update_releases_transaction() {
    require_emulator!();

    let (manager, db) = manager().await;
    let owner = unique_user("driver");
    let listing = manager
        .post(&person(&owner), draft(ListingKind::CarpoolOffer, 2))
        .await
        .unwrap();

    // The owner's own join is refused inside the transaction, which must be
    // rolled back so the next writer is not held up.
    let refused = manager.join(&listing.id, &person(&owner)).await;
    assert!(matches!(refused, Err(LifecycleError::SelfJoin)));

    let joined = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        manager.join(&listing.id, &person(&unique_user("rider"))),
    )
    .await
    .expect("join after a rolled-back transaction")
    .unwrap();
    assert_eq!(joined.filled, 1);

    let stored = db.get_listing(&listing.id).await.unwrap().unwrap();
    assert_eq!(stored.revision, 1);
}

#[tokio::test]
async fn test_concurrent_joins_never_overbook() {
    require_emulator!();

    let (manager, db) = manager().await;
    let listing = manager
        .post(&person(&unique_user("driver")), draft(ListingKind::CarpoolOffer, 2))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..5 {
        let manager = manager.clone();
        let id = listing.id.clone();
        let rider = person(&unique_user(&format!("rider{i}")));
        tasks.push(tokio::spawn(async move { manager.join(&id, &rider).await }));
    }

    let mut joined = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => joined += 1,
            Err(LifecycleError::AlreadyFull) | Err(LifecycleError::Stale) => {}
            Err(other) => panic!("unexpected join error: {other:?}"),
        }
    }
    assert!(joined <= 2);

    let stored = db.get_listing(&listing.id).await.unwrap().unwrap();
    assert_eq!(stored.filled as usize, stored.occupants.len());
    assert_eq!(stored.filled, joined);
    if joined == 2 {
        assert_eq!(stored.status, Status::Accepted);
    }
}

#[tokio::test]
async fn test_open_listings_query_filters_kind() {
    require_emulator!();

    let (manager, _db) = manager().await;
    let listing = manager
        .post(&person(&unique_user("rider")), draft(ListingKind::SoloRideRequest, 1))
        .await
        .unwrap();

    let requests = manager
        .list_open(Some(ListingKind::SoloRideRequest))
        .await
        .unwrap();
    assert!(requests.iter().any(|l| l.id == listing.id));

    let carpools = manager
        .list_open(Some(ListingKind::CarpoolOffer))
        .await
        .unwrap();
    assert!(carpools.iter().all(|l| l.kind == ListingKind::CarpoolOffer));
}

// ═══════════════════════════════════════════════════════════════════════════
// MARKER TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_marker_claim_is_create_if_absent() {
    require_emulator!();

    let (manager, db) = manager().await;
    let listing = manager
        .post(&person(&unique_user("driver")), draft(ListingKind::CarpoolOffer, 2))
        .await
        .unwrap();

    let key = MarkerKey::new(&listing.id, listing.signature(), "someone");
    assert!(db.claim(&key).await.unwrap(), "first claim wins");
    assert!(!db.claim(&key).await.unwrap(), "second claim is a duplicate");
}
