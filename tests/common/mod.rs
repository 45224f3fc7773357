// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{Duration, Utc};
use futures_util::future::BoxFuture;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use ridepool::config::{tasks_invoker_email, Config};
use ridepool::db::{FirestoreDb, MemoryStore};
use ridepool::middleware::auth::create_jwt;
use ridepool::models::{ListingChange, ListingKind, Location, Notification, Occupant, VehicleType};
use ridepool::routes::create_router;
use ridepool::services::{
    ChannelPublisher, DeliveryChannel, DeliveryError, DispatchReport, FareEngine,
    GoogleOidcVerifier, LifecycleManager, ListingDraft, NotificationCoordinator, RetryConfig,
};
use ridepool::AppState;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Key ID the test Cloud Tasks tokens are signed under.
pub const TEST_TASKS_KID: &str = "test-tasks-key";
const TASKS_OIDC_PRIVATE_PEM: &str = include_str!("../fixtures/tasks_oidc_private.pem");
const TASKS_OIDC_PUBLIC_PEM: &str = include_str!("../fixtures/tasks_oidc_public.pem");

/// Delivery channel that remembers everything it was asked to send.
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<Notification>>,
    /// Parties whose deliveries fail
    unreachable: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingDelivery {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, party_id: &str) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.party_id == party_id)
            .collect()
    }

    pub fn fail_for(&self, party_id: &str) {
        self.unreachable.lock().unwrap().push(party_id.to_string());
    }
}

impl DeliveryChannel for RecordingDelivery {
    fn notify<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            if self
                .unreachable
                .lock()
                .unwrap()
                .contains(&notification.party_id)
            {
                return Err(DeliveryError::DeliveryFailed("unreachable".into()));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        })
    }
}

/// Everything a test needs to drive the service and inspect its effects.
#[allow(dead_code)]
pub struct TestContext {
    pub app: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub delivery: Arc<RecordingDelivery>,
    pub changes: mpsc::Receiver<ListingChange>,
}

#[allow(dead_code)]
impl TestContext {
    /// Dispatch every change published so far.
    pub async fn drain(&mut self) -> DispatchReport {
        let mut total = DispatchReport::default();
        while let Ok(change) = self.changes.try_recv() {
            let report = self.state.coordinator.dispatch(&change).await;
            total.delivered += report.delivered;
            total.duplicates += report.duplicates;
            total.failed += report.failed;
        }
        total
    }

    /// Take every change published so far without dispatching.
    pub fn take_changes(&mut self) -> Vec<ListingChange> {
        let mut changes = Vec::new();
        while let Ok(change) = self.changes.try_recv() {
            changes.push(change);
        }
        changes
    }
}

/// Build the service on an in-memory store with a recording delivery channel.
#[allow(dead_code)]
pub fn create_test_context() -> TestContext {
    let config = Config::test_default();
    let store = Arc::new(MemoryStore::new());
    let delivery = Arc::new(RecordingDelivery::default());
    let (publisher, changes) = ChannelPublisher::new(1024);

    let lifecycle = Arc::new(
        LifecycleManager::new(
            store.clone(),
            Arc::new(publisher),
            FareEngine::new(config.fare_utc_offset),
        )
        .with_retry(RetryConfig::IMMEDIATE.with_max_retries(config.tx_max_retries)),
    );
    let coordinator = Arc::new(NotificationCoordinator::new(
        store.clone(),
        delivery.clone(),
    ));

    let tasks_verifier = Arc::new(
        GoogleOidcVerifier::with_fixed_key(
            &config,
            TEST_TASKS_KID,
            DecodingKey::from_rsa_pem(TASKS_OIDC_PUBLIC_PEM.as_bytes())
                .expect("Invalid test OIDC public key"),
        )
        .expect("Failed to build test OIDC verifier"),
    );

    let state = Arc::new(AppState {
        config,
        lifecycle,
        coordinator,
        tasks_verifier,
    });

    TestContext {
        app: create_router(state.clone()),
        state,
        store,
        delivery,
        changes,
    }
}

/// Create a test app. Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let ctx = create_test_context();
    (ctx.app, ctx.state)
}

/// Session JWT for `user_id`, signed with the test key.
#[allow(dead_code)]
pub fn create_test_jwt(config: &Config, user_id: &str) -> String {
    create_jwt(user_id, &format!("User {user_id}"), &config.jwt_signing_key)
        .expect("Failed to create test JWT")
}

/// Claims Cloud Tasks puts in a callback token for this deployment.
#[allow(dead_code)]
pub fn tasks_oidc_claims(config: &Config) -> serde_json::Value {
    let now = Utc::now().timestamp();
    serde_json::json!({
        "iss": "https://accounts.google.com",
        "aud": config.api_url,
        "sub": "112233445566778899",
        "email": tasks_invoker_email(&config.gcp_project_id),
        "email_verified": true,
        "iat": now,
        "exp": now + 300,
    })
}

/// Sign `claims` with the test Cloud Tasks key.
#[allow(dead_code)]
pub fn sign_tasks_oidc_jwt(claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_TASKS_KID.to_string());
    let key = EncodingKey::from_rsa_pem(TASKS_OIDC_PRIVATE_PEM.as_bytes())
        .expect("Invalid test OIDC private key");
    jsonwebtoken::encode(&header, claims, &key).expect("Failed to sign test OIDC token")
}

/// A valid Cloud Tasks callback token.
#[allow(dead_code)]
pub fn create_test_tasks_oidc_jwt(config: &Config) -> String {
    sign_tasks_oidc_jwt(&tasks_oidc_claims(config))
}

#[allow(dead_code)]
pub fn person(id: &str) -> Occupant {
    Occupant {
        user_id: id.to_string(),
        display_name: format!("User {id}"),
    }
}

/// A car listing from Gulshan to Motijheel leaving in two hours.
#[allow(dead_code)]
pub fn draft(kind: ListingKind, capacity: u32) -> ListingDraft {
    ListingDraft {
        kind,
        vehicle_type: VehicleType::Car,
        pickup: Location {
            label: "Gulshan 2".into(),
            lat: 23.7925,
            lng: 90.4078,
        },
        drop: Location {
            label: "Motijheel".into(),
            lat: 23.7330,
            lng: 90.4172,
        },
        departure_at: Utc::now() + Duration::hours(2),
        capacity,
        asking_fare: None,
    }
}

/// Read a JSON response body.
#[allow(dead_code)]
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// Authenticated JSON POST.
#[allow(dead_code)]
pub fn post_json(uri: &str, token: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Authenticated GET.
#[allow(dead_code)]
pub fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}
