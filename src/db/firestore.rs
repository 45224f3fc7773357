// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Listings (posted rides and carpools, updated transactionally)
//! - Notification markers (create-if-absent idempotency records)

use crate::db::{collections, ListingStore, MarkerStore, TxAction, TxBody, TxOutcome};
use crate::error::AppError;
use crate::models::{Listing, ListingKind, MarkerKey, NotificationMarker, Status};
use crate::services::lifecycle::LifecycleError;
use firestore::errors::FirestoreError;
use firestore::FirestoreTransaction;
use futures_util::future::BoxFuture;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator accepts any token; skip credential discovery.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, LifecycleError> {
        self.client
            .as_ref()
            .ok_or_else(|| LifecycleError::Store("Database not connected (offline mode)".into()))
    }

    // ─── Listing Operations ──────────────────────────────────────

    async fn insert_listing(&self, listing: &Listing) -> Result<(), LifecycleError> {
        let _: Listing = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::LISTINGS)
            .document_id(&listing.id)
            .object(listing)
            .execute()
            .await
            .map_err(|e| store_error("Failed to create listing", e))?;
        Ok(())
    }

    async fn read_listing(&self, id: &str) -> Result<Option<Listing>, LifecycleError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::LISTINGS)
            .obj()
            .one(id)
            .await
            .map_err(|e| store_error("Failed to read listing", e))
    }

    /// Read, mutate and write one listing inside a Firestore transaction.
    ///
    /// The read is registered with the transaction, so a concurrent commit
    /// to the same document aborts ours and we report `Stale`.
    async fn transact_listing(
        &self,
        id: &str,
        body: &mut TxBody<'_>,
    ) -> Result<TxOutcome, LifecycleError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        let tx_client = client.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        );

        let current: Option<Listing> = match tx_client
            .fluent()
            .select()
            .by_id_in(collections::LISTINGS)
            .obj()
            .one(id)
            .await
        {
            Ok(current) => current,
            Err(e) => {
                return abandon(
                    transaction,
                    store_error("Failed to read listing in transaction", e),
                )
                .await;
            }
        };

        let Some(mut listing) = current else {
            return abandon(transaction, LifecycleError::NotFound(id.to_string())).await;
        };

        let action = match body(&mut listing) {
            Ok(action) => action,
            Err(e) => return abandon(transaction, e).await,
        };

        if action == TxAction::Skip {
            release(transaction).await;
            return Ok(TxOutcome { listing, action });
        }

        listing.revision += 1;

        let staged = client
            .fluent()
            .update()
            .in_col(collections::LISTINGS)
            .document_id(id)
            .object(&listing)
            .add_to_transaction(&mut transaction);
        if let Err(e) = staged {
            return abandon(
                transaction,
                store_error("Failed to add listing to transaction", e),
            )
            .await;
        }

        // commit() consumes the transaction; a failed commit is already
        // finished on the server side and cannot be rolled back.
        transaction
            .commit()
            .await
            .map_err(|e| store_error("Transaction commit failed", e))?;

        tracing::debug!(
            listing_id = id,
            status = %listing.status,
            filled = listing.filled,
            revision = listing.revision,
            "Listing committed"
        );

        Ok(TxOutcome { listing, action })
    }

    async fn listings_with_status(
        &self,
        status: Status,
        kind: Option<ListingKind>,
    ) -> Result<Vec<Listing>, LifecycleError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::LISTINGS)
            .filter(move |q| {
                q.for_all([
                    q.field("status").eq(status.as_str()),
                    kind.and_then(|k| q.field("kind").eq(k.as_str())),
                ])
            })
            .order_by([(
                "departure_at",
                firestore::FirestoreQueryDirection::Ascending,
            )])
            .obj()
            .query()
            .await
            .map_err(|e| store_error("Failed to query listings", e))
    }

    // ─── Notification Marker Operations ──────────────────────────

    async fn insert_marker(&self, key: &MarkerKey) -> Result<bool, LifecycleError> {
        let marker = NotificationMarker::from_key(key, chrono::Utc::now());

        let result: Result<NotificationMarker, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::NOTIFICATION_MARKERS)
            .document_id(key.document_id())
            .object(&marker)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(store_error("Failed to claim notification marker", e)),
        }
    }
}

/// Map a Firestore error, treating contention as `Stale`.
/// Roll back a transaction that will not be committed.
async fn release(transaction: FirestoreTransaction<'_>) {
    if let Err(e) = transaction.rollback().await {
        tracing::warn!(error = %e, "Failed to roll back listing transaction");
    }
}

/// Roll back, then fail with `err`.
async fn abandon<T>(
    transaction: FirestoreTransaction<'_>,
    err: LifecycleError,
) -> Result<T, LifecycleError> {
    release(transaction).await;
    Err(err)
}

fn store_error(context: &str, err: FirestoreError) -> LifecycleError {
    match err {
        FirestoreError::DataConflictError(_) => LifecycleError::Stale,
        FirestoreError::DatabaseError(ref db) if db.retry_possible => LifecycleError::Stale,
        other => LifecycleError::Store(format!("{}: {}", context, other)),
    }
}

impl ListingStore for FirestoreDb {
    fn create_listing<'a>(
        &'a self,
        listing: &'a Listing,
    ) -> BoxFuture<'a, Result<(), LifecycleError>> {
        Box::pin(self.insert_listing(listing))
    }

    fn get_listing<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Listing>, LifecycleError>> {
        Box::pin(self.read_listing(id))
    }

    fn update_listing<'a>(
        &'a self,
        id: &'a str,
        body: &'a mut TxBody<'_>,
    ) -> BoxFuture<'a, Result<TxOutcome, LifecycleError>> {
        Box::pin(self.transact_listing(id, body))
    }

    fn query_by_status<'a>(
        &'a self,
        status: Status,
        kind: Option<ListingKind>,
    ) -> BoxFuture<'a, Result<Vec<Listing>, LifecycleError>> {
        Box::pin(self.listings_with_status(status, kind))
    }
}

impl MarkerStore for FirestoreDb {
    fn claim<'a>(&'a self, key: &'a MarkerKey) -> BoxFuture<'a, Result<bool, LifecycleError>> {
        Box::pin(self.insert_marker(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_mock_reports_store_error() {
        let db = FirestoreDb::new_mock();
        let err = db.get_listing("abc").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Store(_)));
    }
}
