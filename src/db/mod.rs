// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer.
//!
//! Listings and notification markers live behind two small traits so the
//! lifecycle manager and the notification coordinator can run against
//! Firestore in production and an in-process map in tests and local runs.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::models::{Listing, ListingKind, MarkerKey, Status};
use crate::services::lifecycle::LifecycleError;
use futures_util::future::BoxFuture;

/// Collection names as constants.
pub mod collections {
    pub const LISTINGS: &str = "listings";
    /// Notification idempotency markers (keyed by `MarkerKey::document_id`)
    pub const NOTIFICATION_MARKERS: &str = "notification_markers";
}

/// What a transaction body decided to do with the listing it read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxAction {
    /// Write the mutated listing.
    Commit,
    /// Leave the stored listing untouched (idempotent no-op).
    Skip,
}

/// Result of a read-modify-write.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    /// Listing as read, if skipped; as written, if committed
    pub listing: Listing,
    pub action: TxAction,
}

/// Transaction body: mutate the listing in place or return a guard error.
pub type TxBody<'a> = dyn FnMut(&mut Listing) -> Result<TxAction, LifecycleError> + Send + 'a;

/// Persistent listing storage with single-document atomic updates.
///
/// `update_listing` must apply `body` to the current stored value and
/// commit only if nothing else committed in between. A lost race surfaces
/// as `LifecycleError::Stale`; the caller decides whether to retry.
pub trait ListingStore: Send + Sync {
    fn create_listing<'a>(&'a self, listing: &'a Listing)
        -> BoxFuture<'a, Result<(), LifecycleError>>;

    fn get_listing<'a>(&'a self, id: &'a str)
        -> BoxFuture<'a, Result<Option<Listing>, LifecycleError>>;

    fn update_listing<'a>(
        &'a self,
        id: &'a str,
        body: &'a mut TxBody<'_>,
    ) -> BoxFuture<'a, Result<TxOutcome, LifecycleError>>;

    /// All listings in `status`, optionally restricted to one kind.
    fn query_by_status<'a>(
        &'a self,
        status: Status,
        kind: Option<ListingKind>,
    ) -> BoxFuture<'a, Result<Vec<Listing>, LifecycleError>>;
}

/// Atomic create-if-absent storage for notification markers.
pub trait MarkerStore: Send + Sync {
    /// Claim `key`. Returns `true` if this call created the marker and
    /// `false` if it already existed.
    fn claim<'a>(&'a self, key: &'a MarkerKey) -> BoxFuture<'a, Result<bool, LifecycleError>>;
}
