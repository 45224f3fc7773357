// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store for tests and local runs without Firestore.
//!
//! Each listing's read-modify-write runs while holding its map shard lock,
//! so updates to one listing are serialized and never lost.

use crate::db::{ListingStore, MarkerStore, TxAction, TxBody, TxOutcome};
use crate::models::{Listing, ListingKind, MarkerKey, Status};
use crate::services::lifecycle::LifecycleError;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures_util::future::BoxFuture;

#[derive(Debug, Default)]
pub struct MemoryStore {
    listings: DashMap<String, Listing>,
    markers: DashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of claimed notification markers.
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

impl ListingStore for MemoryStore {
    fn create_listing<'a>(
        &'a self,
        listing: &'a Listing,
    ) -> BoxFuture<'a, Result<(), LifecycleError>> {
        Box::pin(async move {
            match self.listings.entry(listing.id.clone()) {
                Entry::Occupied(_) => Err(LifecycleError::Store(format!(
                    "listing {} already exists",
                    listing.id
                ))),
                Entry::Vacant(slot) => {
                    slot.insert(listing.clone());
                    Ok(())
                }
            }
        })
    }

    fn get_listing<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Listing>, LifecycleError>> {
        Box::pin(async move { Ok(self.listings.get(id).map(|l| l.value().clone())) })
    }

    fn update_listing<'a>(
        &'a self,
        id: &'a str,
        body: &'a mut TxBody<'_>,
    ) -> BoxFuture<'a, Result<TxOutcome, LifecycleError>> {
        Box::pin(async move {
            let mut stored = self
                .listings
                .get_mut(id)
                .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;

            let mut working = stored.clone();
            let action = body(&mut working)?;
            if action == TxAction::Commit {
                working.revision = stored.revision + 1;
                *stored = working.clone();
            }
            Ok(TxOutcome {
                listing: working,
                action,
            })
        })
    }

    fn query_by_status<'a>(
        &'a self,
        status: Status,
        kind: Option<ListingKind>,
    ) -> BoxFuture<'a, Result<Vec<Listing>, LifecycleError>> {
        Box::pin(async move {
            let mut found: Vec<Listing> = self
                .listings
                .iter()
                .filter(|l| l.status == status && kind.is_none_or(|k| l.kind == k))
                .map(|l| l.value().clone())
                .collect();
            found.sort_by(|a, b| {
                a.departure_at
                    .cmp(&b.departure_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(found)
        })
    }
}

impl MarkerStore for MemoryStore {
    fn claim<'a>(&'a self, key: &'a MarkerKey) -> BoxFuture<'a, Result<bool, LifecycleError>> {
        Box::pin(async move { Ok(self.markers.insert(key.document_id())) })
    }
}
