// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Notification records and idempotency markers.

use crate::models::listing::{Role, TransitionSignature};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Where a notification should take the recipient when opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepLink {
    pub listing_id: String,
    /// Which view to open ("my rides as driver" vs "as passenger")
    pub open_as: Role,
}

/// A rendered notification ready for the delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub party_id: String,
    pub title: String,
    pub body: String,
    pub deep_link: DeepLink,
}

/// Idempotency marker key: one per (listing, transition, party).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerKey {
    pub listing_id: String,
    pub signature: TransitionSignature,
    pub party_id: String,
}

impl MarkerKey {
    pub fn new(listing_id: &str, signature: TransitionSignature, party_id: &str) -> Self {
        Self {
            listing_id: listing_id.to_string(),
            signature,
            party_id: party_id.to_string(),
        }
    }

    /// Document ID for the marker. Components are URL-encoded so user IDs
    /// containing `/` stay a single path segment.
    pub fn document_id(&self) -> String {
        format!(
            "{}_{}_{}",
            urlencoding::encode(&self.listing_id),
            self.signature,
            urlencoding::encode(&self.party_id)
        )
    }
}

/// Stored marker document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMarker {
    pub listing_id: String,
    pub signature: String,
    pub party_id: String,
    /// When the marker was claimed (ISO 8601)
    pub claimed_at: String,
}

impl NotificationMarker {
    pub fn from_key(key: &MarkerKey, claimed_at: DateTime<Utc>) -> Self {
        Self {
            listing_id: key.listing_id.clone(),
            signature: key.signature.to_string(),
            party_id: key.party_id.clone(),
            claimed_at: claimed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}
