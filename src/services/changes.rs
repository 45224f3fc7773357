// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Change feed: committed listing mutations fan out to observers.
//!
//! The feed is at-least-once. Observers must tolerate duplicates. Publishing
//! never waits on observers: a full in-process feed drops the change.

use crate::models::ListingChange;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

/// Default buffer for the in-process feed.
pub const CHANGE_FEED_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Change feed closed")]
    Closed,

    #[error("Change feed full, change dropped")]
    Full,

    #[error("Failed to enqueue change: {0}")]
    Enqueue(String),
}

/// Sink for committed listing changes.
pub trait ChangePublisher: Send + Sync {
    fn publish<'a>(&'a self, change: &'a ListingChange) -> BoxFuture<'a, Result<(), PublishError>>;
}

/// In-process feed backed by a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<ListingChange>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end for the coordinator.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ListingChange>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl ChangePublisher for ChannelPublisher {
    fn publish<'a>(&'a self, change: &'a ListingChange) -> BoxFuture<'a, Result<(), PublishError>> {
        Box::pin(async move {
            self.sender
                .try_send(change.clone())
                .map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => PublishError::Full,
                    mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
                })
        })
    }
}
